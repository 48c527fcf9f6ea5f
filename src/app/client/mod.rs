//! HTTP client for the CMS data service
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: rate limiting and the throttling-aware retry loop
//! - `envelope`: XML/JSON response normalisation
//! - `auth`: Basic credential to bearer token exchange
//! - `catalog`: device and raw-file listings
//! - `download`: streamed raw-file retrieval with optional archiving

use std::path::Path;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app::models::{Device, RawFileDescriptor, TimeWindow};
use crate::app::naming;
use crate::auth::Credential;
use crate::errors::{AuthResult, CatalogResult, DownloadResult, HttpError, HttpResult};

pub mod auth;
pub mod catalog;
pub mod config;
pub mod download;
pub mod envelope;
pub mod http;

pub use auth::SessionToken;
pub use config::ClientConfig;
pub use http::RetryPolicy;

use auth::AuthHandler;
use catalog::CatalogHandler;
use download::DownloadHandler;
use http::HttpHandler;

/// HTTP client for the CMS data service
///
/// Holds the connection pool, rate limiter and retry policy. Session state
/// (the bearer token) is passed explicitly to every authenticated call.
#[derive(Debug)]
pub struct CmsClient {
    http_handler: HttpHandler,
    base_url: Url,
}

impl CmsClient {
    /// Creates a new client from configuration
    ///
    /// # Errors
    ///
    /// Returns `HttpError` if the base URL is invalid or the client cannot be built
    pub fn new(config: &ClientConfig) -> HttpResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| HttpError::InvalidUrl {
            url: config.base_url.clone(),
            error: e.to_string(),
        })?;
        let client = config.build_http_client()?;
        let http_handler =
            HttpHandler::new(client, config.rate_limit_rps, config.retry_policy.clone())?;

        tracing::debug!("Created CMS client for {}", base_url);
        Ok(Self {
            http_handler,
            base_url,
        })
    }

    /// Exchange the credential for a session token
    pub async fn authenticate(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> AuthResult<SessionToken> {
        AuthHandler::authenticate(&self.http_handler, &self.base_url, credential, cancel).await
    }

    /// List every device in the catalog
    pub async fn list_devices(
        &self,
        token: &SessionToken,
        cancel: &CancellationToken,
    ) -> CatalogResult<Vec<Device>> {
        CatalogHandler::new(&self.http_handler, &self.base_url, token)
            .list_devices(cancel)
            .await
    }

    /// List raw files for one device in a window
    pub async fn list_files(
        &self,
        token: &SessionToken,
        device: &Device,
        window: &TimeWindow,
        cancel: &CancellationToken,
    ) -> CatalogResult<Vec<RawFileDescriptor>> {
        CatalogHandler::new(&self.http_handler, &self.base_url, token)
            .list_files(device, window, cancel)
            .await
    }

    /// Download endpoint of a raw file
    pub fn locator(
        &self,
        device: &Device,
        descriptor: &RawFileDescriptor,
        format: &str,
    ) -> HttpResult<Url> {
        naming::resolve_remote_locator(&self.base_url, device, descriptor, format)
    }

    /// Fetch a raw file, optionally archiving it at `archive`
    pub async fn fetch(
        &self,
        token: &SessionToken,
        locator: &Url,
        archive: Option<&Path>,
        cancel: &CancellationToken,
    ) -> DownloadResult<Vec<u8>> {
        DownloadHandler::new(&self.http_handler, token)
            .fetch(locator, archive, cancel)
            .await
    }

    /// Get the base URL of the data service
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = CmsClient::new(&ClientConfig::default()).unwrap();
        assert_eq!(client.base_url().scheme(), "https");
    }

    #[test]
    fn test_client_rejects_bad_base_url() {
        let config = ClientConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            CmsClient::new(&config),
            Err(HttpError::InvalidUrl { .. })
        ));

        let config = ClientConfig {
            rate_limit_rps: 0,
            ..Default::default()
        };
        assert!(matches!(
            CmsClient::new(&config),
            Err(HttpError::InvalidRateLimit)
        ));
    }
}
