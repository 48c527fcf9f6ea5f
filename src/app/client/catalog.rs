//! Device and raw-file catalog listing

use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app::client::auth::SessionToken;
use crate::app::client::envelope::{self, list_at, lookup};
use crate::app::client::http::{ApiRequest, HttpHandler};
use crate::app::models::{Device, RawFileDescriptor, TimeWindow};
use crate::constants::api;
use crate::errors::{CatalogError, CatalogResult, HttpError};

/// Lists devices and raw files through an authenticated session
pub struct CatalogHandler<'a> {
    http: &'a HttpHandler,
    base_url: &'a Url,
    token: &'a SessionToken,
}

impl<'a> CatalogHandler<'a> {
    pub fn new(http: &'a HttpHandler, base_url: &'a Url, token: &'a SessionToken) -> Self {
        Self {
            http,
            base_url,
            token,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> CatalogResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                CatalogError::Http(HttpError::InvalidUrl {
                    url: self.base_url.to_string(),
                    error: "base URL cannot carry path segments".to_string(),
                })
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch_envelope(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> CatalogResult<Value> {
        let request = request.header(AUTHORIZATION, self.token.bearer_header());
        let response = self.http.execute(&request, cancel).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                url: request.url.to_string(),
                status,
            });
        }

        Ok(envelope::decode_response(response).await?)
    }

    /// List every device visible to the session
    ///
    /// Entries missing an id, identity or name are skipped.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NoDevices` if `systemItems.systemItem` is missing or empty
    pub async fn list_devices(&self, cancel: &CancellationToken) -> CatalogResult<Vec<Device>> {
        let url = self.endpoint(&[api::SYSTEMS_SEGMENT])?;
        tracing::debug!("Listing devices from {}", url);

        let body = self.fetch_envelope(ApiRequest::get(url), cancel).await?;
        let items: Vec<Value> = list_at(&body, &api::DEVICE_LIST_PATH)?;
        if items.is_empty() {
            tracing::error!("No devices found in the catalog response");
            return Err(CatalogError::NoDevices);
        }

        let devices: Vec<Device> = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<Device>(item.clone()) {
                Ok(device) if !device.id.is_empty() && !device.identity.is_empty() => Some(device),
                Ok(_) | Err(_) => {
                    tracing::debug!("Skipping incomplete device entry: {}", item);
                    None
                }
            })
            .collect();

        if devices.is_empty() {
            return Err(CatalogError::NoDevices);
        }

        tracing::info!("Catalog lists {} devices", devices.len());
        Ok(devices)
    }

    /// List raw files for `device` within the inclusive `window`
    ///
    /// An empty listing is not an error. Descriptors that cannot be decoded
    /// are skipped with a warning.
    pub async fn list_files(
        &self,
        device: &Device,
        window: &TimeWindow,
        cancel: &CancellationToken,
    ) -> CatalogResult<Vec<RawFileDescriptor>> {
        let url = self.endpoint(&[api::SYSTEMS_SEGMENT, &device.id, api::RAWFILES_SEGMENT])?;
        let request = ApiRequest::get(url)
            .query("from", window.start_epoch())
            .query("to", window.end_epoch());

        let body = self.fetch_envelope(request, cancel).await?;
        if lookup(&body, &api::RAW_FILE_LIST_PATH[..1]).is_none() {
            tracing::info!("No raw files data found for device {}", device.id);
            return Ok(Vec::new());
        }

        let items: Vec<Value> = list_at(&body, &api::RAW_FILE_LIST_PATH)?;
        let descriptors: Vec<RawFileDescriptor> = items
            .into_iter()
            .filter_map(|item| {
                serde_json::from_value::<RawFileDescriptor>(item.clone())
                    .map_err(|e| {
                        tracing::warn!(
                            "Skipping undecodable raw file entry for device {}: {} ({})",
                            device.id,
                            item,
                            e
                        );
                    })
                    .ok()
            })
            .collect();

        tracing::debug!(
            "Device {} lists {} raw files in {}",
            device.id,
            descriptors.len(),
            window
        );
        Ok(descriptors)
    }
}
