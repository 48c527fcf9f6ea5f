//! CMS session authentication
//!
//! Exchanges the static Basic credential for a bearer token. The token is
//! held for the whole run and never refreshed.

use reqwest::header::{HeaderValue, AUTHORIZATION};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app::client::envelope::{self, lookup};
use crate::app::client::http::{ApiRequest, HttpHandler};
use crate::auth::Credential;
use crate::constants::{api, auth};
use crate::errors::{AuthError, AuthResult, HttpError};

/// Bearer token obtained from the login endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    header: HeaderValue,
}

impl SessionToken {
    /// Wrap a raw token, validating that it can travel in a header
    pub fn new(token: &str) -> AuthResult<Self> {
        let mut header = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            AuthError::MalformedResponse {
                reason: "token contains characters not allowed in a header".to_string(),
            }
        })?;
        header.set_sensitive(true);
        Ok(Self { header })
    }

    /// Value for the `Authorization` header
    pub fn bearer_header(&self) -> HeaderValue {
        self.header.clone()
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

/// Handles CMS authentication operations
pub struct AuthHandler;

impl AuthHandler {
    /// Login endpoint below `base_url`
    pub fn login_url(base_url: &Url) -> AuthResult<Url> {
        let mut url = base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                AuthError::Http(HttpError::InvalidUrl {
                    url: base_url.to_string(),
                    error: "base URL cannot carry path segments".to_string(),
                })
            })?
            .pop_if_empty()
            .extend(api::LOGIN_PATH);
        Ok(url)
    }

    /// Exchange `credential` for a session token
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if:
    /// - The login endpoint answers with a non-success status
    /// - The response is neither XML nor JSON
    /// - The token field is missing from the response
    pub async fn authenticate(
        http: &HttpHandler,
        base_url: &Url,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> AuthResult<SessionToken> {
        let url = Self::login_url(base_url)?;
        tracing::info!("Authenticating with CMS service at {}", url);

        let request = ApiRequest::get(url).header(AUTHORIZATION, credential.authorization_header()?);
        let response = http.execute(&request, cancel).await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("Login failed with HTTP {}", status);
            return Err(AuthError::LoginFailed { status });
        }

        let body = envelope::decode_response(response).await?;
        let token = Self::extract_token(&body)?;

        tracing::info!("Successfully authenticated with CMS service");
        Ok(token)
    }

    /// Pull the token out of a decoded login envelope
    ///
    /// The token lives at `accessToken.token`, either at the top level or
    /// below a single wrapping element.
    pub fn extract_token(body: &serde_json::Value) -> AuthResult<SessionToken> {
        let direct = lookup(body, &auth::TOKEN_PATH);
        let wrapped = || {
            body.as_object()
                .filter(|root| root.len() == 1)
                .and_then(|root| root.values().next())
                .and_then(|inner| lookup(inner, &auth::TOKEN_PATH))
        };

        match direct.or_else(wrapped).and_then(|token| token.as_str()) {
            Some(token) if !token.trim().is_empty() => SessionToken::new(token.trim()),
            _ => {
                tracing::error!("Login failed: 'token' not found in the response");
                tracing::debug!("Response content: {}", body);
                Err(AuthError::MissingToken)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_login_url() {
        let base = Url::parse("https://cms.example.com/weblog-datasrv").unwrap();
        assert_eq!(
            AuthHandler::login_url(&base).unwrap().as_str(),
            "https://cms.example.com/weblog-datasrv/auth/login"
        );
    }

    #[test]
    fn test_extract_token_json_and_xml_shapes() {
        let json_body = json!({"accessToken": {"token": "abc"}});
        assert_eq!(
            AuthHandler::extract_token(&json_body).unwrap().bearer_header(),
            "Bearer abc"
        );

        // Decoded XML keeps the document root as the outer key
        let xml_body = json!({"loginResponse": {"accessToken": {"token": "xyz"}}});
        assert_eq!(
            AuthHandler::extract_token(&xml_body).unwrap().bearer_header(),
            "Bearer xyz"
        );
    }

    #[test]
    fn test_extract_token_missing() {
        for body in [
            json!({"accessToken": {}}),
            json!({"accessToken": {"token": null}}),
            json!({"accessToken": {"token": ""}}),
            json!({"somethingElse": true}),
        ] {
            assert!(matches!(
                AuthHandler::extract_token(&body),
                Err(AuthError::MissingToken)
            ));
        }
    }

    #[test]
    fn test_session_token_debug_is_redacted() {
        let token = SessionToken::new("secret").unwrap();
        assert!(!format!("{:?}", token).contains("secret"));
        assert_eq!(token.bearer_header(), "Bearer secret");
        assert!(SessionToken::new("bad\ntoken").is_err());
    }
}
