//! Basic credential presented to the login endpoint

use std::env;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::HeaderValue;

use crate::constants::env as env_constants;
use crate::errors::{AuthError, AuthResult};

/// Base64-encoded `user:password` pair
///
/// The encoded value never appears in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    encoded: String,
}

impl Credential {
    /// Use an already-encoded credential
    pub fn from_api_key(key: impl Into<String>) -> Self {
        Self {
            encoded: key.into().trim().to_string(),
        }
    }

    /// Encode a username and password
    pub fn from_parts(username: &str, password: &str) -> Self {
        Self {
            encoded: STANDARD.encode(format!("{}:{}", username, password)),
        }
    }

    /// Load from `CMS_API_KEY`, falling back to `CMS_USERNAME` + `CMS_PASSWORD`
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingCredentials` if neither form is set
    pub fn from_env() -> AuthResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Credential::from_env`] over an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(env_constants::API_KEY) {
            return Ok(Self::from_api_key(key));
        }

        match (
            non_empty(env_constants::USERNAME),
            non_empty(env_constants::PASSWORD),
        ) {
            (Some(username), Some(password)) => Ok(Self::from_parts(username.trim(), &password)),
            _ => Err(AuthError::MissingCredentials),
        }
    }

    /// `Authorization: Basic ...` value
    pub fn authorization_header(&self) -> AuthResult<HeaderValue> {
        if self.encoded.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let mut value = HeaderValue::from_str(&format!("Basic {}", self.encoded)).map_err(|_| {
            AuthError::InvalidCredential {
                reason: "credential contains characters not allowed in a header".to_string(),
            }
        })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_from_parts_encodes_basic_pair() {
        let credential = Credential::from_parts("user", "pass");
        let header = credential.authorization_header().unwrap();
        assert_eq!(header.to_str().unwrap(), "Basic dXNlcjpwYXNz");
        assert!(header.is_sensitive());
    }

    #[test]
    fn test_api_key_takes_precedence() {
        let credential = Credential::from_lookup(lookup(&[
            ("CMS_API_KEY", " a2V5 "),
            ("CMS_USERNAME", "user"),
            ("CMS_PASSWORD", "pass"),
        ]))
        .unwrap();
        assert_eq!(credential, Credential::from_api_key("a2V5"));
    }

    #[test]
    fn test_username_password_fallback() {
        let credential = Credential::from_lookup(lookup(&[
            ("CMS_API_KEY", ""),
            ("CMS_USERNAME", "user"),
            ("CMS_PASSWORD", "pass"),
        ]))
        .unwrap();
        assert_eq!(credential, Credential::from_parts("user", "pass"));
    }

    #[test]
    fn test_missing_credentials() {
        assert!(matches!(
            Credential::from_lookup(lookup(&[("CMS_USERNAME", "user")])),
            Err(AuthError::MissingCredentials)
        ));
        assert!(matches!(
            Credential::from_api_key("").authorization_header(),
            Err(AuthError::MissingCredentials)
        ));
    }

    #[test]
    fn test_invalid_header_characters() {
        let credential = Credential::from_api_key("bad\nkey");
        assert!(matches!(
            credential.authorization_header(),
            Err(AuthError::InvalidCredential { .. })
        ));
    }

    #[test]
    fn test_debug_is_redacted() {
        let rendered = format!("{:?}", Credential::from_parts("user", "secret"));
        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("c2VjcmV0"));
    }
}
