//! CMS Fetcher Library
//!
//! Retrieves raw vibration captures of wind turbines from a condition-monitoring
//! data service and turns them into timestamped records. Requests are throttled
//! and retried according to the service's 429/503/504 signals; the sectioned
//! text captures are parsed leniently, keeping whatever is recoverable.

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use constants::*;

    #[test]
    fn test_constants_accessible() {
        assert_eq!(DEFAULT_CONCURRENCY, 1);
        assert_eq!(ENV_USERNAME, "CMS_USERNAME");
        assert_eq!(ENV_API_KEY, "CMS_API_KEY");
        assert!(USER_AGENT.contains("CMS-Fetcher"));
    }

    #[test]
    fn test_error_types() {
        let auth_error = errors::AuthError::MissingToken;
        let app_error = AppError::Auth(auth_error);

        assert_eq!(app_error.category(), "authentication");
        assert!(!app_error.is_recoverable());

        let catalog = AppError::Catalog(errors::CatalogError::NoDevices);
        assert_eq!(catalog.category(), "catalog");
        assert!(!catalog.is_cancelled());
    }
}
