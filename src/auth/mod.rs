//! Authentication management for CMS credentials
//!
//! [`Credential`] is the Basic credential exchanged for a session token at
//! login. The setup helpers manage its storage in a `.env` file.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cms_fetcher::app::ClientConfig;
//! use cms_fetcher::auth::{check_credentials, setup_credentials};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! if !check_credentials() {
//!     println!("Setting up credentials...");
//!     setup_credentials(&ClientConfig::default()).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod credential;
pub mod setup;

// Re-export main public API
pub use credential::Credential;
pub use setup::{
    check_credentials, get_auth_status, prompt_credentials, save_credentials, setup_credentials,
    show_auth_status, verify_credentials, AuthStatus,
};
