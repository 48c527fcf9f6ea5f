//! Credential storage and interactive setup
//!
//! Credentials are stored in a `.env` file in the working directory with
//! owner-only permissions and loaded through `dotenv` at startup.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::app::client::{ClientConfig, CmsClient};
use crate::auth::Credential;
use crate::constants::{auth, env as env_constants};
use crate::errors::{AuthError, AuthResult};

const DOTENV_FILE: &str = ".env";

/// Authentication status information
#[derive(Debug, Clone)]
pub struct AuthStatus {
    /// Whether a pre-encoded API key is set
    pub api_key_set: bool,
    /// Whether username environment variable is set
    pub username_set: bool,
    /// Whether password environment variable is set
    pub password_set: bool,
    /// Whether .env file exists in current directory
    pub dotenv_file_exists: bool,
    /// Whether credentials have been verified (None = not tested)
    pub credentials_valid: Option<bool>,
}

impl AuthStatus {
    /// Check if a usable credential is available in the environment
    pub fn has_credentials(&self) -> bool {
        self.api_key_set || (self.username_set && self.password_set)
    }

    /// Get descriptive status message for display
    pub fn status_message(&self) -> String {
        match (self.has_credentials(), self.credentials_valid) {
            (false, _) => "Missing credentials - run 'auth setup' to configure".to_string(),
            (true, None) => "Credentials configured but not verified".to_string(),
            (true, Some(true)) => "Credentials configured and verified".to_string(),
            (true, Some(false)) => "Credentials configured but rejected by the service".to_string(),
        }
    }
}

fn is_set(name: &str) -> bool {
    env::var(name).map(|v| !v.trim().is_empty()).unwrap_or(false)
}

/// Check current authentication status
pub fn get_auth_status() -> AuthStatus {
    AuthStatus {
        api_key_set: is_set(env_constants::API_KEY),
        username_set: is_set(env_constants::USERNAME),
        password_set: is_set(env_constants::PASSWORD),
        dotenv_file_exists: Path::new(DOTENV_FILE).exists(),
        credentials_valid: None,
    }
}

/// Check if credentials exist in environment variables
pub fn check_credentials() -> bool {
    get_auth_status().has_credentials()
}

/// Prompt user for credentials interactively
pub fn prompt_credentials() -> AuthResult<(String, String)> {
    print!("CMS Username: ");
    io::stdout().flush()?;

    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    let username = username.trim().to_string();

    if username.is_empty() {
        return Err(AuthError::InvalidUsername {
            reason: "Username cannot be empty".to_string(),
        });
    }

    if !is_valid_username(&username) {
        return Err(AuthError::InvalidUsername {
            reason: format!(
                "Username must be {}-{} characters without whitespace or ':'",
                auth::MIN_USERNAME_LENGTH,
                auth::MAX_USERNAME_LENGTH
            ),
        });
    }

    let password = rpassword::prompt_password("CMS Password: ")?;
    if password.is_empty() {
        return Err(AuthError::InvalidCredential {
            reason: "Password cannot be empty".to_string(),
        });
    }

    Ok((username, password))
}

/// Usernames end up in a Basic `user:password` pair, so ':' is not allowed
fn is_valid_username(username: &str) -> bool {
    let len = username.chars().count();
    if len < auth::MIN_USERNAME_LENGTH || len > auth::MAX_USERNAME_LENGTH {
        return false;
    }

    username
        .chars()
        .all(|c| !c.is_whitespace() && !c.is_control() && c != ':')
}

/// Rewrite `path` so it carries `entries`, keeping every unrelated line
fn upsert_env_file(path: &Path, entries: &[(&str, &str)]) -> AuthResult<()> {
    let mut lines = Vec::new();
    let mut written = vec![false; entries.len()];

    if path.exists() {
        let reader = BufReader::new(File::open(path)?);
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim_start();
            match entries
                .iter()
                .position(|(name, _)| trimmed.starts_with(&format!("{}=", name)))
            {
                Some(i) => {
                    lines.push(format!("{}={}", entries[i].0, entries[i].1));
                    written[i] = true;
                }
                None => lines.push(line),
            }
        }
    }

    for ((name, value), done) in entries.iter().zip(&written) {
        if !done {
            lines.push(format!("{}={}", name, value));
        }
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    for line in lines {
        writeln!(file, "{}", line)?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file.metadata()?.permissions();
        perms.set_mode(auth::ENV_FILE_PERMISSIONS);
        file.set_permissions(perms)?;
    }

    Ok(())
}

/// Save credentials to .env file with secure permissions
pub fn save_credentials(username: &str, password: &str) -> AuthResult<()> {
    upsert_env_file(
        Path::new(DOTENV_FILE),
        &[
            (env_constants::USERNAME, username),
            (env_constants::PASSWORD, password),
        ],
    )?;

    // Make the new values visible to the rest of this process
    env::set_var(env_constants::USERNAME, username);
    env::set_var(env_constants::PASSWORD, password);

    println!("Credentials saved to {} file", DOTENV_FILE);

    #[cfg(unix)]
    println!("File permissions set to owner-only (600)");

    #[cfg(not(unix))]
    println!(
        "Warning: File permissions not set (non-Unix system). Please ensure .env file is protected."
    );

    Ok(())
}

/// Verify credentials by logging in to the service
///
/// Returns `Ok(false)` when the service rejects the credential and an error
/// when the service cannot be reached at all.
pub async fn verify_credentials(config: &ClientConfig) -> AuthResult<bool> {
    let credential = Credential::from_env()?;
    let client = CmsClient::new(config)?;

    println!("Verifying credentials with {}...", client.base_url());

    match client
        .authenticate(&credential, &CancellationToken::new())
        .await
    {
        Ok(_) => {
            println!("Credentials verified successfully!");
            Ok(true)
        }
        Err(e @ AuthError::Http(_)) => Err(e),
        Err(e) => {
            println!("Credential verification failed: {}", e);
            Ok(false)
        }
    }
}

/// Interactive credential setup workflow
pub async fn setup_credentials(config: &ClientConfig) -> AuthResult<()> {
    println!("CMS Authentication Setup");
    println!("========================");
    println!();
    println!("Your credentials will be stored in a .env file in the current directory.");
    println!();

    if check_credentials() {
        println!("Warning: Credentials are already configured.");
        print!("Do you want to update them? [y/N]: ");
        io::stdout().flush()?;

        let mut response = String::new();
        io::stdin().read_line(&mut response)?;

        if !response.trim().to_lowercase().starts_with('y') {
            println!("Setup cancelled.");
            return Ok(());
        }
        println!();
    }

    let (username, password) = prompt_credentials()?;

    println!();
    save_credentials(&username, &password)?;
    // A stale API key would shadow the new pair
    env::remove_var(env_constants::API_KEY);

    println!();
    if verify_credentials(config).await? {
        println!();
        println!("Setup complete!");
    } else {
        println!();
        println!("Setup failed. Please check your credentials and try again.");
        println!("   You can run 'auth setup' again to re-enter your credentials.");
    }

    Ok(())
}

/// Show current authentication status
pub async fn show_auth_status(config: &ClientConfig) -> AuthResult<()> {
    let mut status = get_auth_status();

    println!("CMS Authentication Status");
    println!("=========================");
    println!();

    let yes_no = |set: bool| if set { "Set" } else { "Not set" };
    println!("API key:  {}", yes_no(status.api_key_set));
    match env::var(env_constants::USERNAME) {
        Ok(username) if status.username_set => println!("Username: {} (set)", username),
        _ => println!("Username: Not set"),
    }
    println!("Password: {}", yes_no(status.password_set));
    println!(
        ".env file: {}",
        if status.dotenv_file_exists {
            "Exists"
        } else {
            "Not found"
        }
    );
    println!();

    if status.has_credentials() {
        println!("Testing credentials...");
        status.credentials_valid = Some(verify_credentials(config).await?);
        println!();
    }

    println!("Status: {}", status.status_message());

    if !status.has_credentials() {
        println!();
        println!("To configure credentials, run: cms_fetcher auth setup");
    } else if status.credentials_valid == Some(false) {
        println!();
        println!("To update credentials, run: cms_fetcher auth setup");
    }

    Ok(())
}
