//! S3 Credentials Module
//!
//! Resolves the access key pair used to sign S3 requests.
//!
//! Credentials come from the `s3` configuration section when both keys are
//! present there, otherwise from the standard AWS environment variables.
//!
//! # Example
//!
//! ```
//! use stream_uploadr::s3::Credentials;
//!
//! let creds = Credentials::new("access-key", "secret-key");
//! assert_eq!(creds.access_key_id(), "access-key");
//! assert_eq!(creds.secret_access_key(), "secret-key");
//! ```

use crate::config::S3Config;
use thiserror::Error;

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

/// Credentials for AWS authentication
#[derive(Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Create new credentials
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Create credentials with session token (for temporary credentials)
    pub fn with_session_token(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: Some(session_token.into()),
        }
    }

    /// Get the access key ID
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Get the secret access key
    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    /// Get the session token (if any)
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Load credentials from environment variables
    ///
    /// Looks for:
    /// - `AWS_ACCESS_KEY_ID`
    /// - `AWS_SECRET_ACCESS_KEY`
    /// - `AWS_SESSION_TOKEN` (optional)
    pub fn from_env() -> Result<Self, CredentialsError> {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID").map_err(|_| {
            CredentialsError::MissingCredentials("AWS_ACCESS_KEY_ID not set".into())
        })?;

        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| {
            CredentialsError::MissingCredentials("AWS_SECRET_ACCESS_KEY not set".into())
        })?;

        Ok(match std::env::var("AWS_SESSION_TOKEN").ok() {
            Some(token) => Self::with_session_token(access_key, secret_key, token),
            None => Self::new(access_key, secret_key),
        })
    }

    /// Resolve credentials for an S3 configuration
    ///
    /// Uses `access_key`/`secret_key` from the configuration when both are
    /// set, and falls back to [`Credentials::from_env`] when neither is.
    pub fn resolve(config: &S3Config) -> Result<Self, CredentialsError> {
        match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => Ok(match &config.session_token {
                Some(token) => Self::with_session_token(access_key, secret_key, token),
                None => Self::new(access_key, secret_key),
            }),
            (None, None) => Self::from_env(),
            (Some(_), None) => Err(CredentialsError::MissingCredentials(
                "secret_key not set in config".into(),
            )),
            (None, Some(_)) => Err(CredentialsError::MissingCredentials(
                "access_key not set in config".into(),
            )),
        }
    }
}
