//! Probe configuration.

use auth_csrf_client::CsrfConfig;
use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Client settings rejected
    #[error("Invalid client configuration: {0}")]
    Client(#[from] auth_csrf_client::CsrfError),

    /// Path not starting with `/`
    #[error("Invalid path for {name}: {value}")]
    InvalidPath {
        /// Variable name
        name: &'static str,
        /// Offending value
        value: String,
    },
}

/// What the probe talks to and which endpoints it exercises.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Client settings, including the backend URL
    pub client: CsrfConfig,
    /// Endpoint reachable only with a valid session
    pub protected_path: String,
    /// Login endpoint, exempt from the token requirement
    pub login_path: String,
    /// Token-protected write endpoint
    pub write_path: String,
    /// Login email used for the exemption check
    pub login_email: String,
    /// Login password used for the exemption check
    pub login_password: SecretString,
}

impl ProbeConfig {
    /// Load configuration from environment variables, reading `.env` first.
    ///
    /// # Errors
    ///
    /// Returns an error if `BACKEND_URL` is missing or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`ProbeConfig::from_env`].
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let client = CsrfConfig::from_lookup(&lookup)?;
        let config = Self {
            client,
            protected_path: path_var(&lookup, "PROBE_PROTECTED_PATH", "/appointment/test-endpoint")?,
            login_path: path_var(&lookup, "PROBE_LOGIN_PATH", "/customer/login")?,
            write_path: path_var(&lookup, "PROBE_WRITE_PATH", "/appointment/addmechanicalAppointment")?,
            login_email: lookup("PROBE_EMAIL").unwrap_or_else(|| "test@example.com".to_string()),
            login_password: lookup("PROBE_PASSWORD")
                .unwrap_or_else(|| "testpassword".to_string())
                .into(),
        };
        Ok(config)
    }
}

fn path_var<L>(lookup: &L, name: &'static str, default: &str) -> Result<String, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    let value = lookup(name).unwrap_or_else(|| default.to_string());
    if value.starts_with('/') {
        Ok(value)
    } else {
        Err(ConfigError::InvalidPath { name, value })
    }
}
