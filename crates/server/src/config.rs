//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `PAYMENT_WEBHOOK_SECRET` - payment provider signing secret
//! - `EMAIL_WEBHOOK_SECRET` - email provider signing secret (`whsec_...`)
//! - `CARRIER_WEBHOOK_TOKEN` - shared token for carrier status pushes
//! - `CARRIER_API_URL` - carrier API base URL
//! - `CARRIER_API_KEY` - carrier API key
//! - `EMAIL_API_KEY` - email provider API key
//! - `EMAIL_FROM_ADDRESS` - sender address for customer notifications
//! - `ADMIN_API_TOKEN` - bearer token for the admin/internal surface
//!
//! ## Optional
//! - `SERVER_HOST` - bind address (default: 127.0.0.1)
//! - `SERVER_PORT` - listen port (default: 8080)
//! - `STORE_NAME` - store name used in notification subjects
//!   (default: Tidepool Supply)
//! - `EMAIL_API_URL` - email provider base URL (default: Resend)
//! - `CARRIER_NAME` - carrier display name for quotes (default: Northline)
//! - `QUOTE_CURRENCY` - rate card currency (default: SEK)
//! - `RECONCILE_INTERVAL_SECS` - background reconciliation period,
//!   0 disables (default: 900)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tidepool_core::CurrencyCode;

const MIN_SECRET_LENGTH: usize = 16;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server application configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Store name used in notification subjects
    pub store_name: String,
    /// Payment provider webhook signing secret
    pub payment_webhook_secret: SecretString,
    /// Email provider webhook signing secret
    pub email_webhook_secret: SecretString,
    /// Shared token expected on carrier status pushes
    pub carrier_webhook_token: SecretString,
    /// Bearer token for the admin/internal surface
    pub admin_api_token: SecretString,
    /// Carrier API configuration
    pub carrier: CarrierConfig,
    /// Email provider configuration
    pub email: EmailConfig,
    /// Rate card currency for shipping quotes
    pub quote_currency: CurrencyCode,
    /// Background reconciliation period in seconds, 0 disables
    pub reconcile_interval_secs: u64,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Carrier API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct CarrierConfig {
    /// Carrier API base URL
    pub base_url: String,
    /// Carrier API key
    pub api_key: SecretString,
    /// Carrier display name used in quote service names
    pub name: String,
}

impl std::fmt::Debug for CarrierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarrierConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("name", &self.name)
            .finish()
    }
}

/// Email provider configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct EmailConfig {
    /// Email provider base URL
    pub base_url: String,
    /// Email provider API key
    pub api_key: SecretString,
    /// Sender address for customer notifications
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid,
    /// or if secrets fail the minimum-length check.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("SERVER_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("SERVER_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("SERVER_PORT", "8080")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SERVER_PORT".to_string(), e.to_string()))?;

        let quote_currency = get_env_or_default("QUOTE_CURRENCY", "SEK")
            .parse::<CurrencyCode>()
            .map_err(|e| ConfigError::InvalidEnvVar("QUOTE_CURRENCY".to_string(), e))?;

        let reconcile_interval_secs = get_env_or_default("RECONCILE_INTERVAL_SECS", "900")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("RECONCILE_INTERVAL_SECS".to_string(), e.to_string())
            })?;

        Ok(Self {
            host,
            port,
            store_name: get_env_or_default("STORE_NAME", "Tidepool Supply"),
            payment_webhook_secret: get_validated_secret("PAYMENT_WEBHOOK_SECRET")?,
            email_webhook_secret: get_validated_secret("EMAIL_WEBHOOK_SECRET")?,
            carrier_webhook_token: get_validated_secret("CARRIER_WEBHOOK_TOKEN")?,
            admin_api_token: get_validated_secret("ADMIN_API_TOKEN")?,
            carrier: CarrierConfig {
                base_url: get_required_env("CARRIER_API_URL")?,
                api_key: get_required_secret("CARRIER_API_KEY")?,
                name: get_env_or_default("CARRIER_NAME", "Northline"),
            },
            email: EmailConfig {
                base_url: get_env_or_default("EMAIL_API_URL", "https://api.resend.com"),
                api_key: get_required_secret("EMAIL_API_KEY")?,
                from_address: get_required_env("EMAIL_FROM_ADDRESS")?,
            },
            quote_currency,
            reconcile_interval_secs,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Load a signing secret and enforce a minimum length.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let secret = get_required_secret(key)?;
    validate_secret_length(&secret, key)?;
    Ok(secret)
}

fn validate_secret_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {MIN_SECRET_LENGTH} characters (got {})",
                value.len()
            ),
        ));
    }
    Ok(())
}
