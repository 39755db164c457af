//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use ats_gate_core::DEFAULT_QUOTA;
use tracing::Level;

const GEMINI_OPENAI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which provider answers analysis requests. Both speak the OpenAI chat API.
#[derive(Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub api_key: String,
    /// `None` keeps the client's default OpenAI endpoint.
    pub api_base: Option<String>,
    pub model: String,
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("api_key", &"<XXXXX>")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Clone)]
pub struct PaymentConfig {
    pub stripe_secret_key: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("stripe_secret_key", &"<XXXXX>")
            .field("success_url", &self.success_url)
            .field("cancel_url", &self.cancel_url)
            .finish()
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub engine: EngineConfig,
    pub analysis_quota: u32,
    pub pdftoppm_path: PathBuf,
    pub render_dpi: u32,
    /// Checkout is disabled when no payment key is configured.
    pub payment: Option<PaymentConfig>,
    pub cors_origin: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("database_url", &"<XXXXX>")
            .field("log_level", &self.log_level)
            .field("engine", &self.engine)
            .field("analysis_quota", &self.analysis_quota)
            .field("pdftoppm_path", &self.pdftoppm_path)
            .field("render_dpi", &self.render_dpi)
            .field("payment", &self.payment)
            .field("cors_origin", &self.cors_origin)
            .finish()
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Load Server and Database Settings ---
        let bind_address = parse_var("BIND_ADDRESS", &var_or("BIND_ADDRESS", "0.0.0.0:3000"))?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Analysis Engine (Gemini preferred, OpenAI otherwise) ---
        let engine = match (lookup("GEMINI_API_KEY"), lookup("OPENAI_API_KEY")) {
            (Some(api_key), _) => EngineConfig {
                api_key,
                api_base: Some(var_or("ANALYSIS_API_BASE", GEMINI_OPENAI_BASE)),
                model: var_or("ANALYSIS_MODEL", "gemini-1.5-flash"),
            },
            (None, Some(api_key)) => EngineConfig {
                api_key,
                api_base: lookup("ANALYSIS_API_BASE"),
                model: var_or("ANALYSIS_MODEL", "gpt-4o-mini"),
            },
            (None, None) => {
                return Err(ConfigError::MissingVar(
                    "GEMINI_API_KEY or OPENAI_API_KEY".to_string(),
                ))
            }
        };

        // --- Gate and Rendering Settings ---
        let analysis_quota = match lookup("ANALYSIS_QUOTA") {
            Some(raw) => parse_var("ANALYSIS_QUOTA", &raw)?,
            None => DEFAULT_QUOTA,
        };
        let pdftoppm_path = PathBuf::from(var_or("PDFTOPPM_PATH", "pdftoppm"));
        let render_dpi = parse_var("RENDER_DPI", &var_or("RENDER_DPI", "150"))?;

        // --- Payment Settings (optional) ---
        let payment = lookup("STRIPE_SECRET_KEY").map(|stripe_secret_key| PaymentConfig {
            stripe_secret_key,
            success_url: var_or("PAYMENT_SUCCESS_URL", "https://yourdomain.com/success"),
            cancel_url: var_or("PAYMENT_CANCEL_URL", "https://yourdomain.com/cancel"),
        });

        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:3000");

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            engine,
            analysis_quota,
            pdftoppm_path,
            render_dpi,
            payment,
            cors_origin,
        })
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_with_gemini_key() {
        let config = load(&[("DATABASE_URL", "postgres://db"), ("GEMINI_API_KEY", "g")]).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.analysis_quota, 5);
        assert_eq!(config.engine.model, "gemini-1.5-flash");
        assert_eq!(config.engine.api_base.as_deref(), Some(GEMINI_OPENAI_BASE));
        assert_eq!(config.render_dpi, 150);
        assert!(config.payment.is_none());
    }

    #[test]
    fn openai_key_keeps_default_endpoint() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db"),
            ("OPENAI_API_KEY", "o"),
            ("STRIPE_SECRET_KEY", "sk_test"),
            ("ANALYSIS_QUOTA", "3"),
        ])
        .unwrap();
        assert_eq!(config.engine.api_base, None);
        assert_eq!(config.engine.model, "gpt-4o-mini");
        assert_eq!(config.analysis_quota, 3);
        let payment = config.payment.unwrap();
        assert_eq!(payment.cancel_url, "https://yourdomain.com/cancel");
    }

    #[test]
    fn missing_and_invalid_values_are_reported() {
        assert!(matches!(
            load(&[("GEMINI_API_KEY", "g")]),
            Err(ConfigError::MissingVar(v)) if v == "DATABASE_URL"
        ));
        assert!(matches!(
            load(&[("DATABASE_URL", "postgres://db")]),
            Err(ConfigError::MissingVar(_))
        ));
        assert!(matches!(
            load(&[
                ("DATABASE_URL", "postgres://db"),
                ("GEMINI_API_KEY", "g"),
                ("ANALYSIS_QUOTA", "many"),
            ]),
            Err(ConfigError::InvalidValue(v, _)) if v == "ANALYSIS_QUOTA"
        ));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = load(&[
            ("DATABASE_URL", "postgres://user:hunter2@db"),
            ("GEMINI_API_KEY", "gemini-secret"),
            ("STRIPE_SECRET_KEY", "sk_live_secret"),
        ])
        .unwrap();
        let shown = format!("{config:?}");
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("gemini-secret"));
        assert!(!shown.contains("sk_live_secret"));
    }
}
