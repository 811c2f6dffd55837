//! Application configuration module
//! Handles environment variable loading, configuration validation, and flow timings

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub payment: PaymentConfig,
    pub flow: FlowConfig,
    pub logging: LoggingConfig,
}

/// Delivery backend connection settings
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Retries for idempotent GET requests only
    pub max_retries: u32,
    pub auth_token: Option<String>,
}

/// Mobile-money payment settings
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub poll_interval_secs: u64,
    pub poll_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub country_code: String,
}

/// Order flow timings
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub restaurant_timeout_secs: u32,
    pub payment_window_secs: u32,
    pub status_poll_interval_secs: u64,
    pub post_payment_refresh_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000/api".to_string(),
            request_timeout_secs: 30,
            max_retries: 1,
            auth_token: None,
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3,
            poll_timeout_secs: 300,
            max_retries: 3,
            retry_delay_secs: 2,
            country_code: "237".to_string(),
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            restaurant_timeout_secs: 15 * 60,
            payment_window_secs: 5 * 60,
            status_poll_interval_secs: 3,
            post_payment_refresh_secs: 2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            format: LogFormat::Plain,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            api: ApiConfig::from_env()?,
            payment: PaymentConfig::from_env()?,
            flow: FlowConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api.validate()?;
        self.payment.validate()?;
        self.flow.validate()?;
        self.logging.validate()?;

        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(default),
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(ApiConfig {
            base_url: env::var("DELIVERY_API_BASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DELIVERY_API_BASE_URL".to_string()))?,
            request_timeout_secs: parse_var(
                "DELIVERY_API_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            max_retries: parse_var("DELIVERY_API_MAX_RETRIES", defaults.max_retries)?,
            auth_token: env::var("DELIVERY_API_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::InvalidValue("DELIVERY_API_BASE_URL".to_string()));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "DELIVERY_API_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "DELIVERY_API_TIMEOUT_SECS".to_string(),
            ));
        }

        Ok(())
    }
}

impl PaymentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(PaymentConfig {
            poll_interval_secs: parse_var("PAYMENT_POLL_INTERVAL_SECS", defaults.poll_interval_secs)?,
            poll_timeout_secs: parse_var("PAYMENT_POLL_TIMEOUT_SECS", defaults.poll_timeout_secs)?,
            max_retries: parse_var("PAYMENT_MAX_RETRIES", defaults.max_retries)?,
            retry_delay_secs: parse_var("PAYMENT_RETRY_DELAY_SECS", defaults.retry_delay_secs)?,
            country_code: env::var("PAYMENT_COUNTRY_CODE").unwrap_or(defaults.country_code),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_POLL_INTERVAL_SECS".to_string(),
            ));
        }

        if self.poll_timeout_secs < self.poll_interval_secs {
            return Err(ConfigError::ValidationFailed(
                "PAYMENT_POLL_TIMEOUT_SECS must be >= PAYMENT_POLL_INTERVAL_SECS".to_string(),
            ));
        }

        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue("PAYMENT_MAX_RETRIES".to_string()));
        }

        if self.country_code.is_empty() || !self.country_code.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ConfigError::InvalidValue("PAYMENT_COUNTRY_CODE".to_string()));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl FlowConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(FlowConfig {
            restaurant_timeout_secs: parse_var(
                "ORDER_RESTAURANT_TIMEOUT_SECS",
                defaults.restaurant_timeout_secs,
            )?,
            payment_window_secs: parse_var(
                "ORDER_PAYMENT_WINDOW_SECS",
                defaults.payment_window_secs,
            )?,
            status_poll_interval_secs: parse_var(
                "ORDER_STATUS_POLL_INTERVAL_SECS",
                defaults.status_poll_interval_secs,
            )?,
            post_payment_refresh_secs: parse_var(
                "ORDER_POST_PAYMENT_REFRESH_SECS",
                defaults.post_payment_refresh_secs,
            )?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.restaurant_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "ORDER_RESTAURANT_TIMEOUT_SECS".to_string(),
            ));
        }

        if self.status_poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "ORDER_STATUS_POLL_INTERVAL_SECS".to_string(),
            ));
        }

        Ok(())
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_interval_secs)
    }

    pub fn post_payment_refresh(&self) -> Duration {
        Duration::from_secs(self.post_payment_refresh_secs)
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_timings_match_flow_contract() {
        let flow = FlowConfig::default();
        assert_eq!(flow.restaurant_timeout_secs, 900);
        assert_eq!(flow.payment_window_secs, 300);
        assert_eq!(flow.status_poll_interval(), Duration::from_secs(3));

        let payment = PaymentConfig::default();
        assert_eq!(payment.poll_interval(), Duration::from_secs(3));
        assert_eq!(payment.poll_timeout(), Duration::from_secs(300));
        assert_eq!(payment.max_retries, 3);
        assert_eq!(payment.retry_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_base_url_validation() {
        let config = ApiConfig {
            base_url: "ftp://backend".to_string(),
            ..ApiConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_poll_timeout_shorter_than_interval() {
        let config = PaymentConfig {
            poll_interval_secs: 10,
            poll_timeout_secs: 5,
            ..PaymentConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_invalid_log_level() {
        let config = LoggingConfig {
            level: "LOUD".to_string(),
            format: LogFormat::Plain,
        };

        assert!(config.validate().is_err());
    }
}
