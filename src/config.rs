//! Application configuration module
//! Loads settings from environment variables (and `.env`), then validates them.

use crate::payments::order_id::{is_path_safe, DEFAULT_ORDER_ID_PREFIX};
use crate::payments::providers::upi_gateway::{UpiGatewayConfig, DEFAULT_GATEWAY_BASE_URL};
use crate::payments::target::PayeeConfig;
use std::env;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub donation: DonationConfig,
    pub gateway: GatewayConfig,
    pub admin: AdminConfig,
    pub reconciliation: ReconciliationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Attempts made for a request whose store call is temporarily unavailable.
    pub store_retry_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64, // seconds
}

/// Rules applied to donor submissions and the records they create.
#[derive(Debug, Clone)]
pub struct DonationConfig {
    pub min_amount: u64,
    pub validity_minutes: i64,
    pub require_ten_digit_phone: bool,
    /// Refuse donor self-report once the payment window has passed.
    pub enforce_expiry: bool,
    pub order_id_prefix: String,
    /// Sent to the gateway as `p_info`.
    pub purpose: String,
    pub payee: PayeeConfig,
}

/// How `POST /payments` produces the donor's payment target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTargetMode {
    /// A `upi://pay` link built locally from the payee settings.
    UpiLink,
    /// A hosted payment page from the UPI gateway.
    Gateway,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub mode: PaymentTargetMode,
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub redirect_url: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AdminConfig {
    pub api_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            store: StoreConfig::from_env()?,
            donation: DonationConfig::from_env()?,
            gateway: GatewayConfig::from_env()?,
            admin: AdminConfig::from_env(),
            reconciliation: ReconciliationConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.store.validate()?;
        self.donation.validate(self.gateway.mode)?;
        self.gateway.validate()?;
        self.reconciliation.validate(&self.gateway)?;
        self.logging.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: var("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or("SERVER_PORT", 8000)?,
            store_retry_attempts: parse_or("STORE_RETRY_ATTEMPTS", 3)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }
        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }
        if self.store_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "STORE_RETRY_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match var("STORE_BACKEND")
            .unwrap_or_else(|| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => StoreBackend::Postgres,
            "memory" | "in_memory" => StoreBackend::Memory,
            _ => return Err(ConfigError::InvalidValue("STORE_BACKEND".to_string())),
        };

        Ok(StoreConfig {
            backend,
            database_url: var("DATABASE_URL"),
            max_connections: parse_or("DB_MAX_CONNECTIONS", 10)?,
            min_connections: parse_or("DB_MIN_CONNECTIONS", 1)?,
            connection_timeout: parse_or("DB_CONNECTION_TIMEOUT", 10)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == StoreBackend::Postgres {
            if self.database_url.is_none() {
                return Err(ConfigError::MissingVariable("DATABASE_URL".to_string()));
            }
            if self.max_connections == 0 {
                return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
            }
            if self.min_connections > self.max_connections {
                return Err(ConfigError::InvalidValue(
                    "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for DonationConfig {
    fn default() -> Self {
        Self {
            min_amount: 10,
            validity_minutes: 15,
            require_ten_digit_phone: true,
            enforce_expiry: false,
            order_id_prefix: DEFAULT_ORDER_ID_PREFIX.to_string(),
            purpose: "Donation".to_string(),
            payee: PayeeConfig::default(),
        }
    }
}

impl DonationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = DonationConfig::default();
        Ok(DonationConfig {
            min_amount: parse_or("MIN_DONATION_AMOUNT", defaults.min_amount)?,
            validity_minutes: parse_or("PAYMENT_VALIDITY_MINUTES", defaults.validity_minutes)?,
            require_ten_digit_phone: parse_or(
                "REQUIRE_TEN_DIGIT_PHONE",
                defaults.require_ten_digit_phone,
            )?,
            enforce_expiry: parse_or("ENFORCE_EXPIRY", defaults.enforce_expiry)?,
            order_id_prefix: var("ORDER_ID_PREFIX").unwrap_or(defaults.order_id_prefix),
            purpose: var("DONATION_PURPOSE").unwrap_or(defaults.purpose),
            payee: PayeeConfig {
                vpa: var("UPI_PAYEE_VPA").unwrap_or_default(),
                name: var("UPI_PAYEE_NAME").unwrap_or_default(),
                currency: var("UPI_CURRENCY").unwrap_or(defaults.payee.currency),
                note_prefix: var("UPI_NOTE_PREFIX").unwrap_or(defaults.payee.note_prefix),
            },
        })
    }

    pub fn validate(&self, mode: PaymentTargetMode) -> Result<(), ConfigError> {
        if self.min_amount == 0 {
            return Err(ConfigError::InvalidValue(
                "MIN_DONATION_AMOUNT must be positive".to_string(),
            ));
        }
        if self.validity_minutes <= 0 {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_VALIDITY_MINUTES must be positive".to_string(),
            ));
        }
        if !is_path_safe(&self.order_id_prefix) {
            return Err(ConfigError::InvalidValue(
                "ORDER_ID_PREFIX must be non-empty ASCII letters, digits, '-' or '_'".to_string(),
            ));
        }
        if mode == PaymentTargetMode::UpiLink {
            if !self.payee.vpa.contains('@') {
                return Err(ConfigError::MissingVariable("UPI_PAYEE_VPA".to_string()));
            }
            if self.payee.name.is_empty() {
                return Err(ConfigError::MissingVariable("UPI_PAYEE_NAME".to_string()));
            }
        }
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: PaymentTargetMode::UpiLink,
            api_key: None,
            base_url: DEFAULT_GATEWAY_BASE_URL.to_string(),
            timeout_secs: 15,
            max_retries: 2,
            redirect_url: None,
            webhook_url: None,
            webhook_secret: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = GatewayConfig::default();
        let mode = match var("PAYMENT_TARGET_MODE")
            .unwrap_or_else(|| "upi_link".to_string())
            .to_lowercase()
            .as_str()
        {
            "upi_link" | "upi" => PaymentTargetMode::UpiLink,
            "gateway" => PaymentTargetMode::Gateway,
            _ => return Err(ConfigError::InvalidValue("PAYMENT_TARGET_MODE".to_string())),
        };

        Ok(GatewayConfig {
            mode,
            api_key: var("UPI_GATEWAY_API_KEY"),
            base_url: var("UPI_GATEWAY_BASE_URL").unwrap_or(defaults.base_url),
            timeout_secs: parse_or("UPI_GATEWAY_TIMEOUT_SECS", defaults.timeout_secs)?,
            max_retries: parse_or("UPI_GATEWAY_MAX_RETRIES", defaults.max_retries)?,
            redirect_url: var("UPI_GATEWAY_REDIRECT_URL"),
            webhook_url: var("UPI_GATEWAY_WEBHOOK_URL"),
            webhook_secret: var("UPI_GATEWAY_WEBHOOK_SECRET"),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "UPI_GATEWAY_BASE_URL must be a valid URL".to_string(),
            ));
        }
        if self.mode == PaymentTargetMode::Gateway && self.api_key.is_none() {
            return Err(ConfigError::MissingVariable(
                "UPI_GATEWAY_API_KEY".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "UPI_GATEWAY_TIMEOUT_SECS".to_string(),
            ));
        }
        Ok(())
    }

    /// Client settings, or `None` when no API key is configured.
    pub fn client_config(&self) -> Option<UpiGatewayConfig> {
        let api_key = self.api_key.clone()?;
        Some(UpiGatewayConfig {
            api_key,
            base_url: self.base_url.clone(),
            redirect_url: self.redirect_url.clone(),
            webhook_url: self.webhook_url.clone(),
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
        })
    }
}

impl AdminConfig {
    pub fn from_env() -> Self {
        AdminConfig {
            api_token: var("ADMIN_API_TOKEN"),
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: 60,
            batch_size: 50,
        }
    }
}

impl ReconciliationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = ReconciliationConfig::default();
        Ok(ReconciliationConfig {
            enabled: parse_or("RECONCILE_ENABLED", defaults.enabled)?,
            interval_seconds: parse_or("RECONCILE_INTERVAL_SECONDS", defaults.interval_seconds)?,
            batch_size: parse_or("RECONCILE_BATCH_SIZE", defaults.batch_size)?,
        })
    }

    pub fn validate(&self, gateway: &GatewayConfig) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if gateway.api_key.is_none() {
            return Err(ConfigError::ValidationFailed(
                "RECONCILE_ENABLED requires UPI_GATEWAY_API_KEY".to_string(),
            ));
        }
        if self.interval_seconds == 0 || self.batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "RECONCILE_INTERVAL_SECONDS and RECONCILE_BATCH_SIZE must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: var("LOG_LEVEL").unwrap_or_else(|| "INFO".to_string()),
            format: match var("LOG_FORMAT")
                .unwrap_or_else(|| "plain".to_string())
                .to_lowercase()
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
