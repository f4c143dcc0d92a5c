use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "usd";
const DEFAULT_SEARCH_TTL_SECS: u64 = 60;
const DEFAULT_SUGGEST_TTL_SECS: u64 = 30;
const DEFAULT_REWARD_THRESHOLD_MINOR: i64 = 20_000;
const DEFAULT_REWARD_DISCOUNT_PERCENT: i32 = 10;
const DEFAULT_REWARD_VALIDITY_DAYS: i64 = 30;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CARD_API_BASE_URL: &str = "https://api.stripe.com";
const DEFAULT_WALLET_PAYMENT_URL: &str = "https://esewa.com.np/epay/main";
const DEFAULT_WALLET_VERIFY_URL: &str = "https://esewa.com.np/epay/transrec";
const DEFAULT_WALLET_PID_PREFIX: &str = "ESW";

/// Card gateway settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CardConfig {
    /// Secret API key for the card provider
    #[serde(default)]
    pub secret_key: String,

    /// Provider API base URL (overridable for tests)
    #[serde(default = "default_card_api_base_url")]
    pub api_base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            api_base_url: default_card_api_base_url(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

/// Wallet-redirect gateway settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct WalletConfig {
    /// Redirect target the frontend submits the payment form to
    #[serde(default = "default_wallet_payment_url")]
    pub payment_url: String,

    /// Out-of-band verification endpoint
    #[serde(default = "default_wallet_verify_url")]
    pub verify_url: String,

    /// Merchant code sent with verification requests
    #[serde(default)]
    pub merchant_code: String,

    /// Prefix for generated payment ids
    #[serde(default = "default_wallet_pid_prefix")]
    pub payment_id_prefix: String,

    /// Verification request timeout in seconds
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            payment_url: default_wallet_payment_url(),
            verify_url: default_wallet_verify_url(),
            merchant_code: String::new(),
            payment_id_prefix: default_wallet_pid_prefix(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

/// Cache TTL settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// TTL for cached search result pages
    #[serde(default = "default_search_ttl_secs")]
    pub search_ttl_secs: u64,

    /// TTL for cached suggestion lists
    #[serde(default = "default_suggest_ttl_secs")]
    pub suggest_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            search_ttl_secs: default_search_ttl_secs(),
            suggest_ttl_secs: default_suggest_ttl_secs(),
        }
    }
}

/// Checkout/reward settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CheckoutConfig {
    /// Order total (minor units) at which a reward coupon is issued
    #[serde(default = "default_reward_threshold_minor")]
    pub reward_threshold_minor: i64,

    /// Discount percentage carried by reward coupons
    #[serde(default = "default_reward_discount_percent")]
    #[validate(range(min = 0, max = 100))]
    pub reward_discount_percent: i32,

    /// Reward coupon validity in days
    #[serde(default = "default_reward_validity_days")]
    pub reward_validity_days: i64,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            reward_threshold_minor: default_reward_threshold_minor(),
            reward_discount_percent: default_reward_discount_percent(),
            reward_validity_days: default_reward_validity_days(),
        }
    }
}

/// Application configuration with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// ISO currency code used for provider sessions
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Frontend base URL for success/cancel redirects
    #[serde(default = "default_client_url")]
    pub client_url: String,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    #[serde(default)]
    #[validate]
    pub cache: CacheConfig,

    #[serde(default)]
    #[validate]
    pub checkout: CheckoutConfig,

    #[serde(default)]
    #[validate]
    pub card: CardConfig,

    #[serde(default)]
    #[validate]
    pub wallet: WalletConfig,
}

impl AppConfig {
    /// Minimal configuration around a database URL; everything else takes
    /// the built-in defaults. Used by embedders and the test harness.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            currency: default_currency(),
            client_url: default_client_url(),
            event_channel_capacity: default_event_channel_capacity(),
            cache: CacheConfig::default(),
            checkout: CheckoutConfig::default(),
            card: CardConfig::default(),
            wallet: WalletConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Loads configuration from `config/default`, an environment-specific file
/// selected via `RUN_ENV`/`APP_ENV`, and `APP__`-prefixed environment
/// variables, then validates the result.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate()?;
    Ok(app_config)
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_client_url() -> String {
    "http://localhost:5173".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_db_idle_timeout_secs() -> u64 {
    600
}

fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_search_ttl_secs() -> u64 {
    DEFAULT_SEARCH_TTL_SECS
}

fn default_suggest_ttl_secs() -> u64 {
    DEFAULT_SUGGEST_TTL_SECS
}

fn default_reward_threshold_minor() -> i64 {
    DEFAULT_REWARD_THRESHOLD_MINOR
}

fn default_reward_discount_percent() -> i32 {
    DEFAULT_REWARD_DISCOUNT_PERCENT
}

fn default_reward_validity_days() -> i64 {
    DEFAULT_REWARD_VALIDITY_DAYS
}

fn default_provider_timeout_secs() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_SECS
}

fn default_card_api_base_url() -> String {
    DEFAULT_CARD_API_BASE_URL.to_string()
}

fn default_wallet_payment_url() -> String {
    DEFAULT_WALLET_PAYMENT_URL.to_string()
}

fn default_wallet_verify_url() -> String {
    DEFAULT_WALLET_VERIFY_URL.to_string()
}

fn default_wallet_pid_prefix() -> String {
    DEFAULT_WALLET_PID_PREFIX.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_documented_defaults() {
        let cfg = AppConfig::new("sqlite::memory:");
        assert_eq!(cfg.cache.search_ttl_secs, 60);
        assert_eq!(cfg.cache.suggest_ttl_secs, 30);
        assert_eq!(cfg.checkout.reward_threshold_minor, 20_000);
        assert_eq!(cfg.checkout.reward_discount_percent, 10);
        assert_eq!(cfg.checkout.reward_validity_days, 30);
        assert_eq!(cfg.wallet.timeout_secs, 10);
        assert_eq!(cfg.currency, "usd");
    }

    #[test]
    fn reward_discount_outside_percentage_range_fails_validation() {
        let mut cfg = AppConfig::new("sqlite::memory:");
        cfg.checkout.reward_discount_percent = 150;
        assert!(cfg.validate().is_err());
    }
}
