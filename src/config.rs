use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_MAX_DOCUMENT_LINES: usize = 100;
const CONFIG_FILE: &str = "config/inventory";
const ENV_PREFIX: &str = "STOCKLINE";

/// Inventory engine configuration with validation.
///
/// Loaded from an optional `config/inventory.{toml,yaml,json}` file with
/// `STOCKLINE_`-prefixed environment variables layered on top.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct InventoryConfig {
    /// Product-level default for the low-stock threshold, applied when a
    /// product is published without one.
    #[serde(default = "default_low_stock_threshold")]
    #[validate(range(min = 0))]
    pub default_low_stock_threshold: i64,

    /// Bounded capacity of the event channel handed to subscribers.
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// Maximum number of line items accepted on one movement document.
    #[serde(default = "default_max_document_lines")]
    #[validate(range(min = 1))]
    pub max_document_lines: usize,
}

fn default_low_stock_threshold() -> i64 {
    DEFAULT_LOW_STOCK_THRESHOLD
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_max_document_lines() -> usize {
    DEFAULT_MAX_DOCUMENT_LINES
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            default_low_stock_threshold: default_low_stock_threshold(),
            event_channel_capacity: default_event_channel_capacity(),
            max_document_lines: default_max_document_lines(),
        }
    }
}

impl InventoryConfig {
    /// Load configuration from the layered file + environment sources.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let config: InventoryConfig = settings.try_deserialize()?;
        config
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(config)
    }
}
