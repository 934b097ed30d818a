//! Application configuration loaded from environment variables.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::exchange::{coinbase, gemini, kraken};
use crate::orderbook::FetchPolicy;
use crate::stream::StreamConfig;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Live Refresh ===
    /// Milliseconds between refresh cycles in live mode.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// Quantity priced when none is given on the command line.
    #[serde(default = "default_quantity")]
    pub default_quantity: Decimal,

    /// What a refresh does when one source fails.
    #[serde(default)]
    pub fetch_policy: FetchPolicy,

    // === Venue Endpoints ===
    /// HTTP request timeout for venue polling.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Coinbase level-2 book URL.
    #[serde(default = "default_coinbase_url")]
    pub coinbase_url: String,

    /// Gemini book URL.
    #[serde(default = "default_gemini_url")]
    pub gemini_url: String,

    /// Kraken depth URL.
    #[serde(default = "default_kraken_url")]
    pub kraken_url: String,

    /// Kraken result key for the traded pair.
    #[serde(default = "default_kraken_pair")]
    pub kraken_pair: String,

    // === Streaming Connection ===
    /// Reconnection attempts before giving up.
    #[serde(default = "default_ws_max_reconnect_attempts")]
    pub ws_max_reconnect_attempts: u32,

    /// Fixed delay between reconnection attempts.
    #[serde(default = "default_ws_reconnect_interval_ms")]
    pub ws_reconnect_interval_ms: u64,

    /// Handshake timeout.
    #[serde(default = "default_ws_connection_timeout_ms")]
    pub ws_connection_timeout_ms: u64,

    /// Reconnect automatically after a failure.
    #[serde(default = "default_true")]
    pub ws_auto_reconnect: bool,

    // === Server Configuration ===
    /// Port for the status/metrics endpoints in live mode.
    #[serde(default)]
    pub api_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

fn default_refresh_interval_ms() -> u64 {
    1000
}

fn default_quantity() -> Decimal {
    Decimal::new(10, 0) // 10 BTC
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_coinbase_url() -> String {
    coinbase::DEFAULT_URL.to_string()
}

fn default_gemini_url() -> String {
    gemini::DEFAULT_URL.to_string()
}

fn default_kraken_url() -> String {
    kraken::DEFAULT_URL.to_string()
}

fn default_kraken_pair() -> String {
    kraken::DEFAULT_PAIR.to_string()
}

fn default_ws_max_reconnect_attempts() -> u32 {
    5
}

fn default_ws_reconnect_interval_ms() -> u64 {
    5000
}

fn default_ws_connection_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            default_quantity: default_quantity(),
            fetch_policy: FetchPolicy::default(),
            http_timeout_ms: default_http_timeout_ms(),
            coinbase_url: default_coinbase_url(),
            gemini_url: default_gemini_url(),
            kraken_url: default_kraken_url(),
            kraken_pair: default_kraken_pair(),
            ws_max_reconnect_attempts: default_ws_max_reconnect_attempts(),
            ws_reconnect_interval_ms: default_ws_reconnect_interval_ms(),
            ws_connection_timeout_ms: default_ws_connection_timeout_ms(),
            ws_auto_reconnect: default_true(),
            api_port: None,
            rust_log: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.refresh_interval_ms == 0 {
            return Err("REFRESH_INTERVAL_MS must be greater than 0".to_string());
        }

        if self.default_quantity <= Decimal::ZERO {
            return Err("DEFAULT_QUANTITY must be positive".to_string());
        }

        if self.http_timeout_ms == 0 {
            return Err("HTTP_TIMEOUT_MS must be greater than 0".to_string());
        }

        for (key, value) in [
            ("COINBASE_URL", &self.coinbase_url),
            ("GEMINI_URL", &self.gemini_url),
            ("KRAKEN_URL", &self.kraken_url),
        ] {
            if url::Url::parse(value).is_err() {
                return Err(format!("{key} is not a valid URL: {value}"));
            }
        }

        if self.kraken_pair.is_empty() {
            return Err("KRAKEN_PAIR is required".to_string());
        }

        if self.ws_connection_timeout_ms == 0 {
            return Err("WS_CONNECTION_TIMEOUT_MS must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Interval between live refresh cycles.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// HTTP request timeout.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Streaming connection settings.
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            max_reconnect_attempts: self.ws_max_reconnect_attempts,
            reconnect_interval: Duration::from_millis(self.ws_reconnect_interval_ms),
            connection_timeout: Duration::from_millis(self.ws_connection_timeout_ms),
            auto_reconnect: self.ws_auto_reconnect,
        }
    }
}
