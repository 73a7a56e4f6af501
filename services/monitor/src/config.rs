//! Service configuration
//!
//! Defaults suit local development; every knob can be overridden via
//! MONITOR_* environment variables. Bad values are rejected at startup
//! with typed errors rather than silently falling back.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use types::ids::Symbol;

use crate::alerts::RouterConfig;
use crate::evaluator::EvaluatorConfig;
use crate::metrics::MetricsConfig;
use crate::publisher::PUBLISH_INTERVAL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("no symbols configured")]
    NoSymbols,
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Upstream exchange stream endpoint.
    pub endpoint: String,
    /// Symbols to monitor.
    pub symbols: Vec<Symbol>,
    /// Per-symbol trade window capacity.
    pub trade_window: usize,
    pub evaluator: EvaluatorConfig,
    pub metrics: MetricsConfig,
    pub router: RouterConfig,
    /// Snapshot publish interval.
    pub publish_interval: Duration,
    /// Alert/metrics dump interval.
    pub persist_interval: Duration,
    pub alerts_dir: PathBuf,
    pub metrics_dir: PathBuf,
    /// Subscriber surface bind address.
    pub listen_addr: SocketAddr,
    /// Optional webhook notification target.
    pub webhook_url: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://stream.binance.com:9443/ws".to_string(),
            symbols: vec![Symbol::new("BTC/USDT"), Symbol::new("ETH/USDT")],
            trade_window: crate::processor::DEFAULT_TRADE_WINDOW,
            evaluator: EvaluatorConfig::default(),
            metrics: MetricsConfig::default(),
            router: RouterConfig::default(),
            publish_interval: PUBLISH_INTERVAL,
            persist_interval: Duration::from_secs(300),
            alerts_dir: PathBuf::from("data/alerts"),
            metrics_dir: PathBuf::from("data/metrics"),
            listen_addr: ([0, 0, 0, 0], 8000).into(),
            webhook_url: None,
        }
    }
}

impl MonitorConfig {
    /// Build from MONITOR_* environment variables on top of defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(endpoint) = std::env::var("MONITOR_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Ok(symbols) = std::env::var("MONITOR_SYMBOLS") {
            config.symbols = parse_symbols(&symbols)?;
        }
        if let Ok(value) = std::env::var("MONITOR_TRADE_WINDOW") {
            config.trade_window = parse_nonzero("MONITOR_TRADE_WINDOW", &value)? as usize;
        }
        if let Ok(value) = std::env::var("MONITOR_PUBLISH_INTERVAL_SECS") {
            config.publish_interval =
                Duration::from_secs(parse_nonzero("MONITOR_PUBLISH_INTERVAL_SECS", &value)?);
        }
        if let Ok(value) = std::env::var("MONITOR_PERSIST_INTERVAL_SECS") {
            config.persist_interval =
                Duration::from_secs(parse_nonzero("MONITOR_PERSIST_INTERVAL_SECS", &value)?);
        }
        if let Ok(dir) = std::env::var("MONITOR_ALERTS_DIR") {
            config.alerts_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("MONITOR_METRICS_DIR") {
            config.metrics_dir = PathBuf::from(dir);
        }
        if let Ok(value) = std::env::var("MONITOR_LISTEN_ADDR") {
            config.listen_addr = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "MONITOR_LISTEN_ADDR".to_string(),
                value,
            })?;
        }
        if let Ok(url) = std::env::var("MONITOR_WEBHOOK_URL") {
            config.webhook_url = Some(url);
        }
        if let Ok(value) = std::env::var("MONITOR_ALERT_COOLDOWN_SECS") {
            config.router.cooldown = Some(Duration::from_secs(parse_number(
                "MONITOR_ALERT_COOLDOWN_SECS",
                &value,
            )?));
        }

        Ok(config)
    }
}

fn parse_symbols(raw: &str) -> Result<Vec<Symbol>, ConfigError> {
    let symbols: Vec<Symbol> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Symbol::new)
        .collect();
    if symbols.is_empty() {
        return Err(ConfigError::NoSymbols);
    }
    Ok(symbols)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Window capacities and task intervals must be at least 1; a zero
/// would only surface later as a panic inside a spawned task.
fn parse_nonzero(key: &str, value: &str) -> Result<u64, ConfigError> {
    let parsed: u64 = parse_number(key, value)?;
    if parsed == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = MonitorConfig::default();
        assert_eq!(config.symbols.len(), 2);
        assert_eq!(config.trade_window, 1000);
        assert_eq!(config.publish_interval, Duration::from_secs(60));
        assert!(config.router.cooldown.is_none());
    }

    #[test]
    fn test_parse_symbols_list() {
        let symbols = parse_symbols("BTC/USDT, ETH/USDT ,SOL/USDT").unwrap();
        assert_eq!(symbols.len(), 3);
        assert_eq!(symbols[1], Symbol::new("ETH/USDT"));
    }

    #[test]
    fn test_parse_symbols_rejects_empty() {
        assert!(matches!(parse_symbols("  , ,"), Err(ConfigError::NoSymbols)));
    }

    #[test]
    fn test_parse_number_rejects_garbage() {
        assert!(parse_number::<u64>("KEY", "ten").is_err());
        assert_eq!(parse_number::<u64>("KEY", "10").unwrap(), 10);
    }

    #[test]
    fn test_zero_window_and_intervals_rejected() {
        // A zero window or interval must fail here, not panic later in
        // the processor or the periodic tasks.
        assert!(matches!(
            parse_nonzero("MONITOR_TRADE_WINDOW", "0"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_nonzero("MONITOR_PUBLISH_INTERVAL_SECS", "0"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(parse_nonzero("MONITOR_TRADE_WINDOW", "1000").unwrap(), 1000);
    }
}
