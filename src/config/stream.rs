//! Price Stream Configuration
//!
//! Endpoint, reconnect policy and subscriber queue settings.

use crate::bithumb::types::{FeedKind, BITHUMB_WS_URL};
use crate::error::StreamError;
use crate::stream::backoff::Backoff;
use crate::stream::queue::OverflowPolicy;
use std::str::FromStr;
use std::time::Duration;

/// Price stream configuration
///
/// ## Environment Variables
///
/// - `BITHUMB_WS_URL`: WebSocket endpoint (default: wss://pubwss.bithumb.com/pub/ws)
/// - `PRICE_STREAM_FEED`: `transaction` or `ticker` (default: transaction)
/// - `PRICE_STREAM_RECONNECT_BASE_MS`: First reconnect delay (default: 1000)
/// - `PRICE_STREAM_RECONNECT_MAX_MS`: Reconnect delay cap (default: 30000)
/// - `PRICE_STREAM_RECONNECT_JITTER`: Jitter fraction 0.0-1.0 (default: 0.1)
/// - `PRICE_STREAM_MAX_RECONNECTS`: Reconnects before giving up (default: unlimited, 0 = unlimited)
/// - `PRICE_STREAM_QUEUE_CAPACITY`: Per-subscriber queue size (default: 256)
/// - `PRICE_STREAM_OVERFLOW`: `drop-oldest` or `drop-newest` (default: drop-oldest)
/// - `PRICE_STREAM_CONNECT_TIMEOUT_SECS`: Connect attempt timeout (default: 10)
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// WebSocket endpoint
    pub url: String,

    /// Push channel to subscribe to
    pub feed: FeedKind,

    /// Delay before the first reconnect
    pub reconnect_base: Duration,

    /// Upper bound for reconnect delays
    pub reconnect_max: Duration,

    /// Fraction of each delay randomised (0.0 disables)
    pub reconnect_jitter: f64,

    /// Reconnects allowed after the initial attempt; `None` retries forever
    pub max_reconnect_attempts: Option<u32>,

    /// Quotes buffered per subscriber before the overflow policy applies
    pub queue_capacity: usize,

    pub overflow: OverflowPolicy,

    /// Bound on a single connect attempt
    pub connect_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: BITHUMB_WS_URL.to_string(),
            feed: FeedKind::default(),
            reconnect_base: Duration::from_millis(1_000),
            reconnect_max: Duration::from_millis(30_000),
            reconnect_jitter: 0.1,
            max_reconnect_attempts: None,
            queue_capacity: 256,
            overflow: OverflowPolicy::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl StreamConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Config` when a variable is set but invalid
    pub fn from_env() -> Result<Self, StreamError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StreamError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let url = get("BITHUMB_WS_URL").unwrap_or(defaults.url);
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(StreamError::Config(format!("BITHUMB_WS_URL must be a ws:// or wss:// URL, got {}", url)));
        }

        let feed = match get("PRICE_STREAM_FEED") {
            Some(raw) => raw.parse()?,
            None => defaults.feed,
        };

        let reconnect_base = match get("PRICE_STREAM_RECONNECT_BASE_MS") {
            Some(raw) => Duration::from_millis(parse_number("PRICE_STREAM_RECONNECT_BASE_MS", &raw)?),
            None => defaults.reconnect_base,
        };

        let reconnect_max = match get("PRICE_STREAM_RECONNECT_MAX_MS") {
            Some(raw) => Duration::from_millis(parse_number("PRICE_STREAM_RECONNECT_MAX_MS", &raw)?),
            None => defaults.reconnect_max,
        };

        if reconnect_base.is_zero() {
            return Err(StreamError::Config("PRICE_STREAM_RECONNECT_BASE_MS must be positive".to_string()));
        }
        if reconnect_max < reconnect_base {
            return Err(StreamError::Config(
                "PRICE_STREAM_RECONNECT_MAX_MS must not be below PRICE_STREAM_RECONNECT_BASE_MS".to_string(),
            ));
        }

        let reconnect_jitter = match get("PRICE_STREAM_RECONNECT_JITTER") {
            Some(raw) => {
                let jitter: f64 = parse_number("PRICE_STREAM_RECONNECT_JITTER", &raw)?;
                if !(0.0..=1.0).contains(&jitter) {
                    return Err(StreamError::Config(format!(
                        "PRICE_STREAM_RECONNECT_JITTER must be within 0.0..=1.0, got {}",
                        jitter
                    )));
                }
                jitter
            }
            None => defaults.reconnect_jitter,
        };

        let max_reconnect_attempts = match get("PRICE_STREAM_MAX_RECONNECTS") {
            Some(raw) => match parse_number::<u32>("PRICE_STREAM_MAX_RECONNECTS", &raw)? {
                0 => None,
                n => Some(n),
            },
            None => defaults.max_reconnect_attempts,
        };

        let queue_capacity = match get("PRICE_STREAM_QUEUE_CAPACITY") {
            Some(raw) => parse_number("PRICE_STREAM_QUEUE_CAPACITY", &raw)?,
            None => defaults.queue_capacity,
        };
        if queue_capacity == 0 {
            return Err(StreamError::Config("PRICE_STREAM_QUEUE_CAPACITY must be positive".to_string()));
        }

        let overflow = match get("PRICE_STREAM_OVERFLOW") {
            Some(raw) => raw.parse()?,
            None => defaults.overflow,
        };

        let connect_timeout = match get("PRICE_STREAM_CONNECT_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number("PRICE_STREAM_CONNECT_TIMEOUT_SECS", &raw)?),
            None => defaults.connect_timeout,
        };

        Ok(Self {
            url,
            feed,
            reconnect_base,
            reconnect_max,
            reconnect_jitter,
            max_reconnect_attempts,
            queue_capacity,
            overflow,
            connect_timeout,
        })
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.reconnect_base, self.reconnect_max, self.reconnect_jitter)
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T, StreamError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| StreamError::Config(format!("{} has invalid value {:?}: {}", key, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<StreamConfig, StreamError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StreamConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = load(&[]).expect("Failed to load config");

        assert_eq!(config.url, "wss://pubwss.bithumb.com/pub/ws");
        assert_eq!(config.feed, FeedKind::Transaction);
        assert_eq!(config.reconnect_base, Duration::from_secs(1));
        assert_eq!(config.reconnect_max, Duration::from_secs(30));
        assert_eq!(config.max_reconnect_attempts, None);
        assert_eq!(config.queue_capacity, 256);
        assert_eq!(config.overflow, OverflowPolicy::DropOldest);
        assert_eq!(config, StreamConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("BITHUMB_WS_URL", "ws://127.0.0.1:9001"),
            ("PRICE_STREAM_FEED", "ticker"),
            ("PRICE_STREAM_RECONNECT_BASE_MS", "250"),
            ("PRICE_STREAM_RECONNECT_MAX_MS", "4000"),
            ("PRICE_STREAM_RECONNECT_JITTER", "0"),
            ("PRICE_STREAM_MAX_RECONNECTS", "5"),
            ("PRICE_STREAM_QUEUE_CAPACITY", "16"),
            ("PRICE_STREAM_OVERFLOW", "drop-newest"),
            ("PRICE_STREAM_CONNECT_TIMEOUT_SECS", "3"),
        ])
        .unwrap();

        assert_eq!(config.url, "ws://127.0.0.1:9001");
        assert_eq!(config.feed, FeedKind::Ticker);
        assert_eq!(config.backoff().delay(1), Duration::from_millis(250));
        assert_eq!(config.backoff().delay(10), Duration::from_secs(4));
        assert_eq!(config.max_reconnect_attempts, Some(5));
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.overflow, OverflowPolicy::DropNewest);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_zero_max_reconnects_means_unlimited() {
        let config = load(&[("PRICE_STREAM_MAX_RECONNECTS", "0")]).unwrap();
        assert_eq!(config.max_reconnect_attempts, None);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(load(&[("BITHUMB_WS_URL", "https://example.com")]), Err(StreamError::Config(_))));
        assert!(matches!(load(&[("PRICE_STREAM_QUEUE_CAPACITY", "0")]), Err(StreamError::Config(_))));
        assert!(matches!(load(&[("PRICE_STREAM_RECONNECT_JITTER", "1.5")]), Err(StreamError::Config(_))));
        assert!(matches!(load(&[("PRICE_STREAM_RECONNECT_BASE_MS", "fast")]), Err(StreamError::Config(_))));
        assert!(matches!(
            load(&[("PRICE_STREAM_RECONNECT_BASE_MS", "5000"), ("PRICE_STREAM_RECONNECT_MAX_MS", "1000")]),
            Err(StreamError::Config(_))
        ));
    }
}
