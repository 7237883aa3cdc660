//! Price stream data model
//!
//! Symbols, quotes, connection state and diagnostic events shared by the
//! client, the driver task and its observers.

use crate::error::StreamError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tradable asset identifier (e.g., "BTC_KRW")
///
/// Normalised to trimmed ASCII uppercase. Only `[A-Z0-9_-]` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: &str) -> Result<Self, StreamError> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(StreamError::Subscription("empty symbol".to_string()));
        }
        if let Some(bad) = normalized
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(StreamError::Subscription(format!(
                "invalid character {:?} in symbol {}",
                bad, normalized
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = StreamError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::new(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = StreamError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Symbol::new(value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

/// Latest traded/ticker price for one symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: Symbol,

    /// Price in quote currency
    pub price: Decimal,

    /// Exchange event time, or arrival time when the message has none
    pub timestamp: DateTime<Utc>,

    /// Traded quantity (transaction feed) or 24h volume (ticker feed)
    pub volume: Option<Decimal>,
}

/// Connection lifecycle, owned by the driver task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

impl ConnectionState {
    /// Connected and Disconnected are stable; the others are transient
    pub fn is_stable(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting (attempt {})", attempt),
        }
    }
}

/// Diagnostic events broadcast by the driver task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    StateChanged(ConnectionState),

    /// Inbound frame dropped because it did not decode
    MalformedMessage { reason: String },

    /// Non-success status acknowledgement from the server
    ServerStatus { status: String, message: String },
}

/// Identifier of a registered subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}
