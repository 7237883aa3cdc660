//! Bithumb public WebSocket message types
//!
//! Numeric fields arrive as strings; they are kept as strings here and parsed
//! into `Decimal` by the codec so precision is never lost to floats.

use crate::error::StreamError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Base URL for the Bithumb public WebSocket
pub const BITHUMB_WS_URL: &str = "wss://pubwss.bithumb.com/pub/ws";

/// Status code the server uses for successful acknowledgements
pub const STATUS_OK: &str = "0000";

/// Which push channel to subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    /// Individual trades (`contPrice` is the last traded price)
    #[default]
    Transaction,

    /// 24h rolling ticker (`closePrice` is the current price)
    Ticker,
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Transaction => "transaction",
            FeedKind::Ticker => "ticker",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedKind {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transaction" => Ok(FeedKind::Transaction),
            "ticker" => Ok(FeedKind::Ticker),
            other => Err(StreamError::Config(format!("unknown feed: {}", other))),
        }
    }
}

/// Outbound filter registration
///
/// Example JSON:
/// ```json
/// {"type": "ticker", "symbols": ["BTC_KRW"], "tickTypes": ["24H"]}
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    #[serde(rename = "type")]
    pub feed: FeedKind,

    pub symbols: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_types: Option<Vec<String>>,
}

/// Connection/filter acknowledgement
///
/// `{"status":"0000","resmsg":"Connected Successfully"}`
#[derive(Debug, Clone, Deserialize)]
pub struct StatusMessage {
    pub status: String,
    pub resmsg: String,
}

/// Push envelope; `content` is decoded according to `type`
#[derive(Debug, Clone, Deserialize)]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub kind: String,

    pub content: serde_json::Value,
}

/// Any inbound text frame
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InboundFrame {
    Status(StatusMessage),
    Push(PushMessage),
}

/// Content of a `transaction` push
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionContent {
    pub list: Vec<TransactionEntry>,
}

/// One trade from a `transaction` push
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEntry {
    /// Trading pair symbol (e.g., "BTC_KRW")
    pub symbol: String,

    /// 1 = sell, 2 = buy
    #[serde(default)]
    pub buy_sell_gb: Option<String>,

    /// Traded price
    pub cont_price: String,

    /// Traded quantity
    #[serde(default)]
    pub cont_qty: Option<String>,

    /// Traded amount in quote currency
    #[serde(default)]
    pub cont_amt: Option<String>,

    /// Trade time, KST, `%Y-%m-%d %H:%M:%S%.f`
    #[serde(default)]
    pub cont_dtm: Option<String>,
}

/// Content of a `ticker` push
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerContent {
    pub symbol: String,

    #[serde(default)]
    pub tick_type: Option<String>,

    /// KST date, `%Y%m%d`
    #[serde(default)]
    pub date: Option<String>,

    /// KST time, `%H%M%S`
    #[serde(default)]
    pub time: Option<String>,

    #[serde(default)]
    pub open_price: Option<String>,

    /// Current price
    pub close_price: String,

    #[serde(default)]
    pub volume: Option<String>,

    #[serde(default)]
    pub chg_rate: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_request_serialization() {
        let request = SubscribeRequest {
            feed: FeedKind::Ticker,
            symbols: vec!["BTC_KRW".to_string()],
            tick_types: Some(vec!["24H".to_string()]),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"type":"ticker","symbols":["BTC_KRW"],"tickTypes":["24H"]}"#);
    }

    #[test]
    fn test_status_frame_deserialization() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"status":"0000","resmsg":"Connected Successfully"}"#).unwrap();
        match frame {
            InboundFrame::Status(status) => assert_eq!(status.status, STATUS_OK),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_feed_kind_parsing() {
        assert_eq!("Ticker".parse::<FeedKind>().unwrap(), FeedKind::Ticker);
        assert!("orderbook".parse::<FeedKind>().is_err());
    }
}
