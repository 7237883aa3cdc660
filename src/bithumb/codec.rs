//! Decode inbound Bithumb frames into quotes, encode filter requests

use crate::bithumb::types::{
    FeedKind, InboundFrame, PushMessage, SubscribeRequest, TickerContent, TransactionContent,
    TransactionEntry,
};
use crate::error::StreamError;
use crate::stream::types::{PriceQuote, Symbol};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::str::FromStr;

/// Bithumb reports local Korea Standard Time (UTC+9)
const KST_OFFSET_SECS: i32 = 9 * 3600;

/// Tick window requested on the ticker feed
const TICKER_TICK_TYPE: &str = "24H";

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Quotes(Vec<PriceQuote>),
    Status { status: String, message: String },
}

/// Build the filter registration for `symbols`
pub fn subscribe_request(feed: FeedKind, symbols: &BTreeSet<Symbol>) -> Result<String, StreamError> {
    let request = SubscribeRequest {
        feed,
        symbols: symbols.iter().map(|s| s.as_str().to_string()).collect(),
        tick_types: match feed {
            FeedKind::Ticker => Some(vec![TICKER_TICK_TYPE.to_string()]),
            FeedKind::Transaction => None,
        },
    };
    serde_json::to_string(&request).map_err(|e| StreamError::Decode(e.to_string()))
}

/// Decode one text frame
///
/// `received_at` stamps quotes whose message carries no usable time.
pub fn decode(text: &str, received_at: DateTime<Utc>) -> Result<Inbound, StreamError> {
    let frame: InboundFrame = serde_json::from_str(text)?;
    match frame {
        InboundFrame::Status(status) => Ok(Inbound::Status {
            status: status.status,
            message: status.resmsg,
        }),
        InboundFrame::Push(push) => decode_push(push, received_at).map(Inbound::Quotes),
    }
}

fn decode_push(push: PushMessage, received_at: DateTime<Utc>) -> Result<Vec<PriceQuote>, StreamError> {
    match push.kind.as_str() {
        "transaction" => {
            let content: TransactionContent = serde_json::from_value(push.content)?;
            content
                .list
                .iter()
                .map(|entry| transaction_quote(entry, received_at))
                .collect()
        }
        "ticker" => {
            let content: TickerContent = serde_json::from_value(push.content)?;
            ticker_quote(&content, received_at).map(|quote| vec![quote])
        }
        other => Err(StreamError::Decode(format!("unexpected message type: {}", other))),
    }
}

fn transaction_quote(entry: &TransactionEntry, received_at: DateTime<Utc>) -> Result<PriceQuote, StreamError> {
    let timestamp = match entry.cont_dtm.as_deref() {
        Some(raw) => parse_kst(
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                .map_err(|e| StreamError::Decode(format!("invalid contDtm {:?}: {}", raw, e)))?,
        )?,
        None => received_at,
    };

    Ok(PriceQuote {
        symbol: Symbol::new(&entry.symbol).map_err(|e| StreamError::Decode(e.to_string()))?,
        price: parse_price(&entry.cont_price)?,
        timestamp,
        volume: entry.cont_qty.as_deref().map(parse_decimal).transpose()?,
    })
}

fn ticker_quote(content: &TickerContent, received_at: DateTime<Utc>) -> Result<PriceQuote, StreamError> {
    let timestamp = match (content.date.as_deref(), content.time.as_deref()) {
        (Some(date), Some(time)) => {
            let date = NaiveDate::parse_from_str(date, "%Y%m%d")
                .map_err(|e| StreamError::Decode(format!("invalid date {:?}: {}", date, e)))?;
            let time = NaiveTime::parse_from_str(time, "%H%M%S")
                .map_err(|e| StreamError::Decode(format!("invalid time {:?}: {}", time, e)))?;
            parse_kst(date.and_time(time))?
        }
        _ => received_at,
    };

    Ok(PriceQuote {
        symbol: Symbol::new(&content.symbol).map_err(|e| StreamError::Decode(e.to_string()))?,
        price: parse_price(&content.close_price)?,
        timestamp,
        volume: content.volume.as_deref().map(parse_decimal).transpose()?,
    })
}

fn parse_kst(local: NaiveDateTime) -> Result<DateTime<Utc>, StreamError> {
    let kst = FixedOffset::east_opt(KST_OFFSET_SECS)
        .ok_or_else(|| StreamError::Decode("invalid KST offset".to_string()))?;
    kst.from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| StreamError::Decode(format!("ambiguous local time {}", local)))
}

fn parse_decimal(raw: &str) -> Result<Decimal, StreamError> {
    Decimal::from_str(raw.trim())
        .map_err(|e| StreamError::Decode(format!("invalid decimal {:?}: {}", raw, e)))
}

fn parse_price(raw: &str) -> Result<Decimal, StreamError> {
    let price = parse_decimal(raw)?;
    if price.is_sign_negative() {
        return Err(StreamError::Decode(format!("negative price {:?}", raw)));
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 4, 25, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_decode_transaction_with_multiple_entries() {
        let json = r#"{
            "type": "transaction",
            "content": {
                "list": [
                    {
                        "symbol": "BTC_KRW",
                        "buySellGb": "1",
                        "contPrice": "50123000",
                        "contQty": "0.0125",
                        "contAmt": "626537.50",
                        "contDtm": "2022-04-25 12:24:18.830039",
                        "updn": "dn"
                    },
                    {
                        "symbol": "ETH_KRW",
                        "buySellGb": "2",
                        "contPrice": "3712000",
                        "contQty": "1.5",
                        "contAmt": "5568000",
                        "contDtm": "2022-04-25 12:24:19.000000",
                        "updn": "up"
                    }
                ]
            }
        }"#;

        let Inbound::Quotes(quotes) = decode(json, now()).unwrap() else {
            panic!("expected quotes");
        };
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].symbol.as_str(), "BTC_KRW");
        assert_eq!(quotes[0].price, Decimal::from(50_123_000));
        assert_eq!(quotes[0].volume, Some(Decimal::from_str("0.0125").unwrap()));
        // 12:24:18 KST is 03:24:18 UTC
        assert_eq!(
            quotes[0].timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2022-04-25 03:24:18"
        );
    }

    #[test]
    fn test_decode_ticker() {
        let json = r#"{
            "type": "ticker",
            "content": {
                "symbol": "XRP_KRW",
                "tickType": "24H",
                "date": "20220425",
                "time": "121844",
                "openPrice": "900",
                "closePrice": "912.5",
                "lowPrice": "890",
                "highPrice": "930",
                "volume": "1222314.51355788",
                "chgRate": "1.39"
            }
        }"#;

        let Inbound::Quotes(quotes) = decode(json, now()).unwrap() else {
            panic!("expected quotes");
        };
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].price, Decimal::from_str("912.5").unwrap());
        assert_eq!(quotes[0].timestamp, Utc.with_ymd_and_hms(2022, 4, 25, 3, 18, 44).unwrap());
    }

    #[test]
    fn test_missing_time_falls_back_to_arrival() {
        let json = r#"{"type":"transaction","content":{"list":[{"symbol":"BTC_KRW","contPrice":"1"}]}}"#;
        let Inbound::Quotes(quotes) = decode(json, now()).unwrap() else {
            panic!("expected quotes");
        };
        assert_eq!(quotes[0].timestamp, now());
        assert_eq!(quotes[0].volume, None);
    }

    #[test]
    fn test_decode_status() {
        let inbound = decode(r#"{"status":"5100","resmsg":"Invalid Filter Syntax"}"#, now()).unwrap();
        assert_eq!(
            inbound,
            Inbound::Status {
                status: "5100".to_string(),
                message: "Invalid Filter Syntax".to_string()
            }
        );
    }

    #[test]
    fn test_non_decimal_price_is_decode_error() {
        let json = r#"{"type":"transaction","content":{"list":[{"symbol":"BTC_KRW","contPrice":"abc"}]}}"#;
        assert!(matches!(decode(json, now()), Err(StreamError::Decode(_))));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(decode("not json", now()), Err(StreamError::Decode(_))));
        assert!(matches!(decode(r#"{"type":"orderbookdepth","content":{}}"#, now()), Err(StreamError::Decode(_))));
        assert!(matches!(decode(r#"{"hello":"world"}"#, now()), Err(StreamError::Decode(_))));
    }

    #[test]
    fn test_subscribe_request_encodes_sorted_symbols() {
        let symbols: BTreeSet<Symbol> = ["eth_krw", "btc_krw"]
            .iter()
            .map(|s| Symbol::new(s).unwrap())
            .collect();
        assert_eq!(
            subscribe_request(FeedKind::Transaction, &symbols).unwrap(),
            r#"{"type":"transaction","symbols":["BTC_KRW","ETH_KRW"]}"#
        );
    }
}
