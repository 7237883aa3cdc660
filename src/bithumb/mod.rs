//! Bithumb public WebSocket protocol
//!
//! Wire types for the `transaction` and `ticker` push channels and the codec
//! that turns them into `PriceQuote`s.

pub mod codec;
pub mod types;

pub use codec::{decode, subscribe_request, Inbound};
pub use types::{FeedKind, BITHUMB_WS_URL};
