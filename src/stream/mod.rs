//! Real-time price stream
//!
//! One streaming connection per client, fanned out to any number of
//! subscriptions:
//! - Exponential backoff reconnection (base doubling to a cap, jittered)
//! - Per-subscriber bounded queues with an explicit overflow policy
//! - Per-symbol monotonic delivery (stale quotes are discarded)
//! - Observable connection state and diagnostic events

pub mod backoff;
pub mod client;
mod driver;
mod fanout;
pub mod price_book;
pub mod queue;
pub mod types;

pub use backoff::Backoff;
pub use client::{PriceStreamClient, Subscription};
pub use price_book::PriceBook;
pub use queue::{DeliveryQueue, OverflowPolicy, PushOutcome};
pub use types::{ConnectionState, PriceQuote, StreamEvent, Symbol, SubscriptionId};
