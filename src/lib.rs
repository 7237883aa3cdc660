// Library exports for bithumb-stream

pub mod error;

pub mod bithumb; // Bithumb WebSocket protocol
pub mod config; // Configuration management
pub mod portfolio; // Investment valuation against live quotes
pub mod stream; // Price stream client, fan-out and reconnection
pub mod transport; // Connector/Connection seam (tokio-tungstenite)

pub use config::StreamConfig;
pub use error::{Result, StreamError};
pub use stream::{
    ConnectionState, OverflowPolicy, PriceQuote, PriceStreamClient, StreamEvent, Subscription, Symbol,
};
