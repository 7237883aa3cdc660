//! Transport seam between the price stream and the network
//!
//! The driver task only sees `Connector`/`Connection`. Production uses the
//! tokio-tungstenite implementation in [`ws`]; tests plug in scripted ones.

#[cfg(feature = "websocket")]
pub mod ws;

use crate::error::StreamError;
use std::future::Future;

#[cfg(feature = "websocket")]
pub use ws::{WsConnection, WsConnector};

/// What the transport reports while a connection is open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame
    Text(String),

    /// The peer closed the connection (close reason, if any)
    Closed(Option<String>),

    /// Read failed; the connection is unusable
    Error(String),
}

/// One open streaming connection
pub trait Connection: Send + 'static {
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), StreamError>> + Send;

    /// Wait for the next frame or the end of the connection
    ///
    /// Must be cancel-safe: the driver races it against its command channel.
    fn next_event(&mut self) -> impl Future<Output = TransportEvent> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens connections to a fixed endpoint
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    fn connect(&self, url: &str) -> impl Future<Output = Result<Self::Connection, StreamError>> + Send;
}
