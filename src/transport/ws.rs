//! WebSocket transport over tokio-tungstenite

use crate::error::StreamError;
use crate::transport::{Connection, Connector, TransportEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Type alias for the underlying WebSocket stream
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens tokio-tungstenite connections
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    type Connection = WsConnection;

    async fn connect(&self, url: &str) -> Result<WsConnection, StreamError> {
        info!(url = %url, "Connecting to WebSocket");
        let (stream, _response) = connect_async(url).await?;
        info!(url = %url, "WebSocket connected successfully");
        Ok(WsConnection { stream })
    }
}

/// An open tokio-tungstenite connection
pub struct WsConnection {
    stream: WsStream,
}

impl Connection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<(), StreamError> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Text(text.as_str().to_owned()),
                Some(Ok(Message::Ping(data))) => {
                    debug!("Received ping, sending pong");
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        return TransportEvent::Error(format!("failed to send pong: {}", e));
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    debug!("Received pong");
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(frame = ?frame, "WebSocket close frame received");
                    return TransportEvent::Closed(frame.map(|f| f.reason.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!("Received unexpected binary message");
                }
                Some(Ok(Message::Frame(_))) => {
                    // Raw frames are handled internally by tungstenite
                }
                Some(Err(e)) => return TransportEvent::Error(e.to_string()),
                None => return TransportEvent::Closed(None),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "WebSocket close handshake failed");
        }
    }
}
