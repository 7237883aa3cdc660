//! Connection driver task
//!
//! Single owner of the connection, `ConnectionState`, backoff counter and
//! subscriber registry. Client and subscription handles talk to it only
//! through the command channel.
//!
//! Lifecycle:
//! Disconnected → Connecting → Connected → Reconnecting(n) → Connecting → ...
//! back to Disconnected when the last subscription goes away, on shutdown,
//! or when the reconnect budget is exhausted.

use crate::bithumb::codec::{self, Inbound};
use crate::bithumb::types::STATUS_OK;
use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::stream::backoff::Backoff;
use crate::stream::fanout::Fanout;
use crate::stream::price_book::PriceBook;
use crate::stream::queue::DeliveryQueue;
use crate::stream::types::{ConnectionState, StreamEvent, Symbol, SubscriptionId};
use crate::transport::{Connection, Connector, TransportEvent};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Requests from handles to the driver
pub(crate) enum Command {
    Subscribe {
        id: SubscriptionId,
        symbols: BTreeSet<Symbol>,
        queue: Arc<DeliveryQueue>,
    },
    Cancel(SubscriptionId),
    Shutdown,
}

enum Applied {
    Unchanged,
    InterestChanged,
    Shutdown,
}

enum SessionEnd {
    /// Transport closed or failed; `delivered` if any quote arrived first
    Dropped { delivered: bool },

    /// Last subscription cancelled, connection closed on purpose
    Idle,

    Shutdown,
}

enum Opened<T> {
    Connected(T),
    Failed,
    Idle,
    Shutdown,
}

enum BackoffEnd {
    Elapsed,
    Idle,
    Shutdown,
}

pub(crate) struct Driver<C: Connector> {
    config: StreamConfig,
    connector: Arc<C>,
    backoff: Backoff,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<StreamEvent>,
    book: PriceBook,
    fanout: Fanout,
}

impl<C: Connector> Driver<C> {
    pub fn new(
        config: StreamConfig,
        connector: C,
        commands: mpsc::UnboundedReceiver<Command>,
        state: watch::Sender<ConnectionState>,
        events: broadcast::Sender<StreamEvent>,
        book: PriceBook,
    ) -> Self {
        Self {
            backoff: config.backoff(),
            config,
            connector: Arc::new(connector),
            commands,
            state,
            events,
            book,
            fanout: Fanout::new(),
        }
    }

    pub async fn run(mut self) {
        // Consecutive failed attempts; reset once a session delivers data
        let mut failures: u32 = 0;

        loop {
            while self.fanout.is_empty() {
                let command = self.commands.recv().await;
                if let Applied::Shutdown = self.apply(command).await {
                    return self.finish().await;
                }
            }

            self.set_state(ConnectionState::Connecting);
            let end = match self.open_connection().await {
                Opened::Connected(connection) => {
                    self.set_state(ConnectionState::Connected);
                    self.run_session(connection).await
                }
                Opened::Failed => SessionEnd::Dropped { delivered: false },
                Opened::Idle => SessionEnd::Idle,
                Opened::Shutdown => SessionEnd::Shutdown,
            };

            match end {
                SessionEnd::Shutdown => return self.finish().await,
                SessionEnd::Idle => {
                    failures = 0;
                    self.set_state(ConnectionState::Disconnected);
                    continue;
                }
                SessionEnd::Dropped { delivered } => {
                    if delivered {
                        failures = 0;
                    }
                }
            }

            failures = failures.saturating_add(1);

            if let Some(max) = self.config.max_reconnect_attempts {
                if failures > max {
                    let err = StreamError::RetryExhausted { attempts: max };
                    error!(max_reconnect_attempts = max, "Giving up on price stream");
                    self.fanout.fail_all(&err);
                    self.book.clear().await;
                    failures = 0;
                    self.set_state(ConnectionState::Disconnected);
                    continue;
                }
            }

            self.set_state(ConnectionState::Reconnecting { attempt: failures });
            let delay = self.backoff.jittered_delay(failures);
            warn!(
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                "Price stream disconnected, retrying with exponential backoff"
            );

            match self.wait_backoff(delay).await {
                BackoffEnd::Elapsed => {}
                BackoffEnd::Idle => {
                    failures = 0;
                    self.set_state(ConnectionState::Disconnected);
                }
                BackoffEnd::Shutdown => return self.finish().await,
            }
        }
    }

    /// Connect with a timeout while still serving commands
    ///
    /// Shutdown or cancelling the last subscription abandons the attempt.
    async fn open_connection(&mut self) -> Opened<C::Connection> {
        let connector = Arc::clone(&self.connector);
        let url = self.config.url.clone();
        let attempt = timeout(self.config.connect_timeout, async move { connector.connect(&url).await });
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                result = &mut attempt => return match result {
                    Ok(Ok(connection)) => Opened::Connected(connection),
                    Ok(Err(e)) => {
                        warn!(url = %self.config.url, error = %e, "WebSocket connection failed");
                        Opened::Failed
                    }
                    Err(_) => {
                        warn!(
                            url = %self.config.url,
                            timeout_secs = self.config.connect_timeout.as_secs(),
                            "WebSocket connection timed out"
                        );
                        Opened::Failed
                    }
                },
                command = self.commands.recv() => match self.apply(command).await {
                    Applied::Shutdown => return Opened::Shutdown,
                    Applied::InterestChanged if self.fanout.is_empty() => {
                        info!("No subscriptions left, abandoning connection attempt");
                        return Opened::Idle;
                    }
                    _ => {}
                },
            }
        }
    }

    async fn run_session(&mut self, mut connection: C::Connection) -> SessionEnd {
        let mut delivered = false;

        if let Err(e) = self.send_interest(&mut connection).await {
            warn!(error = %e, "Failed to register symbol filter");
            return SessionEnd::Dropped { delivered };
        }

        loop {
            tokio::select! {
                command = self.commands.recv() => match self.apply(command).await {
                    Applied::Shutdown => {
                        connection.close().await;
                        return SessionEnd::Shutdown;
                    }
                    Applied::InterestChanged if self.fanout.is_empty() => {
                        info!("No subscriptions left, closing connection");
                        connection.close().await;
                        return SessionEnd::Idle;
                    }
                    Applied::InterestChanged => {
                        if let Err(e) = self.send_interest(&mut connection).await {
                            warn!(error = %e, "Failed to update symbol filter");
                            return SessionEnd::Dropped { delivered };
                        }
                    }
                    Applied::Unchanged => {}
                },
                event = connection.next_event() => match event {
                    TransportEvent::Text(text) => {
                        delivered |= self.handle_text(&text).await;
                    }
                    TransportEvent::Closed(reason) => {
                        info!(reason = ?reason, "WebSocket closed by server");
                        return SessionEnd::Dropped { delivered };
                    }
                    TransportEvent::Error(e) => {
                        error!(error = %e, "WebSocket error");
                        return SessionEnd::Dropped { delivered };
                    }
                },
            }
        }
    }

    async fn wait_backoff(&mut self, delay: Duration) -> BackoffEnd {
        let timer = sleep(delay);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = &mut timer => return BackoffEnd::Elapsed,
                command = self.commands.recv() => match self.apply(command).await {
                    Applied::Shutdown => return BackoffEnd::Shutdown,
                    Applied::InterestChanged if self.fanout.is_empty() => return BackoffEnd::Idle,
                    _ => {}
                },
            }
        }
    }

    /// Apply one command to the registry; `None` means every handle is gone
    async fn apply(&mut self, command: Option<Command>) -> Applied {
        match command {
            Some(Command::Subscribe { id, symbols, queue }) => {
                debug!(subscription = %id, symbols = ?symbols, "Adding subscription");
                if self.fanout.add(id, symbols, queue) {
                    Applied::InterestChanged
                } else {
                    Applied::Unchanged
                }
            }
            Some(Command::Cancel(id)) => {
                if !self.fanout.remove(id) {
                    return Applied::Unchanged;
                }
                debug!(subscription = %id, "Subscription cancelled, interest shrank");
                let interest = self.fanout.interest();
                self.book.retain(|symbol| interest.contains(symbol)).await;
                Applied::InterestChanged
            }
            Some(Command::Shutdown) | None => Applied::Shutdown,
        }
    }

    async fn send_interest(&self, connection: &mut C::Connection) -> Result<(), StreamError> {
        let interest = self.fanout.interest();
        let request = codec::subscribe_request(self.config.feed, &interest)?;
        info!(feed = %self.config.feed, symbols = interest.len(), "Registering symbol filter");
        connection.send_text(request).await
    }

    /// Decode and dispatch one frame; true when a subscribed symbol got a fresh quote
    async fn handle_text(&mut self, text: &str) -> bool {
        match codec::decode(text, Utc::now()) {
            Ok(Inbound::Quotes(quotes)) => {
                let mut accepted = false;
                for quote in quotes {
                    if !self.fanout.is_interested(&quote.symbol) {
                        debug!(symbol = %quote.symbol, "Ignoring quote for unsubscribed symbol");
                        continue;
                    }
                    if self.book.record(&quote).await {
                        accepted = true;
                        let delivered = self.fanout.dispatch(&quote);
                        debug!(
                            symbol = %quote.symbol,
                            price = %quote.price,
                            subscribers = delivered,
                            "Dispatched quote"
                        );
                    }
                }
                accepted
            }
            Ok(Inbound::Status { status, message }) => {
                if status == STATUS_OK {
                    debug!(message = %message, "Server acknowledged");
                } else {
                    warn!(status = %status, message = %message, "Server reported an error status");
                    let _ = self.events.send(StreamEvent::ServerStatus { status, message });
                }
                false
            }
            Err(e) => {
                warn!(error = %e, len = text.len(), "Dropping malformed message");
                debug!(text = %text, "Malformed frame");
                let _ = self.events.send(StreamEvent::MalformedMessage { reason: e.to_string() });
                false
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        if changed {
            info!(state = %next, "Connection state changed");
            let _ = self.events.send(StreamEvent::StateChanged(next));
        }
    }

    async fn finish(mut self) {
        self.fanout.close_all();
        self.book.clear().await;

        // Subscriptions racing with shutdown never reach the registry
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Subscribe { queue, .. } = command {
                queue.close(Some(StreamError::Shutdown));
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("Price stream driver stopped");
    }
}
