//! Price stream client and subscription handles
//!
//! `PriceStreamClient` is the handle the presentation layer holds. It spawns
//! the connection driver on construction; the first `connect` opens the
//! connection. Each `Subscription` owns a bounded delivery queue that the
//! driver fills and the caller drains.

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::stream::driver::{Command, Driver};
use crate::stream::price_book::PriceBook;
use crate::stream::queue::DeliveryQueue;
use crate::stream::types::{ConnectionState, PriceQuote, StreamEvent, Symbol, SubscriptionId};
use crate::transport::Connector;
use futures::Stream;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Capacity of the diagnostic event broadcast
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Streaming price client for a single ticker endpoint
///
/// Handles reconnection with exponential backoff and fans quotes out to
/// any number of subscriptions without letting a slow one stall the others.
///
/// ## Example
/// ```rust,no_run
/// use bithumb_stream::{PriceStreamClient, StreamConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = PriceStreamClient::new(StreamConfig::from_env()?);
/// let mut subscription = client.connect(["BTC_KRW", "ETH_KRW"])?;
///
/// while let Some(update) = subscription.recv().await {
///     let quote = update?;
///     println!("{} {}", quote.symbol, quote.price);
/// }
/// # Ok(())
/// # }
/// ```
pub struct PriceStreamClient {
    config: StreamConfig,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<StreamEvent>,
    book: PriceBook,
    next_id: AtomicU64,
    shut_down: AtomicBool,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl PriceStreamClient {
    /// Create a client over the WebSocket transport
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime (spawns the driver task).
    #[cfg(feature = "websocket")]
    pub fn new(config: StreamConfig) -> Self {
        Self::with_connector(config, crate::transport::WsConnector::new())
    }

    /// Create a client over any transport
    ///
    /// No connection is opened until the first `connect`.
    pub fn with_connector<C: Connector>(config: StreamConfig, connector: C) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let book = PriceBook::new();

        let driver = Driver::new(
            config.clone(),
            connector,
            command_rx,
            state_tx,
            events.clone(),
            book.clone(),
        );
        let handle = tokio::spawn(driver.run());

        Self {
            config,
            commands: command_tx,
            state: state_rx,
            events,
            book,
            next_id: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
            driver: Mutex::new(Some(handle)),
        }
    }

    /// Register interest in `symbols` and get a handle yielding their quotes
    ///
    /// The sequence survives reconnects but does not replay quotes missed
    /// while disconnected.
    ///
    /// # Errors
    ///
    /// - `StreamError::Subscription` for an empty set or an invalid symbol
    /// - `StreamError::Shutdown` after `shutdown`
    pub fn connect<I, S>(&self, symbols: I) -> Result<Subscription, StreamError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols = symbols
            .into_iter()
            .map(|s| Symbol::new(s.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()?;

        if symbols.is_empty() {
            return Err(StreamError::Subscription("symbol set must not be empty".to_string()));
        }
        if self.shut_down.load(Ordering::Acquire) {
            return Err(StreamError::Shutdown);
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let queue = Arc::new(DeliveryQueue::new(self.config.queue_capacity, self.config.overflow));

        self.commands
            .send(Command::Subscribe {
                id,
                symbols: symbols.clone(),
                queue: queue.clone(),
            })
            .map_err(|_| StreamError::Shutdown)?;

        debug!(subscription = %id, symbols = ?symbols, "Subscription registered");

        Ok(Subscription {
            id,
            symbols,
            queue,
            commands: self.commands.clone(),
            cancelled: AtomicBool::new(false),
        })
    }

    /// Release `subscription`; same as `Subscription::cancel`
    pub fn cancel(&self, subscription: &Subscription) {
        subscription.cancel();
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver for connection status indication
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Diagnostic events (state changes, malformed frames, server statuses)
    pub fn events(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// Last accepted quote for `symbol`
    pub async fn latest(&self, symbol: &Symbol) -> Option<PriceQuote> {
        self.book.latest(symbol).await
    }

    /// Last accepted quote for every subscribed symbol
    pub async fn latest_all(&self) -> HashMap<Symbol, PriceQuote> {
        self.book.snapshot().await
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Close the connection, end every subscription and stop the driver
    ///
    /// Idempotent; waits for the driver task to finish.
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        let _ = self.commands.send(Command::Shutdown);

        let handle = self
            .driver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Price stream driver task failed");
            }
        }
    }
}

/// A caller's registration of interest in a set of symbols
///
/// Dropping the subscription cancels it.
pub struct Subscription {
    id: SubscriptionId,
    symbols: BTreeSet<Symbol>,
    queue: Arc<DeliveryQueue>,
    commands: mpsc::UnboundedSender<Command>,
    cancelled: AtomicBool,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn symbols(&self) -> &BTreeSet<Symbol> {
        &self.symbols
    }

    /// Wait for the next quote
    ///
    /// Yields `Some(Err(_))` once for a terminal failure (`RetryExhausted`,
    /// `Shutdown`), then `None`. Also `None` after `cancel` or shutdown.
    pub async fn recv(&mut self) -> Option<Result<PriceQuote, StreamError>> {
        self.queue.pop().await
    }

    /// Next already-queued item, without waiting
    pub fn try_recv(&mut self) -> Option<Result<PriceQuote, StreamError>> {
        self.queue.try_pop().flatten()
    }

    /// Release the subscription immediately; repeated calls do nothing
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.abandon();
        // The driver may already be gone; nothing left to release then
        let _ = self.commands.send(Command::Cancel(self.id));
        debug!(subscription = %self.id, "Subscription cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Quotes discarded because this subscriber fell behind
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Adapt into a `futures::Stream` of quote results
    pub fn into_stream(self) -> impl Stream<Item = Result<PriceQuote, StreamError>> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription.recv().await.map(|item| (item, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("symbols", &self.symbols)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
