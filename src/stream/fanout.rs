//! Subscriber registry and quote fan-out
//!
//! Owned by the driver task. Tracks which subscriptions want which symbols,
//! derives the aggregate interest set sent to the server, and pushes quotes
//! into per-subscriber queues without waiting on any of them.

use crate::error::StreamError;
use crate::stream::queue::{DeliveryQueue, PushOutcome};
use crate::stream::types::{PriceQuote, Symbol, SubscriptionId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

struct Subscriber {
    symbols: BTreeSet<Symbol>,
    queue: Arc<DeliveryQueue>,
}

#[derive(Default)]
pub(crate) struct Fanout {
    subscribers: HashMap<SubscriptionId, Subscriber>,

    /// Symbol → number of subscriptions interested in it
    interest: BTreeMap<Symbol, usize>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn interest(&self) -> BTreeSet<Symbol> {
        self.interest.keys().cloned().collect()
    }

    pub fn is_interested(&self, symbol: &Symbol) -> bool {
        self.interest.contains_key(symbol)
    }

    /// Register a subscription; returns true when the interest set grew
    pub fn add(&mut self, id: SubscriptionId, symbols: BTreeSet<Symbol>, queue: Arc<DeliveryQueue>) -> bool {
        if queue.is_closed() {
            // Cancelled before the driver saw it
            return false;
        }

        let mut grew = false;
        for symbol in &symbols {
            let count = self.interest.entry(symbol.clone()).or_insert(0);
            grew |= *count == 0;
            *count += 1;
        }
        self.subscribers.insert(id, Subscriber { symbols, queue });
        grew
    }

    /// Remove a subscription; returns true when the interest set shrank
    ///
    /// Unknown ids are ignored, which makes repeated cancels harmless.
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let Some(subscriber) = self.subscribers.remove(&id) else {
            return false;
        };

        let mut shrank = false;
        for symbol in &subscriber.symbols {
            if let Some(count) = self.interest.get_mut(symbol) {
                *count -= 1;
                if *count == 0 {
                    self.interest.remove(symbol);
                    shrank = true;
                }
            }
        }
        shrank
    }

    /// Push `quote` to every subscriber of its symbol; returns the delivery count
    pub fn dispatch(&self, quote: &PriceQuote) -> usize {
        let mut delivered = 0;
        for (id, subscriber) in &self.subscribers {
            if !subscriber.symbols.contains(&quote.symbol) {
                continue;
            }
            match subscriber.queue.push(quote.clone()) {
                PushOutcome::Queued => delivered += 1,
                PushOutcome::EvictedOldest => {
                    delivered += 1;
                    debug!(subscription = %id, symbol = %quote.symbol, "Subscriber lagging, evicted oldest quote");
                }
                PushOutcome::RejectedNewest => {
                    debug!(subscription = %id, symbol = %quote.symbol, "Subscriber lagging, rejected newest quote");
                }
                PushOutcome::Closed => {}
            }
        }
        delivered
    }

    /// Deliver a terminal error to every subscription and forget them all
    pub fn fail_all(&mut self, err: &StreamError) {
        warn!(subscriptions = self.subscribers.len(), error = %err, "Failing all subscriptions");
        for subscriber in self.subscribers.values() {
            subscriber.queue.close(Some(err.clone()));
        }
        self.subscribers.clear();
        self.interest.clear();
    }

    /// End every subscription's sequence after its queued quotes
    pub fn close_all(&mut self) {
        for subscriber in self.subscribers.values() {
            subscriber.queue.close(None);
        }
        self.subscribers.clear();
        self.interest.clear();
    }
}
