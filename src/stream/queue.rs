//! Bounded per-subscriber delivery queue
//!
//! Decouples the connection's receive path from slow consumers. `push` never
//! waits; when the queue is full the overflow policy decides which quote is
//! discarded. A closed queue drains what it holds, then yields the terminal
//! error (if any), then ends.

use crate::error::StreamError;
use crate::stream::types::PriceQuote;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

/// What to discard when a subscriber's queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued quote to make room (consumer sees freshest prices)
    #[default]
    DropOldest,

    /// Reject the incoming quote (consumer sees a contiguous prefix)
    DropNewest,
}

impl FromStr for OverflowPolicy {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop-oldest" | "drop_oldest" | "oldest" => Ok(OverflowPolicy::DropOldest),
            "drop-newest" | "drop_newest" | "newest" => Ok(OverflowPolicy::DropNewest),
            other => Err(StreamError::Config(format!("unknown overflow policy: {}", other))),
        }
    }
}

/// Result of a non-blocking push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    EvictedOldest,
    RejectedNewest,
    Closed,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<PriceQuote>,
    terminal: Option<StreamError>,
    closed: bool,
    dropped: u64,
}

#[derive(Debug)]
pub struct DeliveryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
}

impl DeliveryQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Never held across an await; a poisoned lock still holds consistent data
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, quote: PriceQuote) -> PushOutcome {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return PushOutcome::Closed;
            }

            if state.items.len() < self.capacity {
                state.items.push_back(quote);
                PushOutcome::Queued
            } else {
                state.dropped += 1;
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        state.items.pop_front();
                        state.items.push_back(quote);
                        PushOutcome::EvictedOldest
                    }
                    OverflowPolicy::DropNewest => PushOutcome::RejectedNewest,
                }
            }
        };

        if outcome != PushOutcome::RejectedNewest {
            self.notify.notify_one();
        }
        outcome
    }

    /// Stop accepting quotes; `terminal` is delivered after queued quotes
    ///
    /// Only the first close takes effect.
    pub fn close(&self, terminal: Option<StreamError>) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            state.terminal = terminal;
        }
        self.notify.notify_one();
        true
    }

    /// Close and discard anything still queued
    pub fn abandon(&self) -> bool {
        let first = {
            let mut state = self.lock();
            state.items.clear();
            state.terminal = None;
            !std::mem::replace(&mut state.closed, true)
        };
        self.notify.notify_one();
        first
    }

    /// Next quote, then the terminal error once, then `None` forever
    pub async fn pop(&self) -> Option<Result<PriceQuote, StreamError>> {
        loop {
            if let Some(next) = self.try_pop() {
                return next;
            }
            self.notify.notified().await;
        }
    }

    /// Non-waiting variant of `pop`: outer `None` means nothing is ready yet
    pub fn try_pop(&self) -> Option<Option<Result<PriceQuote, StreamError>>> {
        let mut state = self.lock();
        if let Some(quote) = state.items.pop_front() {
            return Some(Some(Ok(quote)));
        }
        if let Some(err) = state.terminal.take() {
            return Some(Some(Err(err)));
        }
        if state.closed {
            return Some(None);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Quotes discarded by the overflow policy so far
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::types::Symbol;
    use chrono::{TimeZone, Utc};
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal::Decimal;

    fn quote(seq: i64) -> PriceQuote {
        PriceQuote {
            symbol: Symbol::new("BTC_KRW").unwrap(),
            price: Decimal::from(seq),
            timestamp: Utc.timestamp_millis_opt(1_650_000_000_000 + seq).unwrap(),
            volume: None,
        }
    }

    fn drain(queue: &DeliveryQueue) -> Vec<i64> {
        let mut prices = Vec::new();
        while let Some(Some(Ok(q))) = queue.try_pop() {
            prices.push(q.price.to_i64().unwrap());
        }
        prices
    }

    #[test]
    fn test_drop_oldest_keeps_freshest_quotes() {
        let queue = DeliveryQueue::new(3, OverflowPolicy::DropOldest);
        for seq in 1..=5 {
            queue.push(quote(seq));
        }
        assert_eq!(queue.dropped(), 2);
        assert_eq!(drain(&queue), vec![3, 4, 5]);
    }

    #[test]
    fn test_drop_newest_keeps_earliest_quotes() {
        let queue = DeliveryQueue::new(3, OverflowPolicy::DropNewest);
        let outcomes: Vec<PushOutcome> = (1..=5).map(|seq| queue.push(quote(seq))).collect();
        assert_eq!(outcomes[3], PushOutcome::RejectedNewest);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(drain(&queue), vec![1, 2, 3]);
    }

    #[test]
    fn test_close_drains_then_terminal_then_end() {
        let queue = DeliveryQueue::new(4, OverflowPolicy::DropOldest);
        queue.push(quote(1));
        assert!(queue.close(Some(StreamError::RetryExhausted { attempts: 5 })));
        assert!(!queue.close(None));
        assert_eq!(queue.push(quote(2)), PushOutcome::Closed);

        assert!(matches!(queue.try_pop(), Some(Some(Ok(_)))));
        assert_eq!(
            queue.try_pop(),
            Some(Some(Err(StreamError::RetryExhausted { attempts: 5 })))
        );
        assert_eq!(queue.try_pop(), Some(None));
        assert_eq!(queue.try_pop(), Some(None));
    }

    #[test]
    fn test_abandon_discards_pending() {
        let queue = DeliveryQueue::new(4, OverflowPolicy::DropOldest);
        queue.push(quote(1));
        assert!(queue.abandon());
        assert!(!queue.abandon());
        assert_eq!(queue.try_pop(), Some(None));
    }

    #[test]
    fn test_overflow_policy_parsing() {
        assert_eq!("drop-newest".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::DropNewest);
        assert_eq!("DROP_OLDEST".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::DropOldest);
        assert!("block".parse::<OverflowPolicy>().is_err());
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = std::sync::Arc::new(DeliveryQueue::new(2, OverflowPolicy::DropOldest));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::task::yield_now().await;
        queue.push(quote(7));
        let got = consumer.await.unwrap().unwrap().unwrap();
        assert_eq!(got.price, Decimal::from(7));
    }
}
