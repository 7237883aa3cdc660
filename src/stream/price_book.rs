//! Latest accepted quote per symbol
//!
//! Written only by the driver task; handles read through `PriceStreamClient::latest`.
//! `record` enforces per-symbol timestamp monotonicity before fan-out.

use crate::stream::types::{PriceQuote, Symbol};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    quotes: Arc<RwLock<HashMap<Symbol, PriceQuote>>>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `quote` unless it is older than the one already held
    ///
    /// Equal timestamps are accepted (last write wins).
    pub async fn record(&self, quote: &PriceQuote) -> bool {
        let mut quotes = self.quotes.write().await;
        if let Some(current) = quotes.get(&quote.symbol) {
            if quote.timestamp < current.timestamp {
                debug!(
                    symbol = %quote.symbol,
                    stale = %quote.timestamp,
                    current = %current.timestamp,
                    "Discarding out-of-order quote"
                );
                return false;
            }
        }
        quotes.insert(quote.symbol.clone(), quote.clone());
        true
    }

    pub async fn latest(&self, symbol: &Symbol) -> Option<PriceQuote> {
        self.quotes.read().await.get(symbol).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<Symbol, PriceQuote> {
        self.quotes.read().await.clone()
    }

    /// Forget every symbol
    pub async fn clear(&self) {
        self.quotes.write().await.clear();
    }

    /// Forget symbols nobody is subscribed to any more
    pub async fn retain(&self, keep: impl Fn(&Symbol) -> bool) {
        self.quotes.write().await.retain(|symbol, _| keep(symbol));
    }
}
