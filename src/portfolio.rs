//! Investment records and profit/loss against live quotes
//!
//! A downstream consumer of the price stream: the persistence layer supplies
//! what was invested, in which coin and on which date; the caller supplies
//! the historical price on that date and a live `PriceQuote`.

use crate::error::StreamError;
use crate::stream::types::{PriceQuote, Symbol};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A user's investment in one coin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investment {
    pub symbol: Symbol,

    /// Fiat amount invested
    pub amount: Decimal,

    /// Day the investment was made
    pub date: NaiveDate,
}

/// Read-only access to stored investment records
pub trait InvestmentStore: Send + Sync {
    fn investments(&self) -> Vec<Investment>;

    fn investment(&self, symbol: &Symbol) -> Option<Investment>;
}

/// In-memory store, one record per symbol
#[derive(Debug, Clone, Default)]
pub struct MemoryInvestmentStore {
    records: BTreeMap<Symbol, Investment>,
}

impl MemoryInvestmentStore {
    pub fn new(records: impl IntoIterator<Item = Investment>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.symbol.clone(), record))
                .collect(),
        }
    }
}

impl InvestmentStore for MemoryInvestmentStore {
    fn investments(&self) -> Vec<Investment> {
        self.records.values().cloned().collect()
    }

    fn investment(&self, symbol: &Symbol) -> Option<Investment> {
        self.records.get(symbol).cloned()
    }
}

/// Valuation of an investment at a live price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitLoss {
    pub symbol: Symbol,

    /// Coins bought: amount / past price
    pub quantity: Decimal,

    pub invested: Decimal,

    /// quantity * live price
    pub current_value: Decimal,

    /// current_value - invested
    pub profit: Decimal,

    /// profit / invested * 100
    pub rate_percent: Decimal,
}

impl ProfitLoss {
    /// Value `investment` bought at `past_price` against the live `quote`
    ///
    /// # Errors
    ///
    /// `StreamError::Valuation` for a non-positive past price or amount, or a
    /// quote for a different symbol.
    pub fn evaluate(investment: &Investment, past_price: Decimal, quote: &PriceQuote) -> Result<Self, StreamError> {
        if quote.symbol != investment.symbol {
            return Err(StreamError::Valuation(format!(
                "quote for {} cannot value an investment in {}",
                quote.symbol, investment.symbol
            )));
        }
        if past_price <= Decimal::ZERO {
            return Err(StreamError::Valuation(format!("past price must be positive, got {}", past_price)));
        }
        if investment.amount <= Decimal::ZERO {
            return Err(StreamError::Valuation(format!(
                "invested amount must be positive, got {}",
                investment.amount
            )));
        }

        let quantity = investment.amount / past_price;
        let current_value = quantity * quote.price;
        let profit = current_value - investment.amount;
        let rate_percent = profit / investment.amount * Decimal::ONE_HUNDRED;

        Ok(Self {
            symbol: investment.symbol.clone(),
            quantity,
            invested: investment.amount,
            current_value,
            profit,
            rate_percent,
        })
    }
}
