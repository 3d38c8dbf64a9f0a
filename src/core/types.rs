use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one instrument stream: exchange, data type and symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrumentId {
    pub exchange: String,
    pub data_type: String,
    pub symbol: String,
}

impl InstrumentId {
    pub fn new(
        exchange: impl Into<String>,
        data_type: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            data_type: data_type.into(),
            symbol: symbol.into(),
        }
    }

    /// True if this instrument belongs to the given (exchange, data type) class
    #[inline]
    pub fn in_class(&self, exchange: &str, data_type: &str) -> bool {
        self.exchange == exchange && self.data_type == data_type
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.exchange, self.data_type, self.symbol)
    }
}

/// One side of the top of book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteLevel {
    pub price: f64,
    pub amount: f64,
}

/// Spread figures derived from the best bid and ask
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spreads {
    pub spread: f64,
    /// Spread relative to the bid, in basis points
    pub spread_bps: f64,
    pub mid_price: f64,
}

impl Spreads {
    /// Computes spreads when both prices are present and non-zero
    pub fn from_prices(bid: Option<f64>, ask: Option<f64>) -> Option<Self> {
        match (bid, ask) {
            (Some(bid), Some(ask)) if bid != 0.0 && ask != 0.0 => {
                let spread = ask - bid;
                Some(Self {
                    spread,
                    spread_bps: spread / bid * 10_000.0,
                    mid_price: (bid + ask) / 2.0,
                })
            }
            _ => None,
        }
    }
}
