use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::time::{self, ceil_minute};
use crate::core::types::{InstrumentId, QuoteLevel, Spreads};

/// One normalized top-of-book update. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    instrument: InstrumentId,
    bid: Option<QuoteLevel>,
    ask: Option<QuoteLevel>,
    event_time: DateTime<Utc>,
    local_time: Option<DateTime<Utc>>,
    receive_time: DateTime<Utc>,
    spreads: Option<Spreads>,
}

impl Tick {
    /// Creates a tick and derives its spreads
    pub fn new(
        instrument: InstrumentId,
        bid: Option<QuoteLevel>,
        ask: Option<QuoteLevel>,
        event_time: DateTime<Utc>,
        local_time: Option<DateTime<Utc>>,
        receive_time: DateTime<Utc>,
    ) -> Self {
        let spreads = Spreads::from_prices(bid.map(|l| l.price), ask.map(|l| l.price));
        Self {
            instrument,
            bid,
            ask,
            event_time,
            local_time,
            receive_time,
            spreads,
        }
    }

    #[inline]
    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    #[inline]
    pub fn bid(&self) -> Option<QuoteLevel> {
        self.bid
    }

    #[inline]
    pub fn ask(&self) -> Option<QuoteLevel> {
        self.ask
    }

    /// Exchange-reported event time
    #[inline]
    pub fn event_time(&self) -> DateTime<Utc> {
        self.event_time
    }

    #[inline]
    pub fn local_time(&self) -> Option<DateTime<Utc>> {
        self.local_time
    }

    #[inline]
    pub fn receive_time(&self) -> DateTime<Utc> {
        self.receive_time
    }

    #[inline]
    pub fn spreads(&self) -> Option<Spreads> {
        self.spreads
    }

    /// Flattened storage projection written to the store and to disk
    pub fn to_record(&self) -> TickRecord {
        TickRecord {
            timestamp: self.event_time,
            local_timestamp: self.local_time,
            receive_timestamp: self.receive_time,
            sampling_timestamp: ceil_minute(self.event_time),
            symbol: self.instrument.symbol.clone(),
            exchange: self.instrument.exchange.clone(),
            data_type: self.instrument.data_type.clone(),
            bid_price: self.bid.map(|l| l.price),
            bid_size: self.bid.map(|l| l.amount),
            ask_price: self.ask.map(|l| l.price),
            ask_size: self.ask.map(|l| l.amount),
            spread: self.spreads.map(|s| s.spread),
            spread_bps: self.spreads.map(|s| s.spread_bps),
            mid_price: self.spreads.map(|s| s.mid_price),
        }
    }
}

/// JSON shape of a tick in the shared store and in the `.jsonl` files.
///
/// For a raw tick `sampling_timestamp` is the minute the tick rolls forward
/// into; for a sample it is the minute boundary the sample represents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    #[serde(with = "time::millis")]
    pub timestamp: DateTime<Utc>,
    #[serde(with = "time::millis_option", default)]
    pub local_timestamp: Option<DateTime<Utc>>,
    #[serde(with = "time::millis")]
    pub receive_timestamp: DateTime<Utc>,
    #[serde(with = "time::millis")]
    pub sampling_timestamp: DateTime<Utc>,
    pub symbol: String,
    pub exchange: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub bid_price: Option<f64>,
    pub bid_size: Option<f64>,
    pub ask_price: Option<f64>,
    pub ask_size: Option<f64>,
    pub spread: Option<f64>,
    pub spread_bps: Option<f64>,
    pub mid_price: Option<f64>,
}

impl TickRecord {
    pub fn instrument(&self) -> InstrumentId {
        InstrumentId::new(&self.exchange, &self.data_type, &self.symbol)
    }

    /// Stamps this record as the sample for `minute`
    pub fn into_sample(mut self, minute: DateTime<Utc>) -> Self {
        self.sampling_timestamp = minute;
        self
    }
}

/// Pub/sub payload announcing a new sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEnvelope {
    pub data: TickRecord,
    #[serde(with = "time::millis")]
    pub publish_time: DateTime<Utc>,
}
