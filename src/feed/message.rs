use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::error::FeedError;
use crate::core::record::Tick;
use crate::core::time::parse_timestamp;
use crate::core::types::{InstrumentId, QuoteLevel};

/// Quote message as published by the feed process
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteMessage {
    pub symbol: String,
    pub exchange: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub bids: Vec<QuoteLevel>,
    #[serde(default)]
    pub asks: Vec<QuoteLevel>,
    pub timestamp: String,
    #[serde(rename = "localTimestamp", default)]
    pub local_timestamp: Option<String>,
}

impl QuoteMessage {
    pub fn parse(raw: &str) -> Result<Self, FeedError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Normalizes into a tick; only the best level of each side is kept
    pub fn into_tick(self, receive_time: DateTime<Utc>) -> Result<Tick, FeedError> {
        let event_time = parse_field("timestamp", &self.timestamp)?;
        let local_time = self
            .local_timestamp
            .as_deref()
            .map(|raw| parse_field("localTimestamp", raw))
            .transpose()?;

        Ok(Tick::new(
            InstrumentId::new(self.exchange, self.data_type, self.symbol),
            self.bids.first().copied(),
            self.asks.first().copied(),
            event_time,
            local_time,
            receive_time,
        ))
    }
}

fn parse_field(field: &'static str, raw: &str) -> Result<DateTime<Utc>, FeedError> {
    parse_timestamp(raw).map_err(|source| FeedError::Timestamp {
        field,
        value: raw.to_string(),
        source,
    })
}

/// Decodes one raw feed message into a tick stamped with `receive_time`
pub fn decode_tick(raw: &str, receive_time: DateTime<Utc>) -> Result<Tick, FeedError> {
    QuoteMessage::parse(raw)?.into_tick(receive_time)
}
