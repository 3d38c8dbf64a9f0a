/// Feed topic helpers
pub mod topic {
    pub const TOPIC_PREFIX: &str = "crypto-ticks-";

    /// Splits `crypto-ticks-<exchange>-<data_type>` into `(exchange, data_type)`.
    ///
    /// The data type is the last dash-separated part; the exchange is
    /// everything between the prefix and it, so it may contain dashes.
    pub fn parse_topic(topic: &str) -> Option<(String, String)> {
        let rest = topic.strip_prefix(TOPIC_PREFIX).unwrap_or(topic);
        let (exchange, data_type) = rest.rsplit_once('-')?;
        if exchange.is_empty() || data_type.is_empty() {
            return None;
        }
        Some((exchange.to_string(), data_type.to_string()))
    }

    pub fn topic_for(exchange: &str, data_type: &str) -> String {
        format!("{}{}-{}", TOPIC_PREFIX, exchange, data_type)
    }
}

pub use topic::parse_topic;
