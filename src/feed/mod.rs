pub mod message;
pub mod source;

pub use message::{decode_tick, QuoteMessage};
pub use source::{ChannelFeed, FeedSource, JsonLinesFeed};
