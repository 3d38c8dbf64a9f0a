use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::mpsc;

use crate::core::error::FeedError;

/// A stream of raw feed messages.
///
/// `poll` returns `Ok(None)` when nothing arrived within `timeout` and
/// `Err(FeedError::Closed)` once the source is exhausted.
#[async_trait]
pub trait FeedSource: Send {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<String>, FeedError>;
}

/// In-process feed fed through an mpsc channel
pub struct ChannelFeed {
    rx: mpsc::Receiver<String>,
}

impl ChannelFeed {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Creates a bounded channel and the feed reading from it
    pub fn channel(capacity: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl FeedSource for ChannelFeed {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<String>, FeedError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(msg)) => Ok(Some(msg)),
            Ok(None) => Err(FeedError::Closed),
            Err(_) => Ok(None),
        }
    }
}

/// One JSON message per line from any async reader (stdin, a capture file)
pub struct JsonLinesFeed<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesFeed<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines() }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> FeedSource for JsonLinesFeed<R> {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<String>, FeedError> {
        loop {
            match tokio::time::timeout(timeout, self.lines.next_line()).await {
                Ok(Ok(Some(line))) if line.trim().is_empty() => continue,
                Ok(Ok(Some(line))) => return Ok(Some(line)),
                Ok(Ok(None)) => return Err(FeedError::Closed),
                Ok(Err(e)) => return Err(FeedError::Transport(e.to_string())),
                Err(_) => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_feed() {
        let (tx, mut feed) = ChannelFeed::channel(4);
        tx.send("a".to_string()).await.unwrap();

        assert_eq!(feed.poll(Duration::from_millis(10)).await.unwrap().as_deref(), Some("a"));
        assert_eq!(feed.poll(Duration::from_millis(10)).await.unwrap(), None);
        drop(tx);
        assert!(matches!(feed.poll(Duration::from_millis(10)).await, Err(FeedError::Closed)));
    }

    #[tokio::test]
    async fn test_json_lines_feed_skips_blank_lines() {
        let input: &[u8] = b"{\"a\":1}\n\n  \n{\"b\":2}\n";
        let mut feed = JsonLinesFeed::new(input);

        assert_eq!(feed.poll(Duration::from_secs(1)).await.unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(feed.poll(Duration::from_secs(1)).await.unwrap().as_deref(), Some("{\"b\":2}"));
        assert!(matches!(feed.poll(Duration::from_secs(1)).await, Err(FeedError::Closed)));
    }
}
