use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::core::config::{SamplingTrigger, StoreBackend};
use crate::core::record::TickRecord;
use crate::core::time::parse_timestamp;
use crate::core::types::InstrumentId;
use crate::engine::Pipeline;
use crate::feed::ChannelFeed;
use crate::store::{KeyValueStore, MemoryStore};
use crate::RecorderConfig;

fn quote(symbol: &str, ts: &str, bid: f64) -> String {
    format!(
        r#"{{"type":"quote","symbol":"{}","exchange":"binance-futures","bids":[{{"price":{},"amount":1.0}}],"asks":[{{"price":{},"amount":2.0}}],"timestamp":"{}","localTimestamp":"{}"}}"#,
        symbol,
        bid,
        bid + 1.0,
        ts,
        ts
    )
}

fn read_jsonl(path: &Path) -> Vec<TickRecord> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

fn config(dir: &Path) -> RecorderConfig {
    let mut config = RecorderConfig::default();
    config.topic = "crypto-ticks-binance-futures-quote".to_string();
    config.store.backend = StoreBackend::Memory;
    config.sampler.trigger = SamplingTrigger::Tick;
    config.recording.tick_dir = dir.join("ticks");
    config.recording.sample_dir = dir.join("samples");
    config
}

#[tokio::test]
async fn test_full_pipeline_with_tick_trigger() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let mut published = store.subscribe();
    let pipeline = Pipeline::new(config(dir.path()), store.clone()).await.unwrap();

    let (tx, feed) = ChannelFeed::channel(64);
    for msg in [
        quote("btcusdt", "2024-01-01T10:00:10.000Z", 100.0),
        quote("ethusdt", "2024-01-01T10:00:20.000Z", 200.0),
        quote("btcusdt", "2024-01-01T10:00:59.500Z", 101.0),
        "garbage".to_string(),
        quote("btcusdt", "2024-01-01T10:01:00.200Z", 102.0),
        quote("ethusdt", "2024-01-01T10:02:30.000Z", 201.0),
    ] {
        tx.send(msg).await.unwrap();
    }
    drop(tx);

    pipeline.run(feed).await.unwrap();

    let btc = InstrumentId::new("binance-futures", "quote", "btcusdt");
    let eth = InstrumentId::new("binance-futures", "quote", "ethusdt");

    // raw ticks, flushed by the final pass
    let btc_ticks = read_jsonl(&dir.path().join("ticks/binance-futures/quote/btcusdt/2024-01-01.jsonl"));
    let bids: Vec<f64> = btc_ticks.iter().filter_map(|t| t.bid_price).collect();
    assert_eq!(bids, vec![100.0, 101.0, 102.0]);
    let eth_ticks = read_jsonl(&dir.path().join("ticks/binance-futures/quote/ethusdt/2024-01-01.jsonl"));
    assert_eq!(eth_ticks.len(), 2);
    assert!(store.keys("crypto_ticks:*").await.unwrap().is_empty());

    // 10:01 takes the last tick before the boundary, 10:02 the boundary tick itself
    let btc_samples = read_jsonl(&dir.path().join("samples/sampled/binance-futures/quote/btcusdt/2024-01-01_sampled.jsonl"));
    let picked: Vec<(f64, String)> = btc_samples
        .iter()
        .map(|s| (s.bid_price.unwrap(), crate::core::time::format_millis(&s.sampling_timestamp)))
        .collect();
    assert_eq!(
        picked,
        vec![
            (101.0, "2024-01-01T10:01:00.000Z".to_string()),
            (102.0, "2024-01-01T10:02:00.000Z".to_string()),
        ]
    );
    let eth_samples = read_jsonl(&dir.path().join("samples/sampled/binance-futures/quote/ethusdt/2024-01-01_sampled.jsonl"));
    assert_eq!(eth_samples.len(), 1);
    assert_eq!(eth_samples[0].timestamp, parse_timestamp("2024-01-01T10:00:20Z").unwrap());

    let sampler = pipeline.sampler();
    assert_eq!(sampler.sample_window(&btc).await.unwrap(), btc_samples);
    assert_eq!(sampler.latest_sample(&eth).await.unwrap().as_ref(), eth_samples.first());
    assert_eq!(sampler.last_sampled_minute(), Some(parse_timestamp("2024-01-01T10:02:00Z").unwrap()));

    let mut channels = Vec::new();
    while let Ok(msg) = published.try_recv() {
        channels.push(msg.channel);
    }
    // two channels per sample
    assert_eq!(channels.len(), 6);
    assert_eq!(channels.iter().filter(|c| *c == "latest_samples:binance-futures:quote").count(), 3);

    let snap = pipeline.monitor().snapshot();
    assert_eq!(snap.processed_ticks, 5);
    assert_eq!(snap.dropped_messages, 1);
    assert_eq!(snap.samples_created, 3);
    assert_eq!(snap.sampled_minutes, 2);
    assert_eq!(snap.skipped_minutes, 2);
    assert_eq!(snap.errors, 0);

    let stats = pipeline.monitor().instrument_stats(&btc).unwrap();
    assert_eq!(stats.ticks_received, 3);
    assert_eq!(stats.samples_created, 2);
}

#[tokio::test]
async fn test_stop_handle_ends_run() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config(dir.path()), Arc::new(MemoryStore::new()))
        .await
        .unwrap();
    let (tx, feed) = ChannelFeed::channel(8);
    tx.send(quote("btcusdt", "2024-01-01T10:00:10.000Z", 100.0)).await.unwrap();

    let stop = pipeline.stop_handle();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        stop.stop();
    });

    // the sender stays open, so only the stop handle can end the run
    tokio::time::timeout(std::time::Duration::from_secs(10), pipeline.run(feed))
        .await
        .unwrap()
        .unwrap();
    drop(tx);

    let ticks = read_jsonl(&dir.path().join("ticks/binance-futures/quote/btcusdt/2024-01-01.jsonl"));
    assert_eq!(ticks.len(), 1);
}
