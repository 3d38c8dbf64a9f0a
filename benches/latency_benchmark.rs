use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::time::Duration;
use tick_recorder::{
    core::config::{SamplerConfig, TickCacheConfig},
    core::time::parse_timestamp,
    core::types::QuoteLevel,
    feed::decode_tick,
    InstrumentId, MemoryStore, MinuteSampler, Monitor, Tick, TickCache,
};
use tokio::runtime::Runtime;

const QUOTE: &str = r#"{"type":"quote","symbol":"btcusdt","exchange":"binance-futures","bids":[{"price":42000.5,"amount":1.25}],"asks":[{"price":42001.0,"amount":0.5}],"timestamp":"2024-01-01T10:00:00.123Z","localTimestamp":"2024-01-01T10:00:00.125Z"}"#;

fn sample_tick() -> Tick {
    let ts = parse_timestamp("2024-01-01T10:00:00.123Z").unwrap();
    Tick::new(
        InstrumentId::new("binance-futures", "quote", "btcusdt"),
        Some(QuoteLevel { price: 42000.5, amount: 1.25 }),
        Some(QuoteLevel { price: 42001.0, amount: 0.5 }),
        ts,
        Some(ts),
        ts,
    )
}

fn benchmark_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let now = parse_timestamp("2024-01-01T10:00:00.200Z").unwrap();

    group.bench_function("decode_tick", |b| {
        b.iter(|| black_box(decode_tick(black_box(QUOTE), now)));
    });

    let tick = sample_tick();
    group.bench_function("to_record_json", |b| {
        b.iter(|| black_box(serde_json::to_string(&tick.to_record())));
    });

    group.finish();
}

fn benchmark_tick_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_cache");
    group.measurement_time(Duration::from_secs(10));

    let rt = Runtime::new().unwrap();
    let monitor = Arc::new(Monitor::new(Duration::from_secs(3600)));
    let cache = TickCache::new(Arc::new(MemoryStore::new()), monitor.clone(), TickCacheConfig::default());
    let tick = sample_tick();

    group.bench_function("add_tick", |b| {
        b.iter(|| rt.block_on(cache.add_tick(black_box(&tick))));
    });

    // Buffer 100 ticks, then take them in one rename
    group.bench_function("add_then_take_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                for _ in 0..100 {
                    let _ = cache.add_tick(&tick).await;
                }
                let keys = cache.keys_to_flush("binance-futures", "quote").await.unwrap_or_default();
                for key in keys {
                    black_box(cache.take_ticks(&key).await.ok());
                }
            })
        });
    });

    let sampler = MinuteSampler::new(
        Arc::new(MemoryStore::new()),
        monitor,
        SamplerConfig::default(),
        "binance-futures",
        "quote",
        std::env::temp_dir().join("tick_recorder_bench"),
    );
    group.bench_function("add_to_minute_buffer", |b| {
        b.iter(|| rt.block_on(sampler.add_to_buffer(black_box(&tick))));
    });

    group.finish();
}

criterion_group!(benches, benchmark_decode, benchmark_tick_cache);
criterion_main!(benches);
