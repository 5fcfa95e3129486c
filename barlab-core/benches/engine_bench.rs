//! Engine throughput benchmark: a seeded coinflip run over synthetic
//! 1-minute bars.

use criterion::{criterion_group, criterion_main, Criterion};

use barlab_core::config::resolve_config;
use barlab_core::data::MemoryFeed;
use barlab_core::domain::Bar;
use barlab_core::engine::Engine;
use barlab_core::strategy::CoinflipStrategy;
use chrono::{TimeZone, Utc};

fn synthetic_bars(n: i64) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let base = 100.0 + (i % 23) as f64 * 0.3;
            Bar::new(
                start + chrono::Duration::minutes(i),
                "AAA",
                base,
                base + 0.8,
                base - 0.8,
                base + 0.2,
                50.0,
            )
        })
        .collect()
}

fn bench_engine(c: &mut Criterion) {
    let config = resolve_config(
        serde_yaml::from_str(
            "run: {initial_cash: 100000}\n\
             risk: {r_per_trade: 0.005, stop_resolution_mode: strict, max_leverage: 10}\n",
        )
        .unwrap(),
    )
    .unwrap();
    let bars = synthetic_bars(10_000);

    c.bench_function("engine_10k_bars_coinflip", |b| {
        b.iter(|| {
            let feed = MemoryFeed::new(bars.clone());
            let strategy = CoinflipStrategy::new(42, 0.3, 0, 30);
            let mut engine =
                Engine::new(&config, Box::new(feed), Box::new(strategy)).unwrap();
            engine.run().unwrap();
            engine.report().trades.len()
        })
    });
}

criterion_group!(benches, bench_engine);
criterion_main!(benches);
