#![allow(dead_code)]

use model_lifecycle::application::bootstrap::PersistenceBootstrap;
use model_lifecycle::application::engine::LifecycleEngine;
use model_lifecycle::application::registry::RegistryStores;
use model_lifecycle::config::EngineConfig;
use model_lifecycle::domain::market::{Candle, Timeframe};
use model_lifecycle::domain::model::{AlgorithmKind, DataRange, Hyperparameters, NewModel};
use model_lifecycle::infrastructure::repositories::{InMemoryArtifactStore, InMemoryBarSource};
use model_lifecycle::infrastructure::{EventBus, RecordingListener};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;
use std::sync::Arc;

pub const SYMBOL: &str = "ETH/USDT";
const START_MS: i64 = 1_714_521_600_000;
const HOUR_MS: i64 = 3_600_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

fn candle(i: usize, close: f64, volume: Decimal) -> Candle {
    let d = |v: f64| Decimal::from_f64(v).unwrap_or_default().round_dp(4);
    Candle {
        symbol: SYMBOL.to_string(),
        open: d(close),
        high: d(close * 1.003),
        low: d(close * 0.997),
        close: d(close),
        volume,
        timestamp: START_MS + i as i64 * HOUR_MS,
    }
}

/// Alternating up/down bars on a slow uptrend; the next direction is fully
/// determined by the last return.
pub fn zigzag_bars(n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let swing = if i % 2 == 0 { 15.0 } else { -15.0 };
            let volume = dec!(500) + Decimal::from((i % 4) as u32 * 25);
            candle(i, 2_000.0 + i as f64 * 0.5 + swing, volume)
        })
        .collect()
}

/// Steadily rising closes with seeded noise; most, but not all, bars close up.
pub fn trending_bars(n: usize, seed: u64) -> Vec<Candle> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let close = 2_000.0 + i as f64 * 2.0 + rng.random_range(-1.5..1.5);
            let volume = Decimal::from(rng.random_range(400u32..600));
            candle(i, close, volume)
        })
        .collect()
}

pub fn random_walk_bars(n: usize, seed: u64) -> Vec<Candle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut close = 2_000.0;
    (0..n)
        .map(|i| {
            close *= 1.0 + rng.random_range(-0.01..0.01);
            let volume = Decimal::from(rng.random_range(400u32..600));
            candle(i, close, volume)
        })
        .collect()
}

pub fn range_of(bars: &[Candle]) -> DataRange {
    DataRange::new(bars[0].timestamp, bars[bars.len() - 1].timestamp)
}

pub fn new_model(name: &str, algorithm: AlgorithmKind) -> NewModel {
    NewModel {
        name: name.to_string(),
        symbols: vec![SYMBOL.to_string()],
        timeframe: Timeframe::OneHour,
        algorithm,
        hyperparameters: Hyperparameters::new(),
    }
}

pub struct TestEngine {
    pub engine: LifecycleEngine,
    pub stores: RegistryStores,
    pub events: Arc<RecordingListener>,
    pub range: DataRange,
}

/// Engine over in-memory stores preloaded with `bars`.
pub async fn engine_with(bars: Vec<Candle>, config: EngineConfig) -> TestEngine {
    let handle = PersistenceBootstrap::in_memory(Arc::new(InMemoryArtifactStore::new()));
    let source = Arc::new(InMemoryBarSource::new());
    let range = range_of(&bars);
    source.insert_bars(SYMBOL, bars).await;

    let event_bus = EventBus::new();
    let events = Arc::new(RecordingListener::new());
    event_bus.subscribe(events.clone()).await;

    TestEngine {
        engine: LifecycleEngine::new(handle.stores.clone(), source, event_bus, config),
        stores: handle.stores,
        events,
        range,
    }
}
