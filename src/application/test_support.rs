//! Synthetic bar series shared by unit tests.

use crate::domain::market::Candle;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

const START_MS: i64 = 1_704_067_200_000;

fn candle(i: usize, close: f64, volume: f64) -> Candle {
    let d = |v: f64| Decimal::from_f64(v).unwrap().round_dp(4);
    Candle {
        symbol: "BTC/USDT".to_string(),
        open: d(close),
        high: d(close * 1.004),
        low: d(close * 0.996),
        close: d(close),
        volume: d(volume),
        timestamp: START_MS + i as i64 * 3_600_000,
    }
}

/// Gentle uptrend with alternating up/down bars: the sign of the last
/// return fully predicts the next one.
pub fn zigzag_bars(n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let swing = if i % 2 == 0 { 1.0 } else { -1.0 };
            let close = 100.0 + i as f64 * 0.05 + swing;
            candle(i, close, 1_000.0 + (i % 5) as f64 * 100.0)
        })
        .collect()
}

/// Seeded geometric random walk with no exploitable structure.
pub fn random_walk_bars(n: usize, seed: u64) -> Vec<Candle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut close = 100.0;
    (0..n)
        .map(|i| {
            close *= 1.0 + rng.random_range(-0.01..0.01);
            candle(i, close, rng.random_range(500.0..1_500.0))
        })
        .collect()
}
