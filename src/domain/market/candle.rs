use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// One OHLCV price bar. `timestamp` is Unix milliseconds at bar open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timestamp: i64,
}

/// f64 view of a candle, the form indicators consume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OhlcvF64 {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn to_f64(&self) -> OhlcvF64 {
        OhlcvF64 {
            open: self.open.to_f64().unwrap_or(f64::NAN),
            high: self.high.to_f64().unwrap_or(f64::NAN),
            low: self.low.to_f64().unwrap_or(f64::NAN),
            close: self.close.to_f64().unwrap_or(f64::NAN),
            volume: self.volume.to_f64().unwrap_or(f64::NAN),
        }
    }
}
