use crate::domain::errors::{LifecycleError, LifecycleResult};
use crate::domain::market::Candle;
use crate::domain::ml::feature_registry::FEATURE_COUNT;
use crate::domain::validation::data_quality::StrictBarValidator;
use statrs::statistics::Statistics;
use ta::Next;
use ta::indicators::{
    AverageTrueRange, BollingerBands, ExponentialMovingAverage, MovingAverageConvergenceDivergence,
    RelativeStrengthIndex, SimpleMovingAverage,
};

/// One usable timestep: the bar timestamp and its `FEATURE_NAMES`-ordered values.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub timestamp: i64,
    pub values: Vec<f64>,
}

/// Indicator periods used by the builder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub macd_fast_period: usize,
    pub macd_slow_period: usize,
    pub macd_signal_period: usize,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub atr_period: usize,
    pub sma_period: usize,
    pub ema_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast_period: 12,
            macd_slow_period: 26,
            macd_signal_period: 9,
            bb_period: 20,
            bb_std_dev: 2.0,
            atr_period: 14,
            sma_period: 20,
            ema_period: 10,
        }
    }
}

struct Indicators {
    rsi: RelativeStrengthIndex,
    macd: MovingAverageConvergenceDivergence,
    bb: BollingerBands,
    atr: AverageTrueRange,
    sma: SimpleMovingAverage,
    ema: ExponentialMovingAverage,
}

impl Indicators {
    fn new(p: &IndicatorParams) -> LifecycleResult<Self> {
        let invalid = |what: &str, e: ta::errors::TaError| {
            LifecycleError::invalid_config(format!("{} parameters rejected: {:?}", what, e))
        };
        Ok(Self {
            rsi: RelativeStrengthIndex::new(p.rsi_period).map_err(|e| invalid("RSI", e))?,
            macd: MovingAverageConvergenceDivergence::new(
                p.macd_fast_period,
                p.macd_slow_period,
                p.macd_signal_period,
            )
            .map_err(|e| invalid("MACD", e))?,
            bb: BollingerBands::new(p.bb_period, p.bb_std_dev)
                .map_err(|e| invalid("Bollinger", e))?,
            atr: AverageTrueRange::new(p.atr_period).map_err(|e| invalid("ATR", e))?,
            sma: SimpleMovingAverage::new(p.sma_period).map_err(|e| invalid("SMA", e))?,
            ema: ExponentialMovingAverage::new(p.ema_period).map_err(|e| invalid("EMA", e))?,
        })
    }
}

/// Converts ordered OHLCV bars into fixed-width feature vectors.
///
/// Stateless between calls: indicators are rebuilt and fed from bar 0 on
/// every `build`, so identical input gives identical output. The first
/// `lookback - 1` timesteps are dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureBuilder {
    lookback: usize,
    params: IndicatorParams,
}

impl FeatureBuilder {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback,
            params: IndicatorParams::default(),
        }
    }

    pub fn with_params(lookback: usize, params: IndicatorParams) -> Self {
        Self { lookback, params }
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn width(&self) -> usize {
        FEATURE_COUNT
    }

    /// Number of feature rows `build` yields for `bar_count` bars.
    pub fn output_len(&self, bar_count: usize) -> usize {
        if self.lookback == 0 || bar_count < self.lookback {
            0
        } else {
            bar_count - self.lookback + 1
        }
    }

    pub fn build(&self, bars: &[Candle]) -> LifecycleResult<Vec<FeatureVector>> {
        if self.lookback == 0 {
            return Err(LifecycleError::invalid_config("lookback must be at least 1"));
        }
        if bars.len() < self.lookback {
            return Err(LifecycleError::InsufficientData {
                required: self.lookback,
                available: bars.len(),
            });
        }
        StrictBarValidator::validate_series(bars)?;

        let mut ind = Indicators::new(&self.params)?;
        let w = self.lookback;

        let mut closes: Vec<f64> = Vec::with_capacity(bars.len());
        let mut volumes: Vec<f64> = Vec::with_capacity(bars.len());
        let mut prev_rsi: Option<f64> = None;
        let mut out = Vec::with_capacity(self.output_len(bars.len()));

        for (t, candle) in bars.iter().enumerate() {
            let bar = candle.to_f64();
            closes.push(bar.close);
            volumes.push(bar.volume);

            let item = ta::DataItem::builder()
                .high(bar.high)
                .low(bar.low)
                .close(bar.close)
                .open(bar.open)
                .volume(bar.volume)
                .build()
                .map_err(|e| {
                    LifecycleError::data_quality(format!(
                        "bar {} at {} rejected by indicator input: {:?}",
                        t, candle.timestamp, e
                    ))
                })?;

            // Indicators must see every bar, including the warm-up ones.
            let rsi = ind.rsi.next(bar.close) / 100.0;
            let macd = ind.macd.next(bar.close);
            let bb = ind.bb.next(bar.close);
            let atr = ind.atr.next(&item);
            let sma = ind.sma.next(bar.close);
            let ema = ind.ema.next(bar.close);
            let rsi_delta = prev_rsi.map(|p| rsi - p).unwrap_or(0.0);
            prev_rsi = Some(rsi);

            if t + 1 < w {
                continue;
            }

            let close = bar.close;
            let prev_close = if t > 0 { closes[t - 1] } else { close };
            let window_closes = &closes[t + 1 - w..=t];
            let window_volumes = &volumes[t + 1 - w..=t];

            let return_1 = close / prev_close - 1.0;
            let log_return = (close / prev_close).ln();

            let band = bb.upper - bb.lower;
            let bb_width = if bb.average > 0.0 {
                band / bb.average
            } else {
                0.0
            };
            let bb_position = if band > 1e-12 {
                (close - bb.lower) / band
            } else {
                0.5
            };

            let window_returns: Vec<f64> = window_closes
                .windows(2)
                .map(|p| p[1] / p[0] - 1.0)
                .collect();
            let volatility = if window_returns.len() >= 2 {
                window_returns.iter().population_std_dev()
            } else {
                0.0
            };

            let mean_volume = window_volumes.iter().mean();
            let volume_ratio = if mean_volume > 0.0 {
                bar.volume / mean_volume
            } else {
                1.0
            };

            let mean_close = window_closes.iter().mean();
            let std_close = window_closes.iter().population_std_dev();
            let close_zscore = if std_close > 1e-12 {
                (close - mean_close) / std_close
            } else {
                0.0
            };

            let values = vec![
                return_1,
                log_return,
                rsi,
                rsi_delta,
                macd.macd / close,
                macd.signal / close,
                macd.histogram / close,
                bb_width,
                bb_position,
                atr / close,
                close / sma - 1.0,
                close / ema - 1.0,
                volatility,
                close / window_closes[0] - 1.0,
                volume_ratio,
                (bar.high - bar.low) / close,
                close_zscore,
            ];
            debug_assert_eq!(values.len(), FEATURE_COUNT);

            out.push(FeatureVector {
                timestamp: candle.timestamp,
                values,
            });
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal::prelude::FromPrimitive;

    fn bars(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.7).sin() * 3.0 + i as f64 * 0.1;
                let d = |v: f64| Decimal::from_f64(v).unwrap();
                Candle {
                    symbol: "TEST".to_string(),
                    open: d(close - 0.2),
                    high: d(close + 1.0),
                    low: d(close - 1.0),
                    close: d(close),
                    volume: d(1000.0 + (i % 7) as f64 * 50.0),
                    timestamp: 1_700_000_000_000 + i as i64 * 60_000,
                }
            })
            .collect()
    }

    #[test]
    fn test_output_length_is_l_minus_w_plus_one() {
        for (l, w) in [(30, 1), (30, 10), (30, 30), (100, 20)] {
            let out = FeatureBuilder::new(w).build(&bars(l)).unwrap();
            assert_eq!(out.len(), l - w + 1, "L={} W={}", l, w);
            assert!(out.iter().all(|f| f.values.len() == FEATURE_COUNT));
        }
    }

    #[test]
    fn test_first_row_is_bar_lookback_minus_one() {
        let input = bars(40);
        let out = FeatureBuilder::new(15).build(&input).unwrap();
        assert_eq!(out[0].timestamp, input[14].timestamp);
        assert_eq!(out.last().unwrap().timestamp, input[39].timestamp);
    }

    #[test]
    fn test_deterministic_bit_for_bit() {
        let input = bars(80);
        let builder = FeatureBuilder::new(20);
        let a = builder.build(&input).unwrap();
        let b = builder.build(&input).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            let xb: Vec<u64> = x.values.iter().map(|v| v.to_bits()).collect();
            let yb: Vec<u64> = y.values.iter().map(|v| v.to_bits()).collect();
            assert_eq!(xb, yb);
        }
    }

    #[test]
    fn test_values_are_finite() {
        let out = FeatureBuilder::new(20).build(&bars(120)).unwrap();
        assert!(out.iter().all(|f| f.values.iter().all(|v| v.is_finite())));
    }

    #[test]
    fn test_insufficient_data() {
        let err = FeatureBuilder::new(20).build(&bars(19)).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InsufficientData {
                required: 20,
                available: 19
            }
        ));
    }

    #[test]
    fn test_zero_lookback_rejected() {
        assert!(matches!(
            FeatureBuilder::new(0).build(&bars(10)),
            Err(LifecycleError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_unordered_bars_rejected() {
        let mut input = bars(30);
        input.swap(3, 4);
        assert!(matches!(
            FeatureBuilder::new(5).build(&input),
            Err(LifecycleError::DataQuality { .. })
        ));
    }
}
