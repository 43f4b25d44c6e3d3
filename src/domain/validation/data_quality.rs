use crate::domain::errors::LifecycleError;
use crate::domain::market::{Candle, Timeframe};
use rust_decimal::Decimal;
use tracing::warn;

/// Centralized validator for bar and feature integrity.
///
/// Rejects data that is physically impossible (non-positive prices, low above
/// high, negative volume) or out of time order.
pub struct StrictBarValidator;

impl StrictBarValidator {
    /// Validates a single Candle. Returns true if valid, false otherwise.
    pub fn validate_candle(candle: &Candle) -> bool {
        if candle.open <= Decimal::ZERO
            || candle.high <= Decimal::ZERO
            || candle.low <= Decimal::ZERO
            || candle.close <= Decimal::ZERO
        {
            warn!(
                "Validation FAILED: Candle for {} at {} has non-positive price component(s)",
                candle.symbol, candle.timestamp
            );
            return false;
        }

        if candle.low > candle.high {
            warn!(
                "Validation FAILED: Candle for {} has low {} > high {}",
                candle.symbol, candle.low, candle.high
            );
            return false;
        }

        if candle.open > candle.high
            || candle.open < candle.low
            || candle.close > candle.high
            || candle.close < candle.low
        {
            warn!(
                "Validation FAILED: Candle for {} has open/close outside [low, high]",
                candle.symbol
            );
            return false;
        }

        if candle.volume < Decimal::ZERO {
            warn!(
                "Validation FAILED: Candle for {} has negative volume: {}",
                candle.symbol, candle.volume
            );
            return false;
        }

        true
    }

    /// Validates a bar series: every bar valid and timestamps strictly
    /// increasing. Bars are never reordered or dropped here.
    pub fn validate_series(bars: &[Candle]) -> Result<(), LifecycleError> {
        for (i, candle) in bars.iter().enumerate() {
            if !Self::validate_candle(candle) {
                return Err(LifecycleError::data_quality(format!(
                    "bar {} ({} @ {}) has invalid prices or volume",
                    i, candle.symbol, candle.timestamp
                )));
            }
        }

        if let Some(i) = bars
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(LifecycleError::data_quality(format!(
                "bars out of time order at index {}: {} then {}",
                i + 1,
                bars[i].timestamp,
                bars[i + 1].timestamp
            )));
        }

        Ok(())
    }

    /// Checks that consecutive bars sit a whole number of `timeframe`
    /// intervals apart. Gaps from missing bars pass; bars of another
    /// interval do not.
    pub fn validate_spacing(bars: &[Candle], timeframe: Timeframe) -> Result<(), LifecycleError> {
        let step = timeframe.to_millis();
        if let Some(i) = bars.windows(2).position(|w| {
            let gap = w[1].timestamp - w[0].timestamp;
            gap <= 0 || gap % step != 0
        }) {
            return Err(LifecycleError::data_quality(format!(
                "bars {} and {} are {}ms apart, not a multiple of the {} interval",
                i,
                i + 1,
                bars[i + 1].timestamp - bars[i].timestamp,
                timeframe
            )));
        }
        Ok(())
    }

    /// Locates the first non-finite value in a feature matrix.
    pub fn first_non_finite(rows: &[Vec<f64>]) -> Option<(usize, usize)> {
        rows.iter().enumerate().find_map(|(r, row)| {
            row.iter()
                .position(|v| !v.is_finite())
                .map(|c| (r, c))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts: i64, low: Decimal, high: Decimal) -> Candle {
        Candle {
            symbol: "ETH/USDT".to_string(),
            open: dec!(2000.0),
            high,
            low,
            close: dec!(2000.0),
            volume: dec!(100.0),
            timestamp: ts,
        }
    }

    #[test]
    fn test_validate_candle_invalid_low_high() {
        // Low > High
        assert!(!StrictBarValidator::validate_candle(&candle(1, dec!(2001.0), dec!(2000.0))));
        assert!(StrictBarValidator::validate_candle(&candle(1, dec!(1999.0), dec!(2001.0))));
    }

    #[test]
    fn test_validate_candle_close_outside_range() {
        // open/close are 2000
        assert!(!StrictBarValidator::validate_candle(&candle(1, dec!(2000.5), dec!(2001.0))));
    }

    #[test]
    fn test_validate_series_rejects_out_of_order() {
        let bars = vec![
            candle(2, dec!(1999.0), dec!(2001.0)),
            candle(1, dec!(1999.0), dec!(2001.0)),
        ];
        let err = StrictBarValidator::validate_series(&bars).unwrap_err();
        assert!(matches!(err, LifecycleError::DataQuality { .. }));
    }

    #[test]
    fn test_validate_series_rejects_duplicate_timestamps() {
        let bars = vec![
            candle(5, dec!(1999.0), dec!(2001.0)),
            candle(5, dec!(1999.0), dec!(2001.0)),
        ];
        assert!(StrictBarValidator::validate_series(&bars).is_err());
    }

    #[test]
    fn test_validate_spacing_allows_gaps_of_whole_intervals() {
        let hour = Timeframe::OneHour.to_millis();
        let bars: Vec<Candle> = [0i64, 1, 2, 5]
            .iter()
            .map(|i| candle(i * hour, dec!(1999.0), dec!(2001.0)))
            .collect();
        assert!(StrictBarValidator::validate_spacing(&bars, Timeframe::OneHour).is_ok());
        assert!(StrictBarValidator::validate_spacing(&bars, Timeframe::FifteenMin).is_ok());

        let err = StrictBarValidator::validate_spacing(&bars, Timeframe::FourHour).unwrap_err();
        assert!(matches!(err, LifecycleError::DataQuality { .. }));
    }

    #[test]
    fn test_validate_spacing_rejects_finer_bars() {
        let bars = vec![
            candle(0, dec!(1999.0), dec!(2001.0)),
            candle(Timeframe::FiveMin.to_millis(), dec!(1999.0), dec!(2001.0)),
        ];
        assert!(StrictBarValidator::validate_spacing(&bars, Timeframe::OneHour).is_err());
        assert!(StrictBarValidator::validate_spacing(&bars[..1], Timeframe::OneHour).is_ok());
    }

    #[test]
    fn test_first_non_finite() {
        let rows = vec![vec![1.0, 2.0], vec![3.0, f64::INFINITY]];
        assert_eq!(StrictBarValidator::first_non_finite(&rows), Some((1, 1)));
        assert_eq!(StrictBarValidator::first_non_finite(&rows[..1]), None);
    }
}
