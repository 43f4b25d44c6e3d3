use crate::application::features::FeatureBuilder;
use crate::domain::errors::{LifecycleError, LifecycleResult};
use crate::domain::market::Candle;
use crate::domain::ml::feature_registry::feature_names_owned;
use crate::domain::model::RowRange;
use std::ops::Range;

/// Labelled, time-ordered feature matrix.
///
/// Row `i` holds the features observed at `timestamps[i]` and `labels[i]`
/// is the direction of the following bar (1 = up, 0 = flat or down).
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
    pub timestamps: Vec<i64>,
}

impl Dataset {
    pub fn new(
        feature_names: Vec<String>,
        rows: Vec<Vec<f64>>,
        labels: Vec<u8>,
        timestamps: Vec<i64>,
    ) -> LifecycleResult<Self> {
        if rows.len() != labels.len() || rows.len() != timestamps.len() {
            return Err(LifecycleError::invalid_config(format!(
                "dataset columns disagree: {} rows, {} labels, {} timestamps",
                rows.len(),
                labels.len(),
                timestamps.len()
            )));
        }
        if let Some(i) = rows.iter().position(|r| r.len() != feature_names.len()) {
            return Err(LifecycleError::invalid_config(format!(
                "row {} has {} values, expected {}",
                i,
                rows[i].len(),
                feature_names.len()
            )));
        }
        Ok(Self {
            feature_names,
            rows,
            labels,
            timestamps,
        })
    }

    /// Builds features for `bars` and labels each row with the next bar's
    /// direction. The final feature row has no successor and is dropped.
    pub fn from_bars(bars: &[Candle], lookback: usize) -> LifecycleResult<Self> {
        let features = FeatureBuilder::new(lookback).build(bars)?;
        if features.len() < 2 {
            return Err(LifecycleError::InsufficientData {
                required: lookback + 1,
                available: bars.len(),
            });
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.to_f64().close).collect();
        let usable = features.len() - 1;
        let mut rows = Vec::with_capacity(usable);
        let mut labels = Vec::with_capacity(usable);
        let mut timestamps = Vec::with_capacity(usable);

        for (i, fv) in features.into_iter().take(usable).enumerate() {
            let t = lookback - 1 + i;
            labels.push(u8::from(closes[t + 1] > closes[t]));
            timestamps.push(fv.timestamp);
            rows.push(fv.values);
        }

        Self::new(feature_names_owned(), rows, labels, timestamps)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.feature_names.len()
    }

    /// Contiguous copy of rows `range`; order is preserved.
    pub fn slice(&self, range: Range<usize>) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            rows: self.rows[range.clone()].to_vec(),
            labels: self.labels[range.clone()].to_vec(),
            timestamps: self.timestamps[range].to_vec(),
        }
    }

    /// Describes `range` with the timestamps of its first and last rows.
    pub fn row_range(&self, range: &Range<usize>) -> RowRange {
        let (first_timestamp, last_timestamp) = if range.is_empty() {
            (None, None)
        } else {
            (
                self.timestamps.get(range.start).copied(),
                self.timestamps.get(range.end - 1).copied(),
            )
        };
        RowRange {
            start: range.start,
            end: range.end,
            first_timestamp,
            last_timestamp,
        }
    }

    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r[index]).collect()
    }

    /// Replaces column `index` with `values` (same length as the dataset).
    pub fn set_column(&mut self, index: usize, values: &[f64]) {
        for (row, v) in self.rows.iter_mut().zip(values) {
            row[index] = *v;
        }
    }

    pub fn up_ratio(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        self.labels.iter().filter(|l| **l == 1).count() as f64 / self.labels.len() as f64
    }
}
