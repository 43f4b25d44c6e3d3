use crate::domain::errors::{LifecycleError, LifecycleResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Per-column z-score normalisation fitted on training rows only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl FeatureScaler {
    /// Columns with zero variance get a unit scale so they map to 0.
    pub fn fit(rows: &[Vec<f64>]) -> LifecycleResult<Self> {
        let Some(first) = rows.first() else {
            return Err(LifecycleError::InsufficientData {
                required: 1,
                available: 0,
            });
        };
        let width = first.len();
        let n = rows.len() as f64;

        let mut means = vec![0.0; width];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut stds = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in stds.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2);
            }
        }
        for s in stds.iter_mut() {
            *s = (*s / n).sqrt();
            if *s < 1e-12 {
                *s = 1.0;
            }
        }

        Ok(Self { means, stds })
    }

    pub fn width(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> LifecycleResult<Array2<f64>> {
        let width = self.width();
        let mut flat = Vec::with_capacity(rows.len() * width);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(LifecycleError::invalid_config(format!(
                    "row {} has {} features, scaler expects {}",
                    i,
                    row.len(),
                    width
                )));
            }
            flat.extend(
                row.iter()
                    .zip(self.means.iter().zip(&self.stds))
                    .map(|(v, (m, s))| (v - m) / s),
            );
        }
        Array2::from_shape_vec((rows.len(), width), flat)
            .map_err(|e| LifecycleError::invalid_config(format!("feature matrix shape: {}", e)))
    }
}
