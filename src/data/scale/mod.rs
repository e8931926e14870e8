/*!
Input data scaling
*/
use super::FeatureRow;
use crate::CpuFloat;
use num::Float;
use serde::{Deserialize, Serialize};

/// Scale a value into `[0, 1]` given the observed range of its feature.
///
/// A degenerate range (`max == min`) maps every value to its offset from `min`, so the minimum itself maps to zero.
#[inline]
pub fn scale<F: Float>(value: F, min: F, max: F) -> F {
    let range = max - min;
    if range == F::zero() {
        return value - min;
    }
    (value - min) / range
}

/// Invert `scale`
#[inline]
pub fn unscale<F: Float>(value: F, min: F, max: F) -> F {
    let range = max - min;
    if range == F::zero() {
        return value + min;
    }
    value * range + min
}

/// A per-feature min-max scaler, fit on a table of feature rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler<F = CpuFloat> {
    /// The minimum observed value of each feature
    pub min: Vec<F>,
    /// The maximum observed value of each feature
    pub max: Vec<F>,
}

impl MinMaxScaler {
    /// Fit a scaler to a table of rows. Returns `None` if the table is empty
    pub fn fit(rows: &[FeatureRow]) -> Option<MinMaxScaler> {
        let first = rows.first()?.values();
        let mut min = first.to_vec();
        let mut max = first.to_vec();
        for row in rows {
            for (i, value) in row.values().iter().enumerate() {
                min[i] = min[i].min(*value);
                max[i] = max[i].max(*value);
            }
        }
        Some(MinMaxScaler { min, max })
    }
    /// Scale a single row
    pub fn transform(&self, row: &FeatureRow) -> FeatureRow {
        let values = row.values();
        FeatureRow {
            close: scale(values[0], self.min[0], self.max[0]),
            ret: scale(values[1], self.min[1], self.max[1]),
        }
    }
    /// Scale a table of rows
    pub fn transform_all(&self, rows: &[FeatureRow]) -> Vec<FeatureRow> {
        rows.iter().map(|row| self.transform(row)).collect()
    }
    /// Map a scaled row back to real units
    pub fn inverse_transform(&self, row: &FeatureRow) -> FeatureRow {
        let values = row.values();
        FeatureRow {
            close: unscale(values[0], self.min[0], self.max[0]),
            ret: unscale(values[1], self.min[1], self.max[1]),
        }
    }
    /// Whether this scaler has one range per model feature
    pub fn is_valid(&self) -> bool {
        self.min.len() == FeatureRow::NN_FIELDS && self.max.len() == FeatureRow::NN_FIELDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<FeatureRow> {
        vec![
            FeatureRow {
                close: 100.0,
                ret: 0.01,
            },
            FeatureRow {
                close: 120.0,
                ret: -0.03,
            },
            FeatureRow {
                close: 90.0,
                ret: 0.05,
            },
        ]
    }

    #[test]
    fn fit_finds_ranges() {
        let scaler = MinMaxScaler::fit(&rows()).unwrap();
        assert_eq!(scaler.min, vec![90.0, -0.03]);
        assert_eq!(scaler.max, vec![120.0, 0.05]);
        assert!(scaler.is_valid());
        assert!(MinMaxScaler::fit(&[]).is_none());
    }

    #[test]
    fn scaled_rows_lie_in_unit_interval() {
        let scaler = MinMaxScaler::fit(&rows()).unwrap();
        for row in scaler.transform_all(&rows()) {
            assert!((0.0..=1.0).contains(&row.close));
            assert!((0.0..=1.0).contains(&row.ret));
        }
        let lowest = scaler.transform(&rows()[2]);
        assert_eq!(lowest.close, 0.0);
        assert_eq!(lowest.ret, 1.0);
    }

    #[test]
    fn round_trip_within_range() {
        let scaler = MinMaxScaler::fit(&rows()).unwrap();
        for i in 0..=100 {
            let t = i as f64 / 100.0;
            let row = FeatureRow {
                close: 90.0 + 30.0 * t,
                ret: -0.03 + 0.08 * t,
            };
            let back = scaler.inverse_transform(&scaler.transform(&row));
            assert!((back.close - row.close).abs() < 1e-6);
            assert!((back.ret - row.ret).abs() < 1e-6);
        }
    }

    #[test]
    fn constant_feature_maps_to_zero() {
        let flat = vec![
            FeatureRow {
                close: 5.0,
                ret: 0.0,
            },
            FeatureRow {
                close: 5.0,
                ret: 0.1,
            },
        ];
        let scaler = MinMaxScaler::fit(&flat).unwrap();
        let scaled = scaler.transform(&flat[0]);
        assert_eq!(scaled.close, 0.0);
        assert_eq!(scaler.inverse_transform(&scaled).close, 5.0);
    }
}
