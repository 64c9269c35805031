//! Cell fusion policies.
//!
//! Every policy is a commutative, associative reduction over (value, count)
//! pairs with an identity element, so partial grids can be folded in any
//! order and an untouched cell is simply one whose count is still zero.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How altitudes landing in the same cell are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMode {
    /// Lowest altitude.
    Min,
    /// Highest altitude.
    #[default]
    Max,
    /// Arithmetic mean of altitudes.
    Mean,
    /// Number of contributing samples (debug).
    #[serde(alias = "acc")]
    Accumulate,
}

impl FusionMode {
    /// Short lowercase name, used in logs and metric labels.
    pub const fn as_str(&self) -> &'static str {
        match self {
            FusionMode::Min => "min",
            FusionMode::Max => "max",
            FusionMode::Mean => "mean",
            FusionMode::Accumulate => "acc",
        }
    }

    /// Initial value of an untouched cell.
    pub const fn identity(&self) -> f64 {
        match self {
            FusionMode::Min => f64::INFINITY,
            FusionMode::Max => f64::NEG_INFINITY,
            FusionMode::Mean | FusionMode::Accumulate => 0.0,
        }
    }

    /// Add one altitude sample to a cell.
    #[inline]
    pub fn accumulate(&self, value: &mut f64, count: &mut u32, altitude: f64) {
        match self {
            FusionMode::Min => *value = value.min(altitude),
            FusionMode::Max => *value = value.max(altitude),
            FusionMode::Mean => *value += altitude,
            FusionMode::Accumulate => {}
        }
        *count += 1;
    }

    /// Fold another partial cell into this one.
    #[inline]
    pub fn combine(&self, value: &mut f64, count: &mut u32, other_value: f64, other_count: u32) {
        if other_count == 0 {
            return;
        }
        match self {
            FusionMode::Min => *value = value.min(other_value),
            FusionMode::Max => *value = value.max(other_value),
            FusionMode::Mean => *value += other_value,
            FusionMode::Accumulate => {}
        }
        *count += other_count;
    }

    /// Published value of a fully merged cell.
    #[inline]
    pub fn finalize(&self, value: f64, count: u32, no_data: f64) -> f64 {
        if count == 0 {
            return no_data;
        }
        match self {
            FusionMode::Min | FusionMode::Max => value,
            FusionMode::Mean => value / count as f64,
            FusionMode::Accumulate => count as f64,
        }
    }
}

impl fmt::Display for FusionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FusionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "min" => Ok(FusionMode::Min),
            "max" => Ok(FusionMode::Max),
            "mean" => Ok(FusionMode::Mean),
            "acc" | "accumulate" => Ok(FusionMode::Accumulate),
            other => Err(format!("unknown fusion mode '{}' (expected min, max, mean or acc)", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(mode: FusionMode, samples: &[f64]) -> (f64, u32) {
        let mut value = mode.identity();
        let mut count = 0;
        for &s in samples {
            mode.accumulate(&mut value, &mut count, s);
        }
        (value, count)
    }

    #[test]
    fn test_min_max() {
        assert_eq!(fold(FusionMode::Min, &[5.0, -2.0, 7.0]), (-2.0, 3));
        assert_eq!(fold(FusionMode::Max, &[5.0, -2.0, 7.0]), (7.0, 3));
    }

    #[test]
    fn test_mean_finalize() {
        let (value, count) = fold(FusionMode::Mean, &[10.0, 20.0]);
        assert_eq!(FusionMode::Mean.finalize(value, count, -32768.0), 15.0);
    }

    #[test]
    fn test_accumulate_ignores_altitude() {
        let (value, count) = fold(FusionMode::Accumulate, &[100.0, 200.0, 300.0]);
        assert_eq!(value, 0.0);
        assert_eq!(FusionMode::Accumulate.finalize(value, count, -1.0), 3.0);
    }

    #[test]
    fn test_untouched_finalizes_to_no_data() {
        for mode in [FusionMode::Min, FusionMode::Max, FusionMode::Mean, FusionMode::Accumulate] {
            assert_eq!(mode.finalize(mode.identity(), 0, -9999.0), -9999.0);
        }
    }

    #[test]
    fn test_combine_matches_single_fold() {
        let samples = [3.0, 9.0, -4.0, 12.5, 0.5];
        for mode in [FusionMode::Min, FusionMode::Max, FusionMode::Mean, FusionMode::Accumulate] {
            let (whole_value, whole_count) = fold(mode, &samples);

            let (mut value, mut count) = fold(mode, &samples[..2]);
            let (other_value, other_count) = fold(mode, &samples[2..]);
            mode.combine(&mut value, &mut count, other_value, other_count);

            assert_eq!(count, whole_count);
            assert_eq!(
                mode.finalize(value, count, 0.0),
                mode.finalize(whole_value, whole_count, 0.0)
            );
        }
    }

    #[test]
    fn test_combine_with_untouched_is_noop() {
        let mut value = 4.0;
        let mut count = 1;
        FusionMode::Min.combine(&mut value, &mut count, FusionMode::Min.identity(), 0);
        assert_eq!((value, count), (4.0, 1));
    }

    #[test]
    fn test_parse_and_serde() {
        assert_eq!("MEAN".parse::<FusionMode>().unwrap(), FusionMode::Mean);
        assert_eq!("acc".parse::<FusionMode>().unwrap(), FusionMode::Accumulate);
        assert!("median".parse::<FusionMode>().is_err());

        let mode: FusionMode = serde_json::from_str("\"acc\"").unwrap();
        assert_eq!(mode, FusionMode::Accumulate);
        let mode: FusionMode = serde_json::from_str("\"min\"").unwrap();
        assert_eq!(mode, FusionMode::Min);
        assert!(serde_json::from_str::<FusionMode>("2").is_err());
    }
}
