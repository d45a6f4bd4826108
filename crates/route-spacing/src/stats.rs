use serde::{Deserialize, Serialize};

use crate::spacing::{SpacingRecord, SpacingStatus};

/// Route-level rollup of one evaluation cycle. Every field is zero for an
/// empty route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteStats {
    pub active_vehicles: usize,
    pub average_spacing_km: f64,
    pub min_spacing_km: f64,
    pub max_spacing_km: f64,
    pub optimal_count: usize,
    /// Vehicles that are critical or too close.
    pub poor_count: usize,
}

impl RouteStats {
    /// Aggregates spacing over the known `distance_ahead_km` values.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_records(records: &[SpacingRecord]) -> Self {
        let spacings: Vec<f64> = records.iter().filter_map(|r| r.distance_ahead_km).collect();

        let (average_spacing_km, min_spacing_km, max_spacing_km) = if spacings.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let sum: f64 = spacings.iter().sum();
            let min = spacings.iter().copied().fold(f64::INFINITY, f64::min);
            let max = spacings.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (sum / spacings.len() as f64, min, max)
        };

        Self {
            active_vehicles: records.len(),
            average_spacing_km,
            min_spacing_km,
            max_spacing_km,
            optimal_count: records.iter().filter(|r| r.status == SpacingStatus::Optimal).count(),
            poor_count: records.iter().filter(|r| r.status.is_poor()).count(),
        }
    }
}
