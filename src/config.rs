use std::env;
use std::time::Duration;

use position_sync::SyncConfig;
use realtime::Scope;
use route_spacing::SpacingThresholds;
use tracing::warn;

/// Fleet service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Route filter for the sync manager. All routes when unset.
    pub scope: Scope,
    pub thresholds: SpacingThresholds,
    pub sync: SyncConfig,
    /// Minimum time between spacing evaluations.
    pub evaluation_throttle: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scope: Scope::all(),
            thresholds: SpacingThresholds::default(),
            sync: SyncConfig::default(),
            evaluation_throttle: Duration::from_millis(1_500),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Missing or
    /// unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let env_f64 = |key: &str, default: f64| {
            lookup(key).and_then(|value| value.trim().parse::<f64>().ok()).unwrap_or(default)
        };
        // zero durations are as unusable as unparsable ones
        let env_u64 = |key: &str, default: u64| {
            lookup(key)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(default)
        };

        let scope = lookup("FLEET_ROUTE_ID")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map_or_else(Scope::all, Scope::route);

        let base = defaults.thresholds;
        let thresholds = SpacingThresholds {
            critical_km: env_f64("SPACING_CRITICAL_KM", base.critical_km),
            too_close_km: env_f64("SPACING_TOO_CLOSE_KM", base.too_close_km),
            optimal_min_km: env_f64("SPACING_OPTIMAL_MIN_KM", base.optimal_min_km),
            optimal_max_km: env_f64("SPACING_OPTIMAL_MAX_KM", base.optimal_max_km),
            too_far_km: env_f64("SPACING_TOO_FAR_KM", base.too_far_km),
        };
        let thresholds = match thresholds.validate() {
            Ok(()) => thresholds,
            Err(err) => {
                warn!(error = %err, "invalid spacing thresholds, using defaults");
                base
            }
        };

        let sync = SyncConfig {
            reconcile_interval: Duration::from_secs(env_u64("RECONCILE_INTERVAL_SECS", 30)),
            reconnect_base: Duration::from_millis(env_u64("RECONNECT_BASE_MS", 1_000)),
            reconnect_max: Duration::from_millis(env_u64("RECONNECT_MAX_MS", 30_000)),
        };
        let evaluation_throttle = Duration::from_millis(env_u64("EVALUATION_THROTTLE_MS", 1_500));

        Self { scope, thresholds, sync, evaluation_throttle }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.sync.reconcile_interval, Duration::from_secs(30));
    }

    #[test]
    fn overrides() {
        let config = Config::from_lookup(lookup(&[
            ("FLEET_ROUTE_ID", " route-7 "),
            ("SPACING_TOO_FAR_KM", "4.5"),
            ("EVALUATION_THROTTLE_MS", "250"),
            ("RECONNECT_MAX_MS", "60000"),
        ]));
        assert_eq!(config.scope, Scope::route("route-7"));
        assert_eq!(config.thresholds.too_far_km, 4.5);
        assert_eq!(config.evaluation_throttle, Duration::from_millis(250));
        assert_eq!(config.sync.reconnect_max, Duration::from_secs(60));
    }

    #[test]
    fn unparsable_value_uses_default() {
        let config = Config::from_lookup(lookup(&[
            ("SPACING_CRITICAL_KM", "close"),
            ("RECONCILE_INTERVAL_SECS", "-1"),
            ("FLEET_ROUTE_ID", ""),
        ]));
        assert_eq!(config.thresholds.critical_km, 0.3);
        assert_eq!(config.sync.reconcile_interval, Duration::from_secs(30));
        assert_eq!(config.scope, Scope::all());
    }

    #[test]
    fn zero_durations_use_default() {
        let config = Config::from_lookup(lookup(&[
            ("RECONCILE_INTERVAL_SECS", "0"),
            ("RECONNECT_BASE_MS", "0"),
            ("EVALUATION_THROTTLE_MS", " 0 "),
        ]));
        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(config.evaluation_throttle, Duration::from_millis(1_500));
    }

    #[test]
    fn inconsistent_thresholds_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("SPACING_CRITICAL_KM", "1.0"),
            ("SPACING_TOO_FAR_KM", "4.0"),
        ]));
        assert_eq!(config.thresholds, SpacingThresholds::default());
    }
}
