//! Aggregation policy knobs.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Post-filters applied when finalizing the document.
///
/// Stored as a plain JSON object on disk; every field is optional:
/// ```json
/// {
///   "station_monthly_limit": 50,
///   "top_routes_limit": 100,
///   "min_station_departures": 10
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregationConfig {
    /// Number of highest-activity stations that keep a per-month trend.
    pub station_monthly_limit: usize,
    /// Number of routes kept in `top_routes`.
    pub top_routes_limit: usize,
    /// Stations with fewer departures are left out of the station table.
    pub min_station_departures: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            station_monthly_limit: 50,
            top_routes_limit: 100,
            min_station_departures: 10,
        }
    }
}

impl AggregationConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{path}'"))?;
        serde_json::from_str(&content).with_context(|| format!("invalid config file '{path}'"))
    }

    /// Replaces any field for which an override was given.
    pub fn with_overrides(
        mut self,
        station_monthly_limit: Option<usize>,
        top_routes_limit: Option<usize>,
        min_station_departures: Option<u64>,
    ) -> Self {
        if let Some(limit) = station_monthly_limit {
            self.station_monthly_limit = limit;
        }
        if let Some(limit) = top_routes_limit {
            self.top_routes_limit = limit;
        }
        if let Some(min) = min_station_departures {
            self.min_station_departures = min;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AggregationConfig = serde_json::from_str(r#"{"top_routes_limit": 5}"#).unwrap();
        assert_eq!(config.top_routes_limit, 5);
        assert_eq!(config.station_monthly_limit, 50);
        assert_eq!(config.min_station_departures, 10);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<AggregationConfig, _> = serde_json::from_str(r#"{"top_routes": 5}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_only_replace_given_fields() {
        let config = AggregationConfig::default().with_overrides(None, Some(3), Some(1));
        assert_eq!(config.station_monthly_limit, 50);
        assert_eq!(config.top_routes_limit, 3);
        assert_eq!(config.min_station_departures, 1);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let path = format!("{}/bikeshare_digest_missing_config.json", std::env::temp_dir().display());
        let _ = std::fs::remove_file(&path);
        assert!(AggregationConfig::load(&path).is_err());
    }
}
