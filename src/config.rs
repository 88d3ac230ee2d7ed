//! Engine configuration.
//!
//! Every stage reads its parameters from one section of a TOML file. Missing sections and
//! keys fall back to the built-in defaults.
//!
//! ```toml
//! [plot_area]
//! min_contour_area = 2500.0
//!
//! [kmeans]
//! k = 8
//!
//! [timestamps]
//! timeframe = "15m"
//! ```

use crate::core::axis_x::Timeframe;
use crate::core::candle_palette::{HistogramParams, KMeansParams};
use crate::core::column_mask::MaskParams;
use crate::core::column_reader::ExtractionParams;
use crate::core::edge_scan::EdgeParams;
use crate::core::plot_area::PlotAreaParams;
use crate::error::{ChartError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name searched by [`EngineConfig::load_default`].
pub const CONFIG_FILE_NAME: &str = "chart-ohlc.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimestampConfig {
    /// Candle period used when the request names none
    pub timeframe: String,
}

impl Default for TimestampConfig {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::Hour1.label().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub edges: EdgeParams,
    pub plot_area: PlotAreaParams,
    pub kmeans: KMeansParams,
    pub histogram: HistogramParams,
    pub masks: MaskParams,
    pub extraction: ExtractionParams,
    pub timestamps: TimestampConfig,
}

impl EngineConfig {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations.
    ///
    /// Searches in order:
    /// 1. `./chart-ohlc.toml`
    /// 2. `<user config dir>/chart-ohlc/chart-ohlc.toml`
    ///
    /// Returns default config if no file found.
    pub fn load_default() -> Self {
        if let Ok(config) = Self::load(CONFIG_FILE_NAME) {
            return config;
        }

        if let Some(path) = Self::user_config_path() {
            if let Ok(config) = Self::load(&path) {
                return config;
            }
        }

        Self::default()
    }

    /// Save configuration to a file path.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ChartError::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chart-ohlc").join(CONFIG_FILE_NAME))
    }

    /// Reject values no stage can work with.
    pub fn validate(&self) -> Result<()> {
        self.timestamps.timeframe.parse::<Timeframe>()?;
        if self.kmeans.k == 0 {
            return Err(ChartError::Config("kmeans.k must be at least 1".to_string()));
        }
        if self.edges.low_threshold > self.edges.high_threshold {
            return Err(ChartError::Config(format!(
                "edges.low_threshold ({}) exceeds edges.high_threshold ({})",
                self.edges.low_threshold, self.edges.high_threshold
            )));
        }
        if self.plot_area.aspect_ratio_min > self.plot_area.aspect_ratio_max {
            return Err(ChartError::Config(
                "plot_area.aspect_ratio_min exceeds aspect_ratio_max".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [kmeans]
            k = 8

            [timestamps]
            timeframe = "15m"
            "#,
        )
        .unwrap();
        assert_eq!(config.kmeans.k, 8);
        assert_eq!(config.kmeans.max_iterations, 20);
        assert_eq!(config.histogram.bin_size, 16);
        assert_eq!(config.masks.color_tolerance, 60.0);
        assert_eq!(config.timestamps.timeframe, "15m");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_timeframe() {
        let mut config = EngineConfig::default();
        config.timestamps.timeframe = "2s".to_string();
        assert!(matches!(config.validate(), Err(ChartError::InvalidTimeframe(_))));

        let mut config = EngineConfig::default();
        config.kmeans.k = 0;
        assert!(matches!(config.validate(), Err(ChartError::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("chart-ohlc-test-{}.toml", std::process::id()));
        let mut config = EngineConfig::default();
        config.plot_area.min_contour_area = 2500.0;
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.plot_area.min_contour_area, 2500.0);
        assert_eq!(loaded.timestamps, config.timestamps);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let path = std::env::temp_dir().join(format!("chart-ohlc-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[kmeans\nk = ").unwrap();
        assert!(matches!(EngineConfig::load(&path), Err(ChartError::Config(_))));
        std::fs::remove_file(&path).ok();
    }
}
