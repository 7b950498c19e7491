use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result, bail};
use geo::Point;
use serde::Deserialize;

use crate::cleaner::CleanerConfig;
use crate::displacement::DisplacementConfig;
use crate::matcher::MatcherConfig;
use crate::spatial_index::IndexConfig;

/// Reference position of the airport
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AirportConfig {
    pub lat: f64,
    pub lon: f64,
}

impl AirportConfig {
    pub fn position(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

/// Configuration for reading aircraft traces
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Half-width of the box around the airport in which fixes are kept (degrees)
    pub airport_box_deg: f64,
    /// A gap longer than this starts a new trace (seconds)
    pub split_gap_s: f64,
    /// Traces with fewer fixes are dropped
    pub min_points: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            airport_box_deg: 0.1,
            split_gap_s: 1800.0,
            min_points: 10,
        }
    }
}

/// Everything the matcher can be tuned with.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    /// Airport reference point, the graph's centre when absent
    pub airport: Option<AirportConfig>,
    pub index: IndexConfig,
    pub cleaner: CleanerConfig,
    pub matcher: MatcherConfig,
    pub displacement: DisplacementConfig,
    pub loader: LoaderConfig,
    /// Number of worker threads, available parallelism when absent
    pub workers: Option<usize>,
}

impl SnapConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open config {}", path.display()))?;
        let config: SnapConfig = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.index.grid_size == 0 {
            bail!("index.grid_size must be positive");
        }
        if !(0.0..=1.0).contains(&self.matcher.harsh_fraction) || !(0.0..=1.0).contains(&self.matcher.relaxed_fraction)
        {
            bail!("match fractions must lie in 0..=1");
        }
        if self.matcher.snap_distance_m <= 0.0 {
            bail!("matcher.snap_distance_m must be positive");
        }
        if self.index.margin_m < self.matcher.snap_distance_m {
            bail!(
                "index.margin_m ({}) must be at least matcher.snap_distance_m ({})",
                self.index.margin_m,
                self.matcher.snap_distance_m
            );
        }
        if self.displacement.step_m <= 0.0 {
            bail!("displacement.step_m must be positive");
        }
        if self.workers == Some(0) {
            bail!("workers must be at least 1");
        }
        Ok(())
    }
}
