//! Run configuration and fixed pipeline constants
//!
//! A run is described by a small JSON file: where the diet observations,
//! box geometry and per-predator biomass tables live, which prey-name
//! patterns count as sand lance, which boxes form the data-void region,
//! and where to write the final table.
//!
//! The empirical constants of the analysis (species cap, cumulative
//! occurrence target, depth-bin edges) are named constants rather than
//! config fields: they are properties of this dataset, not of a run.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Hard cap on the number of predator species carried into the analysis.
/// Frequency ranking of the Gulf of Alaska diet data yields exactly four
/// dominant sand-lance predators; the cap is fixed, not derived.
pub const MAX_PREDATOR_SPECIES: usize = 4;

/// Cumulative share of sand-lance-positive stomachs the selected species
/// must cover before selection stops (subject to the cap above).
pub const CUMULATIVE_OCCURRENCE_TARGET: f64 = 0.9;

/// Depth-bin edges (m, positive down) for the data-void extrapolation.
/// Depths shallower than the first edge fall into the first bin, deeper
/// than the last edge into the last bin.
pub const DEPTH_BIN_EDGES_M: [f64; 7] = [1.0, 30.0, 100.0, 200.0, 500.0, 1000.0, 4000.0];

/// Absolute tolerance on the sum-to-1 invariant of the final proportions.
pub const PROPORTION_SUM_TOLERANCE: f64 = 1e-9;

fn default_prey_patterns() -> Vec<String> {
    vec!["sand lance".to_string(), "ammodyt".to_string()]
}

/// One pipeline run: input locations, prey matching, void region, output.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Predator stomach-content observations (delimited text).
    pub diet_csv: PathBuf,

    /// Atlantis box geometry (.bgm-style polygon mesh).
    pub geometry_file: PathBuf,

    /// Predator species name -> per-box biomass table. Must cover every
    /// species the selection stage can return.
    pub biomass_csvs: BTreeMap<String, PathBuf>,

    /// Case-insensitive substrings identifying sand lance in PREY_NAME.
    #[serde(default = "default_prey_patterns")]
    pub prey_name_patterns: Vec<String>,

    /// Box ids lacking adequate survey coverage; their estimates are
    /// replaced by the depth-stratified extrapolation.
    #[serde(default)]
    pub data_void_boxes: Vec<i64>,

    /// Destination of the final distribution table.
    pub output_csv: PathBuf,
}

impl RunConfig {
    /// Load a run configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run config: {:?}", path))?;
        Self::from_json(&contents)
            .with_context(|| format!("Failed to parse run config: {:?}", path))
    }

    /// Parse a run configuration from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid run config JSON")
    }

    /// Whether a box belongs to the configured data-void region.
    pub fn is_void_box(&self, box_id: i64) -> bool {
        self.data_void_boxes.contains(&box_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "diet_csv": "data/diet.csv",
        "geometry_file": "data/goa.bgm",
        "biomass_csvs": {
            "Walleye pollock": "data/biomass_pollock.csv",
            "Pacific cod": "data/biomass_pcod.csv"
        },
        "data_void_boxes": [41, 42, 43],
        "output_csv": "out/distribution.csv"
    }"#;

    #[test]
    fn test_minimal_config_defaults() {
        let cfg = RunConfig::from_json(MINIMAL).unwrap();
        assert_eq!(cfg.prey_name_patterns, vec!["sand lance", "ammodyt"]);
        assert_eq!(cfg.biomass_csvs.len(), 2);
        assert!(cfg.is_void_box(42));
        assert!(!cfg.is_void_box(7));
    }

    #[test]
    fn test_rejects_missing_required_field() {
        assert!(RunConfig::from_json(r#"{"diet_csv": "x.csv"}"#).is_err());
    }
}
