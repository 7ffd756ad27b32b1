//! Pipeline orchestration
//!
//! Runs the five stages in order over the configured inputs and returns
//! (or writes) the final distribution table. Strictly sequential: each
//! stage consumes the previous stage's output and nothing is mutated
//! after hand-off.

use crate::config::RunConfig;
use crate::{assembly, data, geometry, predators, ratios, synthesis};
use anyhow::{anyhow, Context, Result};
use polars::prelude::DataFrame;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;

/// Run the full pipeline and return the final distribution table.
pub fn run(config: &RunConfig) -> Result<DataFrame> {
    println!("Loading diet observations: {:?}", config.diet_csv);
    let diet = data::load_diet(&config.diet_csv)?;

    println!("Loading box geometry: {:?}", config.geometry_file);
    let geom = geometry::BoxGeometry::load(&config.geometry_file)?;
    println!("  Boxes: {}", geom.boxes.len());

    // Stage 1
    let selected = predators::select_predators(&diet, &config.prey_name_patterns)?;
    println!("Selected predators: {:?}", selected);

    // Stage 2
    let observations =
        assembly::assemble_observations(&diet, &selected, &config.prey_name_patterns)?;

    // Stage 3
    let attributed = geometry::attribute_observations(&geom, &observations);

    // Stage 4
    let ratio_map = ratios::mean_prey_ratios(&attributed);
    println!("  Mean ratios for {} (species, box) groups", ratio_map.len());

    // Stage 5
    let mut biomass_tables: BTreeMap<String, FxHashMap<i64, f64>> = BTreeMap::new();
    for species in &selected {
        let path = config.biomass_csvs.get(species).ok_or_else(|| {
            anyhow!("no biomass table configured for predator '{}'", species)
        })?;
        let table = data::load_biomass_table(path, species)
            .with_context(|| format!("Failed to load biomass table for '{}'", species))?;
        biomass_tables.insert(species.clone(), table);
    }

    let mut estimates = synthesis::sum_species_contributions(&geom, &ratio_map, &biomass_tables);
    let void_boxes: FxHashSet<i64> = config.data_void_boxes.iter().copied().collect();
    synthesis::extrapolate_void_boxes(&mut estimates, &void_boxes);
    let proportions = synthesis::normalize_proportions(&estimates)?;

    synthesis::build_distribution(&estimates, &proportions)
}

/// Run the pipeline and persist the result to the configured output path.
pub fn run_and_write(config: &RunConfig) -> Result<DataFrame> {
    let mut df = run(config)?;
    data::write_distribution(&mut df, &config.output_csv)?;
    Ok(df)
}
