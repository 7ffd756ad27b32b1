//! Input ingestion and output writing
//!
//! Loads the diet observation table and the per-predator biomass tables
//! with Polars, enforcing required columns up front (a missing column is
//! fatal and names the offending table) while letting unparsable numeric
//! fields become nulls that downstream extraction skips row-wise.

use crate::error::PipelineError;
use anyhow::{Context, Result};
use polars::prelude::*;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::path::Path;

/// Columns the diet observation table must provide.
pub const DIET_REQUIRED_COLS: &[&str] = &[
    "HAULJOIN",     // haul identifier
    "PRED_NODC",    // predator taxon code
    "PRED_SPECN",   // predator specimen number within haul
    "PRED_NAME",    // predator species name
    "PRED_WT",      // predator body weight, g
    "PREY_NAME",    // prey item name
    "PREY_WT",      // prey weight in stomach, g
    "STOMACH_WT",   // total stomach content weight, g
    "RLONG",        // longitude, degrees
    "RLAT",         // latitude, degrees
    "BOTTOM_DEPTH", // bottom depth at haul, m
    "YEAR",         // sampling year
];

/// Columns each biomass table must provide.
pub const BIOMASS_REQUIRED_COLS: &[&str] = &["box_id", "biomass"];

/// Load the diet observation CSV.
///
/// Unparsable cells are read as nulls (silent data-quality filtering;
/// the assembly stage drops rows whose required measurements are null).
pub fn load_diet(path: &Path) -> Result<DataFrame> {
    let df = read_csv(path)?;
    require_columns(&df, "diet table", DIET_REQUIRED_COLS)?;

    // Normalize dtypes so the extraction stages can rely on them.
    let df = df
        .lazy()
        .with_columns([
            col("HAULJOIN").cast(DataType::String),
            col("PRED_NODC").cast(DataType::Int64),
            col("PRED_SPECN").cast(DataType::Int64),
            col("PRED_NAME").cast(DataType::String),
            col("PRED_WT").cast(DataType::Float64),
            col("PREY_NAME").cast(DataType::String),
            col("PREY_WT").cast(DataType::Float64),
            col("STOMACH_WT").cast(DataType::Float64),
            col("RLONG").cast(DataType::Float64),
            col("RLAT").cast(DataType::Float64),
            col("BOTTOM_DEPTH").cast(DataType::Float64),
            col("YEAR").cast(DataType::Int64),
        ])
        .collect()
        .with_context(|| format!("Failed to normalize diet table dtypes: {:?}", path))?;

    println!("  Diet observations: {}", df.height());
    Ok(df)
}

/// Load one predator's per-box biomass table into a box_id -> biomass map.
pub fn load_biomass_table(path: &Path, species: &str) -> Result<FxHashMap<i64, f64>> {
    let df = read_csv(path)?;
    require_columns(&df, &format!("biomass table for {}", species), BIOMASS_REQUIRED_COLS)?;

    let df = df
        .lazy()
        .with_columns([
            col("box_id").cast(DataType::Int64),
            col("biomass").cast(DataType::Float64),
        ])
        .collect()
        .with_context(|| format!("Failed to normalize biomass table dtypes: {:?}", path))?;

    let box_ids = df.column("box_id")?.i64()?;
    let biomass = df.column("biomass")?.f64()?;

    let mut map = FxHashMap::default();
    for idx in 0..df.height() {
        if let (Some(id), Some(b)) = (box_ids.get(idx), biomass.get(idx)) {
            map.insert(id, b);
        }
    }
    Ok(map)
}

/// Persist the final distribution table.
pub fn write_distribution(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Failed to create output file: {:?}", path))?;
    CsvWriter::new(&mut file)
        .finish(df)
        .with_context(|| format!("Failed to write distribution table: {:?}", path))?;
    println!("Wrote distribution table: {:?} ({} boxes)", path, df.height());
    Ok(())
}

fn read_csv(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_ignore_errors(true)
        .try_into_reader_with_file_path(Some(path.into()))
        .with_context(|| format!("Failed to create CSV reader: {:?}", path))?
        .finish()
        .with_context(|| format!("Failed to load CSV: {:?}", path))
}

fn require_columns(df: &DataFrame, table: &str, required: &[&str]) -> Result<()> {
    let present: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    for &column in required {
        if !present.iter().any(|c| c == column) {
            return Err(PipelineError::SchemaViolation {
                table: table.to_string(),
                column: column.to_string(),
            }
            .into());
        }
    }
    Ok(())
}
