//! Thin wrapper: read a run config, execute the pipeline, write the
//! distribution table.
//!
//! Usage: build_distribution [run_config.json]

use anyhow::Result;
use sandlance_dist::config::RunConfig;
use sandlance_dist::pipeline;
use std::env;
use std::path::PathBuf;

fn main() -> Result<()> {
    let config_path: PathBuf = env::args()
        .nth(1)
        .unwrap_or_else(|| "run_config.json".to_string())
        .into();

    let config = RunConfig::load(&config_path)?;
    let df = pipeline::run_and_write(&config)?;

    let proportions = df.column("proportion")?.f64()?;
    let sum: f64 = proportions.into_iter().flatten().sum();
    println!("Done. {} boxes, proportion sum = {:.12}", df.height(), sum);
    Ok(())
}
