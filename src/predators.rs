//! Stage 1: frequency-ranked predator selection
//!
//! Ranks predator species by how often sand lance shows up in their
//! stomachs, then selects species in descending order until they cover
//! the cumulative occurrence target, truncated to the fixed four-species
//! cap. Ties in count break on species name so the selection is
//! deterministic run to run.

use crate::assembly::count_positive_occurrences;
use crate::config::{CUMULATIVE_OCCURRENCE_TARGET, MAX_PREDATOR_SPECIES};
use anyhow::Result;
use polars::prelude::*;

/// Select the predator species carried through the rest of the pipeline,
/// in descending occurrence order.
pub fn select_predators(diet: &DataFrame, prey_patterns: &[String]) -> Result<Vec<String>> {
    let counts = count_positive_occurrences(diet, prey_patterns)?;
    Ok(rank_and_truncate(counts.into_iter().collect()))
}

fn rank_and_truncate(mut counts: Vec<(String, u64)>) -> Vec<String> {
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    // Fewer species than the cap: every one is kept, even when the top
    // species alone covers the cumulative target.
    if counts.len() < MAX_PREDATOR_SPECIES {
        return counts.into_iter().map(|(species, _)| species).collect();
    }

    let total: u64 = counts.iter().map(|(_, n)| n).sum();
    let mut selected = Vec::new();
    let mut cumulative = 0u64;
    for (species, n) in counts {
        cumulative += n;
        selected.push(species);
        if cumulative as f64 / total as f64 >= CUMULATIVE_OCCURRENCE_TARGET {
            break;
        }
    }
    selected.truncate(MAX_PREDATOR_SPECIES);
    selected
}
