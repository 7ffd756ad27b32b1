//! Stage 4: per-box prey-biomass-per-predator-biomass ratios
//!
//! Groups attributed observations by (species, box) and takes the
//! arithmetic mean of prey weight / predator weight within each group.
//! The mean is unweighted across boxes: a box fed by one stomach counts
//! the same as a box fed by fifty. Combinations never observed are
//! simply absent; the synthesis stage treats absence as zero.

use crate::geometry::AttributedObservation;
use rustc_hash::FxHashMap;

/// Mean prey/predator weight ratio per (species, box).
pub fn mean_prey_ratios(
    observations: &[AttributedObservation],
) -> FxHashMap<(String, i64), f64> {
    let mut sums: FxHashMap<(String, i64), (f64, u64)> = FxHashMap::default();

    for obs in observations {
        if obs.pred_weight <= 0.0 {
            continue; // undefined ratio, ignore rather than propagate
        }
        let ratio = obs.prey_weight / obs.pred_weight;
        if !ratio.is_finite() {
            continue;
        }
        let entry = sums
            .entry((obs.species.clone(), obs.box_id))
            .or_insert((0.0, 0));
        entry.0 += ratio;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(key, (sum, n))| (key, sum / n as f64))
        .collect()
}
