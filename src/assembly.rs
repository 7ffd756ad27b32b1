//! Stage 2: presence/absence observation assembly
//!
//! Builds the unified observation set: every confirmed sand-lance
//! occurrence in a selected predator's stomach, plus one synthesized
//! zero-weight record for each selected predator individual that had a
//! non-empty stomach with no sand lance in it. An empty stomach is
//! non-informative and contributes nothing.
//!
//! Rows whose position or predator weight is missing are excluded here
//! rather than treated as pipeline faults. The output satisfies the
//! triple-uniqueness invariant: one row per
//! (haul, predator taxon, specimen).

use anyhow::Result;
use polars::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

/// One predator-stomach sample. Immutable once assembled.
#[derive(Debug, Clone)]
pub struct Observation {
    pub haul_id: String,
    pub pred_taxon: i64,
    pub specimen: i64,
    pub species: String,
    /// Predator body weight, g.
    pub pred_weight: f64,
    /// Sand lance weight in the stomach, g; 0 for synthesized absences.
    pub prey_weight: f64,
    /// Total stomach content weight, g.
    pub stomach_weight: f64,
    pub lon: f64,
    pub lat: f64,
    /// Bottom depth at the haul, m, positive down.
    pub bottom_depth: f64,
    pub year: i64,
}

/// Case-insensitive substring match of a prey name against the
/// configured sand-lance patterns (pre-lowercased).
pub fn matches_prey(prey_name: &str, lowered_patterns: &[String]) -> bool {
    let lowered = prey_name.to_lowercase();
    lowered_patterns.iter().any(|p| lowered.contains(p.as_str()))
}

/// Lowercase the configured prey patterns once.
pub fn lower_patterns(patterns: &[String]) -> Vec<String> {
    patterns.iter().map(|p| p.to_lowercase()).collect()
}

struct DietColumns<'a> {
    haul: &'a StringChunked,
    taxon: &'a Int64Chunked,
    specn: &'a Int64Chunked,
    pred_name: &'a StringChunked,
    pred_wt: &'a Float64Chunked,
    prey_name: &'a StringChunked,
    prey_wt: &'a Float64Chunked,
    stomach_wt: &'a Float64Chunked,
    lon: &'a Float64Chunked,
    lat: &'a Float64Chunked,
    depth: &'a Float64Chunked,
    year: &'a Int64Chunked,
}

impl<'a> DietColumns<'a> {
    fn from_frame(df: &'a DataFrame) -> Result<Self> {
        Ok(Self {
            haul: df.column("HAULJOIN")?.str()?,
            taxon: df.column("PRED_NODC")?.i64()?,
            specn: df.column("PRED_SPECN")?.i64()?,
            pred_name: df.column("PRED_NAME")?.str()?,
            pred_wt: df.column("PRED_WT")?.f64()?,
            prey_name: df.column("PREY_NAME")?.str()?,
            prey_wt: df.column("PREY_WT")?.f64()?,
            stomach_wt: df.column("STOMACH_WT")?.f64()?,
            lon: df.column("RLONG")?.f64()?,
            lat: df.column("RLAT")?.f64()?,
            depth: df.column("BOTTOM_DEPTH")?.f64()?,
            year: df.column("YEAR")?.i64()?,
        })
    }

    /// Identity and usable measurements for one row, or None if the row
    /// cannot be used (missing identity, position or predator weight).
    fn usable_row(&self, idx: usize) -> Option<(String, i64, i64, String, f64, f64, f64)> {
        let haul = self.haul.get(idx)?.to_string();
        let taxon = self.taxon.get(idx)?;
        let specn = self.specn.get(idx)?;
        let species = self.pred_name.get(idx)?.to_string();
        let pred_wt = self.pred_wt.get(idx).filter(|w| *w > 0.0)?;
        let lon = self.lon.get(idx)?;
        let lat = self.lat.get(idx)?;
        Some((haul, taxon, specn, species, pred_wt, lon, lat))
    }
}

/// Assemble the unified observation set from the full diet table.
pub fn assemble_observations(
    diet: &DataFrame,
    selected_species: &[String],
    prey_patterns: &[String],
) -> Result<Vec<Observation>> {
    let cols = DietColumns::from_frame(diet)?;
    let patterns = lower_patterns(prey_patterns);
    let selected: FxHashSet<&str> = selected_species.iter().map(|s| s.as_str()).collect();

    let mut observations = Vec::new();
    let mut seen: FxHashSet<(String, i64, i64)> = FxHashSet::default();

    // Positive records first: the triple key they claim blocks any
    // synthesized zero for the same individual.
    for idx in 0..diet.height() {
        let Some(prey) = cols.prey_name.get(idx) else { continue };
        if !matches_prey(prey, &patterns) {
            continue;
        }
        let Some((haul, taxon, specn, species, pred_wt, lon, lat)) = cols.usable_row(idx) else {
            continue;
        };
        if !selected.contains(species.as_str()) {
            continue;
        }
        let Some(prey_wt) = cols.prey_wt.get(idx) else { continue };

        if !seen.insert((haul.clone(), taxon, specn)) {
            continue;
        }
        observations.push(Observation {
            haul_id: haul,
            pred_taxon: taxon,
            specimen: specn,
            species,
            pred_weight: pred_wt,
            prey_weight: prey_wt,
            stomach_weight: cols.stomach_wt.get(idx).unwrap_or(prey_wt),
            lon,
            lat,
            bottom_depth: cols.depth.get(idx).unwrap_or(f64::NAN),
            year: cols.year.get(idx).unwrap_or(0),
        });
    }
    let n_positive = observations.len();

    // Synthesized zeros: selected predator, other prey, non-empty stomach.
    // A predator that ate several other prey items appears once.
    for idx in 0..diet.height() {
        let Some(prey) = cols.prey_name.get(idx) else { continue };
        if matches_prey(prey, &patterns) {
            continue;
        }
        let Some((haul, taxon, specn, species, pred_wt, lon, lat)) = cols.usable_row(idx) else {
            continue;
        };
        if !selected.contains(species.as_str()) {
            continue;
        }
        let Some(stomach_wt) = cols.stomach_wt.get(idx).filter(|w| *w > 0.0) else {
            continue;
        };

        let key = (haul.clone(), taxon, specn);
        if !seen.insert(key) {
            continue;
        }
        observations.push(Observation {
            haul_id: haul,
            pred_taxon: taxon,
            specimen: specn,
            species,
            pred_weight: pred_wt,
            prey_weight: 0.0,
            stomach_weight: stomach_wt,
            lon,
            lat,
            bottom_depth: cols.depth.get(idx).unwrap_or(f64::NAN),
            year: cols.year.get(idx).unwrap_or(0),
        });
    }

    println!(
        "  Assembled {} observations ({} positive, {} synthesized zeros)",
        observations.len(),
        n_positive,
        observations.len() - n_positive
    );
    Ok(observations)
}

/// Build a per-species occurrence count map over sand-lance-positive rows.
/// Shared with the selection stage.
pub fn count_positive_occurrences(
    diet: &DataFrame,
    prey_patterns: &[String],
) -> Result<FxHashMap<String, u64>> {
    let pred_name = diet.column("PRED_NAME")?.str()?;
    let prey_name = diet.column("PREY_NAME")?.str()?;
    let patterns = lower_patterns(prey_patterns);

    let mut counts: FxHashMap<String, u64> = FxHashMap::default();
    for idx in 0..diet.height() {
        let (Some(pred), Some(prey)) = (pred_name.get(idx), prey_name.get(idx)) else {
            continue;
        };
        if matches_prey(prey, &patterns) {
            *counts.entry(pred.to_string()).or_insert(0) += 1;
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Vec<String> {
        vec!["sand lance".to_string(), "ammodyt".to_string()]
    }

    fn diet_fixture() -> DataFrame {
        // h1/cod/1 ate sand lance AND shrimp: one positive row only.
        // h1/cod/2 ate shrimp and crab: one zero row.
        // h2/cod/3 has an empty stomach: excluded.
        // h2/pollock/1 positive but missing position: excluded.
        // h2/sculpin/1 not a selected species: excluded.
        df!(
            "HAULJOIN" => ["h1", "h1", "h1", "h1", "h2", "h2", "h2"],
            "PRED_NODC" => [8791i64, 8791, 8791, 8791, 8791, 8831, 8600],
            "PRED_SPECN" => [1i64, 1, 2, 2, 3, 1, 1],
            "PRED_NAME" => [
                "Pacific cod", "Pacific cod", "Pacific cod", "Pacific cod",
                "Pacific cod", "Walleye pollock", "Sculpin",
            ],
            "PRED_WT" => [820.0f64, 820.0, 640.0, 640.0, 550.0, 300.0, 90.0],
            "PREY_NAME" => [
                "Ammodytidae", "Pandalidae", "Pandalidae", "Cancridae",
                "Empty", "Pacific sand lance", "Ammodytidae",
            ],
            "PREY_WT" => [14.0f64, 3.0, 2.0, 1.0, 0.0, 6.0, 2.0],
            "STOMACH_WT" => [17.0f64, 17.0, 3.0, 3.0, 0.0, 6.0, 2.0],
            "RLONG" => [
                Some(-152.0f64), Some(-152.0), Some(-152.1), Some(-152.1),
                Some(-153.0), None, Some(-150.0),
            ],
            "RLAT" => [
                Some(57.0f64), Some(57.0), Some(57.1), Some(57.1),
                Some(58.0), Some(58.2), Some(56.0),
            ],
            "BOTTOM_DEPTH" => [110.0f64, 110.0, 95.0, 95.0, 140.0, 130.0, 60.0],
            "YEAR" => [2013i64, 2013, 2013, 2013, 2015, 2015, 2015],
        )
        .unwrap()
    }

    #[test]
    fn test_triples_unique_after_assembly() {
        let diet = diet_fixture();
        let selected = vec!["Pacific cod".to_string(), "Walleye pollock".to_string()];
        let obs = assemble_observations(&diet, &selected, &patterns()).unwrap();

        let mut triples: Vec<_> = obs
            .iter()
            .map(|o| (o.haul_id.clone(), o.pred_taxon, o.specimen))
            .collect();
        triples.sort();
        let before = triples.len();
        triples.dedup();
        assert_eq!(before, triples.len(), "duplicate (haul, taxon, specimen) triple");
    }

    #[test]
    fn test_positive_eater_gets_no_zero_row() {
        let diet = diet_fixture();
        let selected = vec!["Pacific cod".to_string(), "Walleye pollock".to_string()];
        let obs = assemble_observations(&diet, &selected, &patterns()).unwrap();

        // h1/8791/1: positive only, despite the shrimp row.
        let rows: Vec<_> = obs
            .iter()
            .filter(|o| o.haul_id == "h1" && o.specimen == 1)
            .collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].prey_weight, 14.0);
    }

    #[test]
    fn test_multiple_other_prey_collapse_to_one_zero() {
        let diet = diet_fixture();
        let selected = vec!["Pacific cod".to_string()];
        let obs = assemble_observations(&diet, &selected, &patterns()).unwrap();

        let zeros: Vec<_> = obs
            .iter()
            .filter(|o| o.haul_id == "h1" && o.specimen == 2)
            .collect();
        assert_eq!(zeros.len(), 1);
        assert_eq!(zeros[0].prey_weight, 0.0);
        assert_eq!(zeros[0].stomach_weight, 3.0);
    }

    #[test]
    fn test_empty_stomach_and_missing_position_excluded() {
        let diet = diet_fixture();
        let selected = vec!["Pacific cod".to_string(), "Walleye pollock".to_string()];
        let obs = assemble_observations(&diet, &selected, &patterns()).unwrap();

        assert!(!obs.iter().any(|o| o.haul_id == "h2" && o.specimen == 3));
        assert!(!obs.iter().any(|o| o.species == "Walleye pollock"));
    }

    #[test]
    fn test_unselected_species_excluded() {
        let diet = diet_fixture();
        let obs =
            assemble_observations(&diet, &["Pacific cod".to_string()], &patterns()).unwrap();
        assert!(obs.iter().all(|o| o.species == "Pacific cod"));
    }

    #[test]
    fn test_count_positive_occurrences() {
        let diet = diet_fixture();
        let counts = count_positive_occurrences(&diet, &patterns()).unwrap();
        assert_eq!(counts.get("Pacific cod"), Some(&1));
        assert_eq!(counts.get("Walleye pollock"), Some(&1));
        assert_eq!(counts.get("Sculpin"), Some(&1));
    }
}
