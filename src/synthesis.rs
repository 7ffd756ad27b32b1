//! Stage 5: biomass synthesis, void-region extrapolation, normalization
//!
//! Per species: join per-box mean ratios to that species' estimated
//! biomass (absent combinations contribute zero), multiply, and sum
//! across species into one estimate per box. Boxes in the configured
//! data-void region are overwritten with a depth-stratified estimate
//! borrowed from the surveyed region. The result is normalized to a
//! proportion vector summing to exactly 1, with a floor for
//! zero-proportion habitable boxes paid for by the maximum box.

use crate::config::{DEPTH_BIN_EDGES_M, PROPORTION_SUM_TOLERANCE};
use crate::error::PipelineError;
use crate::geometry::BoxGeometry;
use anyhow::{ensure, Result};
use polars::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;

/// Synthesized sand lance biomass for one box, with the box attributes
/// the later sub-steps need.
#[derive(Debug, Clone)]
pub struct BoxEstimate {
    pub box_id: i64,
    pub botz: f64,
    pub boundary: bool,
    pub area: f64,
    pub estimate: f64,
}

impl BoxEstimate {
    /// A wet, interior cell: plausible habitat that participates in the
    /// floor adjustment.
    fn eligible(&self) -> bool {
        !self.boundary && self.botz < 0.0
    }
}

/// Sub-steps A-C: one generic join-and-default across all species.
///
/// Every geometry box gets an estimate row; a (species, box) pair absent
/// from either the ratio map or the biomass table contributes zero.
pub fn sum_species_contributions(
    geometry: &BoxGeometry,
    ratios: &FxHashMap<(String, i64), f64>,
    biomass_tables: &BTreeMap<String, FxHashMap<i64, f64>>,
) -> Vec<BoxEstimate> {
    geometry
        .boxes
        .iter()
        .map(|b| {
            // Boundary boxes are excluded from biomass accounting: even
            // when an observation lands in one and the external biomass
            // table covers it, the box contributes nothing.
            let estimate: f64 = if b.boundary {
                0.0
            } else {
                biomass_tables
                    .iter()
                    .map(|(species, biomass)| {
                        let ratio = ratios
                            .get(&(species.clone(), b.id))
                            .copied()
                            .unwrap_or(0.0);
                        let mass = biomass.get(&b.id).copied().unwrap_or(0.0);
                        ratio * mass
                    })
                    .sum()
            };
            BoxEstimate {
                box_id: b.id,
                botz: b.botz,
                boundary: b.boundary,
                area: b.area,
                estimate,
            }
        })
        .collect()
}

/// Depth bin index for a positive-down depth. Depths shallower than the
/// first edge clamp into the first bin, deeper than the last edge into
/// the last.
fn depth_bin(depth: f64) -> usize {
    let n_bins = DEPTH_BIN_EDGES_M.len() - 1;
    for i in 0..n_bins {
        if depth < DEPTH_BIN_EDGES_M[i + 1] {
            return i;
        }
    }
    n_bins - 1
}

/// Sub-step D: overwrite each non-boundary void box's estimate with the
/// surveyed region's mean density (mass per unit area) at the same depth
/// bin, times the void box's own area. A bin with no surveyed analog
/// borrows the nearest deeper bin's density.
pub fn extrapolate_void_boxes(estimates: &mut [BoxEstimate], void_boxes: &FxHashSet<i64>) {
    let n_bins = DEPTH_BIN_EDGES_M.len() - 1;
    let mut sums = vec![(0.0f64, 0u64); n_bins];

    for b in estimates.iter() {
        if b.boundary || void_boxes.contains(&b.box_id) || b.botz >= 0.0 || b.area <= 0.0 {
            continue;
        }
        let bin = depth_bin(-b.botz);
        sums[bin].0 += b.estimate / b.area;
        sums[bin].1 += 1;
    }

    let densities: Vec<Option<f64>> = sums
        .iter()
        .map(|(sum, n)| (*n > 0).then(|| *sum / *n as f64))
        .collect();
    let density_at = |bin: usize| -> f64 {
        densities[bin..]
            .iter()
            .find_map(|d| *d)
            .unwrap_or(0.0)
    };

    let mut filled = 0usize;
    for b in estimates.iter_mut() {
        if !void_boxes.contains(&b.box_id) || b.boundary {
            continue;
        }
        b.estimate = density_at(depth_bin(-b.botz)) * b.area;
        filled += 1;
    }
    if filled > 0 {
        println!("  Extrapolated {} data-void boxes from depth-bin densities", filled);
    }
}

/// Sub-step F: normalize estimates into proportions summing to 1, then
/// floor every eligible zero-proportion box at the minimum positive
/// eligible proportion and subtract the granted mass from the single
/// maximum box (ties broken by lowest box id).
///
/// Boundary boxes hold proportion 0 and are untouched, whatever their
/// incoming estimate says.
pub fn normalize_proportions(estimates: &[BoxEstimate]) -> Result<Vec<f64>> {
    // Boundary estimates are masked to zero here as well as at synthesis
    // time, so no caller can hand mass to an edge box.
    let masked = |b: &BoxEstimate| if b.boundary { 0.0 } else { b.estimate };

    let total: f64 = estimates.iter().map(masked).sum();
    if !(total > 0.0) {
        return Err(PipelineError::DegenerateDenominator.into());
    }

    let mut proportions: Vec<f64> = estimates.iter().map(|b| masked(b) / total).collect();

    let min_prop = estimates
        .iter()
        .zip(&proportions)
        .filter(|(b, p)| b.eligible() && **p > 0.0)
        .map(|(_, p)| *p)
        .fold(f64::INFINITY, f64::min);

    if min_prop.is_finite() {
        // Lowest box id wins a max tie; estimates are in id order.
        let max_idx = proportions
            .iter()
            .enumerate()
            .fold(0usize, |best, (i, p)| if *p > proportions[best] { i } else { best });

        let mut floored = 0u64;
        for (b, p) in estimates.iter().zip(proportions.iter_mut()) {
            if b.eligible() && *p == 0.0 {
                *p = min_prop;
                floored += 1;
            }
        }
        proportions[max_idx] -= floored as f64 * min_prop;

        // The floor is funded by the maximum box alone; if the granted
        // mass reaches it, the maximum would end at zero or negative.
        ensure!(
            floored == 0 || proportions[max_idx] > 0.0,
            "zero-floor mass ({} boxes x {:.3e}) exhausted the maximum-proportion box",
            floored,
            min_prop
        );
    }

    let sum: f64 = proportions.iter().sum();
    ensure!(
        (sum - 1.0).abs() <= PROPORTION_SUM_TOLERANCE,
        "proportions sum to {} after redistribution",
        sum
    );
    Ok(proportions)
}

/// Assemble the final distribution table.
pub fn build_distribution(estimates: &[BoxEstimate], proportions: &[f64]) -> Result<DataFrame> {
    let box_ids: Vec<i64> = estimates.iter().map(|b| b.box_id).collect();
    let botz: Vec<f64> = estimates.iter().map(|b| b.botz).collect();
    let boundary: Vec<i32> = estimates.iter().map(|b| b.boundary as i32).collect();

    let df = df!(
        "box_id" => box_ids,
        "botz" => botz,
        "boundary" => boundary,
        "proportion" => proportions.to_vec(),
    )?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn wet_box(box_id: i64, botz: f64, area: f64, estimate: f64) -> BoxEstimate {
        BoxEstimate {
            box_id,
            botz,
            boundary: false,
            area,
            estimate,
        }
    }

    #[test]
    fn test_depth_bin_edges_and_clamps() {
        assert_eq!(depth_bin(0.5), 0); // shallower than first edge
        assert_eq!(depth_bin(1.0), 0);
        assert_eq!(depth_bin(29.9), 0);
        assert_eq!(depth_bin(30.0), 1);
        assert_eq!(depth_bin(150.0), 2);
        assert_eq!(depth_bin(3999.0), 5);
        assert_eq!(depth_bin(8000.0), 5); // deeper than last edge
    }

    #[test]
    fn test_zero_floor_redistribution() {
        // Raw biomass [0, 2, 8] over three habitable boxes:
        // pre-floor [0, 0.2, 0.8]; min_prop 0.2, k = 1;
        // post [0.2, 0.2, 0.6].
        let estimates = vec![
            wet_box(0, -50.0, 1.0, 0.0),
            wet_box(1, -50.0, 1.0, 2.0),
            wet_box(2, -50.0, 1.0, 8.0),
        ];
        let p = normalize_proportions(&estimates).unwrap();
        assert_relative_eq!(p[0], 0.2);
        assert_relative_eq!(p[1], 0.2);
        assert_relative_eq!(p[2], 0.6);
        assert_relative_eq!(p.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_no_eligible_box_left_at_zero() {
        let estimates = vec![
            wet_box(0, -10.0, 1.0, 0.0),
            wet_box(1, -20.0, 1.0, 0.0),
            wet_box(2, -30.0, 1.0, 1.0),
            wet_box(3, -40.0, 1.0, 3.0),
        ];
        let p = normalize_proportions(&estimates).unwrap();
        for (b, prop) in estimates.iter().zip(&p) {
            if b.eligible() {
                assert!(*prop > 0.0, "box {} left at zero", b.box_id);
            }
        }
        assert_relative_eq!(p.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_boundary_boxes_stay_at_zero() {
        let mut boundary = wet_box(0, -100.0, 1.0, 0.0);
        boundary.boundary = true;
        let estimates = vec![
            boundary,
            wet_box(1, -50.0, 1.0, 4.0),
            wet_box(2, -50.0, 1.0, 6.0),
        ];
        let p = normalize_proportions(&estimates).unwrap();
        assert_eq!(p[0], 0.0);
        assert_relative_eq!(p.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_boundary_box_contributes_no_biomass() {
        use crate::geometry::{BoxGeometry, DomainBox};
        use crate::projection::Projection;
        use geo::{LineString, Polygon};

        let square = |x0: f64| {
            Polygon::new(
                LineString::from(vec![
                    (x0, 0.0),
                    (x0 + 1.0, 0.0),
                    (x0 + 1.0, 1.0),
                    (x0, 1.0),
                ]),
                vec![],
            )
        };
        let geom = BoxGeometry {
            boxes: vec![
                DomainBox {
                    id: 0,
                    polygon: square(0.0),
                    area: 1.0e6,
                    botz: -80.0,
                    boundary: false,
                },
                DomainBox {
                    id: 1,
                    polygon: square(1.0),
                    area: 1.0e6,
                    botz: -90.0,
                    boundary: true,
                },
            ],
            projection: Projection::LonLat,
        };

        // Both boxes have a ratio AND biomass; only the interior box may
        // receive any of it.
        let mut ratios = FxHashMap::default();
        ratios.insert(("Pacific cod".to_string(), 0), 0.1);
        ratios.insert(("Pacific cod".to_string(), 1), 0.1);
        let mut biomass = FxHashMap::default();
        biomass.insert(0, 100.0);
        biomass.insert(1, 100.0);
        let tables = BTreeMap::from([("Pacific cod".to_string(), biomass)]);

        let estimates = sum_species_contributions(&geom, &ratios, &tables);
        assert_relative_eq!(estimates[0].estimate, 10.0);
        assert_eq!(estimates[1].estimate, 0.0);
    }

    #[test]
    fn test_boundary_estimate_masked_in_normalization() {
        // A boundary box handed a nonzero estimate still ends at
        // proportion 0, untouched by the floor adjustment.
        let mut edge = wet_box(1, -90.0, 1.0, 5.0);
        edge.boundary = true;
        let estimates = vec![wet_box(0, -80.0, 1.0, 5.0), edge];
        let p = normalize_proportions(&estimates).unwrap();
        assert_relative_eq!(p[0], 1.0);
        assert_eq!(p[1], 0.0);
        assert_relative_eq!(p.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_only_boundary_mass_is_degenerate() {
        let mut edge = wet_box(0, -90.0, 1.0, 5.0);
        edge.boundary = true;
        let estimates = vec![edge, wet_box(1, -50.0, 1.0, 0.0)];
        assert!(normalize_proportions(&estimates).is_err());
    }

    #[test]
    fn test_floor_exhausting_the_maximum_is_fatal() {
        // Three zero boxes each granted 0.5 would need 1.5 from a
        // maximum of 0.5: the redistribution cannot be honored.
        let estimates = vec![
            wet_box(0, -50.0, 1.0, 1.0),
            wet_box(1, -50.0, 1.0, 1.0),
            wet_box(2, -50.0, 1.0, 0.0),
            wet_box(3, -50.0, 1.0, 0.0),
            wet_box(4, -50.0, 1.0, 0.0),
        ];
        let err = normalize_proportions(&estimates).unwrap_err();
        assert!(err.to_string().contains("exhausted the maximum"));
    }

    #[test]
    fn test_degenerate_denominator_is_fatal() {
        let estimates = vec![wet_box(0, -50.0, 1.0, 0.0), wet_box(1, -60.0, 1.0, 0.0)];
        let err = normalize_proportions(&estimates).unwrap_err();
        assert!(err.to_string().contains("normalization is undefined"));
    }

    #[test]
    fn test_max_tie_breaks_to_lowest_box_id() {
        // Boxes 1 and 2 tie for the maximum; box 1 must absorb the floor.
        let estimates = vec![
            wet_box(0, -50.0, 1.0, 0.0),
            wet_box(1, -50.0, 1.0, 5.0),
            wet_box(2, -50.0, 1.0, 5.0),
            wet_box(3, -50.0, 1.0, 2.0),
        ];
        let p = normalize_proportions(&estimates).unwrap();
        let min_prop = 2.0 / 12.0;
        assert_relative_eq!(p[0], min_prop);
        assert_relative_eq!(p[1], 5.0 / 12.0 - min_prop);
        assert_relative_eq!(p[2], 5.0 / 12.0);
        assert_relative_eq!(p.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_void_box_receives_density_times_area() {
        // Surveyed boxes in bin 3 (200-500 m) carry densities 2.0 and
        // 4.0; the void box at the same depth must get mean 3.0 x area.
        let mut estimates = vec![
            wet_box(0, -300.0, 10.0, 20.0),
            wet_box(1, -400.0, 10.0, 40.0),
            wet_box(2, -250.0, 7.0, 999.0), // void, estimate overwritten
        ];
        let void: FxHashSet<i64> = [2].into_iter().collect();
        extrapolate_void_boxes(&mut estimates, &void);
        assert_relative_eq!(estimates[2].estimate, 3.0 * 7.0);
        // Surveyed boxes untouched
        assert_relative_eq!(estimates[0].estimate, 20.0);
        assert_relative_eq!(estimates[1].estimate, 40.0);
    }

    #[test]
    fn test_shallow_void_bin_borrows_next_deeper() {
        // No surveyed box shallower than 30 m; the 10 m void box borrows
        // the 30-100 m bin's density.
        let mut estimates = vec![
            wet_box(0, -60.0, 10.0, 50.0), // bin 1, density 5.0
            wet_box(1, -10.0, 4.0, 0.0),   // void, bin 0
        ];
        let void: FxHashSet<i64> = [1].into_iter().collect();
        extrapolate_void_boxes(&mut estimates, &void);
        assert_relative_eq!(estimates[1].estimate, 5.0 * 4.0);
    }

    #[test]
    fn test_boundary_void_box_not_extrapolated() {
        let mut b = wet_box(1, -100.0, 5.0, 0.0);
        b.boundary = true;
        let mut estimates = vec![wet_box(0, -100.0, 10.0, 30.0), b];
        let void: FxHashSet<i64> = [1].into_iter().collect();
        extrapolate_void_boxes(&mut estimates, &void);
        assert_eq!(estimates[1].estimate, 0.0);
    }

    #[test]
    fn test_build_distribution_schema() {
        let estimates = vec![wet_box(0, -50.0, 1.0, 2.0), wet_box(1, -60.0, 1.0, 8.0)];
        let p = normalize_proportions(&estimates).unwrap();
        let df = build_distribution(&estimates, &p).unwrap();
        assert_eq!(
            df.get_column_names()
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>(),
            vec!["box_id", "botz", "boundary", "proportion"]
        );
        assert_eq!(df.height(), 2);
    }
}
