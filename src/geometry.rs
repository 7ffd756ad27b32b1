//! Domain box geometry and spatial attribution
//!
//! Parses the `.bgm`-style polygon-mesh file describing the Atlantis
//! domain: a projection descriptor, a box count, and per box a vertex
//! list (planar meters), planar area, seafloor depth (`botz`, negative
//! below datum) and a boundary flag marking open-ocean edge boxes.
//!
//! Attribution is a strict filter: an observation point must fall inside
//! exactly one box polygon to be kept. Points outside the mesh, and
//! points on a shared edge claimed by two polygons, are dropped rather
//! than tie-broken.

use crate::assembly::Observation;
use crate::error::PipelineError;
use crate::projection::Projection;
use anyhow::{Context, Result};
use geo::{Contains, LineString, Point, Polygon};
use rustc_hash::FxHashMap;
use std::fs;
use std::path::Path;

/// One polygon cell of the spatial domain. Read-only after parse.
#[derive(Debug, Clone)]
pub struct DomainBox {
    pub id: i64,
    pub polygon: Polygon<f64>,
    /// Planar area, m^2.
    pub area: f64,
    /// Seafloor depth, m, negative below datum.
    pub botz: f64,
    /// Open-ocean edge box, excluded from biomass accounting.
    pub boundary: bool,
}

/// The full box mesh plus its native projection.
#[derive(Debug, Clone)]
pub struct BoxGeometry {
    pub boxes: Vec<DomainBox>,
    pub projection: Projection,
}

/// An observation reduced to what the aggregation stages need, annotated
/// with its containing box.
#[derive(Debug, Clone)]
pub struct AttributedObservation {
    pub species: String,
    pub box_id: i64,
    pub pred_weight: f64,
    pub prey_weight: f64,
}

#[derive(Default)]
struct BoxBuilder {
    verts: Vec<(f64, f64)>,
    area: Option<f64>,
    botz: Option<f64>,
    boundary: bool,
}

impl BoxGeometry {
    /// Load and parse a geometry file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read geometry file: {:?}", path))?;
        Self::parse(&text).with_context(|| format!("Failed to parse geometry file: {:?}", path))
    }

    /// Parse the `.bgm`-style text format.
    pub fn parse(text: &str) -> Result<Self> {
        let mut projection_line: Option<String> = None;
        let mut nbox: Option<usize> = None;
        let mut builders: FxHashMap<i64, BoxBuilder> = FxHashMap::default();

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, rest) = match line.split_once(char::is_whitespace) {
                Some(kv) => kv,
                None => continue,
            };
            let rest = rest.trim();

            if key == "projection" {
                projection_line = Some(rest.to_string());
                continue;
            }
            if key == "nbox" {
                nbox = Some(rest.parse().map_err(|_| {
                    PipelineError::MalformedGeometry(format!(
                        "line {}: invalid box count '{}'",
                        lineno + 1,
                        rest
                    ))
                })?);
                continue;
            }

            // Per-box attribute lines: box<i>.<attr> <values...>
            let Some((box_key, attr)) = key.split_once('.') else {
                continue;
            };
            let Some(id) = box_key.strip_prefix("box").and_then(|s| s.parse::<i64>().ok()) else {
                continue;
            };
            let builder = builders.entry(id).or_default();

            let bad_value = || {
                PipelineError::MalformedGeometry(format!(
                    "line {}: invalid value for {}: '{}'",
                    lineno + 1,
                    key,
                    rest
                ))
            };
            match attr {
                "vert" => {
                    let mut parts = rest.split_whitespace();
                    let x: f64 = parts
                        .next()
                        .and_then(|v| v.parse().ok())
                        .ok_or_else(bad_value)?;
                    let y: f64 = parts
                        .next()
                        .and_then(|v| v.parse().ok())
                        .ok_or_else(bad_value)?;
                    builder.verts.push((x, y));
                }
                "area" => builder.area = Some(rest.parse().map_err(|_| bad_value())?),
                "botz" => builder.botz = Some(rest.parse().map_err(|_| bad_value())?),
                "boundary" => builder.boundary = rest.parse::<i32>().map_err(|_| bad_value())? != 0,
                _ => {} // label, inside markers etc. are not needed
            }
        }

        let projection_line = projection_line
            .ok_or_else(|| PipelineError::MalformedGeometry("no projection line".into()))?;
        let projection = Projection::parse(&projection_line)?;
        let nbox =
            nbox.ok_or_else(|| PipelineError::MalformedGeometry("no nbox declaration".into()))?;

        let mut boxes = Vec::with_capacity(nbox);
        for id in 0..nbox as i64 {
            let builder = builders.remove(&id).ok_or_else(|| {
                PipelineError::MalformedGeometry(format!("box{} is declared but absent", id))
            })?;
            if builder.verts.len() < 3 {
                return Err(PipelineError::MalformedGeometry(format!(
                    "box{} has {} vertices (need at least 3)",
                    id,
                    builder.verts.len()
                ))
                .into());
            }
            let area = builder.area.ok_or_else(|| {
                PipelineError::MalformedGeometry(format!("box{} has no area", id))
            })?;
            let botz = builder.botz.ok_or_else(|| {
                PipelineError::MalformedGeometry(format!("box{} has no botz", id))
            })?;
            boxes.push(DomainBox {
                id,
                polygon: Polygon::new(LineString::from(builder.verts), vec![]),
                area,
                botz,
                boundary: builder.boundary,
            });
        }

        Ok(BoxGeometry { boxes, projection })
    }

    /// Box containing the planar point, if exactly one does.
    pub fn locate(&self, x: f64, y: f64) -> Option<i64> {
        let point = Point::new(x, y);
        let mut hit = None;
        for b in &self.boxes {
            if b.polygon.contains(&point) {
                if hit.is_some() {
                    return None; // ambiguous containment, drop
                }
                hit = Some(b.id);
            }
        }
        hit
    }
}

/// Stage 3: project each observation into the box plane and keep those
/// landing in exactly one box.
pub fn attribute_observations(
    geometry: &BoxGeometry,
    observations: &[Observation],
) -> Vec<AttributedObservation> {
    let mut attributed = Vec::with_capacity(observations.len());
    for obs in observations {
        let (x, y) = geometry.projection.forward(obs.lon, obs.lat);
        if let Some(box_id) = geometry.locate(x, y) {
            attributed.push(AttributedObservation {
                species: obs.species.clone(),
                box_id,
                pred_weight: obs.pred_weight,
                prey_weight: obs.prey_weight,
            });
        }
    }
    println!(
        "  Attributed {} of {} observations to a unique box",
        attributed.len(),
        observations.len()
    );
    attributed
}
