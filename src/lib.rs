//! Sand lance spatial distribution estimator
//!
//! Derives a static per-box biomass distribution for Pacific sand lance
//! over the Gulf of Alaska Atlantis box geometry. Sand lance is rarely
//! caught directly, so its presence is inferred from the stomach
//! contents of its four dominant groundfish predators, scaled by those
//! predators' independently estimated spatial biomass.
//!
//! Five sequential stages:
//! - `predators`: frequency-ranked selection of the predator species
//! - `assembly`: presence/absence observation set with synthesized zeros
//! - `geometry`: point-in-polygon attribution of observations to boxes
//! - `ratios`: mean prey/predator weight ratio per (species, box)
//! - `synthesis`: biomass join, void-region extrapolation, normalization
//!
//! The output is a proportion vector over all boxes summing to 1, used
//! downstream as a prior for the species' spatial distribution.

pub mod assembly;
pub mod config;
pub mod data;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod predators;
pub mod projection;
pub mod ratios;
pub mod synthesis;

// Re-export commonly used types
pub use assembly::Observation;
pub use config::RunConfig;
pub use error::PipelineError;
pub use geometry::{AttributedObservation, BoxGeometry, DomainBox};
pub use projection::Projection;
pub use synthesis::BoxEstimate;
