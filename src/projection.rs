//! Geographic -> planar projection of observation positions
//!
//! The box geometry stores its vertices in the domain's native planar
//! reference and declares that reference with a proj4-style descriptor.
//! Observation positions arrive as lon/lat degrees and must be projected
//! forward into the same plane before point-in-polygon attribution.
//!
//! Only the families the Gulf of Alaska domain actually uses are
//! supported: `longlat` (identity) and ellipsoidal transverse Mercator
//! (`tmerc`, standard Snyder series). Forward direction only; box
//! vertices are never unprojected.

use crate::error::PipelineError;
use anyhow::Result;
use libm::{cos, sin, sqrt, tan};

/// WGS84 semi-major axis (m) and squared eccentricity.
const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// Parameters of an ellipsoidal transverse Mercator projection.
#[derive(Debug, Clone, PartialEq)]
pub struct TmercParams {
    pub lat_0: f64, // latitude of origin, degrees
    pub lon_0: f64, // central meridian, degrees
    pub k_0: f64,   // scale factor at the central meridian
    pub x_0: f64,   // false easting, m
    pub y_0: f64,   // false northing, m
    pub a: f64,     // semi-major axis, m
    pub e2: f64,    // squared first eccentricity
}

/// A forward map from geographic degrees to the domain plane.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Box coordinates are already geographic degrees.
    LonLat,
    /// Ellipsoidal transverse Mercator.
    TransverseMercator(TmercParams),
}

impl Projection {
    /// Parse a proj4-style descriptor such as
    /// `+proj=tmerc +lat_0=50 +lon_0=-154 +k=0.9912 +x_0=0 +y_0=0 +datum=WGS84`.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut proj = None;
        let mut lat_0 = 0.0;
        let mut lon_0 = 0.0;
        let mut k_0 = 1.0;
        let mut x_0 = 0.0;
        let mut y_0 = 0.0;
        let mut a = WGS84_A;
        let mut f = WGS84_F;

        for token in descriptor.split_whitespace() {
            let token = token.trim_start_matches('+');
            let (key, value) = match token.split_once('=') {
                Some(kv) => kv,
                None => continue, // bare flags like +no_defs
            };
            match key {
                "proj" => proj = Some(value.to_string()),
                "lat_0" => lat_0 = parse_num(key, value)?,
                "lon_0" => lon_0 = parse_num(key, value)?,
                "k" | "k_0" => k_0 = parse_num(key, value)?,
                "x_0" => x_0 = parse_num(key, value)?,
                "y_0" => y_0 = parse_num(key, value)?,
                "ellps" | "datum" => match value.to_ascii_uppercase().as_str() {
                    "WGS84" => {
                        a = WGS84_A;
                        f = WGS84_F;
                    }
                    "GRS80" => {
                        a = 6_378_137.0;
                        f = 1.0 / 298.257_222_101;
                    }
                    other => {
                        return Err(PipelineError::UnsupportedProjection(format!(
                            "{}={}",
                            key, other
                        ))
                        .into())
                    }
                },
                _ => {} // units, towgs84 etc. are irrelevant to the forward map
            }
        }

        let e2 = f * (2.0 - f);
        match proj.as_deref() {
            Some("longlat") | Some("latlong") => Ok(Projection::LonLat),
            Some("tmerc") => Ok(Projection::TransverseMercator(TmercParams {
                lat_0,
                lon_0,
                k_0,
                x_0,
                y_0,
                a,
                e2,
            })),
            Some(other) => Err(PipelineError::UnsupportedProjection(other.to_string()).into()),
            None => Err(PipelineError::UnsupportedProjection(descriptor.to_string()).into()),
        }
    }

    /// Project geographic degrees to planar (x, y).
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        match self {
            Projection::LonLat => (lon_deg, lat_deg),
            Projection::TransverseMercator(p) => tmerc_forward(p, lon_deg, lat_deg),
        }
    }
}

fn parse_num(key: &str, value: &str) -> Result<f64> {
    value.parse::<f64>().map_err(|_| {
        PipelineError::UnsupportedProjection(format!("non-numeric {}={}", key, value)).into()
    })
}

/// Snyder's ellipsoidal transverse Mercator forward equations (8-9..8-13).
fn tmerc_forward(p: &TmercParams, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
    let phi = lat_deg.to_radians();
    let lam = lon_deg.to_radians();
    let lam0 = p.lon_0.to_radians();
    let phi0 = p.lat_0.to_radians();

    let e2 = p.e2;
    let ep2 = e2 / (1.0 - e2);

    let sin_phi = sin(phi);
    let cos_phi = cos(phi);
    let n = p.a / sqrt(1.0 - e2 * sin_phi * sin_phi);
    let t = tan(phi) * tan(phi);
    let c = ep2 * cos_phi * cos_phi;
    let big_a = (lam - lam0) * cos_phi;

    let m = meridian_arc(p.a, e2, phi);
    let m0 = meridian_arc(p.a, e2, phi0);

    let a2 = big_a * big_a;
    let a3 = a2 * big_a;
    let a4 = a3 * big_a;
    let a5 = a4 * big_a;
    let a6 = a5 * big_a;

    let x = p.k_0
        * n
        * (big_a
            + (1.0 - t + c) * a3 / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a5 / 120.0)
        + p.x_0;

    let y = p.k_0
        * (m - m0
            + n * tan(phi)
                * (a2 / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0))
        + p.y_0;

    (x, y)
}

/// Meridian arc length from the equator to latitude `phi` (Snyder 3-21).
fn meridian_arc(a: f64, e2: f64, phi: f64) -> f64 {
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    a * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
        - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * sin(2.0 * phi)
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * sin(4.0 * phi)
        - (35.0 * e6 / 3072.0) * sin(6.0 * phi))
}
