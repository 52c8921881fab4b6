//! Ellipsoidal distance computation
//!
//! Distances are computed with the Vincenty inverse formula on the WGS-84 ellipsoid. The iteration
//! is known not to converge for some nearly antipodal points - in such case the great-circle
//! distance on a sphere of the mean earth radius is used instead. The error of the fallback is
//! well below 0.5% which is acceptable for the purpose of this crate.

use crate::Coordinates;

/// WGS-84 semi-major axis in meters
const WGS84_A: f64 = 6_378_137.0;

/// WGS-84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// WGS-84 semi-minor axis in meters
const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);

/// Mean earth radius (IUGG) in meters
const MEAN_EARTH_RADIUS: f64 = 6_371_008.8;

/// Convergence threshold for the longitude on the auxiliary sphere
const TOLERANCE: f64 = 1e-12;

const MAX_ITERATIONS: usize = 200;

/// Length of the international mile in kilometers
pub const KILOMETERS_PER_MILE: f64 = 1.609_344;

/// Distance between two points
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Distance {
    meters: f64,
}

impl Distance {
    /// Computes the distance between two points along the ellipsoid surface
    pub fn between(a: Coordinates, b: Coordinates) -> Self {
        let meters = vincenty(a, b).unwrap_or_else(|| great_circle(a, b));
        Self { meters }
    }

    pub fn meters(&self) -> f64 {
        self.meters
    }

    pub fn kilometers(&self) -> f64 {
        self.meters / 1000.0
    }

    pub fn miles(&self) -> f64 {
        self.kilometers() / KILOMETERS_PER_MILE
    }
}

/// Rounds the value to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Vincenty inverse formula. Returns `None` if the iteration doesn't converge.
fn vincenty(a: Coordinates, b: Coordinates) -> Option<f64> {
    let phi1 = a.latitude().to_radians();
    let phi2 = b.latitude().to_radians();
    let l = normalize_longitude((b.longitude() - a.longitude()).to_radians());

    let u1 = ((1.0 - WGS84_F) * phi1.tan()).atan();
    let u2 = ((1.0 - WGS84_F) * phi2.tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;

    for _ in 0..MAX_ITERATIONS {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();

        let sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();

        if sin_sigma == 0.0 {
            // coincident points
            return Some(0.0);
        }

        let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        let sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;

        // Equatorial line has `cos_sq_alpha == 0`
        let cos_2sigma_m = if cos_sq_alpha != 0.0 {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        } else {
            0.0
        };

        let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));
        let previous = lambda;
        lambda = l
            + (1.0 - c)
                * WGS84_F
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))));

        if lambda.abs() > std::f64::consts::PI {
            return None;
        }

        if (lambda - previous).abs() <= TOLERANCE {
            let u_sq = cos_sq_alpha * (WGS84_A.powi(2) - WGS84_B.powi(2)) / WGS84_B.powi(2);
            let big_a =
                1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
            let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));

            let delta_sigma = big_b
                * sin_sigma
                * (cos_2sigma_m
                    + big_b / 4.0
                        * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))
                            - big_b / 6.0
                                * cos_2sigma_m
                                * (-3.0 + 4.0 * sin_sigma.powi(2))
                                * (-3.0 + 4.0 * cos_2sigma_m.powi(2))));

            return Some(WGS84_B * big_a * (sigma - delta_sigma));
        }
    }

    None
}

/// Wraps longitude difference into `[-pi, pi]`
fn normalize_longitude(l: f64) -> f64 {
    use std::f64::consts::{PI, TAU};

    if l > PI {
        l - TAU
    } else if l < -PI {
        l + TAU
    } else {
        l
    }
}

/// Haversine distance on the mean earth sphere
fn great_circle(a: Coordinates, b: Coordinates) -> f64 {
    let phi1 = a.latitude().to_radians();
    let phi2 = b.latitude().to_radians();
    let d_phi = phi2 - phi1;
    let d_lambda = (b.longitude() - a.longitude()).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * MEAN_EARTH_RADIUS * h.sqrt().min(1.0).asin()
}
