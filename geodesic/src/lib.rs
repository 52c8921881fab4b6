//! Distances between points on the WGS-84 ellipsoid

mod coordinates;
mod distance;

pub use coordinates::{Coordinates, Error};
pub use distance::{Distance, KILOMETERS_PER_MILE, round2};
