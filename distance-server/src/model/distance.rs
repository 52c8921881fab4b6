//! Distance service

use std::str::FromStr;

use geodesic::{Coordinates, Distance, round2};
use tracing::{debug, info, instrument};

use crate::geocoder::Geocoder;
use crate::model::Error;
use crate::model::cache::{CachedDistance, DistanceRecord};
use crate::model::users::UserId;

/// Requested distance unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Kilometers,
    Miles,
    Both,
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Kilometers" => Ok(Self::Kilometers),
            "Miles" => Ok(Self::Miles),
            "Both" => Ok(Self::Both),
            _ => Err(Error::UnsupportedUnit(s.to_owned())),
        }
    }
}

/// Distance request between two places
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceQuery {
    pub place_a: String,
    pub place_b: String,
    pub unit: Unit,
}

/// Computed distance in the requested unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceResult {
    pub distance: CachedDistance,
    pub unit: Unit,
    /// Whether the distance came from the cache
    pub cached: bool,
}

impl std::fmt::Display for DistanceResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let CachedDistance { kilometers, miles } = self.distance;
        match self.unit {
            Unit::Kilometers => write!(f, "{kilometers:.2} km"),
            Unit::Miles => write!(f, "{miles:.2} mi"),
            Unit::Both => write!(f, "{miles:.2} mi {kilometers:.2} km"),
        }
    }
}

impl DistanceQuery {
    /// Builds the query, validating the unit name
    pub fn new(
        place_a: impl Into<String>,
        place_b: impl Into<String>,
        unit: &str,
    ) -> Result<Self, Error> {
        Ok(Self {
            place_a: place_a.into(),
            place_b: place_b.into(),
            unit: unit.parse()?,
        })
    }

    /// Answers the query for the user
    ///
    /// The cached distance is used if the pair of places was ever requested, otherwise both places
    /// are geocoded and the distance is computed. Either way the request is recorded in the user's
    /// history.
    #[instrument(skip(db, geocoder))]
    pub async fn compute(
        &self,
        db: &sqlx::SqlitePool,
        geocoder: &dyn Geocoder,
        user_id: UserId,
    ) -> Result<DistanceResult, Error> {
        let cached = DistanceRecord::lookup(db, &self.place_a, &self.place_b).await?;

        let (distance, cached) = match cached {
            Some(distance) => {
                debug!("Distance found in cache");
                (distance, true)
            }
            None => {
                let a = geocode(geocoder, &self.place_a).await?;
                let b = geocode(geocoder, &self.place_b).await?;
                let distance = Distance::between(a, b);

                let distance = CachedDistance {
                    kilometers: round2(distance.kilometers()),
                    miles: round2(distance.miles()),
                };
                (distance, false)
            }
        };

        let record =
            DistanceRecord::store(db, user_id, &self.place_a, &self.place_b, distance).await?;
        info!(record = record.id, cached, "Distance computed");

        Ok(DistanceResult {
            distance,
            unit: self.unit,
            cached,
        })
    }
}

/// Resolves the place, converting all the geocoder failures to `GeocodeFailure`
async fn geocode(geocoder: &dyn Geocoder, place: &str) -> Result<Coordinates, Error> {
    match geocoder.resolve(place).await {
        Ok(Some(coordinates)) => {
            debug!(place, %coordinates, "Place geocoded");
            Ok(coordinates)
        }
        Ok(None) => Err(Error::GeocodeFailure {
            place: place.to_owned(),
            cause: "location could not be geocoded".to_owned(),
        }),
        Err(err) => Err(Error::GeocodeFailure {
            place: place.to_owned(),
            cause: err.to_string(),
        }),
    }
}
