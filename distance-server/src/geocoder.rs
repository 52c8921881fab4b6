//! Place name resolution

use async_trait::async_trait;
use geodesic::Coordinates;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Geocoding request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Geocoding service responded with status {0}")]
    Status(StatusCode),
    #[error("Invalid geocoding response: {0}")]
    InvalidResponse(String),
}

/// Resolves place names to coordinates
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Returns coordinates of the best match, `None` if nothing matches the name
    async fn resolve(&self, place: &str) -> Result<Option<Coordinates>, Error>;
}

/// Single entry of Nominatim search results
#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

impl Place {
    fn coordinates(&self) -> Result<Coordinates, Error> {
        let latitude = self
            .lat
            .parse()
            .map_err(|_| Error::InvalidResponse(format!("latitude {:?}", self.lat)))?;
        let longitude = self
            .lon
            .parse()
            .map_err(|_| Error::InvalidResponse(format!("longitude {:?}", self.lon)))?;

        Coordinates::new(latitude, longitude).map_err(|err| Error::InvalidResponse(err.to_string()))
    }
}

/// Nominatim search API client
///
/// Single attempt per place, bounded by the configured timeout.
#[derive(Clone)]
pub struct Nominatim {
    client: Client,
    search_url: String,
}

impl Nominatim {
    pub fn new(config: &config::Geocoder) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        let search_url = format!("{}/search", config.endpoint.trim_end_matches('/'));
        Ok(Self { client, search_url })
    }
}

#[async_trait]
impl Geocoder for Nominatim {
    #[instrument(skip(self))]
    async fn resolve(&self, place: &str) -> Result<Option<Coordinates>, Error> {
        let response = self
            .client
            .get(&self.search_url)
            .header(header::ACCEPT, "application/json")
            .query(&[("q", place), ("format", "json"), ("limit", "1")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status));
        }

        let places: Vec<Place> = response.json().await?;
        debug!(found = places.len(), "Geocoding response received");

        places.first().map(Place::coordinates).transpose()
    }
}
