//! Service persistence model

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use color_eyre::Result;

pub mod auth;
pub mod cache;
pub mod distance;
pub mod users;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thiserror::Error;

use crate::config;
use crate::geocoder::Geocoder;
use crate::hasher::Hasher;

#[derive(Debug, Clone, Error)]
pub enum SetupError {
    #[error("Invalid SQLite path: {path}")]
    InvalidSQLitePath { path: PathBuf },
}

/// Failures reported by the model operations
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid user ID, invalid token, or inactive session")]
    Unauthenticated,
    #[error("Access token has expired, please login again")]
    TokenExpired,
    #[error("Token is already inactive or invalid")]
    AlreadyInactive,
    #[error("User with user name '{0}' already exists")]
    UsernameTaken(String),
    #[error(
        "Unsupported unit {0:?} received for calculating distances, acceptable are: Kilometers; Miles; Both"
    )]
    UnsupportedUnit(String),
    #[error("Location {place:?} could not be geocoded: {cause}")]
    GeocodeFailure { place: String, cause: String },
    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error(transparent)]
    Hasher(#[from] crate::hasher::Error),
}

/// Shared service state: the database pool and the collaborators
#[derive(Clone)]
pub struct Model {
    /// Database access
    db: sqlx::SqlitePool,
    /// Password hashing
    hasher: Arc<dyn Hasher>,
    /// Place names resolution
    geocoder: Arc<dyn Geocoder>,
}

impl Model {
    /// Model for testing purposes - using the in-memory SQLite database and the cheap hasher
    #[cfg(test)]
    pub async fn test(geocoder: impl Geocoder + 'static) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_lazy_with(opts);

        sqlx::migrate!("model/migrations").run(&db).await?;

        Ok(Self {
            db,
            hasher: Arc::new(crate::hasher::PlainHasher),
            geocoder: Arc::new(geocoder),
        })
    }

    /// Model from configuration
    ///
    /// If the database is created in-memory, the migrations are being executed automatically. If database is
    /// file based migrations would be executed only if requested by configuration.
    pub async fn with_config(
        config: config::Database,
        hasher: impl Hasher + 'static,
        geocoder: impl Geocoder + 'static,
    ) -> Result<Self> {
        use config::Database::*;

        let db = match config {
            Memory { max_connections } => {
                // Parsed form is shared between all connections of the pool
                let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

                // Closing the last connection would drop the database
                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_lazy_with(opts);

                sqlx::migrate!("model/migrations").run(&pool).await?;
                pool
            }

            SqLite {
                path,
                max_connections,
                migrate,
            } => {
                let path = path
                    .as_path()
                    .to_str()
                    .ok_or_else(|| SetupError::InvalidSQLitePath { path: path.clone() })?;

                let opts = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .foreign_keys(true);

                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .connect_lazy_with(opts);

                if migrate {
                    sqlx::migrate!("model/migrations").run(&pool).await?;
                }

                pool
            }
        };

        Ok(Self {
            db,
            hasher: Arc::new(hasher),
            geocoder: Arc::new(geocoder),
        })
    }

    /// Accesses the DB pool
    pub fn db(&self) -> &sqlx::SqlitePool {
        &self.db
    }

    pub fn hasher(&self) -> Arc<dyn Hasher> {
        self.hasher.clone()
    }

    pub fn geocoder(&self) -> &dyn Geocoder {
        self.geocoder.as_ref()
    }
}

/// Pool over a fresh in-memory database with all migrations applied
#[cfg(test)]
pub(crate) async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("model/migrations").run(&pool).await.unwrap();
    pool
}
