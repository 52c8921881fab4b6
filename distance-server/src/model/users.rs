//! Credential store

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::prelude::Type;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::hasher::{self, Hasher};
use crate::model::Error;

#[derive(Debug, Clone, thiserror::Error)]
#[error("Invalid user id format")]
pub struct InvalidUserId;

/// Newtype for user id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = InvalidUserId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Uuid::parse_str(s.trim()).map_err(|_| InvalidUserId)?;
        Ok(Self(id))
    }
}

/// Registered user. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Unique login name
    pub username: String,
    /// Digest produced by the `Hasher`
    pub password_hash: String,
}

impl User {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
        }
    }

    /// Registers a new user, hashing the password
    #[instrument(skip(db, hasher, password))]
    pub async fn signup(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        hasher: Arc<dyn Hasher>,
        username: &str,
        password: &str,
    ) -> Result<UserId, Error> {
        let password_hash = hasher::hash(hasher, password).await?;
        let user_id = Self::new(username, password_hash).create(db).await?;

        info!(%user_id, "User created");
        Ok(user_id)
    }

    /// Fetches user from the database
    #[cfg(test)]
    pub async fn fetch(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        user_id: UserId,
    ) -> Result<Option<Self>, Error> {
        let row: Option<(String, String)> =
            sqlx::query_as("select username, password_hash from users where id = ?")
                .bind(user_id)
                .fetch_optional(db)
                .await?;

        Ok(row.map(|(username, password_hash)| Self {
            username,
            password_hash,
        }))
    }

    /// Fetches user by its username
    pub async fn fetch_by_username(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        username: &str,
    ) -> Result<Option<(UserId, Self)>, Error> {
        let row: Option<(UserId, String, String)> =
            sqlx::query_as("select id, username, password_hash from users where username = ?")
                .bind(username)
                .fetch_optional(db)
                .await?;

        Ok(row.map(|(user_id, username, password_hash)| {
            (
                user_id,
                Self {
                    username,
                    password_hash,
                },
            )
        }))
    }

    /// Creates user in the database
    ///
    /// Fails with `UsernameTaken` if the username is already registered.
    pub async fn create(
        self,
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
    ) -> Result<UserId, Error> {
        let user_id = UserId(Uuid::new_v4());
        let result = sqlx::query("insert into users(id, username, password_hash) values (?, ?, ?)")
            .bind(user_id)
            .bind(&self.username)
            .bind(&self.password_hash)
            .execute(db)
            .await;

        match result {
            Ok(_) => Ok(user_id),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(Error::UsernameTaken(self.username))
            }
            Err(err) => Err(err.into()),
        }
    }
}
