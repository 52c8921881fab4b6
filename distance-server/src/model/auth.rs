//! Authorization data
//!
//! Every successful login opens a new session, identified by an opaque access token. Each user
//! has at most one active session - opening a session deactivates all the previous ones in the
//! same transaction. Sessions are never removed, deactivated sessions stay as the login history.
//!
//! Session states: `active` -> `inactive` (logged out, expired, or replaced by a newer login).
//! There is no way back to `active`.

use std::sync::Arc;

use base64::prelude::*;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use sqlx::prelude::Type;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::hasher::{self, Hasher};
use crate::model::Error;
use crate::model::users::{User, UserId};

/// Mixed into the token digest, so the stored digests are useless without the application.
const TOKEN_APP_SECRET: &str = "DistanceServerAccessTokenSecret";

/// How long the session stays valid after login
pub const TOKEN_LIFETIME_SECS: i64 = 86_400;

fn token_lifetime() -> TimeDelta {
    TimeDelta::seconds(TOKEN_LIFETIME_SECS)
}

/// Newtype for the access token string
///
/// The token is 32 random bytes encoded with URL-safe Base64. Only the digest of
/// `{APP_SECRET}.{token}` is stored in the database, so leaked sessions table doesn't give
/// access to any account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps token provided by the client
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generates a new unpredictable token
    fn generate() -> Self {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(Uuid::new_v4().as_bytes());
        bytes[16..].copy_from_slice(Uuid::new_v4().as_bytes());
        Self(BASE64_URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Digest under which the token is stored
    fn digest(&self) -> Vec<u8> {
        let mut hasher = Sha3_256::new();
        hasher.update(TOKEN_APP_SECRET.as_bytes());
        hasher.update(b".");
        hasher.update(self.0.as_bytes());
        hasher.finalize().to_vec()
    }
}

/// Session ID newtype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session data
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Session ID
    pub id: SessionId,
    /// User ID for this session
    pub user_id: UserId,
    /// Login time, with whole seconds precision
    pub issued_at: DateTime<Utc>,
    /// Whether the token still gives access
    pub active: bool,
}

impl Session {
    /// Checks if the session lifetime passed at `now`
    ///
    /// Session is still valid exactly `TOKEN_LIFETIME_SECS` after being issued.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.issued_at > token_lifetime()
    }

    /// Verifies credentials and opens a new session for the user
    ///
    /// Unknown username and wrong password are both reported as `InvalidCredentials`.
    #[instrument(skip(db, hasher, password))]
    pub async fn login(
        db: &sqlx::SqlitePool,
        hasher: Arc<dyn Hasher>,
        username: &str,
        password: &str,
    ) -> Result<(AccessToken, Self), Error> {
        let user = User::fetch_by_username(db, username).await?;
        let digest = user.as_ref().map(|(_, user)| user.password_hash.clone());
        let verified = hasher::verify(hasher, password, digest).await;

        let user_id = match user {
            Some((user_id, _)) if verified => user_id,
            Some(_) => {
                warn!("Login failed: incorrect password");
                return Err(Error::InvalidCredentials);
            }
            None => {
                warn!("Login failed: user not found");
                return Err(Error::InvalidCredentials);
            }
        };

        let (token, session) = Self::start(db, user_id, Utc::now()).await?;
        info!(%user_id, session = %session.id, "User logged in, previous sessions invalidated");

        Ok((token, session))
    }

    /// Opens a new session for the user, deactivating all the other sessions of the user
    pub async fn start(
        db: impl sqlx::Acquire<'_, Database = sqlx::Sqlite>,
        user_id: UserId,
        issued_at: DateTime<Utc>,
    ) -> Result<(AccessToken, Self), Error> {
        let token = AccessToken::generate();
        let session = Self {
            id: SessionId(Uuid::new_v4()),
            user_id,
            issued_at: issued_at.trunc_subsecs(0),
            active: true,
        };

        let mut tx = db.begin().await?;

        sqlx::query("update sessions set active = 0 where user_id = ? and active = 1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "insert into sessions (id, user_id, token_digest, created_at, active) values (?, ?, ?, ?, 1)",
        )
        .bind(session.id)
        .bind(user_id)
        .bind(token.digest())
        .bind(session.issued_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((token, session))
    }

    /// Verifies that the token belongs to an active session of the claimed user
    pub async fn validate(
        db: impl sqlx::Acquire<'_, Database = sqlx::Sqlite>,
        token: &AccessToken,
        claimed: UserId,
    ) -> Result<UserId, Error> {
        Self::validate_at(db, token, claimed, Utc::now()).await
    }

    /// `validate` with explicit current time
    ///
    /// Expired session is deactivated before `TokenExpired` is returned.
    pub async fn validate_at(
        db: impl sqlx::Acquire<'_, Database = sqlx::Sqlite>,
        token: &AccessToken,
        claimed: UserId,
        now: DateTime<Utc>,
    ) -> Result<UserId, Error> {
        let mut conn = db.acquire().await?;

        let session = Self::fetch_active(&mut *conn, token, Some(claimed))
            .await?
            .ok_or(Error::Unauthenticated)?;
        session.ensure_unexpired(&mut *conn, now).await?;

        Ok(session.user_id)
    }

    /// Verifies the token alone, returning the user it was issued for
    pub async fn authenticate(
        db: impl sqlx::Acquire<'_, Database = sqlx::Sqlite>,
        token: &AccessToken,
    ) -> Result<UserId, Error> {
        Self::authenticate_at(db, token, Utc::now()).await
    }

    /// `authenticate` with explicit current time
    pub async fn authenticate_at(
        db: impl sqlx::Acquire<'_, Database = sqlx::Sqlite>,
        token: &AccessToken,
        now: DateTime<Utc>,
    ) -> Result<UserId, Error> {
        let mut conn = db.acquire().await?;

        let session = Self::fetch_active(&mut *conn, token, None)
            .await?
            .ok_or(Error::Unauthenticated)?;
        session.ensure_unexpired(&mut *conn, now).await?;

        Ok(session.user_id)
    }

    /// Deactivates the active session with this token
    ///
    /// Fails with `AlreadyInactive` if there is no such session, so the second logout with the same
    /// token reports failure.
    #[instrument(skip_all)]
    pub async fn logout(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        token: &AccessToken,
    ) -> Result<(), Error> {
        let result =
            sqlx::query("update sessions set active = 0 where token_digest = ? and active = 1")
                .bind(token.digest())
                .execute(db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(Error::AlreadyInactive);
        }

        info!("Session closed");
        Ok(())
    }

    /// Finds the active session by token, optionally requiring it to belong to the given user
    async fn fetch_active(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        token: &AccessToken,
        user_id: Option<UserId>,
    ) -> Result<Option<Self>, Error> {
        let row: Option<(SessionId, UserId, DateTime<Utc>)> = sqlx::query_as(
            "select id, user_id, created_at from sessions \
             where token_digest = ? and active = 1 and (? is null or user_id = ?)",
        )
        .bind(token.digest())
        .bind(user_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;

        Ok(row.map(|(id, user_id, issued_at)| Self {
            id,
            user_id,
            issued_at,
            active: true,
        }))
    }

    /// Deactivates the session if it is expired at `now`, returning `TokenExpired` in such case
    async fn ensure_unexpired(
        &self,
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        if !self.is_expired_at(now) {
            return Ok(());
        }

        sqlx::query("update sessions set active = 0 where id = ?")
            .bind(self.id)
            .execute(db)
            .await?;

        info!(user_id = %self.user_id, session = %self.id, "Session expired");
        Err(Error::TokenExpired)
    }
}
