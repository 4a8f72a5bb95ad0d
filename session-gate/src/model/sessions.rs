//! Stored login sessions

use std::fmt;

use async_graphql::scalar;
use base64::prelude::*;
use chrono::{DateTime, TimeDelta, Utc};
use color_eyre::Result;
use color_eyre::eyre::{OptionExt, bail, ensure};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use sqlx::prelude::Type;
use thiserror::Error;
use uuid::Uuid;

use crate::model::clock::Clock;
use crate::model::login::LoginState;
use crate::model::validity::SessionValidator;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid session key format")]
    InvalidKeyFormat,
    #[error("Session doesn't exist")]
    NonExistingSession,
    #[error("Signature malformed in the database")]
    InvalidSignatureStored,
    #[error("Session id collision")]
    SessionIdCollision,
    #[error("Invalid authorization format")]
    InvalidAuthorization,
    #[error("Invalid authorization scheme")]
    InvalidAuthorizationScheme,
}

/// Secret mixed into every session key signature. It should eventually be provided at build time.
const SESSION_KEY_APP_SECRET: &str = "SessionGateAppKeySecret";

/// Newtype for login session id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key addressing a stored login session
///
/// Has a form of `{session_id}.{token}`, where `session_id` is the base64 encoded session uuid and
/// `token` is a random base64 encoded uuid. The token itself is never stored: the session keeps a
/// random `secret` and the SHA3-256 `signature` of `{APP_SECRET}.{session_id}.{secret}.{token}`.
/// Leaking the database alone is therefore not enough to address a session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

scalar!(SessionKey);

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl SessionKey {
    /// Reads the key out of an `Authorization: Session {key}` header value
    pub fn from_authorization(header: &str) -> Result<Self, Error> {
        let (scheme, key) = header
            .split_once(' ')
            .ok_or(Error::InvalidAuthorization)?;

        match scheme {
            "Session" => Ok(Self(key.trim().to_owned())),
            _ => Err(Error::InvalidAuthorizationScheme),
        }
    }

    /// Finds the session this key was issued for
    pub async fn authenticate(
        &self,
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
    ) -> Result<LoginSession> {
        let (session_id, token) = self
            .0
            .split_once('.')
            .ok_or_eyre(Error::InvalidKeyFormat)?;

        let session_id: [u8; 16] = BASE64_STANDARD
            .decode(session_id)
            .map_err(|_| Error::InvalidKeyFormat)?
            .try_into()
            .map_err(|_| Error::InvalidKeyFormat)?;
        let id = SessionId(Uuid::from_bytes(session_id));

        let row: Option<SessionRow> = sqlx::query_as(
            "select secret, signature, username, access_token, access_token_expiration_date,
                refresh_token, created_at, updated_at
            from login_sessions where id = ?",
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        let (
            secret,
            signature,
            username,
            access_token,
            access_token_expiration_date,
            refresh_token,
            created_at,
            updated_at,
        ) = row.ok_or_eyre(Error::NonExistingSession)?;

        let signature: [u8; 32] = signature
            .try_into()
            .map_err(|_| Error::InvalidSignatureStored)?;

        ensure!(
            sign(id, secret, token) == signature,
            "Session key signature doesn't match"
        );

        Ok(LoginSession {
            id,
            login: LoginState {
                access_token,
                access_token_expiration_date,
                refresh_token,
                username,
            },
            created_at,
            updated_at,
        })
    }
}

type SessionRow = (
    Uuid,
    Vec<u8>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

/// Computes the key signature for a session
fn sign(id: SessionId, secret: Uuid, token: &str) -> [u8; 32] {
    let secret = BASE64_STANDARD.encode(secret.as_bytes());
    let data = format!("{SESSION_KEY_APP_SECRET}.{id}.{secret}.{token}");

    let mut hasher = Sha3_256::new();
    hasher.update(data.as_bytes());
    hasher.finalize().into()
}

/// Login state stored for a client
#[derive(Debug, Clone, PartialEq)]
pub struct LoginSession {
    pub id: SessionId,
    pub login: LoginState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoginSession {
    /// Stores a new session holding `login`
    ///
    /// Returns the stored session together with the key addressing it. The key can't be recovered
    /// later.
    pub async fn create(
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        login: LoginState,
        now: DateTime<Utc>,
    ) -> Result<(Self, SessionKey)> {
        let id = SessionId(Uuid::new_v4());
        let secret = Uuid::new_v4();
        let token = BASE64_STANDARD.encode(Uuid::new_v4().as_bytes());
        let signature = sign(id, secret, &token);

        let insertion = sqlx::query(
            "insert into login_sessions (id, secret, signature, username, access_token,
                access_token_expiration_date, refresh_token, created_at, updated_at)
            values (?, ?, ?, ?, ?, ?, ?, ?, ?) on conflict(id) do nothing",
        )
        .bind(id)
        .bind(secret)
        .bind(signature.as_slice())
        .bind(&login.username)
        .bind(&login.access_token)
        .bind(&login.access_token_expiration_date)
        .bind(&login.refresh_token)
        .bind(now)
        .bind(now)
        .execute(db)
        .await?;

        if insertion.rows_affected() == 0 {
            bail!(Error::SessionIdCollision);
        }

        let session_id = BASE64_STANDARD.encode(id.0.as_bytes());
        let key = SessionKey(format!("{session_id}.{token}"));

        let session = Self {
            id,
            login,
            created_at: now,
            updated_at: now,
        };
        Ok((session, key))
    }

    /// Persists the current login state
    pub async fn update(
        &mut self,
        db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let update = sqlx::query(
            "update login_sessions set username = ?, access_token = ?,
                access_token_expiration_date = ?, refresh_token = ?, updated_at = ?
            where id = ?",
        )
        .bind(&self.login.username)
        .bind(&self.login.access_token)
        .bind(&self.login.access_token_expiration_date)
        .bind(&self.login.refresh_token)
        .bind(now)
        .bind(self.id)
        .execute(db)
        .await?;

        if update.rows_affected() == 0 {
            bail!(Error::NonExistingSession);
        }

        self.updated_at = now;
        Ok(())
    }

    /// Removes the session, its key stops authenticating
    pub async fn logout(self, db: impl sqlx::Executor<'_, Database = sqlx::Sqlite>) -> Result<()> {
        sqlx::query("delete from login_sessions where id = ?")
            .bind(self.id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Removes sessions nothing can be done with anymore
    ///
    /// That is sessions with an unusable access token and no refresh token, and sessions not updated
    /// for longer than `retention`. Returns the number of removed sessions.
    pub async fn cleanup<C: Clock>(
        db: &sqlx::SqlitePool,
        validator: &SessionValidator<C>,
        retention: TimeDelta,
    ) -> Result<u64> {
        let now = validator.clock().now();
        let stale_before = now
            .checked_sub_signed(retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let stale = sqlx::query("delete from login_sessions where updated_at < ?")
            .bind(stale_before)
            .execute(db)
            .await?
            .rows_affected();

        let rows: Vec<(Uuid, Option<String>, Option<String>)> = sqlx::query_as(
            "select id, access_token, access_token_expiration_date
            from login_sessions where refresh_token is null",
        )
        .fetch_all(db)
        .await?;

        let mut expired = 0;
        for (id, access_token, access_token_expiration_date) in rows {
            let login = LoginState {
                access_token,
                access_token_expiration_date,
                ..LoginState::default()
            };

            if !validator.is_valid(&login) {
                expired += sqlx::query("delete from login_sessions where id = ?")
                    .bind(id)
                    .execute(db)
                    .await?
                    .rows_affected();
            }
        }

        Ok(stale + expired)
    }
}
