//! Service global context

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_graphql::EmptySubscription;
use chrono::{DateTime, TimeDelta, Utc};
use color_eyre::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thiserror::Error;

pub mod clock;
pub mod login;
pub mod sessions;
pub mod validity;

use crate::config;
use crate::model::clock::Clock;
use crate::model::sessions::LoginSession;
use crate::model::validity::SessionValidator;
use crate::mutation::Mutation;
use crate::query::Query;
use crate::service::Schema;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Invalid SQLite path: {path}")]
    InvalidSQLitePath { path: PathBuf },
    #[error("Retention period too long: {0:?}")]
    InvalidRetention(Duration),
}

/// In-memory database shared by all connections of a pool
const IN_MEMORY_DB: &str = "sqlite::memory:";

/// Context for GraphQL schema and HTTP handlers
#[derive(Debug, Clone)]
pub struct Model {
    /// Database access
    db: sqlx::SqlitePool,
    /// Token validity evaluated against the service clock
    validator: SessionValidator<Arc<dyn Clock>>,
}

impl Model {
    /// Context for testing purposes - using the in-memory SQLite database
    pub async fn test(clock: Arc<dyn Clock>) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(IN_MEMORY_DB)?;

        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_lazy_with(opts);

        sqlx::migrate!("model/migrations").run(&db).await?;

        Ok(Self {
            db,
            validator: SessionValidator::new(clock),
        })
    }

    /// Context from configuration
    ///
    /// If the database is created in-memory, the migrations are being executed automatically. If database is
    /// file based migrations would be executed only if requested by configuration.
    pub async fn with_config(config: config::Database, clock: Arc<dyn Clock>) -> Result<Self> {
        use config::Database::*;

        let db = match config {
            Memory { max_connections } => {
                // Named shared-cache database, visible to every pooled connection
                let opts = SqliteConnectOptions::from_str(IN_MEMORY_DB)?;

                // The database lives as long as at least one connection is open
                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_lazy_with(opts);

                sqlx::migrate!("model/migrations").run(&pool).await?;
                pool
            }

            Sqlite {
                path,
                max_connections,
                migrate,
            } => {
                let path = path
                    .as_path()
                    .to_str()
                    .ok_or_else(|| Error::InvalidSQLitePath { path: path.clone() })?;

                let opts = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true);

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
            validator: SessionValidator::new(clock),
        })
    }

    /// Buids schema with attached context
    pub fn schema(&self) -> Schema {
        Schema::build(Query::new(), Mutation::new(), EmptySubscription)
            .data(self.clone())
            .finish()
    }

    /// Accesses the DB pool
    pub fn db(&self) -> &sqlx::SqlitePool {
        &self.db
    }

    /// Validator evaluating against the service clock
    pub fn validator(&self) -> &SessionValidator<Arc<dyn Clock>> {
        &self.validator
    }

    /// Current instant of the service clock
    pub fn now(&self) -> DateTime<Utc> {
        self.validator.clock().now()
    }

    /// Removes unusable and stale sessions, returning how many were removed
    pub async fn cleanup(&self, retention: Duration) -> Result<u64> {
        let retention =
            TimeDelta::from_std(retention).map_err(|_| Error::InvalidRetention(retention))?;
        LoginSession::cleanup(&self.db, &self.validator, retention).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::clock::FixedClock;
    use crate::model::login::{LoginState, TokenResponse};

    #[tokio::test]
    async fn cleanup_follows_service_clock() {
        let now: DateTime<Utc> = "2024-03-01T12:00:00Z".parse().unwrap();
        let clock = Arc::new(FixedClock::new(now));
        let model = Model::test(clock.clone()).await.unwrap();

        let login = LoginState::from_token(
            TokenResponse {
                access_token: "abc".to_owned(),
                refresh_token: None,
                expires_in: 60,
                username: None,
            },
            model.now(),
        );
        let (_, key) = LoginSession::create(model.db(), login, model.now())
            .await
            .unwrap();

        let retention = Duration::from_secs(3600);
        assert_eq!(model.cleanup(retention).await.unwrap(), 0);

        clock.advance(TimeDelta::seconds(61));
        assert_eq!(model.cleanup(retention).await.unwrap(), 1);
        let _ = key.authenticate(model.db()).await.unwrap_err();
    }

    #[tokio::test]
    async fn in_memory_config() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let model = Model::with_config(config::Database::default(), clock)
            .await
            .unwrap();

        // Every pooled connection sees the migrated schema
        let mut conns = Vec::new();
        for _ in 0..4 {
            conns.push(model.db().acquire().await.unwrap());
        }

        for conn in &mut conns {
            let (count,): (i64,) = sqlx::query_as("select count(*) from login_sessions")
                .fetch_one(&mut **conn)
                .await
                .unwrap();
            assert_eq!(count, 0);
        }
    }

    #[tokio::test]
    async fn huge_retention_keeps_sessions() {
        let now: DateTime<Utc> = "2024-03-01T12:00:00Z".parse().unwrap();
        let clock = Arc::new(FixedClock::new(now));
        let model = Model::test(clock.clone()).await.unwrap();

        let login = LoginState::from_token(
            TokenResponse {
                access_token: "abc".to_owned(),
                refresh_token: Some("def".to_owned()),
                expires_in: 60,
                username: None,
            },
            model.now(),
        );
        let (_, key) = LoginSession::create(model.db(), login, model.now())
            .await
            .unwrap();

        clock.advance(TimeDelta::seconds(1));
        let retention = Duration::from_secs(10_000_000_000_000);
        assert_eq!(model.cleanup(retention).await.unwrap(), 0);
        key.authenticate(model.db()).await.unwrap();
    }
}
