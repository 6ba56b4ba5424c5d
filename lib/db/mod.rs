pub mod models;
pub mod schema;

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use diesel::connection::SimpleConnection;
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_async::{
    pg::AsyncPgConnection,
    pooled_connection::{
        deadpool::{BuildError, Pool},
        AsyncDieselConnectionManager,
    },
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use thiserror::Error;
use tracing::info;

use crate::ingest::{ArticleStore, PgArticleStore, SqliteArticleStore};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
pub const SQLITE_MIGRATIONS: EmbeddedMigrations = embed_migrations!("sqlite_migrations");

const SQLITE_PRAGMAS: &str = r#"
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 5000;
"#;

#[derive(Error, Debug)]
pub enum StoreSetupError {
    #[error("unsupported database url `{0}`; expected postgres://, sqlite://, a .db file or :memory:")]
    UnsupportedUrl(String),

    #[error("failed to connect to database")]
    Connection(#[from] diesel::ConnectionError),

    #[error("failed to configure database")]
    Configure(#[from] diesel::result::Error),

    #[error("failed to run migrations")]
    Migration(#[source] Box<dyn StdError + Send + Sync>),

    #[error("failed to build connection pool")]
    Pool(#[from] BuildError),

    #[error("migration task did not complete")]
    Join(#[from] tokio::task::JoinError),
}

/// Which backend a connection string selects.
#[derive(Clone, PartialEq, Eq)]
pub enum DatabaseUrl {
    Postgres(String),
    /// A filesystem path or `:memory:`.
    Sqlite(String),
}

impl DatabaseUrl {
    pub fn parse(raw: &str) -> Result<Self, StoreSetupError> {
        let raw = raw.trim();
        if raw.starts_with("postgres://") || raw.starts_with("postgresql://") {
            return Ok(Self::Postgres(raw.to_string()));
        }
        if let Some(path) = raw.strip_prefix("sqlite://") {
            if path.is_empty() {
                return Err(StoreSetupError::UnsupportedUrl(raw.to_string()));
            }
            return Ok(Self::Sqlite(path.to_string()));
        }
        if raw == ":memory:"
            || [".db", ".sqlite", ".sqlite3"]
                .iter()
                .any(|suffix| raw.ends_with(suffix))
        {
            return Ok(Self::Sqlite(raw.to_string()));
        }
        Err(StoreSetupError::UnsupportedUrl(raw.to_string()))
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Sqlite(_) => "sqlite",
        }
    }
}

// Postgres URLs may carry credentials; never print them.
impl fmt::Debug for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres(_) => f.write_str("Postgres(<redacted>)"),
            Self::Sqlite(path) => f.debug_tuple("Sqlite").field(path).finish(),
        }
    }
}

pub async fn build_db_pool(db_url: &str) -> Result<Pool<AsyncPgConnection>, BuildError> {
    let pool_config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(db_url);
    let pool = Pool::builder(pool_config).build()?;

    Ok(pool)
}

/// Applies pending Postgres migrations. Runs on a blocking thread through the
/// async connection wrapper so no libpq is needed.
pub async fn run_postgres_migrations(db_url: &str) -> Result<usize, StoreSetupError> {
    let db_url = db_url.to_string();
    tokio::task::spawn_blocking(move || -> Result<usize, StoreSetupError> {
        let mut conn = AsyncConnectionWrapper::<AsyncPgConnection>::establish(&db_url)?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(StoreSetupError::Migration)?;
        Ok(applied.len())
    })
    .await?
}

/// Opens a SQLite store at `path` (or `:memory:`) with its schema migrated.
pub fn open_sqlite_store(path: &str) -> Result<SqliteArticleStore, StoreSetupError> {
    open_sqlite(path, true)
}

fn open_sqlite(path: &str, run_migrations: bool) -> Result<SqliteArticleStore, StoreSetupError> {
    let mut conn = SqliteConnection::establish(path)?;
    conn.batch_execute(SQLITE_PRAGMAS)?;

    if run_migrations {
        let applied = conn
            .run_pending_migrations(SQLITE_MIGRATIONS)
            .map_err(StoreSetupError::Migration)?
            .len();
        info!(
            event = "migrations_applied",
            backend = "sqlite",
            applied,
            "sqlite schema is up to date"
        );
    }

    Ok(SqliteArticleStore::new(conn))
}

/// Opens the store selected by `url`, applying migrations unless told not to.
pub async fn connect_store(
    url: &DatabaseUrl,
    run_migrations: bool,
) -> Result<Arc<dyn ArticleStore>, StoreSetupError> {
    match url {
        DatabaseUrl::Postgres(db_url) => {
            if run_migrations {
                let applied = run_postgres_migrations(db_url).await?;
                info!(
                    event = "migrations_applied",
                    backend = "postgres",
                    applied,
                    "postgres schema is up to date"
                );
            }
            let pool = build_db_pool(db_url).await?;
            Ok(Arc::new(PgArticleStore::new(pool)))
        }
        DatabaseUrl::Sqlite(path) => Ok(Arc::new(open_sqlite(path, run_migrations)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::{connect_store, DatabaseUrl, StoreSetupError};
    use crate::ingest::ArticleStore;

    #[test]
    fn url_selects_backend() {
        assert_eq!(
            DatabaseUrl::parse("postgres://user:pw@localhost/news").unwrap(),
            DatabaseUrl::Postgres("postgres://user:pw@localhost/news".to_string())
        );
        assert_eq!(
            DatabaseUrl::parse("postgresql://localhost/news")
                .unwrap()
                .backend(),
            "postgres"
        );
        assert_eq!(
            DatabaseUrl::parse("sqlite://data/news.db").unwrap(),
            DatabaseUrl::Sqlite("data/news.db".to_string())
        );
        assert_eq!(
            DatabaseUrl::parse("news.sqlite3").unwrap(),
            DatabaseUrl::Sqlite("news.sqlite3".to_string())
        );
        assert_eq!(
            DatabaseUrl::parse(":memory:").unwrap(),
            DatabaseUrl::Sqlite(":memory:".to_string())
        );
    }

    #[test]
    fn unknown_schemes_are_rejected() {
        assert!(matches!(
            DatabaseUrl::parse("mysql://localhost/news"),
            Err(StoreSetupError::UnsupportedUrl(_))
        ));
        assert!(matches!(
            DatabaseUrl::parse("sqlite://"),
            Err(StoreSetupError::UnsupportedUrl(_))
        ));
    }

    #[test]
    fn debug_output_hides_postgres_credentials() {
        let url = DatabaseUrl::parse("postgres://admin:hunter2@db/news").unwrap();
        assert!(!format!("{url:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn sqlite_store_starts_empty_after_migrations() {
        let store = connect_store(&DatabaseUrl::Sqlite(":memory:".to_string()), true)
            .await
            .unwrap();
        assert_eq!(store.article_count().await.unwrap(), 0);
    }
}
