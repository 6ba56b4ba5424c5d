use std::collections::HashSet;
use std::sync::Arc;

use diesel::dsl::now;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel::sqlite::SqliteConnection;
use diesel::upsert::excluded;
use diesel::{insert_into, update};
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use futures::future::BoxFuture;
use tokio::sync::Mutex;

use crate::db::models::{Article, ArticleTopic, ArticleUpsert, Topic};
use crate::db::schema::{article_topics, articles, topics};

use super::error_mapping::map_diesel_error;
use super::types::StoreUnavailable;

/// One `INSERT .. ON CONFLICT (external_id) DO UPDATE` per row, all inside a
/// single transaction. Conflicts rewrite the ingestion-owned columns only.
///
/// Shared by both stores; diesel-async runs them on distinct connection types.
macro_rules! upsert_in_transaction {
    ($conn:expr, $rows:expr) => {
        $conn
            .transaction::<_, DieselError, _>(|conn| {
                async move {
                    let mut written = 0;
                    for row in $rows {
                        written += insert_into(articles::table)
                            .values(row)
                            .on_conflict(articles::external_id)
                            .do_update()
                            .set((
                                articles::title.eq(excluded(articles::title)),
                                articles::url.eq(excluded(articles::url)),
                                articles::kind.eq(excluded(articles::kind)),
                                articles::last_ingested_at.eq(now),
                            ))
                            .execute(conn)
                            .await?;
                    }
                    Ok(written)
                }
                .scope_boxed()
            })
            .await
            .map_err(map_diesel_error)
    };
}

/// Durable side of a reconciliation run.
///
/// Abstracted so transient and fatal store behavior can be exercised without a
/// live Postgres instance.
pub trait ArticleStore: Send + Sync {
    /// Applies one natural-key upsert per row, all inside one transaction.
    /// Returns the number of rows written.
    fn upsert_batch<'a>(
        &'a self,
        rows: &'a [ArticleUpsert],
    ) -> BoxFuture<'a, Result<usize, StoreUnavailable>>;

    fn article_count<'a>(&'a self) -> BoxFuture<'a, Result<i64, StoreUnavailable>>;
}

impl<T> ArticleStore for Arc<T>
where
    T: ArticleStore + ?Sized,
{
    fn upsert_batch<'a>(
        &'a self,
        rows: &'a [ArticleUpsert],
    ) -> BoxFuture<'a, Result<usize, StoreUnavailable>> {
        (**self).upsert_batch(rows)
    }

    fn article_count<'a>(&'a self) -> BoxFuture<'a, Result<i64, StoreUnavailable>> {
        (**self).article_count()
    }
}

/// Postgres-backed store used by the production runtime.
pub struct PgArticleStore {
    pool: Pool<AsyncPgConnection>,
}

impl PgArticleStore {
    pub fn new(pool: Pool<AsyncPgConnection>) -> Self {
        Self { pool }
    }
}

impl ArticleStore for PgArticleStore {
    fn upsert_batch<'a>(
        &'a self,
        rows: &'a [ArticleUpsert],
    ) -> BoxFuture<'a, Result<usize, StoreUnavailable>> {
        Box::pin(async move {
            if rows.is_empty() {
                return Ok(0);
            }

            let mut pooled = self.pool.get().await.map_err(|err| {
                StoreUnavailable::retryable(format!("failed to acquire DB pool connection: {err}"))
            })?;
            let conn: &mut AsyncPgConnection = &mut pooled;
            upsert_in_transaction!(conn, rows)
        })
    }

    fn article_count<'a>(&'a self) -> BoxFuture<'a, Result<i64, StoreUnavailable>> {
        Box::pin(async move {
            let mut conn = self.pool.get().await.map_err(|err| {
                StoreUnavailable::retryable(format!("failed to acquire DB pool connection: {err}"))
            })?;
            articles::table
                .count()
                .get_result(&mut conn)
                .await
                .map_err(map_diesel_error)
        })
    }
}

/// SQLite-backed store for local runs and tests.
///
/// SQLite allows one writer, so the connection sits behind a mutex rather than a
/// pool.
pub struct SqliteArticleStore {
    conn: Mutex<SyncConnectionWrapper<SqliteConnection>>,
}

impl SqliteArticleStore {
    /// Wraps a connection whose schema is already migrated.
    pub fn new(conn: SqliteConnection) -> Self {
        Self {
            conn: Mutex::new(SyncConnectionWrapper::new(conn)),
        }
    }

    /// Lookup helper for tests and operator tooling; ingestion never reads rows.
    pub async fn find_article(&self, external_id: i64) -> Result<Option<Article>, StoreUnavailable> {
        let mut conn = self.conn.lock().await;
        articles::table
            .filter(articles::external_id.eq(external_id))
            .select(Article::as_select())
            .first(&mut *conn)
            .await
            .optional()
            .map_err(map_diesel_error)
    }

    /// All articles ordered by natural key. Test and ops helper.
    pub async fn list_articles(&self) -> Result<Vec<Article>, StoreUnavailable> {
        let mut conn = self.conn.lock().await;
        articles::table
            .order(articles::external_id.asc())
            .select(Article::as_select())
            .load(&mut *conn)
            .await
            .map_err(map_diesel_error)
    }

    /// Writes the enrichment columns the summarizer owns. Returns whether a row
    /// matched. Stands in for the downstream summarizer in tests and local runs.
    pub async fn record_summary(
        &self,
        external_id: i64,
        summary: &str,
        sentiment: Option<&str>,
    ) -> Result<bool, StoreUnavailable> {
        let mut conn = self.conn.lock().await;
        let updated = update(articles::table.filter(articles::external_id.eq(external_id)))
            .set((
                articles::summary.eq(Some(summary)),
                articles::sentiment.eq(sentiment),
            ))
            .execute(&mut *conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(updated > 0)
    }

    /// Labels an article with a topic, creating the topic on first use. Test and
    /// ops helper for the downstream topic labeler.
    pub async fn attach_topic(
        &self,
        external_id: i64,
        topic_name: &str,
    ) -> Result<(), StoreUnavailable> {
        let mut conn = self.conn.lock().await;
        conn.transaction::<_, DieselError, _>(|conn| {
            async move {
                let article_id: i64 = articles::table
                    .filter(articles::external_id.eq(external_id))
                    .select(articles::id)
                    .first(conn)
                    .await?;

                insert_into(topics::table)
                    .values(topics::name.eq(topic_name))
                    .on_conflict(topics::name)
                    .do_nothing()
                    .execute(conn)
                    .await?;
                let topic_id: i64 = topics::table
                    .filter(topics::name.eq(topic_name))
                    .select(topics::id)
                    .first(conn)
                    .await?;

                insert_into(article_topics::table)
                    .values(ArticleTopic {
                        article_id,
                        topic_id,
                    })
                    .on_conflict((article_topics::article_id, article_topics::topic_id))
                    .do_nothing()
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }

    /// Test and ops helper.
    pub async fn topics_for(&self, external_id: i64) -> Result<Vec<Topic>, StoreUnavailable> {
        let mut conn = self.conn.lock().await;
        article_topics::table
            .inner_join(articles::table)
            .inner_join(topics::table)
            .filter(articles::external_id.eq(external_id))
            .order(topics::name.asc())
            .select(Topic::as_select())
            .load(&mut *conn)
            .await
            .map_err(map_diesel_error)
    }
}

impl ArticleStore for SqliteArticleStore {
    fn upsert_batch<'a>(
        &'a self,
        rows: &'a [ArticleUpsert],
    ) -> BoxFuture<'a, Result<usize, StoreUnavailable>> {
        Box::pin(async move {
            if rows.is_empty() {
                return Ok(0);
            }

            let mut conn = self.conn.lock().await;
            upsert_in_transaction!(conn, rows)
        })
    }

    fn article_count<'a>(&'a self) -> BoxFuture<'a, Result<i64, StoreUnavailable>> {
        Box::pin(async move {
            let mut conn = self.conn.lock().await;
            articles::table
                .count()
                .get_result(&mut *conn)
                .await
                .map_err(map_diesel_error)
        })
    }
}

/// Deduplicates one staged batch by `external_id`, keeping the last occurrence
/// so later rows win. Returns the number of rows dropped.
pub(crate) fn dedupe_by_external_id(rows: &mut Vec<ArticleUpsert>) -> usize {
    if rows.len() < 2 {
        return 0;
    }

    let mut seen: HashSet<i64> = HashSet::with_capacity(rows.len());
    let mut unique_reversed: Vec<ArticleUpsert> = Vec::with_capacity(rows.len());
    let mut duplicates = 0usize;

    for row in rows.drain(..).rev() {
        if seen.insert(row.external_id) {
            unique_reversed.push(row);
        } else {
            duplicates += 1;
        }
    }

    unique_reversed.reverse();
    *rows = unique_reversed;
    duplicates
}

#[cfg(test)]
mod tests {
    use super::{dedupe_by_external_id, ArticleStore};
    use crate::db::models::ArticleUpsert;
    use crate::db::open_sqlite_store;

    fn row(external_id: i64, title: &str) -> ArticleUpsert {
        ArticleUpsert {
            external_id,
            title: Some(title.to_string()),
            url: Some(format!("https://example.com/{external_id}")),
            kind: "story".to_string(),
        }
    }

    #[test]
    fn dedupe_keeps_last_row_per_id_in_order() {
        let mut rows = vec![row(1, "a"), row(2, "b"), row(1, "c"), row(3, "d")];
        assert_eq!(dedupe_by_external_id(&mut rows), 1);

        let kept: Vec<(i64, &str)> = rows
            .iter()
            .map(|r| (r.external_id, r.title.as_deref().unwrap()))
            .collect();
        assert_eq!(kept, vec![(2, "b"), (1, "c"), (3, "d")]);
    }

    #[tokio::test]
    async fn upsert_updates_in_place_on_conflict() {
        let store = open_sqlite_store(":memory:").unwrap();

        store.upsert_batch(&[row(42, "first")]).await.unwrap();
        let before = store.find_article(42).await.unwrap().unwrap();

        let mut changed = row(42, "second");
        changed.url = None;
        store.upsert_batch(&[changed]).await.unwrap();

        assert_eq!(store.article_count().await.unwrap(), 1);
        let after = store.find_article(42).await.unwrap().unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.title.as_deref(), Some("second"));
        assert_eq!(after.url, None);
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn upsert_leaves_enrichment_columns_alone() {
        let store = open_sqlite_store(":memory:").unwrap();
        store.upsert_batch(&[row(7, "original")]).await.unwrap();

        assert!(store
            .record_summary(7, "a short summary", Some(r#"{"label":"positive"}"#))
            .await
            .unwrap());
        store.attach_topic(7, "rust").await.unwrap();
        store.attach_topic(7, "databases").await.unwrap();

        store.upsert_batch(&[row(7, "retitled")]).await.unwrap();

        let article = store.find_article(7).await.unwrap().unwrap();
        assert_eq!(article.title.as_deref(), Some("retitled"));
        assert_eq!(article.summary.as_deref(), Some("a short summary"));
        assert_eq!(article.sentiment.as_deref(), Some(r#"{"label":"positive"}"#));

        let names: Vec<String> = store
            .topics_for(7)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["databases".to_string(), "rust".to_string()]);
    }

    #[tokio::test]
    async fn record_summary_reports_missing_rows() {
        let store = open_sqlite_store(":memory:").unwrap();
        assert!(!store.record_summary(99, "nothing here", None).await.unwrap());
        assert!(store.find_article(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let store = open_sqlite_store(":memory:").unwrap();
        assert_eq!(store.upsert_batch(&[]).await.unwrap(), 0);
        assert_eq!(store.article_count().await.unwrap(), 0);
    }
}
