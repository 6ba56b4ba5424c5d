use chrono::NaiveDateTime;
use diesel::prelude::*;

use super::schema::{article_topics, articles, topics};
use crate::hn_client::{ItemKind, Story};

/// A stored article, including the enrichment columns other processes own.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = articles)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct Article {
    pub id: i64,
    pub external_id: i64,
    pub title: Option<String>,
    pub url: Option<String>,
    pub kind: String,
    pub summary: Option<String>,
    pub sentiment: Option<String>,
    pub created_at: NaiveDateTime,
    pub last_ingested_at: NaiveDateTime,
}

/// The ingestion-owned projection of an article: exactly the columns a
/// natural-key upsert may write.
#[derive(Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = articles)]
#[diesel(treat_none_as_default_value = false)]
pub struct ArticleUpsert {
    pub external_id: i64,
    pub title: Option<String>,
    pub url: Option<String>,
    pub kind: String,
}

impl From<Story> for ArticleUpsert {
    fn from(story: Story) -> Self {
        Self {
            external_id: story.id,
            title: story.title,
            url: story.url,
            kind: ItemKind::Story.as_str().to_string(),
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = topics)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct Topic {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub keywords: Option<String>,
}

#[derive(Insertable, Queryable, Debug, Clone, Copy, PartialEq, Eq)]
#[diesel(table_name = article_topics)]
pub struct ArticleTopic {
    pub article_id: i64,
    pub topic_id: i64,
}
