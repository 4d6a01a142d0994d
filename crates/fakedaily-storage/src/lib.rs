//! Article persistence for FakeDaily: the `ArticleStore` contract, a SQLite
//! backend, an in-memory backend, the media file store for uploads and the
//! image processing applied to them.

use async_trait::async_trait;
use fakedaily_core::{Article, ArticleChanges, ArticleImage, NewArticle, NewImage};
use thiserror::Error;

mod imaging;
mod media;
mod memory;
mod sqlite;

pub use imaging::{ImageProcessor, ImagingError, WatermarkOptions, WatermarkPosition};
pub use media::{is_allowed_image, sanitize_filename, MediaStore, StoredImage, ALLOWED_IMAGE_EXTENSIONS};
pub use memory::MemoryArticleStore;
pub use sqlite::SqliteArticleStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row {table}#{id}: {reason}")]
    CorruptRow {
        table: &'static str,
        id: i64,
        reason: String,
    },
    #[error("tag serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Unavailable(String),
}

/// Listing filter; the default lists every article.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleFilter {
    pub published_only: bool,
    /// Case-insensitive tag match.
    pub tag: Option<String>,
    /// Case-insensitive substring match over title and content.
    pub query: Option<String>,
}

impl ArticleFilter {
    pub fn published() -> Self {
        Self {
            published_only: true,
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = (!query.trim().is_empty()).then_some(query);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn matches(&self, article: &Article) -> bool {
        if self.published_only && !article.published {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !article.has_tag(tag) {
                return false;
            }
        }
        match &self.query {
            Some(query) => article.matches_query(query),
            None => true,
        }
    }
}

/// Newest first, ties broken by the higher id.
pub fn sort_newest_first(articles: &mut [Article]) {
    articles.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn insert_article(&self, article: &NewArticle) -> Result<i64, StoreError>;

    async fn get_article(&self, id: i64) -> Result<Option<Article>, StoreError>;

    /// Matching articles, newest `created_at` first.
    async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>, StoreError>;

    /// Replaces the editable fields; `false` when no row has this id.
    async fn update_article(&self, id: i64, changes: &ArticleChanges) -> Result<bool, StoreError>;

    /// Removes the article together with its image rows.
    async fn delete_article(&self, id: i64) -> Result<bool, StoreError>;

    async fn add_image(&self, image: &NewImage) -> Result<i64, StoreError>;

    async fn get_image(&self, id: i64) -> Result<Option<ArticleImage>, StoreError>;

    async fn images_for_article(&self, article_id: i64) -> Result<Vec<ArticleImage>, StoreError>;

    async fn delete_image(&self, id: i64) -> Result<bool, StoreError>;
}
