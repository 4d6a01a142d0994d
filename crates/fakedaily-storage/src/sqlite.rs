use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use fakedaily_core::{
    format_storage_timestamp, parse_stored_tags, parse_timestamp, Article, ArticleChanges,
    ArticleImage, NewArticle, NewImage,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::{sort_newest_first, ArticleFilter, ArticleStore, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        author TEXT,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        published BOOLEAN DEFAULT 0,
        tags TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS images (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        article_id INTEGER,
        filename TEXT NOT NULL,
        filepath TEXT NOT NULL,
        alt_text TEXT,
        caption TEXT,
        uploaded_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (article_id) REFERENCES articles(id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(published)",
    "CREATE INDEX IF NOT EXISTS idx_images_article ON images(article_id)",
];

// Declared column types (TIMESTAMP, BOOLEAN) are normalized in SQL so rows
// decode the same way regardless of how legacy rows were written.
const ARTICLE_COLUMNS: &str = r#"
    id, title, content, author,
    CAST(published AS INTEGER) AS published,
    tags,
    CAST(created_at AS TEXT) AS created_at,
    CAST(updated_at AS TEXT) AS updated_at
"#;

const IMAGE_COLUMNS: &str = r#"
    id, article_id, filename, filepath, alt_text, caption,
    CAST(uploaded_at AS TEXT) AS uploaded_at
"#;

/// Single-file SQLite article store.
#[derive(Debug, Clone)]
pub struct SqliteArticleStore {
    pool: SqlitePool,
}

impl SqliteArticleStore {
    /// Opens (creating when missing) the database at `database_url` and makes
    /// sure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        if let Some(parent) = database_file_path(database_url).and_then(|p| p.parent().map(Path::to_path_buf)) {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(&parent).await.map_err(|err| {
                    StoreError::Unavailable(format!(
                        "creating database directory {}: {err}",
                        parent.display()
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        info!(database_url, "article store ready");
        Ok(store)
    }

    /// Private in-memory database; a single long-lived connection keeps it alive.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Idempotent; safe to call on every start.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for (idx, statement) in SCHEMA.iter().enumerate() {
            debug!(statement = idx, "applying schema statement");
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn database_file_path(database_url: &str) -> Option<&Path> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let rest = rest.split('?').next().unwrap_or_default();
    if rest.is_empty() || rest == ":memory:" {
        return None;
    }
    Some(Path::new(rest))
}

fn encode_tags(tags: &[String]) -> Result<Option<String>, StoreError> {
    if tags.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(tags)?))
}

fn decode_timestamp(
    table: &'static str,
    id: i64,
    column: &str,
    raw: Option<String>,
) -> Result<NaiveDateTime, StoreError> {
    let raw = raw.unwrap_or_default();
    parse_timestamp(&raw).ok_or_else(|| StoreError::CorruptRow {
        table,
        id,
        reason: format!("unparsable {column} {raw:?}"),
    })
}

fn article_from_row(row: &SqliteRow) -> Result<Article, StoreError> {
    let id: i64 = row.try_get("id")?;
    let published: Option<i64> = row.try_get("published")?;
    let tags: Option<String> = row.try_get("tags")?;
    Ok(Article {
        id,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        author: row.try_get("author")?,
        published: published.unwrap_or(0) != 0,
        tags: parse_stored_tags(tags.as_deref()),
        created_at: decode_timestamp("articles", id, "created_at", row.try_get("created_at")?)?,
        updated_at: decode_timestamp("articles", id, "updated_at", row.try_get("updated_at")?)?,
    })
}

fn image_from_row(row: &SqliteRow) -> Result<ArticleImage, StoreError> {
    let id: i64 = row.try_get("id")?;
    let article_id: Option<i64> = row.try_get("article_id")?;
    Ok(ArticleImage {
        id,
        article_id: article_id.unwrap_or_default(),
        filename: row.try_get("filename")?,
        filepath: row.try_get("filepath")?,
        alt_text: row.try_get("alt_text")?,
        caption: row.try_get("caption")?,
        uploaded_at: decode_timestamp("images", id, "uploaded_at", row.try_get("uploaded_at")?)?,
    })
}

#[async_trait]
impl ArticleStore for SqliteArticleStore {
    async fn insert_article(&self, article: &NewArticle) -> Result<i64, StoreError> {
        let now = Utc::now().naive_utc();
        let created_at = article.created_at.unwrap_or(now);
        let updated_at = article.updated_at.unwrap_or(created_at);
        let result = sqlx::query(
            r#"
            INSERT INTO articles (title, content, author, published, tags, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.author)
        .bind(article.published)
        .bind(encode_tags(&article.tags)?)
        .bind(format_storage_timestamp(&created_at))
        .bind(format_storage_timestamp(&updated_at))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn get_article(&self, id: i64) -> Result<Option<Article>, StoreError> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(article_from_row).transpose()
    }

    async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>, StoreError> {
        let sql = if filter.published_only {
            format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE published = 1")
        } else {
            format!("SELECT {ARTICLE_COLUMNS} FROM articles")
        };
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        // Tag and text matching happen here for Unicode-aware case folding.
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let article = article_from_row(row)?;
            if filter.matches(&article) {
                out.push(article);
            }
        }
        sort_newest_first(&mut out);
        Ok(out)
    }

    async fn update_article(&self, id: i64, changes: &ArticleChanges) -> Result<bool, StoreError> {
        let updated_at = changes.updated_at.unwrap_or_else(|| Utc::now().naive_utc());
        let result = sqlx::query(
            r#"
            UPDATE articles
               SET title = ?,
                   content = ?,
                   author = ?,
                   published = ?,
                   tags = ?,
                   created_at = COALESCE(?, created_at),
                   updated_at = ?
             WHERE id = ?
            "#,
        )
        .bind(&changes.title)
        .bind(&changes.content)
        .bind(&changes.author)
        .bind(changes.published)
        .bind(encode_tags(&changes.tags)?)
        .bind(changes.created_at.as_ref().map(format_storage_timestamp))
        .bind(format_storage_timestamp(&updated_at))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_article(&self, id: i64) -> Result<bool, StoreError> {
        sqlx::query("DELETE FROM images WHERE article_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        let result = sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_image(&self, image: &NewImage) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO images (article_id, filename, filepath, alt_text, caption, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(image.article_id)
        .bind(&image.filename)
        .bind(&image.filepath)
        .bind(&image.alt_text)
        .bind(&image.caption)
        .bind(format_storage_timestamp(&Utc::now().naive_utc()))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn get_image(&self, id: i64) -> Result<Option<ArticleImage>, StoreError> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(image_from_row).transpose()
    }

    async fn images_for_article(&self, article_id: i64) -> Result<Vec<ArticleImage>, StoreError> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE article_id = ? ORDER BY id");
        let rows = sqlx::query(&sql).bind(article_id).fetch_all(&self.pool).await?;
        rows.iter().map(image_from_row).collect()
    }

    async fn delete_image(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
