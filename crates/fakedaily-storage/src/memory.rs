use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use fakedaily_core::{Article, ArticleChanges, ArticleImage, NewArticle, NewImage};
use tokio::sync::Mutex;

use crate::{sort_newest_first, ArticleFilter, ArticleStore, StoreError};

#[derive(Debug, Default)]
struct State {
    next_article_id: i64,
    next_image_id: i64,
    articles: BTreeMap<i64, Article>,
    images: BTreeMap<i64, ArticleImage>,
}

/// Process-local store used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryArticleStore {
    state: Mutex<State>,
}

impl MemoryArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies every article of `articles` in, keeping their ids.
    pub async fn seeded(articles: impl IntoIterator<Item = Article>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock().await;
            for article in articles {
                state.next_article_id = state.next_article_id.max(article.id);
                state.articles.insert(article.id, article);
            }
        }
        store
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.articles.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ArticleStore for MemoryArticleStore {
    async fn insert_article(&self, article: &NewArticle) -> Result<i64, StoreError> {
        let now = Utc::now().naive_utc();
        let created_at = article.created_at.unwrap_or(now);
        let mut state = self.state.lock().await;
        state.next_article_id += 1;
        let id = state.next_article_id;
        state.articles.insert(
            id,
            Article {
                id,
                title: article.title.clone(),
                content: article.content.clone(),
                author: article.author.clone(),
                published: article.published,
                tags: article.tags.clone(),
                created_at,
                updated_at: article.updated_at.unwrap_or(created_at),
            },
        );
        Ok(id)
    }

    async fn get_article(&self, id: i64) -> Result<Option<Article>, StoreError> {
        Ok(self.state.lock().await.articles.get(&id).cloned())
    }

    async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>, StoreError> {
        let state = self.state.lock().await;
        let mut out: Vec<Article> = state
            .articles
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        sort_newest_first(&mut out);
        Ok(out)
    }

    async fn update_article(&self, id: i64, changes: &ArticleChanges) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(article) = state.articles.get_mut(&id) else {
            return Ok(false);
        };
        article.title = changes.title.clone();
        article.content = changes.content.clone();
        article.author = changes.author.clone();
        article.published = changes.published;
        article.tags = changes.tags.clone();
        if let Some(created_at) = changes.created_at {
            article.created_at = created_at;
        }
        article.updated_at = changes.updated_at.unwrap_or_else(|| Utc::now().naive_utc());
        Ok(true)
    }

    async fn delete_article(&self, id: i64) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        state.images.retain(|_, image| image.article_id != id);
        Ok(state.articles.remove(&id).is_some())
    }

    async fn add_image(&self, image: &NewImage) -> Result<i64, StoreError> {
        let mut state = self.state.lock().await;
        state.next_image_id += 1;
        let id = state.next_image_id;
        state.images.insert(
            id,
            ArticleImage {
                id,
                article_id: image.article_id,
                filename: image.filename.clone(),
                filepath: image.filepath.clone(),
                alt_text: image.alt_text.clone(),
                caption: image.caption.clone(),
                uploaded_at: Utc::now().naive_utc(),
            },
        );
        Ok(id)
    }

    async fn get_image(&self, id: i64) -> Result<Option<ArticleImage>, StoreError> {
        Ok(self.state.lock().await.images.get(&id).cloned())
    }

    async fn images_for_article(&self, article_id: i64) -> Result<Vec<ArticleImage>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .images
            .values()
            .filter(|image| image.article_id == article_id)
            .cloned()
            .collect())
    }

    async fn delete_image(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.images.remove(&id).is_some())
    }
}
