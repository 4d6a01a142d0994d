//! Axum + Askama web surface for FakeDaily: public reader, admin pages and
//! the admin JSON API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use fakedaily_import::{ImportConfig, Reconciler};
use fakedaily_storage::{ArticleStore, ImageProcessor, MediaStore, SqliteArticleStore, StoreError};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

mod api;
mod pages;

pub use api::{export_articles, ExportedArticle, ExportedImage};
pub mod security;
pub mod whatsapp;

/// Uploads and import bodies above this size are refused.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://database/articles.db";
pub const DEFAULT_MEDIA_DIR: &str = "media/images";
pub const DEFAULT_SITE_TITLE: &str = "FakeDaily";
pub const DEFAULT_BASE_URL: &str = "http://localhost:5001";
pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_LOGO_PATH: &str = "logo.png";

#[derive(Debug, Clone, PartialEq)]
pub struct WebConfig {
    pub database_url: String,
    pub media_dir: PathBuf,
    /// Mount point such as `/fakedaily`; empty serves from the root.
    pub app_prefix: String,
    pub site_title: String,
    /// Used for absolute image URLs in API responses.
    pub base_url: String,
    pub port: u16,
    /// Watermark logo; uploads asking for a watermark are stored as-is when absent.
    pub logo_path: PathBuf,
    /// Uploads larger than these bounds are scaled down.
    pub max_image_width: Option<u32>,
    pub max_image_height: Option<u32>,
    pub import: ImportConfig,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            media_dir: PathBuf::from(DEFAULT_MEDIA_DIR),
            app_prefix: String::new(),
            site_title: DEFAULT_SITE_TITLE.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            port: DEFAULT_PORT,
            logo_path: PathBuf::from(DEFAULT_LOGO_PATH),
            max_image_width: None,
            max_image_height: None,
            import: ImportConfig::default(),
        }
    }
}

impl WebConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();
        Self {
            database_url: text("DATABASE_URL").unwrap_or(defaults.database_url),
            media_dir: text("MEDIA_DIR").map(PathBuf::from).unwrap_or(defaults.media_dir),
            app_prefix: normalize_prefix(&lookup("APP_PREFIX").unwrap_or_default()),
            site_title: text("SITE_TITLE").unwrap_or(defaults.site_title),
            base_url: text("BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            port: text("FAKEDAILY_WEB_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            logo_path: text("LOGO_PATH").map(PathBuf::from).unwrap_or(defaults.logo_path),
            max_image_width: text("MAX_IMAGE_WIDTH").and_then(|v| v.parse().ok()),
            max_image_height: text("MAX_IMAGE_HEIGHT").and_then(|v| v.parse().ok()),
            import: ImportConfig::from_lookup(&lookup),
        }
    }
}

impl WebConfig {
    /// Absolute URL under which an uploaded image is served.
    pub fn image_url(&self, filename: &str) -> String {
        format!("{}{}/media/images/{filename}", self.base_url, self.app_prefix)
    }
}

/// `fakedaily/` and `/fakedaily/` both become `/fakedaily`.
pub fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

pub struct AppState {
    pub store: Arc<dyn ArticleStore>,
    pub media: MediaStore,
    pub images: Arc<ImageProcessor>,
    pub config: WebConfig,
    pub reconciler: Reconciler,
    /// Held for the whole of an import so batches never interleave.
    import_lock: Mutex<()>,
}

impl AppState {
    pub fn new(store: Arc<dyn ArticleStore>, config: WebConfig, reconciler: Reconciler) -> Self {
        Self {
            store,
            media: MediaStore::new(config.media_dir.clone()),
            images: Arc::new(ImageProcessor::from_logo_path(&config.logo_path)),
            config,
            reconciler,
            import_lock: Mutex::new(()),
        }
    }

    /// Opens the SQLite store and builds the reconciler described by `config`.
    pub async fn from_config(config: WebConfig) -> anyhow::Result<Self> {
        let store = SqliteArticleStore::connect(&config.database_url)
            .await
            .with_context(|| format!("opening article store {}", config.database_url))?;
        let reconciler = config.import.build_reconciler()?;
        Ok(Self::new(Arc::new(store), config, reconciler))
    }

    pub(crate) fn path(&self, route: &str) -> String {
        format!("{}{route}", self.config.app_prefix)
    }
}

pub fn app(state: AppState) -> Router {
    let prefix = state.config.app_prefix.clone();
    let routes = Router::new()
        .route("/", get(pages::root_handler))
        .route("/reader/", get(pages::reader_index_handler))
        .route("/public/", get(pages::reader_index_handler))
        .route("/reader/tag/{tag}", get(pages::reader_tag_handler))
        .route("/public/tag/{tag}", get(pages::reader_tag_handler))
        .route("/reader/article/{id}", get(pages::reader_article_handler))
        .route("/public/article/{id}", get(pages::reader_article_handler))
        .route("/admin", get(pages::admin_index_handler))
        .route("/admin/", get(pages::admin_index_handler))
        .route("/admin/article/{id}/whatsapp", get(pages::whatsapp_export_handler))
        .route("/media/images/{filename}", get(api::serve_image_handler))
        .route(
            "/admin/api/articles",
            get(api::list_articles_handler).post(api::create_article_handler),
        )
        .route(
            "/admin/api/articles/{id}",
            get(api::get_article_handler)
                .put(api::update_article_handler)
                .delete(api::delete_article_handler),
        )
        .route("/admin/api/articles/{id}/whatsapp", get(api::whatsapp_text_handler))
        .route("/admin/api/upload/images/{id}", post(api::upload_images_handler))
        .route("/admin/api/images/{id}", delete(api::delete_image_handler))
        .route("/admin/api/export/articles", get(api::export_articles_handler))
        .route("/admin/api/import/articles", post(api::import_articles_handler))
        .with_state(Arc::new(state));

    let router = if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(&prefix, routes)
    };
    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let port = state.config.port;
    let prefix = state.config.app_prefix.clone();
    let site_title = state.config.site_title.clone();
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    info!(port, prefix = %prefix, site_title = %site_title, "fakedaily web listening");
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": message.into() })),
    )
        .into_response()
}

pub(crate) fn store_failure(err: StoreError) -> Response {
    error!(%err, "article store operation failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("storage error: {err}"))
}
