//! Admin JSON API and media file serving.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Multipart, Path as AxumPath, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use fakedaily_adapters::parse_json_value;
use fakedaily_core::{
    format_storage_timestamp, parse_bool_text, parse_timestamp, Article, ArticleChanges, ArticleDraft, ArticleImage,
    NewImage,
};
use fakedaily_import::ImportError;
use fakedaily_storage::{is_allowed_image, ArticleFilter, ArticleStore, StoreError, WatermarkOptions};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn, Level};

use crate::security::{log_security_event, ClientInfo};
use crate::{api_error, store_failure, whatsapp, AppState, WebConfig};

#[derive(Debug, Clone, Serialize)]
pub struct ExportedImage {
    pub id: i64,
    pub filename: String,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
    pub url: String,
}

/// Article as the API and the export file present it.
#[derive(Debug, Clone, Serialize)]
pub struct ExportedArticle {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub published: bool,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    pub images: Vec<ExportedImage>,
}

impl ExportedArticle {
    pub fn new(config: &WebConfig, article: Article, images: Vec<ArticleImage>) -> Self {
        Self {
            id: article.id,
            created_at: format_storage_timestamp(&article.created_at),
            updated_at: format_storage_timestamp(&article.updated_at),
            title: article.title,
            content: article.content,
            author: article.author,
            published: article.published,
            tags: article.tags,
            images: images
                .into_iter()
                .map(|img| ExportedImage {
                    id: img.id,
                    url: config.image_url(&img.filename),
                    filename: img.filename,
                    alt_text: img.alt_text,
                    caption: img.caption,
                })
                .collect(),
        }
    }
}

/// Matching articles with their images, newest first.
pub async fn export_articles(
    store: &dyn ArticleStore,
    config: &WebConfig,
    filter: &ArticleFilter,
) -> Result<Vec<ExportedArticle>, StoreError> {
    let articles = store.list_articles(filter).await?;
    let mut out = Vec::with_capacity(articles.len());
    for article in articles {
        let images = store.images_for_article(article.id).await?;
        out.push(ExportedArticle::new(config, article, images));
    }
    Ok(out)
}

async fn export_article(state: &AppState, article: Article) -> Result<ExportedArticle, Response> {
    let images = state
        .store
        .images_for_article(article.id)
        .await
        .map_err(store_failure)?;
    Ok(ExportedArticle::new(&state.config, article, images))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, Response> {
    serde_json::from_slice(body)
        .map_err(|err| api_error(StatusCode::BAD_REQUEST, format!("request body is not valid JSON: {err}")))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    q: Option<String>,
    published: Option<String>,
    tag: Option<String>,
}

impl ListQuery {
    fn filter(&self) -> ArticleFilter {
        let mut filter = ArticleFilter {
            published_only: self.published.as_deref() == Some("yes"),
            ..Default::default()
        };
        if let Some(q) = &self.q {
            filter = filter.with_query(q.clone());
        }
        if let Some(tag) = self.tag.as_deref().filter(|t| !t.trim().is_empty()) {
            filter = filter.with_tag(tag);
        }
        filter
    }
}

pub(crate) async fn list_articles_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let out = match export_articles(state.store.as_ref(), &state.config, &query.filter()).await {
        Ok(out) => out,
        Err(err) => return store_failure(err),
    };
    Json(json!({ "success": true, "count": out.len(), "articles": out })).into_response()
}

pub(crate) async fn get_article_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> Response {
    match state.store.get_article(id).await {
        Ok(Some(article)) => match export_article(&state, article).await {
            Ok(article) => Json(json!({ "success": true, "article": article })).into_response(),
            Err(resp) => resp,
        },
        Ok(None) => api_error(StatusCode::NOT_FOUND, format!("article {id} not found")),
        Err(err) => store_failure(err),
    }
}

/// Title and content are mandatory for manual edits.
fn validated_payload(body: &[u8]) -> Result<ArticleDraft, Response> {
    let draft: ArticleDraft = parse_body(body)?;
    let has_content = draft.content.as_deref().is_some_and(|c| !c.trim().is_empty());
    if draft.title_text().is_none() || !has_content {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "title and content are required",
        ));
    }
    Ok(draft)
}

pub(crate) async fn create_article_handler(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    body: Bytes,
) -> Response {
    let draft = match validated_payload(&body) {
        Ok(draft) => draft,
        Err(resp) => return resp,
    };
    let Some(new) = draft.to_new_article() else {
        return api_error(StatusCode::BAD_REQUEST, "title and content are required");
    };
    let id = match state.store.insert_article(&new).await {
        Ok(id) => id,
        Err(err) => return store_failure(err),
    };
    log_security_event(
        Level::INFO,
        &client,
        &format!("article created: id={id} title={:?} published={}", new.title, new.published),
    );
    match state.store.get_article(id).await {
        Ok(Some(article)) => match export_article(&state, article).await {
            Ok(article) => (
                StatusCode::CREATED,
                Json(json!({ "success": true, "article": article })),
            )
                .into_response(),
            Err(resp) => resp,
        },
        Ok(None) => api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("article {id} vanished after insert")),
        Err(err) => store_failure(err),
    }
}

pub(crate) async fn update_article_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
    client: ClientInfo,
    body: Bytes,
) -> Response {
    let draft = match validated_payload(&body) {
        Ok(draft) => draft,
        Err(resp) => return resp,
    };
    let Some(new) = draft.to_new_article() else {
        return api_error(StatusCode::BAD_REQUEST, "title and content are required");
    };
    let created_at = new.created_at;
    let changes = ArticleChanges {
        created_at,
        // An explicit `updated_at` is kept, otherwise the store stamps "now".
        updated_at: draft.updated_at.as_deref().and_then(parse_timestamp),
        ..ArticleChanges::from(new)
    };
    match state.store.update_article(id, &changes).await {
        Ok(true) => {}
        Ok(false) => return api_error(StatusCode::NOT_FOUND, format!("article {id} not found")),
        Err(err) => return store_failure(err),
    }
    log_security_event(
        Level::INFO,
        &client,
        &format!("article updated: id={id} title={:?} published={}", changes.title, changes.published),
    );
    get_article_handler(State(state), AxumPath(id)).await
}

pub(crate) async fn delete_article_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
    client: ClientInfo,
) -> Response {
    let images = match state.store.images_for_article(id).await {
        Ok(images) => images,
        Err(err) => return store_failure(err),
    };
    match state.store.delete_article(id).await {
        Ok(true) => {}
        Ok(false) => {
            log_security_event(Level::ERROR, &client, &format!("failed to delete article: id={id}"));
            return api_error(StatusCode::NOT_FOUND, format!("article {id} not found"));
        }
        Err(err) => return store_failure(err),
    }
    for image in &images {
        if let Err(err) = state.media.remove(&image.filename).await {
            warn!(file = %image.filename, error = %err, "could not remove image file");
        }
    }
    log_security_event(
        Level::WARN,
        &client,
        &format!("article deleted: id={id} images={}", images.len()),
    );
    Json(json!({ "success": true, "deleted": id })).into_response()
}

pub(crate) async fn whatsapp_text_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> Response {
    match state.store.get_article(id).await {
        Ok(Some(article)) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            whatsapp::format_article(&article.title, &article.content, article.author.as_deref()),
        )
            .into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, format!("article {id} not found")),
        Err(err) => store_failure(err),
    }
}

#[derive(Debug, Clone, Serialize)]
struct UploadedImage {
    id: i64,
    filename: String,
    original_filename: String,
    content_hash: String,
    url: String,
}

pub(crate) async fn upload_images_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(article_id): AxumPath<i64>,
    client: ClientInfo,
    mut multipart: Multipart,
) -> Response {
    match state.store.get_article(article_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, format!("article {article_id} not found")),
        Err(err) => return store_failure(err),
    }

    let mut uploaded = Vec::new();
    let mut errors = Vec::new();
    let mut files = Vec::new();
    let mut files_seen = 0usize;
    let mut add_watermark = false;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return api_error(StatusCode::BAD_REQUEST, format!("invalid multipart body: {err}")),
        };
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("add_watermark") => match field.text().await {
                Ok(value) => add_watermark = parse_bool_text(&value),
                Err(err) => return api_error(StatusCode::BAD_REQUEST, format!("invalid multipart body: {err}")),
            },
            Some("images") => {
                let original = field.file_name().unwrap_or_default().to_string();
                if original.is_empty() {
                    continue;
                }
                files_seen += 1;
                if !is_allowed_image(&original) {
                    errors.push(format!("invalid file extension: {original}"));
                    continue;
                }
                match field.bytes().await {
                    Ok(bytes) => files.push((original, bytes)),
                    Err(err) => errors.push(format!("{original}: {err}")),
                }
            }
            _ => {}
        }
    }

    // Without a logo on disk the flag is ignored.
    let watermark = add_watermark && state.images.has_logo();
    for (original, bytes) in files {
        let bytes = match process_upload(&state, watermark, bytes.clone()).await {
            Ok(processed) => processed,
            Err(err) => {
                warn!(article_id, file = %original, error = %err, "image processing failed");
                errors.push(format!("image processing failed for {original}: {err}"));
                bytes
            }
        };
        match store_upload(&state, article_id, &original, &bytes).await {
            Ok(image) => {
                log_security_event(
                    Level::INFO,
                    &client,
                    &format!(
                        "image uploaded: article_id={article_id} file={} watermark={watermark}",
                        image.filename
                    ),
                );
                uploaded.push(image);
            }
            Err(err) => {
                warn!(article_id, file = %original, error = %err, "image upload failed");
                errors.push(format!("{original}: {err}"));
            }
        }
    }

    if files_seen == 0 {
        return api_error(StatusCode::BAD_REQUEST, "no files uploaded");
    }
    let status = if uploaded.is_empty() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    (
        status,
        Json(json!({
            "success": !uploaded.is_empty(),
            "uploaded": uploaded.len(),
            "errors": errors,
            "images": uploaded,
        })),
    )
        .into_response()
}

/// Downscales to the configured bounds and watermarks when asked. Unchanged
/// input comes back as-is.
async fn process_upload(state: &Arc<AppState>, watermark: bool, bytes: Bytes) -> anyhow::Result<Bytes> {
    let processor = state.images.clone();
    let (max_width, max_height) = (state.config.max_image_width, state.config.max_image_height);
    let input = bytes.clone();
    let processed = tokio::task::spawn_blocking(move || {
        let options = watermark.then(WatermarkOptions::default);
        processor.prepare_upload(&input, options.as_ref(), max_width, max_height)
    })
    .await??;
    Ok(processed.map(Bytes::from).unwrap_or(bytes))
}

async fn store_upload(
    state: &AppState,
    article_id: i64,
    original: &str,
    bytes: &[u8],
) -> anyhow::Result<UploadedImage> {
    let stored = state
        .media
        .store_image(article_id, Utc::now().naive_utc(), original, bytes)
        .await?;

    let existing = if stored.deduplicated {
        state
            .store
            .images_for_article(article_id)
            .await?
            .into_iter()
            .find(|img| img.filename == stored.filename)
    } else {
        None
    };
    let id = match existing {
        Some(image) => {
            debug!(image_id = image.id, "re-upload of an identical file");
            image.id
        }
        None => {
            state
                .store
                .add_image(&NewImage {
                    article_id,
                    filename: stored.filename.clone(),
                    filepath: stored.relative_path.clone(),
                    alt_text: None,
                    caption: None,
                })
                .await?
        }
    };
    Ok(UploadedImage {
        id,
        url: state.config.image_url(&stored.filename),
        filename: stored.filename,
        original_filename: original.to_string(),
        content_hash: stored.content_hash,
    })
}

pub(crate) async fn delete_image_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
    client: ClientInfo,
) -> Response {
    let image = match state.store.get_image(id).await {
        Ok(Some(image)) => image,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, format!("image {id} not found")),
        Err(err) => return store_failure(err),
    };
    if let Err(err) = state.media.remove(&image.filename).await {
        warn!(file = %image.filename, error = %err, "could not remove image file");
    }
    match state.store.delete_image(id).await {
        Ok(_) => {
            log_security_event(
                Level::WARN,
                &client,
                &format!("image deleted: id={id} file={}", image.filepath),
            );
            Json(json!({ "success": true, "deleted": id })).into_response()
        }
        Err(err) => store_failure(err),
    }
}

pub(crate) async fn export_articles_handler(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
) -> Response {
    let out = match export_articles(state.store.as_ref(), &state.config, &ArticleFilter::default()).await {
        Ok(out) => out,
        Err(err) => return store_failure(err),
    };
    log_security_event(Level::INFO, &client, &format!("articles exported: count={}", out.len()));
    Json(json!({ "success": true, "count": out.len(), "articles": out })).into_response()
}

pub(crate) async fn import_articles_handler(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    body: Bytes,
) -> Response {
    let value: serde_json::Value = match parse_body(&body) {
        Ok(value) => value,
        Err(resp) => return resp,
    };
    let batch = match parse_json_value(value) {
        Ok(batch) => batch,
        Err(err) => return api_error(StatusCode::BAD_REQUEST, err.to_string()),
    };

    let report = {
        let _guard = state.import_lock.lock().await;
        match state.reconciler.reconcile(state.store.as_ref(), batch).await {
            Ok(report) => report,
            Err(err @ ImportError::EmptyBatch) => {
                return api_error(StatusCode::BAD_REQUEST, err.to_string())
            }
        }
    };

    let level = if report.errors.is_empty() { Level::INFO } else { Level::WARN };
    log_security_event(
        level,
        &client,
        &format!(
            "import completed: imported={} updated={} skipped={} errors={}",
            report.imported,
            report.updated,
            report.skipped + report.rejected + report.failed,
            report.errors.len()
        ),
    );
    Json(report.to_response()).into_response()
}

fn image_content_type(filename: &str) -> &'static str {
    let ext = filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

pub(crate) async fn serve_image_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(filename): AxumPath<String>,
) -> Response {
    let Some(path) = state.media.resolve(&filename) else {
        return (StatusCode::NOT_FOUND, "image not found").into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, image_content_type(&filename))], bytes).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "image not found").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use crate::WebConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use fakedaily_storage::ArticleStore;
    use serde_json::json;

    #[tokio::test]
    async fn import_reports_counts_and_rejects_bad_bodies() {
        let h = harness();
        let body = json!({
            "articles": [
                {"title": "Kanzler eröffnet Würstelstand", "content": "Im Parlament.", "created_at": "2026-01-10 09:00:00"},
                {"title": "kanzler eröffnet würstelstand", "content": "Dublette.", "updated_at": "2026-01-01 09:00:00"},
                {"content": "Kein Titel"}
            ]
        })
        .to_string();
        let (status, value) = send_json(&h.router, "POST", "/admin/api/import/articles", &body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["success"], true);
        assert_eq!(value["imported"], 1);
        assert_eq!(value["updated"], 0);
        assert_eq!(value["skipped"], 2);
        assert_eq!(value["errors"].as_array().unwrap().len(), 1);
        assert_eq!(h.store.len().await, 1);

        let (status, value) = send_json(&h.router, "POST", "/admin/api/import/articles", "kein json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["success"], false);

        let (status, _) = send_json(&h.router, "POST", "/admin/api/import/articles", r#"{"articles": []}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send_json(&h.router, "POST", "/admin/api/import/articles", r#"{"other": 1}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn export_feeds_back_into_import_without_changes() {
        let h = harness();
        h.store.insert_article(&article("Erster", "Eins", true)).await.unwrap();
        h.store.insert_article(&article("Zweiter", "Zwei", false)).await.unwrap();

        let (status, text) = get(&h.router, "/admin/api/export/articles").await;
        assert_eq!(status, StatusCode::OK);
        let exported: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(exported["count"], 2);
        assert!(exported["articles"][0]["images"].as_array().unwrap().is_empty());

        let (status, value) =
            send_json(&h.router, "POST", "/admin/api/import/articles", &exported.to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["imported"], 0);
        assert_eq!(value["updated"], 0);
        assert_eq!(value["skipped"], 2);
        assert_eq!(h.store.len().await, 2);
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let h = harness();
        let (status, value) = send_json(
            &h.router,
            "POST",
            "/admin/api/articles",
            r#"{"title": "Neu", "content": "Text", "tags": "Satire, Wien", "published": "on"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = value["article"]["id"].as_i64().unwrap();
        assert_eq!(value["article"]["tags"], json!(["Satire", "Wien"]));
        assert_eq!(value["article"]["published"], true);

        let (status, _) =
            send_json(&h.router, "POST", "/admin/api/articles", r#"{"title": "Ohne Inhalt", "content": " "}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, value) = send_json(
            &h.router,
            "PUT",
            &format!("/admin/api/articles/{id}"),
            r#"{"title": "Neu bearbeitet", "content": "Mehr Text", "created_at": "2025-12-24 18:00:00"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["article"]["title"], "Neu bearbeitet");
        assert_eq!(value["article"]["created_at"], "2025-12-24 18:00:00");

        let (status, _) = send_json(&h.router, "PUT", "/admin/api/articles/999", r#"{"title": "X", "content": "Y"}"#).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, value) = send_json(&h.router, "GET", "/admin/api/articles?q=bearbeitet", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["count"], 1);

        let (status, _) = send_json(&h.router, "DELETE", &format!("/admin/api/articles/{id}"), "").await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send_json(&h.router, "GET", &format!("/admin/api/articles/{id}"), "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send_json(&h.router, "DELETE", &format!("/admin/api/articles/{id}"), "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn whatsapp_text_endpoint() {
        let h = harness();
        let id = h
            .store
            .insert_article(&article("Eilmeldung", "Das ist **wichtig**", true))
            .await
            .unwrap();
        let (status, text) = get(&h.router, &format!("/admin/api/articles/{id}/whatsapp")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "*EILMELDUNG*\n\nDas ist *wichtig*\n\n_Redaktion_");

        let (status, _) = get(&h.router, "/admin/api/articles/77/whatsapp").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    fn multipart_request(uri: &str, files: &[(&str, &[u8])]) -> Request<Body> {
        multipart_form(uri, &[], files)
    }

    fn multipart_form(uri: &str, fields: &[(&str, &str)], files: &[(&str, &[u8])]) -> Request<Body> {
        let boundary = "fakedaily-test-boundary";
        let mut body = Vec::new();
        for (name, bytes) in files {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"images\"; filename=\"{name}\"\r\n").as_bytes(),
            );
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        for (name, value) in fields {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
            body.extend_from_slice(value.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn upload_serve_and_delete_images() {
        let h = harness();
        let id = h.store.insert_article(&article("Mit Bild", "Text", true)).await.unwrap();

        let (status, text) = send(
            &h.router,
            multipart_request(
                &format!("/admin/api/upload/images/{id}"),
                &[("Foto 1.png", b"png-bytes"), ("notes.txt", b"nope")],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["uploaded"], 1);
        assert_eq!(value["errors"].as_array().unwrap().len(), 1);
        let filename = value["images"][0]["filename"].as_str().unwrap().to_string();
        assert!(filename.starts_with(&format!("{id}_")));
        assert!(filename.ends_with("_Foto_1.png"));
        assert!(h.media_dir.path().join(&filename).exists());

        let (status, body) = get(&h.router, &format!("/media/images/{filename}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "png-bytes");

        let (status, _) = get(&h.router, "/media/images/..%2Fsecret.png").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let image_id = value["images"][0]["id"].as_i64().unwrap();
        let (status, _) = send_json(&h.router, "DELETE", &format!("/admin/api/images/{image_id}"), "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!h.media_dir.path().join(&filename).exists());
        let (status, _) = send_json(&h.router, "DELETE", &format!("/admin/api/images/{image_id}"), "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_errors() {
        let h = harness();
        let (status, _) = send(&h.router, multipart_request("/admin/api/upload/images/5", &[("a.png", b"x")])).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let id = h.store.insert_article(&article("Ohne Bild", "Text", true)).await.unwrap();
        let (status, _) = send(&h.router, multipart_request(&format!("/admin/api/upload/images/{id}"), &[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, text) = send(
            &h.router,
            multipart_request(&format!("/admin/api/upload/images/{id}"), &[("virus.exe", b"x")]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(text.contains("invalid file extension"));
    }

    #[tokio::test]
    async fn same_named_uploads_keep_separate_files() {
        let h = harness();
        let id = h.store.insert_article(&article("Zwei Fotos", "Text", true)).await.unwrap();

        let (status, text) = send(
            &h.router,
            multipart_request(
                &format!("/admin/api/upload/images/{id}"),
                &[("image.jpg", b"first-bytes"), ("image.jpg", b"second-bytes")],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["uploaded"], 2);
        let first = value["images"][0]["filename"].as_str().unwrap().to_string();
        let second = value["images"][1]["filename"].as_str().unwrap().to_string();
        assert_ne!(first, second);
        assert_eq!(std::fs::read(h.media_dir.path().join(&first)).unwrap(), b"first-bytes");
        assert_eq!(std::fs::read(h.media_dir.path().join(&second)).unwrap(), b"second-bytes");

        let first_id = value["images"][0]["id"].as_i64().unwrap();
        let (status, _) = send_json(&h.router, "DELETE", &format!("/admin/api/images/{first_id}"), "").await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = get(&h.router, &format!("/media/images/{second}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "second-bytes");
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn uploads_are_watermarked_and_downscaled() {
        let logo_dir = tempfile::tempdir().unwrap();
        let logo_path = logo_dir.path().join("logo.png");
        image::RgbaImage::from_pixel(100, 100, image::Rgba([255, 0, 0, 255]))
            .save(&logo_path)
            .unwrap();
        let h = harness_with(WebConfig {
            logo_path,
            max_image_width: Some(400),
            ..Default::default()
        });
        let id = h.store.insert_article(&article("Mit Logo", "Text", true)).await.unwrap();
        let uri = format!("/admin/api/upload/images/{id}");

        let (status, text) = send(
            &h.router,
            multipart_form(&uri, &[("add_watermark", "on")], &[("foto.png", &png(800, 600))]),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{text}");
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let filename = value["images"][0]["filename"].as_str().unwrap();
        let stored = image::open(h.media_dir.path().join(filename)).unwrap().to_rgb8();
        assert_eq!(stored.dimensions(), (400, 300));
        // 400 * 0.15 * 0.5 = 30px logo, 20px from the bottom-right corner.
        assert_eq!(stored.get_pixel(365, 265).0, [255, 0, 0]);

        let (status, text) = send(
            &h.router,
            multipart_form(&uri, &[("add_watermark", "false")], &[("klein.png", &png(200, 100))]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let filename = value["images"][0]["filename"].as_str().unwrap();
        assert_eq!(std::fs::read(h.media_dir.path().join(filename)).unwrap(), png(200, 100));

        let (status, text) = send(
            &h.router,
            multipart_form(&uri, &[("add_watermark", "yes")], &[("kaputt.png", b"not a png")]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["uploaded"], 1);
        assert!(value["errors"][0].as_str().unwrap().starts_with("image processing failed for kaputt.png"));
    }
}
