//! Server-rendered reader and admin pages.

use std::cmp::Ordering;
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::NaiveDateTime;
use fakedaily_core::{truncate_chars, Article, ArticleImage};
use fakedaily_storage::{ArticleFilter, StoreError};
use pulldown_cmark::{html, Event, Options, Parser};
use serde::Deserialize;
use tracing::error;

use crate::{whatsapp, AppState};

const READER_EXCERPT_CHARS: usize = 300;
const ADMIN_EXCERPT_CHARS: usize = 200;

/// Markdown to HTML; single newlines become `<br>` like the editor shows them.
pub fn render_markdown(text: &str) -> String {
    let parser = Parser::new_ext(text, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH).map(
        |event| match event {
            Event::SoftBreak => Event::HardBreak,
            other => other,
        },
    );
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn display_date(ts: &NaiveDateTime) -> String {
    ts.format("%d.%m.%Y %H:%M").to_string()
}

#[derive(Debug, Clone)]
struct ArticleCard {
    id: i64,
    title: String,
    author: String,
    published: bool,
    tags: Vec<String>,
    created: String,
    excerpt_html: String,
}

impl ArticleCard {
    fn new(article: &Article, excerpt_chars: usize) -> Self {
        Self {
            id: article.id,
            title: article.title.clone(),
            author: article.author.clone().unwrap_or_default(),
            published: article.published,
            tags: article.tags.clone(),
            created: display_date(&article.created_at),
            excerpt_html: render_markdown(truncate_chars(&article.content, excerpt_chars)),
        }
    }
}

#[derive(Debug, Clone)]
struct ImageView {
    url: String,
    alt_text: String,
    caption: String,
}

impl ImageView {
    fn new(state: &AppState, image: &ArticleImage) -> Self {
        Self {
            url: state.path(&format!("/media/images/{}", image.filename)),
            alt_text: image.alt_text.clone().unwrap_or_default(),
            caption: image.caption.clone().unwrap_or_default(),
        }
    }
}

#[derive(Template)]
#[template(path = "reader_index.html")]
struct ReaderIndexTemplate {
    site_title: String,
    prefix: String,
    articles: Vec<ArticleCard>,
    search_query: String,
    /// Empty outside tag listings.
    current_tag: String,
}

#[derive(Template)]
#[template(path = "reader_article.html")]
struct ReaderArticleTemplate {
    site_title: String,
    prefix: String,
    article: ArticleCard,
    content_html: String,
    images: Vec<ImageView>,
}

#[derive(Template)]
#[template(path = "admin_index.html")]
struct AdminIndexTemplate {
    site_title: String,
    prefix: String,
    articles: Vec<ArticleCard>,
    search_query: String,
    published_only: bool,
    sort_by: String,
    sort_order: String,
}

#[derive(Template)]
#[template(path = "whatsapp_export.html")]
struct WhatsAppExportTemplate {
    site_title: String,
    prefix: String,
    article: ArticleCard,
    whatsapp_text: String,
    images: Vec<ImageView>,
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => {
            error!(%err, "template rendering failed");
            server_error(&err.to_string())
        }
    }
}

fn server_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Serverfehler: {message}")),
    )
        .into_response()
}

fn store_error_page(err: StoreError) -> Response {
    error!(%err, "article store operation failed");
    server_error(&err.to_string())
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Html(message.to_string())).into_response()
}

pub(crate) async fn root_handler(State(state): State<Arc<AppState>>) -> Redirect {
    Redirect::to(&state.path("/reader/"))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchQuery {
    q: Option<String>,
}

async fn reader_listing(
    state: &AppState,
    filter: ArticleFilter,
    search_query: String,
    current_tag: String,
) -> Response {
    match state.store.list_articles(&filter).await {
        Ok(articles) => render_html(ReaderIndexTemplate {
            site_title: state.config.site_title.clone(),
            prefix: state.config.app_prefix.clone(),
            articles: articles
                .iter()
                .map(|a| ArticleCard::new(a, READER_EXCERPT_CHARS))
                .collect(),
            search_query,
            current_tag,
        }),
        Err(err) => store_error_page(err),
    }
}

pub(crate) async fn reader_index_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Response {
    let search_query = query.q.unwrap_or_default().trim().to_string();
    let filter = ArticleFilter::published().with_query(search_query.clone());
    reader_listing(&state, filter, search_query, String::new()).await
}

pub(crate) async fn reader_tag_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(tag): AxumPath<String>,
) -> Response {
    let filter = ArticleFilter::published().with_tag(tag.clone());
    reader_listing(&state, filter, String::new(), tag).await
}

pub(crate) async fn reader_article_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> Response {
    let article = match state.store.get_article(id).await {
        Ok(Some(article)) if article.published => article,
        Ok(_) => return not_found("Artikel nicht gefunden oder nicht veröffentlicht"),
        Err(err) => return store_error_page(err),
    };
    let images = match state.store.images_for_article(id).await {
        Ok(images) => images,
        Err(err) => return store_error_page(err),
    };
    render_html(ReaderArticleTemplate {
        site_title: state.config.site_title.clone(),
        prefix: state.config.app_prefix.clone(),
        content_html: render_markdown(&article.content),
        article: ArticleCard::new(&article, 0),
        images: images.iter().map(|img| ImageView::new(&state, img)).collect(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AdminSort {
    Id,
    Status,
    Title,
    Tags,
    Date,
}

impl AdminSort {
    /// Unknown keys sort by id.
    fn parse(raw: &str) -> Self {
        match raw {
            "status" => Self::Status,
            "title" => Self::Title,
            "tags" => Self::Tags,
            "date" => Self::Date,
            _ => Self::Id,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Status => "status",
            Self::Title => "title",
            Self::Tags => "tags",
            Self::Date => "date",
        }
    }

    fn compare(self, a: &Article, b: &Article) -> Ordering {
        match self {
            Self::Id => a.id.cmp(&b.id),
            Self::Status => a.published.cmp(&b.published),
            Self::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            Self::Tags => a.tags.len().cmp(&b.tags.len()),
            Self::Date => a.created_at.cmp(&b.created_at),
        }
    }
}

/// Stable sort, so equal keys keep the store's newest-first order.
pub(crate) fn sort_admin_articles(articles: &mut [Article], sort: AdminSort, descending: bool) {
    articles.sort_by(|a, b| {
        let ord = sort.compare(a, b);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AdminQuery {
    q: Option<String>,
    published: Option<String>,
    sort: Option<String>,
    order: Option<String>,
}

pub(crate) async fn admin_index_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Response {
    let search_query = query.q.unwrap_or_default().trim().to_string();
    let published_only = query.published.as_deref() == Some("yes");
    let sort = AdminSort::parse(query.sort.as_deref().unwrap_or_default());
    let descending = query.order.as_deref() != Some("asc");

    let filter = ArticleFilter {
        published_only,
        ..Default::default()
    }
    .with_query(search_query.clone());
    let mut articles = match state.store.list_articles(&filter).await {
        Ok(articles) => articles,
        Err(err) => return store_error_page(err),
    };
    sort_admin_articles(&mut articles, sort, descending);

    render_html(AdminIndexTemplate {
        site_title: state.config.site_title.clone(),
        prefix: state.config.app_prefix.clone(),
        articles: articles
            .iter()
            .map(|a| ArticleCard::new(a, ADMIN_EXCERPT_CHARS))
            .collect(),
        search_query,
        published_only,
        sort_by: sort.as_str().to_string(),
        sort_order: if descending { "desc" } else { "asc" }.to_string(),
    })
}

pub(crate) async fn whatsapp_export_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> Response {
    let article = match state.store.get_article(id).await {
        Ok(Some(article)) => article,
        Ok(None) => return not_found("Artikel nicht gefunden"),
        Err(err) => return store_error_page(err),
    };
    let images = match state.store.images_for_article(id).await {
        Ok(images) => images,
        Err(err) => return store_error_page(err),
    };
    render_html(WhatsAppExportTemplate {
        site_title: state.config.site_title.clone(),
        prefix: state.config.app_prefix.clone(),
        whatsapp_text: whatsapp::format_article(&article.title, &article.content, article.author.as_deref()),
        article: ArticleCard::new(&article, 0),
        images: images.iter().map(|img| ImageView::new(&state, img)).collect(),
    })
}
