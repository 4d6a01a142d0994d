use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDateTime;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

pub const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

const MAX_NAME_ATTEMPTS: usize = 100;

pub fn is_allowed_image(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Keeps ASCII alphanumerics, `.`, `-` and `_`; whitespace becomes `_`.
/// Directory components and leading dots are dropped.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

/// `name` itself for the first attempt, then `stem_<n>.ext`.
fn numbered_filename(name: &str, attempt: usize) -> String {
    if attempt <= 1 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{attempt}.{ext}"),
        _ => format!("{name}_{attempt}"),
    }
}

#[derive(Debug, Clone)]
pub struct StoredImage {
    pub filename: String,
    /// Path recorded in the `images` table, e.g. `media/images/<filename>`.
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub content_hash: String,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Upload directory for article images.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn upload_filename(article_id: i64, uploaded_at: NaiveDateTime, original: &str) -> String {
        let stamp = uploaded_at.format("%Y%m%d_%H%M%S");
        let name = sanitize_filename(original);
        let name = if name.is_empty() { "upload".to_string() } else { name };
        format!("{article_id}_{stamp}_{name}")
    }

    /// Absolute path of a stored file, `None` for names that could escape the root.
    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        if filename.is_empty() || sanitize_filename(filename) != filename {
            return None;
        }
        Some(self.root.join(filename))
    }

    /// Writes the upload through a temp file that is then linked under its
    /// final name. A taken name holding different bytes moves the upload to
    /// `<stem>_2.<ext>`, `<stem>_3.<ext>` and so on; a taken name holding the
    /// same bytes is reported as `deduplicated`.
    pub async fn store_image(
        &self,
        article_id: i64,
        uploaded_at: NaiveDateTime,
        original_name: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StoredImage> {
        let content_hash = Self::sha256_hex(bytes);
        let base_name = Self::upload_filename(article_id, uploaded_at, original_name);

        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating media directory {}", self.root.display()))?;

        let temp_path = self
            .root
            .join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp media file {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing temp media file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp media file {}", temp_path.display()))?;
        drop(file);

        let placed = self.place(&temp_path, &base_name, &content_hash).await;
        let _ = fs::remove_file(&temp_path).await;
        let (filename, deduplicated) = placed?;
        if deduplicated {
            debug!(%filename, "identical upload already stored");
        }

        Ok(StoredImage {
            relative_path: format!("media/images/{filename}"),
            absolute_path: self.root.join(&filename),
            filename,
            content_hash,
            byte_size: bytes.len(),
            deduplicated,
        })
    }

    /// Links `temp_path` under the first free candidate name. Linking fails on
    /// an existing name, so a concurrent upload is never overwritten.
    async fn place(
        &self,
        temp_path: &Path,
        base_name: &str,
        content_hash: &str,
    ) -> anyhow::Result<(String, bool)> {
        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let filename = numbered_filename(base_name, attempt);
            let target = self.root.join(&filename);
            match fs::hard_link(temp_path, &target).await {
                Ok(()) => return Ok((filename, false)),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    let existing = fs::read(&target)
                        .await
                        .with_context(|| format!("reading media file {}", target.display()))?;
                    if Self::sha256_hex(&existing) == content_hash {
                        return Ok((filename, true));
                    }
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!(
                            "linking temp media file {} -> {}",
                            temp_path.display(),
                            target.display()
                        )
                    })
                }
            }
        }
        anyhow::bail!("no free media name for {base_name} after {MAX_NAME_ATTEMPTS} attempts")
    }

    /// Missing files are not an error.
    pub async fn remove(&self, filename: &str) -> anyhow::Result<bool> {
        let Some(path) = self.resolve(filename) else {
            return Ok(false);
        };
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("removing media file {}", path.display())),
        }
    }
}
