use chrono::{DateTime, Local};
use postwatch_core::MediaError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions kept as-is when inferring a media file name.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];
pub const FALLBACK_EXTENSION: &str = "jpg";

/// Infer a file extension from the media URL's path suffix.
///
/// Falls back to the `format` query parameter (pbs.twimg.com serves
/// `.../media/<id>?format=png`) and finally to `jpg`.
pub fn infer_extension(media_url: &str) -> &'static str {
    let parsed = url::Url::parse(media_url).ok();

    let from_path = match &parsed {
        Some(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(suffix_of)
            .map(str::to_ascii_lowercase),
        None => media_url
            .split('?')
            .next()
            .and_then(suffix_of)
            .map(str::to_ascii_lowercase),
    };

    if let Some(ext) = from_path.as_deref().and_then(allowed) {
        return ext;
    }

    parsed
        .as_ref()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "format")
                .map(|(_, value)| value.to_ascii_lowercase())
        })
        .as_deref()
        .and_then(allowed)
        .unwrap_or(FALLBACK_EXTENSION)
}

fn suffix_of(segment: &str) -> Option<&str> {
    segment.rsplit_once('.').map(|(_, ext)| ext)
}

fn allowed(ext: &str) -> Option<&'static str> {
    ALLOWED_EXTENSIONS.iter().copied().find(|allowed| *allowed == ext)
}

/// `{account}_{post_id}_{YYYYmmdd_HHMMSS}.{ext}`
pub fn media_file_name(
    account: &str,
    post_id: &str,
    downloaded_at: DateTime<Local>,
    media_url: &str,
) -> String {
    format!(
        "{}_{}_{}.{}",
        account,
        post_id,
        downloaded_at.format("%Y%m%d_%H%M%S"),
        infer_extension(media_url)
    )
}

/// Directory where downloaded media is stored.
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

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub fn path_for(&self, account: &str, post_id: &str, media_url: &str) -> PathBuf {
        self.root
            .join(media_file_name(account, post_id, Local::now(), media_url))
    }

    pub async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), MediaError> {
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| MediaError::WriteFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!(path = %path.display(), size = bytes.len(), "Stored media");
        Ok(())
    }
}
