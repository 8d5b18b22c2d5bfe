use postwatch_core::{CoreError, ErrorRecovery, LogRecord, PostSnapshot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use x_client::MediaFetcher;

use crate::store::DedupGuard;

/// Records a newly seen post: best-effort media download, then one post log
/// append.
pub struct PostRecorder {
    media: Arc<dyn MediaFetcher>,
}

impl PostRecorder {
    pub fn new(media: Arc<dyn MediaFetcher>) -> Self {
        Self { media }
    }

    /// Must be called with the guard that authorized the post, i.e. right
    /// after `compare_and_mark` returned true on it.
    pub async fn record(
        &self,
        guard: &DedupGuard,
        account: &str,
        snapshot: &PostSnapshot,
    ) -> Result<LogRecord, CoreError> {
        let media_path = self.fetch_media(account, snapshot).await;
        let record = LogRecord::new(account, snapshot, media_path);
        if let Err(e) = guard.append(&record).await {
            if let Some(path) = &record.media_path {
                discard_media(account, path).await;
            }
            return Err(e);
        }
        info!(account, post_id = %snapshot.id, "New post found from {}", account);
        Ok(record)
    }

    async fn fetch_media(&self, account: &str, snapshot: &PostSnapshot) -> Option<PathBuf> {
        let media_url = snapshot.media_url.as_deref()?;
        match self.media.download(media_url, account, &snapshot.id).await {
            Ok(path) => Some(path),
            Err(e) => {
                error!(account, post_id = %snapshot.id, media_url, "Error downloading image");
                ErrorRecovery::handle(account, &e);
                None
            }
        }
    }
}

/// Remove media for a post whose record could not be written; the post is
/// downloaded again when it is retried.
async fn discard_media(account: &str, path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(account, path = %path.display(), "Removed media of unrecorded post"),
        Err(e) => warn!(
            account,
            path = %path.display(),
            error = %e,
            "Could not remove media of unrecorded post"
        ),
    }
}
