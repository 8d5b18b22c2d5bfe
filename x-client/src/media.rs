use async_trait::async_trait;
use postwatch_core::{CoreError, MediaError};
use std::path::PathBuf;
use std::time::Duration;
use storage::MediaStore;
use tracing::{debug, info};

use crate::retry::{RetryConfig, RetryExecutor};

/// Downloads a post's media and stores it, returning where it was written.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn download(
        &self,
        media_url: &str,
        account: &str,
        post_id: &str,
    ) -> Result<PathBuf, CoreError>;
}

pub struct HttpMediaFetcher {
    client: reqwest::Client,
    store: MediaStore,
    retry: RetryExecutor,
    timeout: Duration,
}

impl HttpMediaFetcher {
    pub fn new(store: MediaStore, timeout: Duration, max_attempts: u32) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("postwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            store,
            retry: RetryExecutor::new(RetryConfig::media(max_attempts)),
            timeout,
        })
    }

    async fn fetch_bytes(&self, media_url: &str) -> Result<Vec<u8>, CoreError> {
        let transfer_failed = |e: reqwest::Error| -> CoreError {
            if e.is_timeout() {
                CoreError::Timeout {
                    seconds: self.timeout.as_secs(),
                }
            } else {
                MediaError::TransferFailed {
                    url: media_url.to_string(),
                    reason: e.to_string(),
                }
                .into()
            }
        };

        let response = self
            .client
            .get(media_url)
            .send()
            .await
            .map_err(transfer_failed)?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::HttpStatus {
                url: media_url.to_string(),
                status_code: status.as_u16(),
            }
            .into());
        }

        let bytes = response.bytes().await.map_err(transfer_failed)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn download(
        &self,
        media_url: &str,
        account: &str,
        post_id: &str,
    ) -> Result<PathBuf, CoreError> {
        debug!(account, post_id, media_url, "Downloading media");
        let bytes = self
            .retry
            .execute("media download", || self.fetch_bytes(media_url))
            .await?;

        let path = self.store.path_for(account, post_id, media_url);
        self.store.write(&path, &bytes).await?;

        info!(account, post_id, path = %path.display(), "Media downloaded successfully");
        Ok(path)
    }
}
