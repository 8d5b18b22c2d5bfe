use async_trait::async_trait;
use postwatch_core::{CoreError, ExtractionError};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tracing::debug;

use crate::extractor::POST_SELECTOR;

/// Turns a URL into fully rendered HTML.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, CoreError>;
    fn name(&self) -> &str;
}

// --- Headless Chromium ---

/// A single browser session: a throwaway profile directory. The directory
/// is removed when the session is dropped, on every exit path of a render.
struct ChromeSession {
    profile: TempDir,
}

impl ChromeSession {
    fn open() -> Result<Self, CoreError> {
        let profile = tempfile::Builder::new()
            .prefix("postwatch-chrome-")
            .tempdir()?;
        Ok(Self { profile })
    }

    fn profile_dir(&self) -> &Path {
        self.profile.path()
    }
}

/// Renders pages with `chromium --headless --dump-dom`. The child process
/// is spawned with `kill_on_drop`, so a timed-out render never leaks it.
pub struct ChromeRenderer {
    chrome_bin: String,
    post_wait: Duration,
    timeout: Duration,
}

impl ChromeRenderer {
    pub fn new(chrome_bin: impl Into<String>, post_wait: Duration, timeout: Duration) -> Self {
        Self {
            chrome_bin: chrome_bin.into(),
            post_wait,
            timeout,
        }
    }

    fn args(&self, session: &ChromeSession, url: &str) -> Vec<String> {
        vec![
            "--headless=new".to_string(),
            "--no-sandbox".to_string(),
            "--disable-gpu".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-notifications".to_string(),
            "--disable-extensions".to_string(),
            format!("--user-data-dir={}", session.profile_dir().display()),
            format!("--virtual-time-budget={}", self.post_wait.as_millis()),
            "--dump-dom".to_string(),
            url.to_string(),
        ]
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn render(&self, url: &str) -> Result<String, CoreError> {
        let session = ChromeSession::open()?;

        let mut command = tokio::process::Command::new(&self.chrome_bin);
        command.args(self.args(&session, url)).kill_on_drop(true);

        debug!(url, chrome = %self.chrome_bin, "Rendering page with Chrome");
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| ExtractionError::RenderTimeout {
                url: url.to_string(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| ExtractionError::NavigationFailed {
                url: url.to_string(),
                reason: format!("could not launch {}: {}", self.chrome_bin, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::NavigationFailed {
                url: url.to_string(),
                reason: format!("chrome exited with {}: {}", output.status, stderr.trim()),
            }
            .into());
        }

        if output.stdout.is_empty() {
            return Err(ExtractionError::NavigationFailed {
                url: url.to_string(),
                reason: "chrome returned an empty DOM".to_string(),
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn name(&self) -> &str {
        "chrome"
    }
}

// --- Browserless /content API ---

/// Renders pages through a Browserless instance, waiting for the first
/// post element to show up before the HTML is returned.
pub struct BrowserlessRenderer {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    post_wait: Duration,
}

impl BrowserlessRenderer {
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        post_wait: Duration,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            post_wait,
        })
    }

    fn endpoint(&self) -> String {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }

    fn request_body(&self, url: &str) -> serde_json::Value {
        serde_json::json!({
            "url": url,
            "waitForSelector": {
                "selector": POST_SELECTOR,
                "timeout": self.post_wait.as_millis() as u64,
            },
        })
    }
}

#[async_trait]
impl PageRenderer for BrowserlessRenderer {
    async fn render(&self, url: &str) -> Result<String, CoreError> {
        debug!(url, "Rendering page with Browserless");
        let resp = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(&self.request_body(url))
            .send()
            .await
            .map_err(|e| ExtractionError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ExtractionError::RendererStatus {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        resp.text().await.map_err(|e| {
            ExtractionError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn name(&self) -> &str {
        "browserless"
    }
}
