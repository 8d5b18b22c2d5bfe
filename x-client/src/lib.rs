pub mod extractor;
pub mod media;
pub mod renderer;
pub mod retry;


pub use extractor::{parse_latest_post, post_id_from_permalink, ContentExtractor, TimelineExtractor};
pub use media::{HttpMediaFetcher, MediaFetcher};
pub use renderer::{BrowserlessRenderer, ChromeRenderer, PageRenderer};
pub use retry::{RetryConfig, RetryExecutor};

use postwatch_core::{CoreError, ExtractorConfig, RendererKind};
use std::sync::Arc;
use std::time::Duration;

/// Build the content extractor selected by the configuration.
pub fn build_extractor(config: &ExtractorConfig) -> Result<Arc<dyn ContentExtractor>, CoreError> {
    let post_wait = Duration::from_secs(config.post_wait_secs);
    let timeout = Duration::from_secs(config.timeout_secs);

    let extractor: Arc<dyn ContentExtractor> = match config.renderer {
        RendererKind::Chrome => Arc::new(TimelineExtractor::new(
            ChromeRenderer::new(config.chrome_bin.clone(), post_wait, timeout),
            &config.base_url,
        )),
        RendererKind::Browserless => {
            let base_url = config.browserless_url.as_deref().ok_or_else(|| {
                CoreError::Config(postwatch_core::ConfigError::MissingField {
                    field: "extractor.browserless_url".to_string(),
                })
            })?;
            Arc::new(TimelineExtractor::new(
                BrowserlessRenderer::new(
                    base_url,
                    config.browserless_token.as_deref(),
                    post_wait,
                    timeout,
                )?,
                &config.base_url,
            ))
        }
    };

    Ok(extractor)
}
