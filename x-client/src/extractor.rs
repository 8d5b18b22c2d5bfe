use async_trait::async_trait;
use postwatch_core::{CoreError, ExtractionError, PostSnapshot};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::renderer::PageRenderer;

pub const POST_SELECTOR: &str = r#"article[data-testid="tweet"]"#;
const PERMALINK_SELECTOR: &str = r#"a[href*="/status/"]"#;
const TEXT_SELECTOR: &str = r#"[data-testid="tweetText"]"#;
const MEDIA_SELECTOR: &str = r#"img[src*="media"]"#;
const SOCIAL_CONTEXT_SELECTOR: &str = r#"[data-testid="socialContext"]"#;

/// Produces the newest post of an account, or fails.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn fetch_latest(&self, account: &str) -> Result<PostSnapshot, CoreError>;
}

/// Reads the newest post off an account's rendered profile timeline.
pub struct TimelineExtractor<R> {
    renderer: R,
    base_url: String,
}

impl<R: PageRenderer> TimelineExtractor<R> {
    pub fn new(renderer: R, base_url: &str) -> Self {
        Self {
            renderer,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn profile_url(&self, account: &str) -> String {
        format!("{}/{}", self.base_url, account)
    }
}

#[async_trait]
impl<R: PageRenderer> ContentExtractor for TimelineExtractor<R> {
    async fn fetch_latest(&self, account: &str) -> Result<PostSnapshot, CoreError> {
        let url = self.profile_url(account);
        let html = self.renderer.render(&url).await?;
        debug!(
            account,
            renderer = self.renderer.name(),
            bytes = html.len(),
            "Rendered profile page"
        );
        parse_latest_post(&html, account, &self.base_url)
    }
}

/// Post id from a permalink: the path segment after `/status/`.
pub fn post_id_from_permalink(permalink: &str) -> Option<String> {
    let (_, rest) = permalink.split_once("/status/")?;
    let id = rest.split(['?', '#', '/']).next()?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

fn selector(css: &str) -> Result<Selector, CoreError> {
    Selector::parse(css).map_err(|e| CoreError::Internal {
        message: format!("invalid selector {css}: {e}"),
    })
}

fn absolute_url(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", base_url, href)
    } else {
        format!("{}/{}", base_url, href)
    }
}

fn is_pinned(post: &ElementRef, social_context: &Selector) -> bool {
    post.select(social_context)
        .any(|el| el.text().collect::<String>().contains("Pinned"))
}

/// Pick the newest post from a rendered timeline. Pinned posts are skipped
/// unless every visible post is pinned.
pub fn parse_latest_post(
    html: &str,
    account: &str,
    base_url: &str,
) -> Result<PostSnapshot, CoreError> {
    let document = Html::parse_document(html);
    let post_selector = selector(POST_SELECTOR)?;
    let social_context = selector(SOCIAL_CONTEXT_SELECTOR)?;

    let posts: Vec<ElementRef> = document.select(&post_selector).collect();
    let post = posts
        .iter()
        .find(|p| !is_pinned(p, &social_context))
        .or_else(|| posts.first())
        .ok_or_else(|| ExtractionError::NoPosts {
            account: account.to_string(),
        })?;

    let missing = |field: &str| ExtractionError::MissingField {
        account: account.to_string(),
        field: field.to_string(),
    };

    let href = post
        .select(&selector(PERMALINK_SELECTOR)?)
        .find_map(|a| a.value().attr("href"))
        .ok_or_else(|| missing("permalink"))?;
    let permalink = absolute_url(href, base_url);
    let id = post_id_from_permalink(&permalink).ok_or_else(|| missing("permalink"))?;

    let text = post
        .select(&selector(TEXT_SELECTOR)?)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .ok_or_else(|| missing("text"))?;

    let media_url = post
        .select(&selector(MEDIA_SELECTOR)?)
        .find_map(|img| img.value().attr("src"))
        .map(String::from);

    Ok(PostSnapshot {
        id,
        text,
        permalink,
        media_url,
    })
}
