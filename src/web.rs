//! Web page fetching and HTML-to-text extraction.
//!
//! The text transform is a deterministic approximation, not an HTML parser:
//! malformed markup may leak stray characters, which is an accepted
//! trade-off for recipe pages.

use regex::Regex;
use reqwest::{header, redirect, Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; RecipeIngest/1.0)";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Redirect chains longer than this error out instead of looping forever.
const MAX_REDIRECT_HOPS: usize = 5;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("redirect chain exceeded {MAX_REDIRECT_HOPS} hops")]
    TooManyRedirects,
}

/// A fetched page together with its extracted plain text.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedPage {
    pub url: String,
    pub html: String,
    pub text: String,
    pub content_length: usize,
}

/// HTTP fetcher with a fixed user-agent, a 10 second timeout and manual,
/// hop-capped redirect handling.
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }

    /// Fetch a URL, following up to [`MAX_REDIRECT_HOPS`] redirects.
    /// Only a 200 response counts as success.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut current = url.to_string();

        for _ in 0..=MAX_REDIRECT_HOPS {
            let response = self
                .client
                .get(&current)
                .send()
                .await
                .map_err(classify_transport_error)?;

            let status = response.status();
            if status.is_redirection() {
                if let Some(location) = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                {
                    // Location may be relative; resolve it against the page
                    // that issued the redirect.
                    current = match reqwest::Url::parse(&current)
                        .ok()
                        .and_then(|base| base.join(location).ok())
                    {
                        Some(resolved) => resolved.to_string(),
                        None => location.to_string(),
                    };
                    debug!("Following redirect to {current}");
                    continue;
                }
                return Err(FetchError::Status(status.as_u16()));
            }

            if status != StatusCode::OK {
                return Err(FetchError::Status(status.as_u16()));
            }

            return response.text().await.map_err(classify_transport_error);
        }

        Err(FetchError::TooManyRedirects)
    }

    /// Fetch a page and extract its plain text in one call.
    pub async fn fetch_and_extract(&self, url: &str) -> Result<FetchedPage, FetchError> {
        if !is_valid_url(url) {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let html = self.fetch(url).await?;
        let text = extract_text(&html);
        info!(
            "Fetched {url}: {} bytes of HTML, {} chars of text",
            html.len(),
            text.chars().count()
        );

        Ok(FetchedPage {
            url: url.to_string(),
            content_length: html.len(),
            text,
            html,
        })
    }
}

fn classify_transport_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(err)
    }
}

/// Accepts only http/https URLs that parse cleanly.
pub fn is_valid_url(url: &str) -> bool {
    reqwest::Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Strip markup from an HTML document, yielding plain text.
///
/// Non-content blocks and comments are dropped, block boundaries become
/// newlines, the remaining tags are stripped, a small fixed set of named
/// entities is decoded, and whitespace is collapsed.
pub fn extract_text(html: &str) -> String {
    let hidden_blocks = Regex::new(
        r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<noscript\b[^>]*>.*?</noscript\s*>",
    )
    .expect("hard-coded pattern");
    let comments = Regex::new(r"(?s)<!--.*?-->").expect("hard-coded pattern");
    let line_breaks = Regex::new(
        r"(?i)</(?:p|div|li|ul|ol|h[1-6]|table|tr|th|td|section|article|header|footer|blockquote|pre|dl|dt|dd)\s*>|<(?:br|hr)\b[^>]*>",
    )
    .expect("hard-coded pattern");
    let tags = Regex::new(r"(?s)<[^>]*>").expect("hard-coded pattern");
    let horizontal_ws = Regex::new(r"[ \t]+").expect("hard-coded pattern");
    let line_edge_ws = Regex::new(r"(?m)^ +| +$").expect("hard-coded pattern");
    let blank_lines = Regex::new(r"\n{3,}").expect("hard-coded pattern");

    let text = html.replace("\r\n", "\n").replace('\r', "\n");
    let text = hidden_blocks.replace_all(&text, "");
    let text = comments.replace_all(&text, "");
    let text = line_breaks.replace_all(&text, "\n");
    let text = tags.replace_all(&text, "");

    // Decode a fixed set of named entities; ampersand goes last so encoded
    // entities are not decoded twice in one pass.
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&euro;", "\u{20AC}")
        .replace("&amp;", "&");

    let text = horizontal_ws.replace_all(&text, " ");
    let text = line_edge_ws.replace_all(&text, "");
    let text = blank_lines.replace_all(&text, "\n\n");
    text.trim().to_string()
}
