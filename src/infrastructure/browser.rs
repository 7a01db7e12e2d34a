//! Browser session seam
//!
//! The engine never talks to a concrete browser. A collection task drives a
//! [`PageDriver`] - one owned session, inherently sequential - and observes
//! its network traffic through a bounded channel of [`NetworkResponse`]s.
//! Concrete drivers (CDP, WebDriver) live outside this crate; tests use a
//! scripted driver.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

/// One observed network response from the driven session
#[derive(Debug, Clone)]
pub struct NetworkResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// What a scroll/load-more step achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollOutcome {
    /// Page height grew; more content may follow
    Grew,
    /// An explicit "show more" control was clicked
    LoadMoreClicked,
    /// Nothing further loads; the listing is at its end
    Exhausted,
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("session was blocked by an anti-bot challenge")]
    Interstitial,

    #[error("browser session is closed")]
    SessionClosed,
}

impl DriverError {
    /// Transient failures are retried with backoff; the rest escalate.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Navigation { .. } | Self::Timeout { .. })
    }
}

/// A driven browser session, owned by exactly one collection task.
///
/// Every method is a suspension point; the engine checks cancellation
/// around each call. `take_responses` hands over the bounded network
/// response channel exactly once per session.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate the main page to the given URL and wait for content
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// Perform one scroll (or load-more click) step on the listing
    async fn scroll_step(&mut self) -> Result<ScrollOutcome, DriverError>;

    /// Rendered markup of the listing region as currently visible
    async fn visible_html(&mut self) -> Result<String, DriverError>;

    /// Open a product detail page; returns its rendered markup (phase 1)
    async fn open_detail(&mut self, url: &str) -> Result<String, DriverError>;

    /// Scroll the open detail page to trigger the second data phase;
    /// returns the expanded markup
    async fn expand_detail(&mut self) -> Result<String, DriverError>;

    /// The bounded channel of intercepted network responses. `None` after
    /// the first call.
    fn take_responses(&mut self) -> Option<mpsc::Receiver<NetworkResponse>>;

    /// Close the session and release its resources
    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Build the marketplace search URL for a keyword.
pub fn search_url(base_url: &str, keyword: &str, import_only: bool) -> Result<String, DriverError> {
    let mut url = Url::parse(base_url).map_err(|e| DriverError::Navigation {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;
    url.set_path("/search/");
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("text", keyword);
        if import_only {
            pairs.append_pair("from_global", "true");
        }
    }
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_encodes_keyword() {
        let url = search_url("https://www.ozon.ru", "мини вентилятор", false).unwrap();
        assert!(url.starts_with("https://www.ozon.ru/search/?text="));
        assert!(!url.contains(' '));
    }

    #[test]
    fn import_only_adds_global_flag() {
        let url = search_url("https://www.ozon.ru", "fan", true).unwrap();
        assert!(url.contains("from_global=true"));
    }
}
