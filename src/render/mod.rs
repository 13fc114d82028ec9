//! Rendering collaborator
//!
//! The harvester never touches a browser or an HTTP client directly. It loads
//! pages through a [`Renderer`] and queries them through the [`Page`] trait:
//! wait for a selector, query elements, read attributes and text, check
//! visibility, click, and scroll.
//!
//! Two backends are provided:
//! - [`HttpRenderer`] fetches static markup with reqwest
//! - [`FixtureRenderer`] serves in-memory pages whose markup can change in
//!   response to clicks, for offline replay and tests
//!
//! Both evaluate queries with the same [`HtmlPage`] snapshot engine.

mod fixture;
mod html_page;
mod http;

pub use fixture::FixtureRenderer;
pub use html_page::{is_element_visible, HtmlPage, VisibilityRules, FIXTURE_STATE_ATTRIBUTE};
pub use http::{build_http_client, HttpRenderer, RequestDecorator};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors raised by a renderer or a page
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Timed out after {waited_ms}ms waiting for '{selector}'")]
    Timeout { selector: String, waited_ms: u64 },

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Interaction failed: {0}")]
    Interaction(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RenderError {
    /// Returns true for transient failures that a retry may fix
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Navigation { .. } | Self::Http(_)
        )
    }
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Opaque reference to an element of the current page snapshot
///
/// Handles are document-order positions. They stay valid until the page
/// markup changes (for example after a click re-renders it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementHandle(pub(crate) usize);

impl ElementHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A rendered document
#[async_trait]
pub trait Page: Send + Sync {
    /// The URL the page was loaded from
    fn url(&self) -> &Url;

    /// Waits until any element matching `selectors` exists
    ///
    /// With `require_visible`, only a visible match ends the wait.
    async fn wait_for_selector(
        &self,
        selectors: &str,
        timeout: Duration,
        require_visible: bool,
    ) -> RenderResult<ElementHandle>;

    /// Returns every element matching `selector`, in document order
    async fn query_all(&self, selector: &str) -> RenderResult<Vec<ElementHandle>>;

    /// Returns every descendant of `scope` matching `selector`
    async fn query_within(
        &self,
        scope: ElementHandle,
        selector: &str,
    ) -> RenderResult<Vec<ElementHandle>>;

    async fn attribute(&self, element: ElementHandle, name: &str) -> RenderResult<Option<String>>;

    /// Returns the element's text with whitespace collapsed
    async fn text(&self, element: ElementHandle) -> RenderResult<String>;

    /// Returns the element's computed visibility
    async fn is_visible(&self, element: ElementHandle) -> RenderResult<bool>;

    async fn click(&self, element: ElementHandle) -> RenderResult<()>;

    async fn scroll_into_view(&self, element: ElementHandle) -> RenderResult<()>;

    /// Waits a fixed settle interval for client-side rendering
    async fn settle(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Loads pages
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn load_page(&self, url: &Url) -> RenderResult<Box<dyn Page>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RenderError::Timeout {
            selector: ".x".to_string(),
            waited_ms: 10
        }
        .is_retryable());
        assert!(RenderError::Navigation {
            url: "https://a.example".to_string(),
            message: "HTTP 503".to_string()
        }
        .is_retryable());
        assert!(!RenderError::Selector("ul[".to_string()).is_retryable());
        assert!(!RenderError::Interaction("detached".to_string()).is_retryable());
    }
}
