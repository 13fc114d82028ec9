//! Static HTTP renderer
//!
//! Fetches markup with reqwest and serves it through an [`HtmlPage`]. Static
//! markup cannot react to interaction, so clicks and scrolls leave the page
//! unchanged.

use crate::config::UserAgentConfig;
use crate::render::{HtmlPage, Page, RenderError, RenderResult, Renderer, VisibilityRules};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, RequestBuilder};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Insertion point for request shaping (proxies, header rotation)
///
/// The harvester ships no implementation; deployments that need one plug it
/// in here.
pub trait RequestDecorator: Send + Sync {
    fn decorate(&self, request: RequestBuilder) -> RequestBuilder;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Overall timeout for a single request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Renderer that fetches pages over HTTP
pub struct HttpRenderer {
    client: Client,
    rules: VisibilityRules,
    decorator: Option<Arc<dyn RequestDecorator>>,
}

impl HttpRenderer {
    pub fn new(client: Client, rules: VisibilityRules) -> Self {
        Self {
            client,
            rules,
            decorator: None,
        }
    }

    pub fn with_decorator(mut self, decorator: Arc<dyn RequestDecorator>) -> Self {
        self.decorator = Some(decorator);
        self
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn load_page(&self, url: &Url) -> RenderResult<Box<dyn Page>> {
        let mut request = self.client.get(url.clone());
        if let Some(decorator) = &self.decorator {
            request = decorator.decorate(request);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RenderError::Navigation {
                    url: url.to_string(),
                    message: "request timed out".to_string(),
                }
            } else {
                RenderError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Navigation {
                url: url.to_string(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        let body = response.text().await?;
        tracing::debug!("Loaded {} ({} bytes)", url, body.len());

        Ok(Box::new(HtmlPage::new(url.clone(), body, self.rules.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(5));
        assert!(client.is_ok());
    }

    struct Tagging;

    impl RequestDecorator for Tagging {
        fn decorate(&self, request: RequestBuilder) -> RequestBuilder {
            request.header("x-harvest", "1")
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_retryable() {
        let client =
            build_http_client(&UserAgentConfig::default(), Duration::from_millis(500)).unwrap();
        let renderer =
            HttpRenderer::new(client, VisibilityRules::default()).with_decorator(Arc::new(Tagging));

        let url = Url::parse("http://127.0.0.1:9/shop/c?page=1").unwrap();
        let err = match renderer.load_page(&url).await {
            Ok(_) => panic!("port 9 should refuse connections"),
            Err(e) => e,
        };
        assert!(err.is_retryable());
    }
}
