//! In-memory renderer for offline replay
//!
//! Each fixture page has a base markup plus optional named states. Elements
//! marked with `data-fixture-state="<name>"` switch the page to that state
//! when clicked, which is enough to replay variant galleries that a
//! client-side framework swaps in and out.

use crate::render::{HtmlPage, Page, RenderError, RenderResult, Renderer, VisibilityRules};
use crate::url::normalize_url;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default)]
struct FixturePage {
    markup: String,
    states: HashMap<String, String>,
    /// Loads that fail before the page is served
    failures: u32,
    delay: Duration,
}

/// Renderer backed by in-memory markup
pub struct FixtureRenderer {
    pages: HashMap<String, FixturePage>,
    rules: VisibilityRules,
    loads: Mutex<HashMap<String, u32>>,
}

fn fixture_key(url: &str) -> String {
    normalize_url(url)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl FixtureRenderer {
    pub fn new(rules: VisibilityRules) -> Self {
        Self {
            pages: HashMap::new(),
            rules,
            loads: Mutex::new(HashMap::new()),
        }
    }

    fn page_mut(&mut self, url: &str) -> &mut FixturePage {
        self.pages.entry(fixture_key(url)).or_default()
    }

    /// Serves `markup` for `url`
    pub fn with_page(mut self, url: &str, markup: impl Into<String>) -> Self {
        self.page_mut(url).markup = markup.into();
        self
    }

    /// Adds a named state clicks on `url` may switch to
    pub fn with_state(mut self, url: &str, name: &str, markup: impl Into<String>) -> Self {
        self.page_mut(url)
            .states
            .insert(name.to_string(), markup.into());
        self
    }

    /// Makes the first `times` loads of `url` fail with a navigation error
    pub fn failing_first(mut self, url: &str, times: u32) -> Self {
        self.page_mut(url).failures = times;
        self
    }

    /// Delays every load of `url`
    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        self.page_mut(url).delay = delay;
        self
    }

    /// Returns how many times `url` was loaded
    pub fn load_count(&self, url: &str) -> u32 {
        self.loads
            .lock()
            .map(|loads| loads.get(&fixture_key(url)).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Returns the number of loads across all pages
    pub fn total_loads(&self) -> u32 {
        self.loads
            .lock()
            .map(|loads| loads.values().sum())
            .unwrap_or(0)
    }

    fn record_load(&self, key: &str) -> RenderResult<u32> {
        let mut loads = self
            .loads
            .lock()
            .map_err(|_| RenderError::Interaction("fixture load counter poisoned".to_string()))?;
        let count = loads.entry(key.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}

#[async_trait]
impl Renderer for FixtureRenderer {
    async fn load_page(&self, url: &Url) -> RenderResult<Box<dyn Page>> {
        let key = fixture_key(url.as_str());
        let attempt = self.record_load(&key)?;

        let fixture = self.pages.get(&key).ok_or_else(|| RenderError::Navigation {
            url: url.to_string(),
            message: "HTTP 404".to_string(),
        })?;

        if !fixture.delay.is_zero() {
            tokio::time::sleep(fixture.delay).await;
        }

        if attempt <= fixture.failures {
            return Err(RenderError::Navigation {
                url: url.to_string(),
                message: format!("simulated failure {} of {}", attempt, fixture.failures),
            });
        }

        let page = HtmlPage::new(url.clone(), fixture.markup.clone(), self.rules.clone())
            .with_states(fixture.states.clone());
        Ok(Box::new(page))
    }
}
