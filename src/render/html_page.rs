//! Snapshot engine shared by the renderers
//!
//! An `HtmlPage` owns the current markup of a page and answers queries
//! against a scraper document parsed from it. The document is parsed once
//! per markup version and reparsed only after a click swaps the markup.
//! Borrows of it are confined to synchronous helpers and never live across
//! an await point.

use crate::config::CaptureConfig;
use crate::render::{ElementHandle, Page, RenderError, RenderResult};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use url::Url;

/// Clicking an element carrying this attribute (or inside one) swaps the
/// page markup to the named state, when the page knows that state
pub const FIXTURE_STATE_ATTRIBUTE: &str = "data-fixture-state";

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How computed visibility is decided
#[derive(Debug, Clone)]
pub struct VisibilityRules {
    /// Effective opacity below this counts as invisible
    pub min_opacity: f32,
    /// Classes that hide an element and its subtree
    pub hidden_classes: Vec<String>,
}

impl Default for VisibilityRules {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

impl From<&CaptureConfig> for VisibilityRules {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            min_opacity: config.min_opacity,
            hidden_classes: config.hidden_classes.clone(),
        }
    }
}

/// A page whose DOM is a markup snapshot
pub struct HtmlPage {
    url: Url,
    markup: RwLock<String>,
    /// Parsed form of `markup`, dropped whenever the markup changes
    document: Mutex<Option<Html>>,
    parses: AtomicUsize,
    states: HashMap<String, String>,
    rules: VisibilityRules,
}

fn poisoned<T>(_: T) -> RenderError {
    RenderError::Interaction("page markup lock poisoned".to_string())
}

impl HtmlPage {
    pub fn new(url: Url, markup: impl Into<String>, rules: VisibilityRules) -> Self {
        Self {
            url,
            markup: RwLock::new(markup.into()),
            document: Mutex::new(None),
            parses: AtomicUsize::new(0),
            states: HashMap::new(),
            rules,
        }
    }

    /// Registers the alternative markups clicks may switch to
    pub fn with_states(mut self, states: HashMap<String, String>) -> Self {
        self.states = states;
        self
    }

    /// Returns the current markup
    pub fn markup(&self) -> RenderResult<String> {
        self.markup
            .read()
            .map(|markup| markup.clone())
            .map_err(poisoned)
    }

    /// Number of times the markup has been parsed
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::Relaxed)
    }

    fn cached_document(&self) -> RenderResult<MutexGuard<'_, Option<Html>>> {
        self.document.lock().map_err(poisoned)
    }

    /// Runs `f` against the parsed current markup, parsing it if needed
    fn read<T>(&self, f: impl FnOnce(&Html) -> RenderResult<T>) -> RenderResult<T> {
        let mut cached = self.cached_document()?;
        if cached.is_none() {
            let markup = self.markup.read().map_err(poisoned)?;
            let parses = self.parses.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::trace!("Parsing {} ({} bytes, parse #{})", self.url, markup.len(), parses);
            *cached = Some(Html::parse_document(&markup));
        }

        match cached.as_ref() {
            Some(document) => f(document),
            None => Err(RenderError::Interaction(format!(
                "no document for {}",
                self.url
            ))),
        }
    }

    fn find_first(&self, selectors: &str, require_visible: bool) -> RenderResult<Option<ElementHandle>> {
        let selector = parse_selector(selectors)?;
        let rules = &self.rules;
        self.read(|document| {
            let matched = document
                .select(&selector)
                .filter(|el| !require_visible || is_element_visible(*el, rules));
            Ok(handles_of(document, matched)?.into_iter().next())
        })
    }
}

#[async_trait]
impl Page for HtmlPage {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn wait_for_selector(
        &self,
        selectors: &str,
        timeout: Duration,
        require_visible: bool,
    ) -> RenderResult<ElementHandle> {
        let started = Instant::now();

        loop {
            if let Some(handle) = self.find_first(selectors, require_visible)? {
                return Ok(handle);
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(RenderError::Timeout {
                    selector: selectors.to_string(),
                    waited_ms: elapsed.as_millis() as u64,
                });
            }

            tokio::time::sleep((timeout - elapsed).min(POLL_INTERVAL)).await;
        }
    }

    async fn query_all(&self, selector: &str) -> RenderResult<Vec<ElementHandle>> {
        let selector = parse_selector(selector)?;
        self.read(|document| handles_of(document, document.select(&selector)))
    }

    async fn query_within(
        &self,
        scope: ElementHandle,
        selector: &str,
    ) -> RenderResult<Vec<ElementHandle>> {
        let selector = parse_selector(selector)?;
        self.read(|document| {
            let scope = element_at(document, scope)?;
            handles_of(document, scope.select(&selector))
        })
    }

    async fn attribute(&self, element: ElementHandle, name: &str) -> RenderResult<Option<String>> {
        self.read(|document| {
            let element = element_at(document, element)?;
            Ok(element.value().attr(name).map(str::to_string))
        })
    }

    async fn text(&self, element: ElementHandle) -> RenderResult<String> {
        self.read(|document| {
            let element = element_at(document, element)?;
            let text = element.text().collect::<Vec<_>>().join(" ");
            Ok(text.split_whitespace().collect::<Vec<_>>().join(" "))
        })
    }

    async fn is_visible(&self, element: ElementHandle) -> RenderResult<bool> {
        let rules = &self.rules;
        self.read(|document| Ok(is_element_visible(element_at(document, element)?, rules)))
    }

    async fn click(&self, element: ElementHandle) -> RenderResult<()> {
        let target_state = self.read(|document| {
            let element = element_at(document, element)?;
            Ok(ancestors(element).find_map(|node| {
                node.value()
                    .attr(FIXTURE_STATE_ATTRIBUTE)
                    .map(str::to_string)
            }))
        })?;

        let Some(name) = target_state else {
            tracing::trace!("Click on {} changed nothing", self.url);
            return Ok(());
        };

        match self.states.get(&name) {
            Some(next) => {
                *self.markup.write().map_err(poisoned)? = next.clone();
                *self.cached_document()? = None;
                tracing::trace!("Click on {} switched to state '{}'", self.url, name);
                Ok(())
            }
            None => Err(RenderError::Interaction(format!(
                "unknown page state '{}'",
                name
            ))),
        }
    }

    async fn scroll_into_view(&self, element: ElementHandle) -> RenderResult<()> {
        self.read(|document| element_at(document, element).map(|_| ()))
    }
}

/// Parses a CSS selector, mapping the error into a render error
pub fn parse_selector(selector: &str) -> RenderResult<Selector> {
    Selector::parse(selector)
        .map_err(|e| RenderError::Selector(format!("'{}': {:?}", selector, e)))
}

fn all_elements() -> RenderResult<Selector> {
    parse_selector("*")
}

fn element_at(document: &Html, handle: ElementHandle) -> RenderResult<ElementRef<'_>> {
    let all = all_elements()?;
    let found = document.select(&all).nth(handle.0);
    found.ok_or_else(|| RenderError::ElementNotFound(format!("element #{}", handle.0)))
}

/// Converts matched elements into document-order handles
fn handles_of<'a>(
    document: &'a Html,
    matched: impl Iterator<Item = ElementRef<'a>>,
) -> RenderResult<Vec<ElementHandle>> {
    let ids: HashSet<_> = matched.map(|el| el.id()).collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let all = all_elements()?;
    let handles = document
        .select(&all)
        .enumerate()
        .filter(|(_, el)| ids.contains(&el.id()))
        .map(|(index, _)| ElementHandle(index))
        .collect();
    Ok(handles)
}

fn ancestors(element: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    std::iter::successors(Some(element), |el| el.parent().and_then(ElementRef::wrap))
}

fn style_declarations(style: &str) -> impl Iterator<Item = (String, String)> + '_ {
    style.split(';').filter_map(|declaration| {
        let (property, value) = declaration.split_once(':')?;
        Some((
            property.trim().to_ascii_lowercase(),
            value.trim().to_ascii_lowercase(),
        ))
    })
}

/// Decides whether an element is rendered visibly
///
/// An element is hidden if it or any ancestor has `display: none`, the
/// `hidden` attribute, or one of the configured hide classes. The nearest
/// `visibility` declaration wins, and opacity multiplies down the tree.
pub fn is_element_visible(element: ElementRef<'_>, rules: &VisibilityRules) -> bool {
    let mut opacity = 1.0_f32;
    let mut visibility_decided = false;

    for node in ancestors(element) {
        let value = node.value();

        if value.attr("hidden").is_some() {
            return false;
        }

        if value
            .classes()
            .any(|class| rules.hidden_classes.iter().any(|hidden| hidden == class))
        {
            return false;
        }

        let Some(style) = value.attr("style") else {
            continue;
        };

        for (property, declared) in style_declarations(style) {
            let declared = declared.trim_end_matches("!important").trim();
            match property.as_str() {
                "display" if declared == "none" => return false,
                "visibility" if !visibility_decided => {
                    visibility_decided = true;
                    if declared == "hidden" || declared == "collapse" {
                        return false;
                    }
                }
                "opacity" => {
                    if let Ok(parsed) = declared.parse::<f32>() {
                        opacity *= parsed.clamp(0.0, 1.0);
                    }
                }
                _ => {}
            }
        }
    }

    opacity >= rules.min_opacity
}
