//! Pagination discovery
//!
//! Catalog pagination is not known in advance. Every catalog page proposes
//! the page numbers its pagination widget shows, plus one page past the
//! highest known page when an enabled "next" affordance is present. The
//! frontier absorbs pages it has already seen, so discovery stops on its own
//! once the last page shows no further numbers and no enabled "next".

use crate::config::SelectorConfig;
use crate::record::CatalogPageRef;
use crate::render::{Page, RenderResult};
use crate::url::{page_number, with_page_number};

/// What a catalog page revealed about pagination
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationOutcome {
    pub current_page: u32,
    /// Distinct page numbers shown by the widget, in display order
    pub visible_pages: Vec<u32>,
    pub next_enabled: bool,
    /// Catalog pages to offer to the frontier
    pub candidates: Vec<CatalogPageRef>,
}

impl PaginationOutcome {
    /// The page computed from the "next" affordance, if any
    pub fn next_page(&self) -> Option<u32> {
        if !self.next_enabled {
            return None;
        }
        let highest = self
            .visible_pages
            .iter()
            .copied()
            .max()
            .unwrap_or(self.current_page)
            .max(self.current_page);
        // No page lies past the largest representable number
        highest.checked_add(1)
    }
}

/// Infers the catalog pages reachable from a rendered catalog page
///
/// Never fails: a pagination widget that has not rendered yet, or a query
/// that errors, is logged and yields fewer candidates.
pub async fn discover_pages(
    page: &dyn Page,
    selectors: &SelectorConfig,
    page_param: &str,
) -> PaginationOutcome {
    let url = page.url().clone();
    let mut outcome = PaginationOutcome {
        current_page: page_number(&url, page_param),
        ..Default::default()
    };

    match visible_page_numbers(page, &selectors.pagination_pages).await {
        Ok(pages) => outcome.visible_pages = pages,
        Err(e) => tracing::warn!("Could not read page numbers on {}: {}", url, e),
    }

    match has_enabled_next(page, &selectors.pagination_next).await {
        Ok(enabled) => outcome.next_enabled = enabled,
        Err(e) => tracing::warn!("Could not probe next page on {}: {}", url, e),
    }

    let mut numbers = outcome.visible_pages.clone();
    if let Some(next) = outcome.next_page() {
        if !numbers.contains(&next) {
            numbers.push(next);
        }
    }

    outcome.candidates = numbers
        .into_iter()
        .map(|n| CatalogPageRef {
            url: with_page_number(&url, page_param, n).to_string(),
            inferred_page_number: n,
        })
        .collect();

    tracing::debug!(
        "Pagination on {} (page {}): visible {:?}, next enabled: {}",
        url,
        outcome.current_page,
        outcome.visible_pages,
        outcome.next_enabled
    );

    outcome
}

async fn visible_page_numbers(page: &dyn Page, selector: &str) -> RenderResult<Vec<u32>> {
    let mut numbers = Vec::new();

    for element in page.query_all(selector).await? {
        if !page.is_visible(element).await? {
            continue;
        }
        let text = page.text(element).await?;
        if let Ok(n) = text.trim().parse::<u32>() {
            if n > 0 && !numbers.contains(&n) {
                numbers.push(n);
            }
        }
    }

    Ok(numbers)
}

async fn has_enabled_next(page: &dyn Page, selector: &str) -> RenderResult<bool> {
    for element in page.query_all(selector).await? {
        if page.is_visible(element).await? {
            return Ok(true);
        }
    }
    Ok(false)
}
