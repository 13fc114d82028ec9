//! Product link extraction
//!
//! Each configured selector is an independent strategy. Strategies run in
//! order and their results are unioned, since the catalog may expose the same
//! product through different markup depending on load timing.

use crate::config::SelectorConfig;
use crate::record::ProductRef;
use crate::render::Page;
use crate::url::absolutize;
use std::collections::HashSet;
use url::Url;

/// Extracts the product URLs referenced on a catalog page
///
/// # Arguments
///
/// * `page` - The rendered catalog page
/// * `selectors` - Link strategies and link-bearing attributes
/// * `origin` - The site origin relative references resolve against
/// * `product_path` - Path fragment every product URL contains
///
/// # Returns
///
/// Absolute product URLs in first-seen order, each tagged with the catalog
/// page it was found on. A failing strategy is logged and skipped.
pub async fn extract_product_links(
    page: &dyn Page,
    selectors: &SelectorConfig,
    origin: &Url,
    product_path: &str,
) -> Vec<ProductRef> {
    let source = page.url().to_string();
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for strategy in &selectors.product_links {
        let elements = match page.query_all(strategy).await {
            Ok(elements) => elements,
            Err(e) => {
                tracing::warn!("Link strategy '{}' failed on {}: {}", strategy, source, e);
                continue;
            }
        };

        let before = links.len();
        for element in elements {
            for attribute in &selectors.link_attributes {
                let Ok(Some(reference)) = page.attribute(element, attribute).await else {
                    continue;
                };

                let Some(url) = absolutize(&reference, origin) else {
                    continue;
                };

                if url.contains(product_path) && seen.insert(url.clone()) {
                    links.push(ProductRef {
                        url,
                        source_catalog_page: source.clone(),
                    });
                }
            }
        }

        tracing::debug!(
            "Link strategy '{}' added {} product URLs on {}",
            strategy,
            links.len() - before,
            source
        );
    }

    if links.is_empty() {
        log_link_diagnostics(page, selectors, product_path).await;
    }

    links
}

/// Logs what the catalog page did contain when no product link was found
async fn log_link_diagnostics(page: &dyn Page, selectors: &SelectorConfig, product_path: &str) {
    let product_anchor = format!(r#"a[href*="{}"]"#, product_path);

    let anchors = page.query_all("a").await.map(|a| a.len()).unwrap_or(0);
    let product_anchors = page
        .query_all(&product_anchor)
        .await
        .map(|a| a.len())
        .unwrap_or(0);
    let pagination = page
        .query_all(&selectors.pagination_widget)
        .await
        .map(|p| p.len())
        .unwrap_or(0);

    tracing::warn!(
        "No product links on {}: {} anchors, {} matching '{}', {} pagination widgets",
        page.url(),
        anchors,
        product_anchors,
        product_path,
        pagination
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{HtmlPage, VisibilityRules};

    fn catalog(markup: &str) -> HtmlPage {
        HtmlPage::new(
            Url::parse("https://shop.example/shop/c?page=1").unwrap(),
            markup,
            VisibilityRules::default(),
        )
    }

    fn origin() -> Url {
        Url::parse("https://shop.example").unwrap()
    }

    #[tokio::test]
    async fn test_strategies_are_unioned_and_deduplicated() {
        let page = catalog(
            r#"
            <a class="product-listing-desc" href="/shop/p/tee/1">Tee</a>
            <div class="product-item"><a href="https://shop.example/shop/p/hoodie/2">Hoodie</a></div>
            <a ng-href="/shop/p/cap/3"></a>
            <a href="/about">About</a>
            "#,
        );

        let links =
            extract_product_links(&page, &SelectorConfig::default(), &origin(), "/shop/p/").await;
        let urls: Vec<_> = links.iter().map(|l| l.url.as_str()).collect();

        assert_eq!(
            urls,
            vec![
                "https://shop.example/shop/p/tee/1",
                "https://shop.example/shop/p/hoodie/2",
                "https://shop.example/shop/p/cap/3",
            ]
        );
        assert!(links
            .iter()
            .all(|l| l.source_catalog_page == "https://shop.example/shop/c?page=1"));
    }

    #[tokio::test]
    async fn test_bare_relative_links_resolve_against_origin() {
        let page = catalog(r#"<div class="product-item"><a href="shop/p/tee/9">Tee</a></div>"#);
        let links =
            extract_product_links(&page, &SelectorConfig::default(), &origin(), "/shop/p/").await;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://shop.example/shop/p/tee/9");
    }

    #[tokio::test]
    async fn test_empty_catalog_yields_nothing() {
        let page = catalog(r#"<a href="/about">About</a>"#);
        let links =
            extract_product_links(&page, &SelectorConfig::default(), &origin(), "/shop/p/").await;
        assert!(links.is_empty());
    }

    #[tokio::test]
    async fn test_broken_strategy_does_not_stop_the_others() {
        let mut selectors = SelectorConfig::default();
        selectors.product_links.insert(0, "a[".to_string());

        let page = catalog(r#"<a href="/shop/p/tee/1">Tee</a>"#);
        let links = extract_product_links(&page, &selectors, &origin(), "/shop/p/").await;
        assert_eq!(links.len(), 1);
    }
}
