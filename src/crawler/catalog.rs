//! Catalog page task
//!
//! Renders a catalog page, feeds its product links to the product queue and
//! its pagination candidates back into the catalog queue.

use crate::config::{SelectorConfig, SiteConfig, TimingConfig};
use crate::crawler::{Phase, PhaseWorker, TaskFailure, TaskSuccess};
use crate::extract::{discover_pages, extract_product_links};
use crate::frontier::Frontier;
use crate::render::Renderer;
use crate::storage::{QueueEntry, QueueKind, StorageError};
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

/// Phase 1 worker
pub struct CatalogWorker {
    renderer: Arc<dyn Renderer>,
    frontier: Arc<Frontier>,
    selectors: SelectorConfig,
    timing: TimingConfig,
    origin: Url,
    page_param: String,
    product_path: String,
}

fn storage_failure(e: StorageError) -> TaskFailure {
    TaskFailure::retryable(format!("Storage error: {}", e))
}

impl CatalogWorker {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        frontier: Arc<Frontier>,
        site: &SiteConfig,
        selectors: SelectorConfig,
        timing: TimingConfig,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            renderer,
            frontier,
            selectors,
            timing,
            origin: Url::parse(&site.origin)?,
            page_param: site.page_param.clone(),
            product_path: site.product_path.clone(),
        })
    }
}

#[async_trait]
impl PhaseWorker for CatalogWorker {
    fn phase(&self) -> Phase {
        Phase::Catalog
    }

    fn queue(&self) -> QueueKind {
        QueueKind::Catalog
    }

    async fn process(&self, entry: &QueueEntry) -> Result<TaskSuccess, TaskFailure> {
        let url = Url::parse(&entry.url)
            .map_err(|e| TaskFailure::fatal(format!("Invalid catalog URL: {}", e)))?;

        tracing::info!("Processing catalog page {}", entry.url);
        let page = self.renderer.load_page(&url).await?;

        // A catalog page may legitimately render without listings
        if let Err(e) = page
            .wait_for_selector(
                &self.selectors.catalog_ready,
                self.timing.page_ready_timeout(),
                false,
            )
            .await
        {
            tracing::warn!("{} never became ready, extracting anyway: {}", entry.url, e);
        }
        page.settle(self.timing.catalog_settle()).await;

        let products =
            extract_product_links(page.as_ref(), &self.selectors, &self.origin, &self.product_path)
                .await;

        let mut new_products = 0;
        for product in &products {
            if self
                .frontier
                .enqueue(
                    QueueKind::Product,
                    &product.url,
                    Some(&product.source_catalog_page),
                )
                .map_err(storage_failure)?
            {
                new_products += 1;
            }
        }

        let pagination = discover_pages(page.as_ref(), &self.selectors, &self.page_param).await;

        let mut new_pages = 0;
        for candidate in &pagination.candidates {
            if self
                .frontier
                .enqueue(QueueKind::Catalog, &candidate.url, Some(&entry.url))
                .map_err(storage_failure)?
            {
                new_pages += 1;
            }
        }

        tracing::info!(
            "Catalog page {} (page {}): {} product links ({} new), {} new catalog pages",
            entry.url,
            pagination.current_page,
            products.len(),
            new_products,
            new_pages
        );

        Ok(TaskSuccess {
            enqueued: new_products + new_pages,
            emitted: 0,
        })
    }

    fn on_terminal_failure(&self, entry: &QueueEntry, failure: &TaskFailure) -> usize {
        tracing::error!("Abandoning catalog page {}: {}", entry.url, failure);
        0
    }
}
