//! Product page task
//!
//! Each attempt builds a draft record incrementally: scalar fields first,
//! then one gallery per color as the variant walk captures it. When the
//! retry budget runs out, whatever the last attempt drafted is emitted as a
//! partial record annotated with the error.

use crate::config::{SelectorConfig, TimingConfig};
use crate::crawler::{Phase, PhaseWorker, TaskFailure, TaskSuccess};
use crate::extract::{FieldExtractor, VariantWalker};
use crate::frontier::VisitedRegistry;
use crate::output::RecordSink;
use crate::record::{ColorVariant, ProductRecord};
use crate::render::{Page, Renderer};
use crate::storage::{QueueEntry, QueueKind};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

type Draft = Arc<Mutex<ProductRecord>>;

fn with_draft<R>(draft: &Draft, f: impl FnOnce(&mut ProductRecord) -> R) -> R {
    let mut record = draft.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut record)
}

/// Global cap on the number of product records
///
/// A slot is reserved when a product task is admitted and released when the
/// attempt is returned to the queue for a retry. Terminal outcomes keep their
/// slot, since they emit a record too.
#[derive(Debug)]
pub struct ProductLimit {
    max: Option<usize>,
    reserved: AtomicUsize,
    announced: AtomicBool,
}

impl ProductLimit {
    /// Creates a limit with `already_recorded` slots taken by earlier runs
    pub fn new(max: Option<usize>, already_recorded: usize) -> Self {
        Self {
            max,
            reserved: AtomicUsize::new(already_recorded),
            announced: AtomicBool::new(false),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None, 0)
    }

    /// Takes a slot, returning false once the cap is reached
    pub fn try_reserve(&self) -> bool {
        let Some(max) = self.max else {
            return true;
        };

        let reserved = self
            .reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max).then_some(n + 1)
            })
            .is_ok();

        if !reserved && !self.announced.swap(true, Ordering::SeqCst) {
            tracing::info!(
                "Product limit of {} reached, remaining products are skipped",
                max
            );
        }

        reserved
    }

    /// Gives a slot back
    pub fn release(&self) {
        if self.max.is_some() {
            let _ = self
                .reserved
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        }
    }

    pub fn reserved(&self) -> usize {
        self.reserved.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }
}

/// Phase 2 worker: extracts one record per product URL
pub struct ProductWorker {
    renderer: Arc<dyn Renderer>,
    sink: Arc<dyn RecordSink>,
    fields: FieldExtractor,
    walker: VariantWalker,
    product_ready: String,
    timing: TimingConfig,
    limit: ProductLimit,
    drafts: Mutex<HashMap<String, Draft>>,
    emitted: VisitedRegistry,
}

impl ProductWorker {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        sink: Arc<dyn RecordSink>,
        fields: FieldExtractor,
        walker: VariantWalker,
        selectors: &SelectorConfig,
        timing: TimingConfig,
        limit: ProductLimit,
    ) -> Self {
        Self {
            renderer,
            sink,
            fields,
            walker,
            product_ready: selectors.product_ready.clone(),
            timing,
            limit,
            drafts: Mutex::new(HashMap::new()),
            emitted: VisitedRegistry::new("emitted"),
        }
    }

    pub fn limit(&self) -> &ProductLimit {
        &self.limit
    }

    /// Starts a fresh draft for an attempt, replacing any earlier one
    fn begin_draft(&self, url: &str) -> Draft {
        let draft = Arc::new(Mutex::new(ProductRecord::new(url)));
        self.drafts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), Arc::clone(&draft));
        draft
    }

    /// Removes the draft for a URL and returns a snapshot of it
    fn take_draft(&self, url: &str) -> Option<ProductRecord> {
        let draft = self
            .drafts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url)?;
        Some(with_draft(&draft, |record| record.clone()))
    }

    fn discard_draft(&self, url: &str) {
        self.drafts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
    }

    /// Writes a record to the sink, at most once per URL
    ///
    /// Returns the number of records written (0 or 1).
    fn emit(&self, record: &ProductRecord) -> usize {
        if !self.emitted.mark(&record.source_url) {
            tracing::warn!(
                "A record for {} was already emitted, dropping the new one",
                record.source_url
            );
            return 0;
        }

        match self.sink.emit(record) {
            Ok(true) => 1,
            Ok(false) => 0,
            Err(e) => {
                tracing::error!(
                    "Record for {} could not be persisted and is lost: {}",
                    record.source_url,
                    e
                );
                0
            }
        }
    }

    /// Runs the field extractor, writing each field into the draft as soon
    /// as it resolves
    async fn extract_fields(&self, page: &dyn Page, draft: &Draft) -> Vec<ColorVariant> {
        let identifier = self.fields.identifier(page).await;
        with_draft(draft, |record| record.identifier = identifier);

        let name = self.fields.name(page).await;
        with_draft(draft, |record| record.name = name);

        let category = self.fields.category(page).await;
        with_draft(draft, |record| record.category = category);

        let sizes = self.fields.sizes(page).await;
        with_draft(draft, |record| record.sizes = sizes);

        let colors = self.fields.colors(page).await;
        let labels: Vec<String> = colors.iter().map(|c| c.label.clone()).collect();
        with_draft(draft, |record| record.colors = labels);

        colors
    }
}

#[async_trait]
impl PhaseWorker for ProductWorker {
    fn phase(&self) -> Phase {
        Phase::Product
    }

    fn queue(&self) -> QueueKind {
        QueueKind::Product
    }

    fn admit(&self, _entry: &QueueEntry) -> bool {
        self.limit.try_reserve()
    }

    async fn process(&self, entry: &QueueEntry) -> Result<TaskSuccess, TaskFailure> {
        let draft = self.begin_draft(&entry.url);
        let url = Url::parse(&entry.url)
            .map_err(|e| TaskFailure::fatal(format!("Invalid product URL: {}", e)))?;

        match self.limit.max() {
            Some(max) => tracing::info!(
                "Processing product {} ({}/{})",
                entry.url,
                self.limit.reserved(),
                max
            ),
            None => tracing::info!("Processing product {}", entry.url),
        }

        let page = self.renderer.load_page(&url).await?;
        page.wait_for_selector(&self.product_ready, self.timing.page_ready_timeout(), false)
            .await?;
        page.settle(self.timing.product_settle()).await;

        let colors = self.extract_fields(page.as_ref(), &draft).await;

        let capture_target = Arc::clone(&draft);
        let report = self
            .walker
            .walk(page.as_ref(), &colors, move |color, images| {
                with_draft(&capture_target, |record| {
                    record.color_images.insert(color.to_string(), images);
                });
            })
            .await;

        let mut record = self
            .take_draft(&entry.url)
            .unwrap_or_else(|| with_draft(&draft, |record| record.clone()));
        record.captured_at = Utc::now();

        tracing::info!(
            "Extracted {} - {} ({} colors, {} with images, {} images)",
            record.identifier.as_deref().unwrap_or("?"),
            record.name.as_deref().unwrap_or("?"),
            record.colors.len(),
            report.recorded.len() + usize::from(report.default_key.is_some()),
            record.image_count()
        );

        Ok(TaskSuccess {
            enqueued: 0,
            emitted: self.emit(&record),
        })
    }

    fn on_retry(&self, entry: &QueueEntry) {
        self.limit.release();
        // The next attempt starts a fresh draft, and may never run if the cap is reached
        self.discard_draft(&entry.url);
    }

    fn on_terminal_failure(&self, entry: &QueueEntry, failure: &TaskFailure) -> usize {
        let record = self
            .take_draft(&entry.url)
            .unwrap_or_else(|| ProductRecord::new(entry.url.as_str()))
            .into_partial(failure.message.as_str());

        tracing::warn!(
            "Emitting partial record for {} ({} fields captured)",
            entry.url,
            [
                record.identifier.is_some(),
                record.name.is_some(),
                record.category.is_some(),
                !record.sizes.is_empty(),
                !record.colors.is_empty(),
            ]
            .iter()
            .filter(|captured| **captured)
            .count()
        );

        self.emit(&record)
    }
}
