//! Variant walker
//!
//! For each declared color the walker selects the matching color option,
//! waits for the gallery to re-render, and captures it:
//!
//! ```text
//! Idle -> SelectingVariant -> AwaitingRender -> CapturingImages
//!      -> Recorded | EmptyCapture -> (next color) ... -> Done
//! ```
//!
//! Every color is attempted independently. A missing option, a failed click
//! or a failed capture degrades that color to `EmptyCapture` and the walk
//! moves on. If no color yielded images, one default capture runs without
//! any selection.

use crate::config::{SelectorConfig, TimingConfig};
use crate::extract::GalleryCapture;
use crate::record::{ColorVariant, DEFAULT_COLOR_KEY};
use crate::render::{ElementHandle, Page, RenderError, RenderResult};

/// States of the variant walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantState {
    Idle,
    SelectingVariant(String),
    AwaitingRender(String),
    CapturingImages(String),
    Recorded(String),
    EmptyCapture(String),
    Done,
}

/// Summary of one walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    /// Every state entered, in order
    pub states: Vec<VariantState>,
    /// Colors that yielded at least one image
    pub recorded: Vec<String>,
    /// Colors that yielded nothing
    pub empty: Vec<String>,
    /// Key the default pass assigned images to, if it ran and found any
    pub default_key: Option<String>,
}

impl WalkReport {
    fn enter(&mut self, state: VariantState) {
        tracing::trace!("Variant walk: {:?}", state);
        self.states.push(state);
    }
}

/// Drives color selection and gallery capture on a product page
#[derive(Debug, Clone)]
pub struct VariantWalker {
    color_option: String,
    color_option_label: String,
    color_option_target: String,
    gallery_visible: String,
    timing: TimingConfig,
    gallery: GalleryCapture,
}

impl VariantWalker {
    pub fn new(selectors: &SelectorConfig, timing: TimingConfig, gallery: GalleryCapture) -> Self {
        Self {
            color_option: selectors.color_option.clone(),
            color_option_label: selectors.color_option_label.clone(),
            color_option_target: selectors.color_option_target.clone(),
            gallery_visible: selectors.gallery_visible.clone(),
            timing,
            gallery,
        }
    }

    /// Walks every declared color
    ///
    /// `on_capture` receives each color label with its non-empty image list
    /// as soon as it is captured, so images survive a later abort of the
    /// surrounding task.
    pub async fn walk<F>(
        &self,
        page: &dyn Page,
        colors: &[ColorVariant],
        mut on_capture: F,
    ) -> WalkReport
    where
        F: FnMut(&str, Vec<String>) + Send,
    {
        let mut report = WalkReport::default();
        report.enter(VariantState::Idle);

        for color in colors {
            let label = color.label.as_str();

            match self.walk_color(page, label, &mut report).await {
                Ok(images) if !images.is_empty() => {
                    tracing::debug!("{}: {} images for {}", page.url(), images.len(), label);
                    report.enter(VariantState::Recorded(label.to_string()));
                    report.recorded.push(label.to_string());
                    on_capture(label, images);
                }
                Ok(_) => {
                    tracing::debug!("{}: no visible images for {}", page.url(), label);
                    report.enter(VariantState::EmptyCapture(label.to_string()));
                    report.empty.push(label.to_string());
                }
                Err(e) => {
                    tracing::warn!("{}: color {} failed: {}", page.url(), label, e);
                    report.enter(VariantState::EmptyCapture(label.to_string()));
                    report.empty.push(label.to_string());
                }
            }
        }

        if report.recorded.is_empty() {
            self.default_pass(page, colors, &mut report, &mut on_capture)
                .await;
        }

        report.enter(VariantState::Done);
        report
    }

    /// Selects one color and captures its gallery
    async fn walk_color(
        &self,
        page: &dyn Page,
        label: &str,
        report: &mut WalkReport,
    ) -> RenderResult<Vec<String>> {
        report.enter(VariantState::SelectingVariant(label.to_string()));

        let option = self
            .find_option(page, label)
            .await?
            .ok_or_else(|| RenderError::ElementNotFound(format!("color option '{}'", label)))?;

        page.scroll_into_view(option).await?;
        page.settle(self.timing.scroll_settle()).await;

        // Click the most specific actionable element, else the option itself
        let target = page
            .query_within(option, &self.color_option_target)
            .await?
            .into_iter()
            .next()
            .unwrap_or(option);
        page.click(target).await?;

        report.enter(VariantState::AwaitingRender(label.to_string()));
        page.settle(self.timing.variant_settle()).await;

        if let Err(e) = page
            .wait_for_selector(&self.gallery_visible, self.timing.gallery_wait(), true)
            .await
        {
            tracing::debug!("Gallery not visible after selecting {}: {}", label, e);
        }

        report.enter(VariantState::CapturingImages(label.to_string()));
        self.gallery.capture(page).await
    }

    /// Finds the color option whose label text equals `label`
    async fn find_option(&self, page: &dyn Page, label: &str) -> RenderResult<Option<ElementHandle>> {
        for option in page.query_all(&self.color_option).await? {
            let labels = match page.query_within(option, &self.color_option_label).await {
                Ok(labels) => labels,
                Err(_) => continue,
            };

            let Some(first) = labels.into_iter().next() else {
                continue;
            };

            if let Ok(text) = page.text(first).await {
                if text.trim() == label {
                    return Ok(Some(option));
                }
            }
        }

        Ok(None)
    }

    /// Captures whatever gallery is shown, without selecting a color
    async fn default_pass<F>(
        &self,
        page: &dyn Page,
        colors: &[ColorVariant],
        report: &mut WalkReport,
        on_capture: &mut F,
    ) where
        F: FnMut(&str, Vec<String>) + Send,
    {
        let key = colors
            .first()
            .map(|c| c.label.clone())
            .unwrap_or_else(|| DEFAULT_COLOR_KEY.to_string());

        report.enter(VariantState::CapturingImages(key.clone()));
        match self.gallery.capture(page).await {
            Ok(images) if !images.is_empty() => {
                tracing::debug!("{}: default capture found {} images", page.url(), images.len());
                report.enter(VariantState::Recorded(key.clone()));
                report.default_key = Some(key.clone());
                on_capture(&key, images);
            }
            Ok(_) => {
                report.enter(VariantState::EmptyCapture(key));
            }
            Err(e) => {
                tracing::warn!("{}: default capture failed: {}", page.url(), e);
                report.enter(VariantState::EmptyCapture(key));
            }
        }
    }
}
