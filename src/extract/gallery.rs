//! Gallery image capture
//!
//! Images are read only from the designated gallery container, never from
//! the whole document. A client-side framework keeps galleries of earlier
//! variants in the DOM (hidden), and reading outside the container would leak
//! their images into the current variant.

use crate::config::{CaptureConfig, CaptureScope, SelectorConfig};
use crate::render::{ElementHandle, Page, RenderResult};
use crate::url::absolutize;
use url::Url;

/// Reads the visible gallery images of a product page
#[derive(Debug, Clone)]
pub struct GalleryCapture {
    gallery: String,
    gallery_image: String,
    image_attributes: Vec<String>,
    scope: CaptureScope,
    image_keywords: Vec<String>,
    origin: Url,
}

impl GalleryCapture {
    pub fn new(selectors: &SelectorConfig, capture: &CaptureConfig, origin: Url) -> Self {
        Self {
            gallery: selectors.gallery.clone(),
            gallery_image: selectors.gallery_image.clone(),
            image_attributes: selectors.image_attributes.clone(),
            scope: capture.scope,
            image_keywords: capture.image_keywords.clone(),
            origin,
        }
    }

    pub fn scope(&self) -> CaptureScope {
        self.scope
    }

    /// Captures the absolute, deduplicated image URLs currently shown
    ///
    /// In strict scope only the first gallery container is read, and only if
    /// it is visible. In all-visible scope every visible container is read.
    /// Within a container, invisible images are skipped.
    pub async fn capture(&self, page: &dyn Page) -> RenderResult<Vec<String>> {
        let mut containers = page.query_all(&self.gallery).await?;
        if self.scope == CaptureScope::Strict {
            containers.truncate(1);
        }

        let mut images: Vec<String> = Vec::new();
        for container in containers {
            if !page.is_visible(container).await? {
                tracing::trace!("Gallery container on {} is hidden", page.url());
                continue;
            }

            for image in page.query_within(container, &self.gallery_image).await? {
                if !page.is_visible(image).await? {
                    continue;
                }

                let Some(source) = self.source_of(page, image).await? else {
                    continue;
                };
                let Some(url) = absolutize(&source, &self.origin) else {
                    continue;
                };

                if self.is_product_image(&url) && !images.contains(&url) {
                    images.push(url);
                }
            }
        }

        Ok(images)
    }

    /// Returns the first non-empty source attribute, lazy-loading ones included
    async fn source_of(&self, page: &dyn Page, image: ElementHandle) -> RenderResult<Option<String>> {
        for attribute in &self.image_attributes {
            if let Some(value) = page.attribute(image, attribute).await? {
                let value = value.trim();
                if !value.is_empty() {
                    return Ok(Some(value.to_string()));
                }
            }
        }
        Ok(None)
    }

    fn is_product_image(&self, url: &str) -> bool {
        self.image_keywords.is_empty()
            || self
                .image_keywords
                .iter()
                .any(|keyword| url.contains(keyword.as_str()))
    }
}
