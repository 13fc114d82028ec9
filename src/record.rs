//! Harvest data model
//!
//! Catalog and product references flow through the queues; `ProductRecord`
//! is the only entity handed to the output sink.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Key used in `color_images` when a product declares no colors
pub const DEFAULT_COLOR_KEY: &str = "Default";

/// A catalog page to visit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPageRef {
    pub url: String,
    pub inferred_page_number: u32,
}

/// A product page to visit, with the catalog page it was found on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRef {
    pub url: String,
    pub source_catalog_page: String,
}

/// A color option declared on a product page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorVariant {
    pub label: String,
}

/// The normalized output record for one product URL
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub identifier: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    /// Declared colors, in discovery order
    pub colors: Vec<String>,
    /// Deduplicated sizes, in discovery order
    pub sizes: Vec<String>,
    /// Image URLs per color label, deduplicated per color
    pub color_images: BTreeMap<String, Vec<String>>,
    pub source_url: String,
    pub captured_at: DateTime<Utc>,
    pub error_detail: Option<String>,
}

impl ProductRecord {
    /// Creates an empty record for a product URL
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            identifier: None,
            name: None,
            category: None,
            colors: Vec::new(),
            sizes: Vec::new(),
            color_images: BTreeMap::new(),
            source_url: source_url.into(),
            captured_at: Utc::now(),
            error_detail: None,
        }
    }

    /// Converts whatever was captured so far into a partial record
    ///
    /// The capture timestamp is refreshed to the moment of failure.
    pub fn into_partial(mut self, error: impl Into<String>) -> Self {
        self.captured_at = Utc::now();
        self.error_detail = Some(error.into());
        self
    }

    /// Returns true if this record was emitted after a terminal failure
    pub fn is_partial(&self) -> bool {
        self.error_detail.is_some()
    }

    /// Returns the total number of captured image URLs across all colors
    pub fn image_count(&self) -> usize {
        self.color_images.values().map(Vec::len).sum()
    }

    /// Flattens the record into the legacy dataset row layout
    pub fn to_flat_row(&self) -> FlatRecordRow {
        FlatRecordRow {
            sku: self.identifier.clone().unwrap_or_default(),
            name: self.name.clone().unwrap_or_default(),
            colors: self.colors.join(";"),
            size: self.sizes.join(";"),
            color_image: serde_json::to_string(&self.color_images)
                .unwrap_or_else(|_| "{}".to_string()),
            category: self.category.clone().unwrap_or_default(),
            url: self.source_url.clone(),
            scraped_at: self.captured_at.to_rfc3339(),
            error: self.error_detail.clone(),
        }
    }
}

/// One row of the flat dataset layout (one column per field)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatRecordRow {
    #[serde(rename = "SKU")]
    pub sku: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Colors")]
    pub colors: String,
    #[serde(rename = "Size")]
    pub size: String,
    /// The color-to-images map serialized as a JSON string
    #[serde(rename = "ColorImage")]
    pub color_image: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "ScrapedAt")]
    pub scraped_at: String,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_record_keeps_captured_fields() {
        let mut record = ProductRecord::new("https://example.com/shop/p/tee/42");
        record.identifier = Some("42".to_string());

        let partial = record.into_partial("Timed out waiting for .style-number-font");
        assert!(partial.is_partial());
        assert_eq!(partial.identifier.as_deref(), Some("42"));
        assert!(partial.name.is_none());
    }

    #[test]
    fn test_flat_row_layout() {
        let mut record = ProductRecord::new("https://example.com/shop/p/tee/42");
        record.identifier = Some("42".to_string());
        record.colors = vec!["Red".to_string(), "Blue".to_string()];
        record.sizes = vec!["S".to_string(), "M".to_string()];
        record
            .color_images
            .insert("Red".to_string(), vec!["https://cdn.example/r1.jpg".to_string()]);

        let row = record.to_flat_row();
        assert_eq!(row.sku, "42");
        assert_eq!(row.colors, "Red;Blue");
        assert_eq!(row.size, "S;M");
        assert_eq!(row.color_image, r#"{"Red":["https://cdn.example/r1.jpg"]}"#);
        assert_eq!(row.error, None);

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["URL"], "https://example.com/shop/p/tee/42");
        assert!(json.get("Error").is_none());
    }

    #[test]
    fn test_nested_serialization_uses_camel_case() {
        let record = ProductRecord::new("https://example.com/p/1");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("sourceUrl").is_some());
        assert!(json.get("colorImages").is_some());
        assert!(json["errorDetail"].is_null());
    }

    #[test]
    fn test_image_count() {
        let mut record = ProductRecord::new("https://example.com/p/1");
        record.color_images.insert(
            "Red".to_string(),
            vec!["a".to_string(), "b".to_string()],
        );
        record
            .color_images
            .insert("Blue".to_string(), vec!["c".to_string()]);
        assert_eq!(record.image_count(), 3);
    }
}
