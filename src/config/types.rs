use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Variant-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub site: SiteConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub selectors: SelectorConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Worker pool and retry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Concurrent catalog page tasks during phase 1
    #[serde(default = "default_catalog_concurrency")]
    pub catalog_concurrency: u32,

    /// Concurrent product page tasks during phase 2
    #[serde(default = "default_product_concurrency")]
    pub product_concurrency: u32,

    /// How many times a failing task is requeued before it is terminal
    #[serde(default = "default_max_request_retries")]
    pub max_request_retries: u32,

    /// Wall-clock budget for a single page task (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Stop processing product pages after this many records
    #[serde(default)]
    pub max_products: Option<usize>,
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            catalog_concurrency: default_catalog_concurrency(),
            product_concurrency: default_product_concurrency(),
            max_request_retries: default_max_request_retries(),
            request_timeout_secs: default_request_timeout_secs(),
            max_products: None,
        }
    }
}

/// The site being harvested
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteConfig {
    /// Scheme and host used to absolutize relative references
    pub origin: String,

    /// Catalog URLs that seed phase 1
    pub start_urls: Vec<String>,

    /// Query parameter carrying the catalog page index
    #[serde(default = "default_page_param")]
    pub page_param: String,

    /// Path fragment every product URL contains
    #[serde(default = "default_product_path")]
    pub product_path: String,
}

/// Bounded waits, all in milliseconds
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TimingConfig {
    /// Wait for the page's readiness selectors after navigation
    pub page_ready_timeout: u64,

    /// Pause after a catalog page is ready, for client-side rendering
    pub catalog_settle: u64,

    /// Pause after a product page is ready, for client-side rendering
    pub product_settle: u64,

    /// Pause after scrolling a color option into view
    pub scroll_settle: u64,

    /// Pause after activating a color option
    pub variant_settle: u64,

    /// Wait for a visible gallery after activating a color option
    pub gallery_wait: u64,
}

impl TimingConfig {
    pub fn page_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.page_ready_timeout)
    }

    pub fn catalog_settle(&self) -> Duration {
        Duration::from_millis(self.catalog_settle)
    }

    pub fn product_settle(&self) -> Duration {
        Duration::from_millis(self.product_settle)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle)
    }

    pub fn variant_settle(&self) -> Duration {
        Duration::from_millis(self.variant_settle)
    }

    pub fn gallery_wait(&self) -> Duration {
        Duration::from_millis(self.gallery_wait)
    }

    /// Zero-length waits, for replaying fixtures
    pub fn immediate() -> Self {
        Self {
            page_ready_timeout: 50,
            catalog_settle: 0,
            product_settle: 0,
            scroll_settle: 0,
            variant_settle: 0,
            gallery_wait: 50,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            page_ready_timeout: 30_000,
            catalog_settle: 3_000,
            product_settle: 2_000,
            scroll_settle: 500,
            variant_settle: 3_000,
            gallery_wait: 5_000,
        }
    }
}

/// Which gallery containers an image capture may read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureScope {
    /// Only the first gallery container, and only if it is visible
    Strict,
    /// Every visible gallery container on the page
    AllVisible,
}

/// Gallery capture tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CaptureConfig {
    pub scope: CaptureScope,

    /// An image URL is kept only if it contains one of these (empty keeps all)
    pub image_keywords: Vec<String>,

    /// Elements with an effective opacity below this are invisible
    pub min_opacity: f32,

    /// Classes the rendering framework uses to hide elements
    pub hidden_classes: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            scope: CaptureScope::Strict,
            image_keywords: vec!["product".to_string(), "cdn".to_string()],
            min_opacity: 0.1,
            hidden_classes: vec!["ng-hide".to_string()],
        }
    }
}

/// CSS selectors and patterns that bind the extractors to the site's markup
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SelectorConfig {
    // ===== Catalog pages =====
    pub catalog_ready: String,
    /// Independent product link strategies, unioned in order
    pub product_links: Vec<String>,
    /// Attributes that may carry a link target
    pub link_attributes: Vec<String>,
    pub pagination_widget: String,
    pub pagination_pages: String,
    pub pagination_next: String,

    // ===== Product pages =====
    pub product_ready: String,
    pub identifier: String,
    pub identifier_pattern: String,
    pub url_identifier_pattern: String,
    /// Name strategies, tried in order
    pub name: Vec<String>,
    pub category: String,
    pub category_pattern: String,
    pub sizes: String,
    pub color_labels: String,

    // ===== Variant interaction =====
    pub color_option: String,
    pub color_option_label: String,
    pub color_option_target: String,
    pub gallery: String,
    pub gallery_visible: String,
    pub gallery_image: String,
    /// Attributes that may carry an image source, lazy-loading ones included
    pub image_attributes: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            catalog_ready: r#".product-listing-desc, .pagination, a[href*="/shop/p/"]"#.to_string(),
            product_links: vec![
                "a.product-listing-desc".to_string(),
                r#"a[href*="/shop/p/"]"#.to_string(),
                r#"a[ng-href*="/shop/p/"]"#.to_string(),
                ".product-listing-desc a".to_string(),
                ".product-item a".to_string(),
                r#"a[href^="/shop/p/"]"#.to_string(),
            ],
            link_attributes: vec!["href".to_string(), "ng-href".to_string()],
            pagination_widget: ".pagination".to_string(),
            pagination_pages: "li.pagination-page a".to_string(),
            pagination_next: "li.pagination-next:not(.disabled)".to_string(),

            product_ready: ".style-number-font, format-text".to_string(),
            identifier: ".style-number-font".to_string(),
            identifier_pattern: r"Style:\s*(\d+)".to_string(),
            url_identifier_pattern: r"/(\d+)/?$".to_string(),
            name: vec![
                r#"format-text[text="prodDetails.productNameAttribute.displayValue"]"#.to_string(),
                "format-text.ng-binding".to_string(),
                "h1, h2, h5, .product-name".to_string(),
            ],
            category: r#"a[ng-href^="c/"]"#.to_string(),
            category_pattern: r"c/([^/?#]+)".to_string(),
            sizes: ".details.sizes span.ng-binding".to_string(),
            color_labels: ".color-tooltip .color-feature-title".to_string(),

            color_option: ".color-tooltip".to_string(),
            color_option_label: ".color-feature-title".to_string(),
            color_option_target: ".pdp-colors".to_string(),
            gallery: "ul.preview-thumbnail".to_string(),
            gallery_visible: r#"ul.preview-thumbnail:not([style*="display: none"])"#.to_string(),
            gallery_image: "li.preview-image img".to_string(),
            image_attributes: vec![
                "src".to_string(),
                "data-ng-src".to_string(),
                "ng-src".to_string(),
                "data-src".to_string(),
            ],
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct UserAgentConfig {
    pub name: String,
    pub version: String,
    pub contact_url: Option<String>,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value
    pub fn header_value(&self) -> String {
        match &self.contact_url {
            Some(contact) => format!("{}/{} (+{})", self.name, self.version, contact),
            None => format!("{}/{}", self.name, self.version),
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            name: "variant-harvest".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: None,
        }
    }
}

/// Shape of the records written to the JSON lines file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordFormat {
    /// One JSON object per record, with nested colors and images
    Nested,
    /// The flat dataset row layout (joined lists, images as a JSON string)
    Flat,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database holding queues, runs and records
    pub database_path: String,

    /// Path to the JSON lines record file
    pub records_path: String,

    /// Path to the markdown summary file
    pub summary_path: String,

    #[serde(default = "default_record_format")]
    pub format: RecordFormat,
}

fn default_catalog_concurrency() -> u32 {
    5
}

fn default_product_concurrency() -> u32 {
    3
}

fn default_max_request_retries() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_product_path() -> String {
    "/shop/p/".to_string()
}

fn default_record_format() -> RecordFormat {
    RecordFormat::Nested
}
