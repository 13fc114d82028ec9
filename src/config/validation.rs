use crate::config::types::{Config, CrawlerConfig, OutputConfig, SelectorConfig, SiteConfig};
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_site_config(&config.site)?;
    validate_selectors(&config.selectors)?;
    validate_output_config(&config.output)?;

    if !(0.0..1.0).contains(&config.capture.min_opacity) {
        return Err(ConfigError::Validation(format!(
            "min-opacity must be in [0, 1), got {}",
            config.capture.min_opacity
        )));
    }

    Ok(())
}

/// Validates worker pool configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("catalog-concurrency", config.catalog_concurrency),
        ("product-concurrency", config.product_concurrency),
    ] {
        if !(1..=64).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "{} must be between 1 and 64, got {}",
                name, value
            )));
        }
    }

    if config.max_request_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-request-retries must be <= 10, got {}",
            config.max_request_retries
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the origin and start URLs
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let origin = parse_http_url("origin", &config.origin)?;

    if config.start_urls.is_empty() {
        return Err(ConfigError::Validation(
            "start-urls must contain at least one catalog URL".to_string(),
        ));
    }

    for start in &config.start_urls {
        let url = parse_http_url("start URL", start)?;
        if url.host_str() != origin.host_str() {
            return Err(ConfigError::Validation(format!(
                "Start URL '{}' is not on the origin host '{}'",
                start,
                origin.host_str().unwrap_or_default()
            )));
        }
    }

    if config.page_param.trim().is_empty() {
        return Err(ConfigError::Validation(
            "page-param cannot be empty".to_string(),
        ));
    }

    if config.product_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "product-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Parses a URL and requires an http(s) scheme with a host
fn parse_http_url(what: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            what, value
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' has no host",
            what, value
        )));
    }

    Ok(url)
}

/// Compiles every selector and pattern so a typo fails at startup
fn validate_selectors(selectors: &SelectorConfig) -> Result<(), ConfigError> {
    let mut css: Vec<&str> = vec![
        selectors.catalog_ready.as_str(),
        selectors.pagination_widget.as_str(),
        selectors.pagination_pages.as_str(),
        selectors.pagination_next.as_str(),
        selectors.product_ready.as_str(),
        selectors.identifier.as_str(),
        selectors.category.as_str(),
        selectors.sizes.as_str(),
        selectors.color_labels.as_str(),
        selectors.color_option.as_str(),
        selectors.color_option_label.as_str(),
        selectors.color_option_target.as_str(),
        selectors.gallery.as_str(),
        selectors.gallery_visible.as_str(),
        selectors.gallery_image.as_str(),
    ];
    css.extend(selectors.product_links.iter().map(String::as_str));
    css.extend(selectors.name.iter().map(String::as_str));

    for selector in css {
        Selector::parse(selector).map_err(|e| {
            ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e))
        })?;
    }

    for pattern in [
        &selectors.identifier_pattern,
        &selectors.url_identifier_pattern,
        &selectors.category_pattern,
    ] {
        Regex::new(pattern)
            .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {}", pattern, e)))?;
    }

    if selectors.product_links.is_empty() {
        return Err(ConfigError::Validation(
            "product-links needs at least one selector".to_string(),
        ));
    }

    if selectors.image_attributes.is_empty() || selectors.link_attributes.is_empty() {
        return Err(ConfigError::Validation(
            "image-attributes and link-attributes cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("database-path", &config.database_path),
        ("records-path", &config.records_path),
        ("summary-path", &config.summary_path),
    ] {
        if value.is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::CaptureConfig;

    #[test]
    fn test_default_selectors_compile() {
        assert!(validate_selectors(&SelectorConfig::default()).is_ok());
    }

    #[test]
    fn test_broken_selector_is_rejected() {
        let mut selectors = SelectorConfig::default();
        selectors.gallery = "ul[".to_string();
        assert!(matches!(
            validate_selectors(&selectors),
            Err(ConfigError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_broken_pattern_is_rejected() {
        let mut selectors = SelectorConfig::default();
        selectors.identifier_pattern = "Style: (".to_string();
        assert!(validate_selectors(&selectors).is_err());
    }

    #[test]
    fn test_concurrency_bounds() {
        let mut crawler = CrawlerConfig::default();
        assert!(validate_crawler_config(&crawler).is_ok());

        crawler.product_concurrency = 0;
        assert!(validate_crawler_config(&crawler).is_err());

        crawler.product_concurrency = 65;
        assert!(validate_crawler_config(&crawler).is_err());
    }

    #[test]
    fn test_start_urls_must_share_origin_host() {
        let site = SiteConfig {
            origin: "https://shop.example.com".to_string(),
            start_urls: vec!["https://other.example.com/c?page=1".to_string()],
            page_param: "page".to_string(),
            product_path: "/p/".to_string(),
        };
        assert!(validate_site_config(&site).is_err());
    }

    #[test]
    fn test_start_urls_required() {
        let site = SiteConfig {
            origin: "https://shop.example.com".to_string(),
            start_urls: vec![],
            page_param: "page".to_string(),
            product_path: "/p/".to_string(),
        };
        assert!(validate_site_config(&site).is_err());
    }

    #[test]
    fn test_default_capture_opacity_is_valid() {
        let capture = CaptureConfig::default();
        assert!((0.0..1.0).contains(&capture.min_opacity));
    }
}
