//! Configuration module for Variant-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use variant_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Product workers: {}", config.crawler.product_concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CaptureConfig, CaptureScope, Config, CrawlerConfig, OutputConfig, RecordFormat,
    SelectorConfig, SiteConfig, TimingConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
