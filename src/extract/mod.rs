//! Extraction from rendered pages
//!
//! - [`links`]: product URLs on a catalog page
//! - [`pagination`]: further catalog pages reachable from a catalog page
//! - [`fields`]: scalar product fields through fallback chains
//! - [`gallery`]: visible images of the product gallery
//! - [`variants`]: the per-color selection and capture walk

pub mod fields;
pub mod gallery;
pub mod links;
pub mod pagination;
pub mod variants;

pub use fields::{normalize_sizes, FieldChain, FieldExtractor, FieldStrategy, StepOutcome};
pub use gallery::GalleryCapture;
pub use links::extract_product_links;
pub use pagination::{discover_pages, PaginationOutcome};
pub use variants::{VariantState, VariantWalker, WalkReport};
