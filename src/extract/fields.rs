//! Field extraction with ordered fallback chains
//!
//! Every field is resolved by a [`FieldChain`]: a list of strategies tried in
//! order until one finds a value. Each step reports [`StepOutcome`] instead of
//! failing, so one broken selector never aborts the record.

use crate::config::SelectorConfig;
use crate::record::ColorVariant;
use crate::render::Page;
use crate::ConfigError;
use regex::Regex;

/// Result of one fallback step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Found(String),
    /// Nothing matched
    Missing,
    /// The step itself errored
    Failed(String),
}

/// A single way of reading a field
#[derive(Debug, Clone)]
pub enum FieldStrategy {
    /// Trimmed text of the first matching element with non-empty text
    Text { selector: String },

    /// First capture group of `pattern` applied to element text
    TextPattern { selector: String, pattern: Regex },

    /// First capture group of `pattern` applied to an attribute value
    AttributePattern {
        selector: String,
        attribute: String,
        pattern: Regex,
    },

    /// First capture group of `pattern` applied to the page URL
    UrlPattern { pattern: Regex },
}

fn first_capture(pattern: &Regex, haystack: &str) -> Option<String> {
    let captures = pattern.captures(haystack)?;
    captures
        .get(1)
        .or_else(|| captures.get(0))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

impl FieldStrategy {
    pub async fn apply(&self, page: &dyn Page) -> StepOutcome {
        match self {
            Self::Text { selector } => {
                let elements = match page.query_all(selector).await {
                    Ok(elements) => elements,
                    Err(e) => return StepOutcome::Failed(e.to_string()),
                };
                for element in elements {
                    match page.text(element).await {
                        Ok(text) if !text.trim().is_empty() => {
                            return StepOutcome::Found(text.trim().to_string())
                        }
                        Ok(_) => continue,
                        Err(e) => return StepOutcome::Failed(e.to_string()),
                    }
                }
                StepOutcome::Missing
            }

            Self::TextPattern { selector, pattern } => {
                let elements = match page.query_all(selector).await {
                    Ok(elements) => elements,
                    Err(e) => return StepOutcome::Failed(e.to_string()),
                };
                for element in elements {
                    match page.text(element).await {
                        Ok(text) => {
                            if let Some(value) = first_capture(pattern, &text) {
                                return StepOutcome::Found(value);
                            }
                        }
                        Err(e) => return StepOutcome::Failed(e.to_string()),
                    }
                }
                StepOutcome::Missing
            }

            Self::AttributePattern {
                selector,
                attribute,
                pattern,
            } => {
                let elements = match page.query_all(selector).await {
                    Ok(elements) => elements,
                    Err(e) => return StepOutcome::Failed(e.to_string()),
                };
                for element in elements {
                    match page.attribute(element, attribute).await {
                        Ok(Some(value)) => {
                            if let Some(found) = first_capture(pattern, &value) {
                                return StepOutcome::Found(found);
                            }
                        }
                        Ok(None) => continue,
                        Err(e) => return StepOutcome::Failed(e.to_string()),
                    }
                }
                StepOutcome::Missing
            }

            Self::UrlPattern { pattern } => match first_capture(pattern, page.url().path()) {
                Some(value) => StepOutcome::Found(value),
                None => StepOutcome::Missing,
            },
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Text { selector } => format!("text of '{}'", selector),
            Self::TextPattern { selector, pattern } => {
                format!("text of '{}' matching /{}/", selector, pattern)
            }
            Self::AttributePattern {
                selector,
                attribute,
                pattern,
            } => format!("{} of '{}' matching /{}/", attribute, selector, pattern),
            Self::UrlPattern { pattern } => format!("URL matching /{}/", pattern),
        }
    }
}

/// Ordered fallback strategies for one field
#[derive(Debug, Clone)]
pub struct FieldChain {
    field: &'static str,
    steps: Vec<FieldStrategy>,
}

impl FieldChain {
    pub fn new(field: &'static str, steps: Vec<FieldStrategy>) -> Self {
        Self { field, steps }
    }

    /// Returns the first value any step finds, or None once all are exhausted
    pub async fn resolve(&self, page: &dyn Page) -> Option<String> {
        for step in &self.steps {
            match step.apply(page).await {
                StepOutcome::Found(value) => {
                    tracing::debug!("{} = '{}' via {}", self.field, value, step.describe());
                    return Some(value);
                }
                StepOutcome::Missing => {
                    tracing::trace!("{}: nothing via {}", self.field, step.describe());
                }
                StepOutcome::Failed(e) => {
                    tracing::warn!("{}: {} failed: {}", self.field, step.describe(), e);
                }
            }
        }

        tracing::debug!("{} not found on {}", self.field, page.url());
        None
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidSelector(format!("'{}': {}", pattern, e)))
}

/// Extracts the scalar fields of a product page
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    identifier: FieldChain,
    name: FieldChain,
    category: FieldChain,
    sizes_selector: String,
    color_labels_selector: String,
}

impl FieldExtractor {
    /// Builds the fallback chains from configured selectors
    pub fn from_selectors(selectors: &SelectorConfig) -> Result<Self, ConfigError> {
        let identifier = FieldChain::new(
            "identifier",
            vec![
                FieldStrategy::TextPattern {
                    selector: selectors.identifier.clone(),
                    pattern: compile(&selectors.identifier_pattern)?,
                },
                FieldStrategy::UrlPattern {
                    pattern: compile(&selectors.url_identifier_pattern)?,
                },
            ],
        );

        let name = FieldChain::new(
            "name",
            selectors
                .name
                .iter()
                .map(|selector| FieldStrategy::Text {
                    selector: selector.clone(),
                })
                .collect(),
        );

        let category_pattern = compile(&selectors.category_pattern)?;
        let mut category_steps: Vec<FieldStrategy> = selectors
            .link_attributes
            .iter()
            .map(|attribute| FieldStrategy::AttributePattern {
                selector: selectors.category.clone(),
                attribute: attribute.clone(),
                pattern: category_pattern.clone(),
            })
            .collect();
        category_steps.push(FieldStrategy::Text {
            selector: selectors.category.clone(),
        });
        let category = FieldChain::new("category", category_steps);

        Ok(Self {
            identifier,
            name,
            category,
            sizes_selector: selectors.sizes.clone(),
            color_labels_selector: selectors.color_labels.clone(),
        })
    }

    pub async fn identifier(&self, page: &dyn Page) -> Option<String> {
        self.identifier.resolve(page).await
    }

    pub async fn name(&self, page: &dyn Page) -> Option<String> {
        self.name.resolve(page).await
    }

    pub async fn category(&self, page: &dyn Page) -> Option<String> {
        self.category.resolve(page).await
    }

    /// Returns the normalized, deduplicated size list
    pub async fn sizes(&self, page: &dyn Page) -> Vec<String> {
        match texts_of(page, &self.sizes_selector).await {
            Ok(raw) => normalize_sizes(raw),
            Err(e) => {
                tracing::warn!("sizes: '{}' failed: {}", self.sizes_selector, e);
                Vec::new()
            }
        }
    }

    /// Returns the declared color options, in page order
    pub async fn colors(&self, page: &dyn Page) -> Vec<ColorVariant> {
        let labels = match texts_of(page, &self.color_labels_selector).await {
            Ok(labels) => labels,
            Err(e) => {
                tracing::warn!("colors: '{}' failed: {}", self.color_labels_selector, e);
                return Vec::new();
            }
        };

        let mut colors: Vec<ColorVariant> = Vec::new();
        for label in labels {
            let label = label.trim();
            if !label.is_empty() && !colors.iter().any(|c| c.label == label) {
                colors.push(ColorVariant {
                    label: label.to_string(),
                });
            }
        }
        colors
    }
}

async fn texts_of(page: &dyn Page, selector: &str) -> crate::render::RenderResult<Vec<String>> {
    let mut texts = Vec::new();
    for element in page.query_all(selector).await? {
        texts.push(page.text(element).await?);
    }
    Ok(texts)
}

/// Cleans raw size labels
///
/// Trims each label, drops placeholder dashes, strips a leading "- " and
/// removes duplicates while keeping the first occurrence.
pub fn normalize_sizes<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut sizes: Vec<String> = Vec::new();

    for label in raw {
        let label = label.as_ref().trim();
        if label.is_empty() || label == "-" {
            continue;
        }

        let cleaned = label.strip_prefix('-').map(str::trim_start).unwrap_or(label);
        if !cleaned.is_empty() && !sizes.iter().any(|s| s == cleaned) {
            sizes.push(cleaned.to_string());
        }
    }

    sizes
}
