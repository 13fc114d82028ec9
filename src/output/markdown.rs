//! Markdown summary generation
//!
//! This module generates human-readable markdown summaries of harvest
//! results: run information, queue state breakdowns, record counts and the
//! product URLs that failed terminally.

use crate::output::traits::{HarvestSummary, OutputResult};
use crate::state::RequestState;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Failed URLs listed per section before truncating
const MAX_LISTED_URLS: usize = 50;

/// Generates a markdown summary from harvest statistics
///
/// # Arguments
///
/// * `summary` - The harvest summary data
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(summary: &HarvestSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a harvest summary as markdown
pub fn format_markdown_summary(summary: &HarvestSummary) -> String {
    let mut md = String::new();

    md.push_str("# Variant-Harvest Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", summary.run_id));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at));
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    if let Some(duration) = summary.duration_seconds {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", summary.status));
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    // Records
    md.push_str("## Records\n\n");
    md.push_str(&format!("- **Records Emitted**: {}\n", summary.records));
    md.push_str(&format!(
        "- **Complete Records**: {}\n",
        summary.complete_records()
    ));
    md.push_str(&format!(
        "- **Partial Records**: {}\n",
        summary.partial_records
    ));
    md.push_str(&format!(
        "- **Images Captured**: {}\n",
        summary.images_captured
    ));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n",
        summary.success_rate()
    ));
    md.push_str(&format!(
        "- **Failure Rate**: {:.2}%\n",
        summary.failure_rate()
    ));
    let unrecorded = summary.unrecorded_products();
    if unrecorded > 0 {
        md.push_str(&format!(
            "- **Products Without A Record**: {}\n",
            unrecorded
        ));
    }
    md.push('\n');

    // Queue breakdown
    md.push_str("## Queue State Breakdown\n\n");
    md.push_str("| State | Catalog | Product |\n");
    md.push_str("|-------|---------|---------|\n");
    for state in RequestState::all_states() {
        md.push_str(&format!(
            "| {} | {} | {} |\n",
            state_label(state),
            summary.catalog.count(state),
            summary.product.count(state)
        ));
    }
    md.push_str(&format!(
        "| **Total** | {} | {} |\n\n",
        summary.catalog.total, summary.product.total
    ));

    push_url_list(
        &mut md,
        "Failed Products",
        &summary.failed_products,
    );
    push_url_list(
        &mut md,
        "Abandoned Catalog Pages",
        &summary.failed_catalog_pages,
    );

    md
}

fn state_label(state: RequestState) -> &'static str {
    match state {
        RequestState::Pending => "Pending",
        RequestState::InFlight => "In Flight",
        RequestState::Handled => "Handled",
        RequestState::Failed => "Failed",
        RequestState::Skipped => "Skipped",
    }
}

fn push_url_list(md: &mut String, title: &str, urls: &[String]) {
    if urls.is_empty() {
        return;
    }

    md.push_str(&format!("## {}\n\n", title));
    md.push_str(&format!("Total: {}\n\n", urls.len()));
    for url in urls.iter().take(MAX_LISTED_URLS) {
        md.push_str(&format!("- {}\n", url));
    }
    if urls.len() > MAX_LISTED_URLS {
        md.push_str(&format!(
            "\n... and {} more\n\n",
            urls.len() - MAX_LISTED_URLS
        ));
    } else {
        md.push('\n');
    }
}
