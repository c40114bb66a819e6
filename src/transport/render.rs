//! Text rendering for catalog listings and progress milestones.

use std::fmt::Write as _;

use crate::catalog::{CatalogResult, MIB, Variant};
use crate::progress::Milestone;

/// Command prefix the requester uses to pick a variant.
pub const DOWNLOAD_COMMAND_PREFIX: &str = "/download_";

/// Greeting shown for `/start` and `/help`.
#[must_use]
pub fn welcome_text(catalog_ceiling: &str) -> String {
    format!(
        "Hi! I download videos for you.\n\
         Send me a link and I will list the formats available for download.\n\
         Pick one with {DOWNLOAD_COMMAND_PREFIX}<id>, or /cancel a running download.\n\
         Limit: files up to {catalog_ceiling}."
    )
}

/// Formats a byte count as megabytes with one decimal, or `N/A`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(size_bytes: Option<u64>) -> String {
    match size_bytes {
        Some(bytes) => format!("{:.1} MB", bytes as f64 / MIB as f64),
        None => "N/A".to_string(),
    }
}

fn format_variant(out: &mut String, variant: &Variant, selectable: bool) {
    let _ = writeln!(out, "Format #{}", variant.id);
    let _ = writeln!(out, "Extension: {}", variant.container);
    let _ = writeln!(out, "Quality: {}", variant.descriptive_label);
    let _ = writeln!(out, "Size: {}", format_size(variant.size_bytes));
    if selectable {
        let _ = writeln!(out, "-> {DOWNLOAD_COMMAND_PREFIX}{}", variant.id);
    }
}

/// Renders the full listing: available variants first, then rejected ones.
#[must_use]
pub fn format_catalog(catalog: &CatalogResult) -> String {
    let mut out = String::new();
    if let Some(title) = &catalog.title {
        let _ = writeln!(out, "{title}\n");
    }

    if catalog.available.is_empty() {
        out.push_str("No formats available for download.\n");
    } else {
        out.push_str("Available formats:\n\n");
        for variant in &catalog.available {
            format_variant(&mut out, variant, true);
            out.push('\n');
        }
    }

    if !catalog.rejected.is_empty() {
        let _ = writeln!(out, "\nUnavailable formats (> {}):\n", catalog.ceiling);
        for variant in &catalog.rejected {
            format_variant(&mut out, variant, false);
            out.push('\n');
        }
    }

    out.trim_end().to_string()
}

/// Renders a progress milestone notification.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_milestone(milestone: &Milestone) -> String {
    let downloaded_mb = milestone.downloaded_bytes as f64 / MIB as f64;
    let total_mb = milestone.total_bytes as f64 / MIB as f64;
    let speed = milestone
        .rate
        .map_or_else(|| "N/A".to_string(), |rate| format!("{:.1} MB/s", rate / MIB as f64));
    format!(
        "Downloading: {:.1}%\nDownloaded: {downloaded_mb:.1} MB of {total_mb:.1} MB\nSpeed: {speed}",
        milestone.percent
    )
}
