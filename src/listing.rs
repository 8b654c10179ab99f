//! Listing-page resolution
//!
//! Finds the most recently modified timelapse on the printer's directory
//! listing and derives the artifact path to export. The parser is a narrow
//! pattern matcher scoped to the one listing shape the printer's embedded
//! file server produces (`<tr>` rows, a folder anchor per row, and the
//! modification time stored as an integer `name` attribute on a table cell).
//! Only that layout is recognized; if the firmware changes the page, the
//! patterns here must be updated.

use crate::config::Config;
use crate::error::{ResolutionError, Result};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// File extension of exported artifacts
pub(crate) const ARTIFACT_EXT: &str = ".mp4";

/// Compile a fixed pattern known to be valid.
#[allow(clippy::expect_used)]
fn fixed_pattern(pattern: &str) -> Regex {
    Regex::new(pattern).expect("fixed pattern compiles")
}

static ROW_RE: LazyLock<Regex> = LazyLock::new(|| fixed_pattern(r"(?is)<tr\b[^>]*>(.*?)</tr>"));
static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| fixed_pattern(r#"(?is)<a[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#));
static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| fixed_pattern(r#"(?i)<td[^>]*\bname\s*=\s*"?(-?\d+)"?[^>]*>"#));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| fixed_pattern(r"<[^>]*>"));

/// One usable row of the listing page
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingEntry {
    /// Human-facing entry name (anchor text with markup stripped)
    pub name: String,
    /// Link reference of the entry's folder anchor
    pub href: String,
    /// Modification-time ordinal from the row's table-cell attribute
    pub modified: i64,
}

/// Extract usable entries from a listing document
///
/// A row is usable when it has an anchor whose target is not already an
/// artifact (pre-rendered `.mp4` links are skipped, isolating the
/// human-facing folder link) and a parseable modification ordinal. Rows
/// missing either are discarded.
pub(crate) fn parse_listing(html: &str) -> Vec<ListingEntry> {
    let mut entries = Vec::new();

    for row_match in ROW_RE.captures_iter(html) {
        let row = &row_match[1];

        let Some(anchor) = ANCHOR_RE
            .captures_iter(row)
            .find(|a| !a[1].ends_with(ARTIFACT_EXT))
        else {
            continue;
        };
        let href = anchor[1].to_string();
        let label = TAG_RE.replace_all(&anchor[2], "").trim().to_string();
        let name = if label.is_empty() { href.clone() } else { label };

        let Some(modified) = ORDINAL_RE
            .captures_iter(row)
            .find_map(|c| c[1].parse::<i64>().ok())
        else {
            continue;
        };

        entries.push(ListingEntry {
            name,
            href,
            modified,
        });
    }

    entries
}

/// Pick the most recently modified entry
///
/// Stable reduce: strictly greater ordinals replace the running maximum, so
/// an exact tie keeps the first entry encountered.
pub(crate) fn latest_entry(html: &str) -> Option<ListingEntry> {
    parse_listing(html)
        .into_iter()
        .fold(None, |latest: Option<ListingEntry>, entry| match latest {
            Some(current) if entry.modified > current.modified => Some(entry),
            Some(current) => Some(current),
            None => Some(entry),
        })
}

/// Normalize an entry reference into an absolute artifact path
///
/// The reference is resolved against the listing page URL (absolute paths are
/// used directly, relative ones resolve under the listing path), one trailing
/// slash is stripped, and the artifact extension is appended unless the
/// reference already ends with it.
pub(crate) fn artifact_path(href: &str, page_url: &Url) -> Option<String> {
    let resolved = page_url.join(href).ok()?;
    let path = resolved.path();
    let base = path.strip_suffix('/').unwrap_or(path);
    if base.ends_with(ARTIFACT_EXT) {
        Some(base.to_string())
    } else {
        Some(format!("{base}{ARTIFACT_EXT}"))
    }
}

/// Resolve the artifact path of the most recently modified listing entry
///
/// Fails with [`ResolutionError::FetchFailed`] when the page is unreachable
/// or answers non-2xx, and with [`ResolutionError::NoEntries`] when no row
/// parses.
pub async fn resolve_latest(client: &reqwest::Client, config: &Config) -> Result<String> {
    let page_url = config.listing_url();
    tracing::debug!(url = %page_url, "fetching timelapse listing");

    let html = fetch_listing(client, &page_url).await?;

    let entry = latest_entry(&html).ok_or_else(|| ResolutionError::NoEntries {
        url: page_url.clone(),
    })?;

    let base = Url::parse(&page_url).map_err(|e| ResolutionError::FetchFailed {
        url: page_url.clone(),
        reason: format!("invalid listing URL: {e}"),
    })?;
    let path = artifact_path(&entry.href, &base).ok_or_else(|| ResolutionError::NoEntries {
        url: page_url.clone(),
    })?;

    tracing::debug!(
        name = %entry.name.trim_end_matches('/'),
        href = %entry.href,
        modified = entry.modified,
        path = %path,
        "resolved latest timelapse"
    );

    Ok(path)
}

async fn fetch_listing(client: &reqwest::Client, page_url: &str) -> Result<String> {
    let response = client
        .get(page_url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ResolutionError::FetchFailed {
            url: page_url.to_string(),
            reason: e.to_string(),
        })?;

    let html = response
        .text()
        .await
        .map_err(|e| ResolutionError::FetchFailed {
            url: page_url.to_string(),
            reason: e.to_string(),
        })?;

    Ok(html)
}
