//! Search-results page parsing.
//!
//! The results table marks each listing row with `tr.bg`. Inside a row the
//! name cell `td.nam` holds the anchor, `td.sl_s` holds the seeder count and
//! the *second* `td.s` cell holds the size (the first `td.s` is the comment
//! count; only position tells them apart).
//!
//! Parsing never fails the caller: unrecognized structure degrades to fewer
//! results with diagnostics in the log.

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

/// Phrase the site shows when a query has no matches.
pub const NOTHING_FOUND_MARKER: &str = "По Вашему запросу ничего не найдено";

const USERNAME_FIELD_MARKER: &str = r#"name="username""#;
const PASSWORD_FIELD_MARKER: &str = r#"name="password""#;

/// One listing from a search results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// Listing title as shown in the name cell.
    pub title: String,
    /// Site-local listing identifier.
    pub id: String,
    /// Seeder count; zero when the cell is missing or malformed.
    pub seeders: u32,
    /// Human-readable size, verbatim from the page.
    pub size: String,
}

/// Whether `text` embeds the login form (both credential fields).
#[must_use]
pub fn contains_login_form(text: &str) -> bool {
    text.contains(USERNAME_FIELD_MARKER) && text.contains(PASSWORD_FIELD_MARKER)
}

struct RowSelectors {
    row: Selector,
    name_anchor: Selector,
    seeders: Selector,
    size: Selector,
}

impl RowSelectors {
    fn build() -> Result<Self, String> {
        let parse = |css: &str| Selector::parse(css).map_err(|e| format!("{css}: {e}"));
        Ok(Self {
            row: parse("tr.bg")?,
            name_anchor: parse("td.nam a")?,
            seeders: parse("td.sl_s")?,
            size: parse("td.s")?,
        })
    }
}

/// Parses a decoded search results page into listings ordered by seeders, descending.
///
/// Equal seeder counts keep document order. A login page or the
/// "nothing found" page yields an empty list.
#[must_use]
pub fn parse_search_results(html: &str) -> Vec<SearchResult> {
    if contains_login_form(html) {
        debug!("results page is a login form");
        return Vec::new();
    }
    if html.contains(NOTHING_FOUND_MARKER) {
        debug!("site reported no matches");
        return Vec::new();
    }

    let selectors = match RowSelectors::build() {
        Ok(selectors) => selectors,
        Err(error) => {
            warn!(error = %error, "result selectors failed to compile");
            return Vec::new();
        }
    };

    let document = Html::parse_document(html);
    let mut results = Vec::new();
    let mut rows_seen = 0_usize;
    for row in document.select(&selectors.row) {
        rows_seen += 1;
        if let Some(result) = parse_row(row, &selectors, rows_seen) {
            results.push(result);
        }
    }

    if rows_seen == 0 {
        debug!(bytes = html.len(), "no result rows in page");
    } else if results.len() < rows_seen {
        debug!(rows = rows_seen, kept = results.len(), "dropped incomplete result rows");
    }

    // `sort_by` is stable, so equal seeder counts keep document order.
    results.sort_by(|a, b| b.seeders.cmp(&a.seeders));
    results
}

fn parse_row(row: ElementRef<'_>, selectors: &RowSelectors, index: usize) -> Option<SearchResult> {
    let Some(anchor) = row.select(&selectors.name_anchor).next() else {
        debug!(row = index, "row has no name anchor");
        return None;
    };
    let Some(href) = anchor.value().attr("href") else {
        debug!(row = index, "name anchor has no href");
        return None;
    };
    let id = id_from_href(href);
    if id.is_empty() {
        debug!(row = index, href, "href carries no identifier");
        return None;
    }
    let title = collapse_whitespace(&anchor.text().collect::<String>());
    if title.is_empty() {
        debug!(row = index, id, "row has an empty title");
        return None;
    }

    let seeders = row
        .select(&selectors.seeders)
        .next()
        .map(|cell| cell.text().collect::<String>())
        .map_or(0, |text| parse_seeders(&text, index));

    let size = match row.select(&selectors.size).nth(1) {
        Some(cell) => collapse_whitespace(&cell.text().collect::<String>()),
        None => {
            debug!(row = index, id, "row has no size cell");
            String::new()
        }
    };

    Some(SearchResult {
        title,
        id: id.to_string(),
        seeders,
        size,
    })
}

/// The text after the first `=` of the href, or empty when there is none.
fn id_from_href(href: &str) -> &str {
    href.split_once('=').map_or("", |(_, rest)| rest.trim())
}

fn parse_seeders(text: &str, index: usize) -> u32 {
    let trimmed = text.trim();
    trimmed.parse::<u32>().unwrap_or_else(|_| {
        debug!(row = index, text = trimmed, "unreadable seeder count; using 0");
        0
    })
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
