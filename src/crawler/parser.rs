//! Listing-page parsing: pagination, candidate extraction, and filtering
//!
//! Extraction is deliberately tolerant. A listing entry with a missing or
//! unparsable score or rating count gets zero for that field, which fails
//! any positive threshold on its own; a broken pagination control falls
//! back to a single page. Each fallback is logged distinctly so the
//! failure modes stay visible without ever aborting a page.

use crate::aggregate::Record;
use crate::config::Criteria;
use scraper::{ElementRef, Html, Selector};

/// Selector for the pagination control's page links
const PAGINATOR_SELECTOR: &str = "div.paginator > a";

/// Selector for one listing entry
const ENTRY_SELECTOR: &str = "#subject_list > ul > li";

/// Selector for an entry's title/link anchor
const TITLE_SELECTOR: &str = ".info > h2 > a";

/// Selector for an entry's score text
const SCORE_SELECTOR: &str = ".rating_nums";

/// Selector for an entry's rating-count text
const COUNT_SELECTOR: &str = ".pl";

/// A listing entry as extracted, before parsing and filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub title: String,
    pub score_text: String,
    pub count_text: String,
    pub link: String,
}

impl RawEntry {
    /// Parses the score text, falling back to zero when unparsable
    pub fn score(&self) -> f32 {
        match self.score_text.trim().parse() {
            Ok(score) => score,
            Err(_) => {
                if !self.score_text.trim().is_empty() {
                    tracing::debug!(title = %self.title, text = %self.score_text, "score unparsable, using 0");
                }
                0.0
            }
        }
    }

    /// Parses the rating-count text, falling back to zero
    ///
    /// The count is wrapped in decoration like "(12345 ratings)", so all
    /// non-digit characters are stripped before parsing.
    pub fn rating_count(&self) -> u32 {
        let digits: String = self.count_text.chars().filter(|c| c.is_ascii_digit()).collect();
        match digits.parse() {
            Ok(count) => count,
            Err(_) => {
                if !self.count_text.trim().is_empty() {
                    tracing::debug!(title = %self.title, text = %self.count_text, "rating count unparsable, using 0");
                }
                0
            }
        }
    }

    /// Applies the run's filter: both thresholds are inclusive
    ///
    /// Returns the finished record when the entry passes, None otherwise.
    pub fn filter(&self, criteria: &Criteria) -> Option<Record> {
        let score = self.score();
        let rating_count = self.rating_count();

        if score >= criteria.min_score && rating_count >= criteria.min_count {
            Some(Record {
                title: self.title.clone(),
                score,
                rating_count,
                link: self.link.clone(),
            })
        } else {
            None
        }
    }
}

/// Determines the total page count from a listing's first page
///
/// Reads the final page indicator of the pagination control. Any parse
/// failure (missing control, non-numeric text) falls back to a single
/// page so the listing is still crawled.
pub fn page_count(html: &str) -> u32 {
    let document = Html::parse_document(html);

    let parsed = Selector::parse(PAGINATOR_SELECTOR).ok().and_then(|selector| {
        document
            .select(&selector)
            .last()
            .and_then(|a| a.text().collect::<String>().trim().parse::<u32>().ok())
            .filter(|count| *count >= 1)
    });

    match parsed {
        Some(count) => count,
        None => {
            tracing::warn!("pagination indicator missing or unparsable, assuming a single page");
            1
        }
    }
}

/// Extracts candidate entries from one listing page
///
/// Per-entry extraction never fails the page: entries without a title
/// anchor are skipped, and missing score/count fields come back as empty
/// text (parsed to zero later).
pub fn extract_candidates(html: &str) -> Vec<RawEntry> {
    let document = Html::parse_document(html);
    let mut entries = Vec::new();

    let Ok(entry_selector) = Selector::parse(ENTRY_SELECTOR) else {
        return entries;
    };

    for element in document.select(&entry_selector) {
        if let Some(entry) = extract_entry(element) {
            entries.push(entry);
        }
    }

    entries
}

fn extract_entry(element: ElementRef) -> Option<RawEntry> {
    let title_selector = Selector::parse(TITLE_SELECTOR).ok()?;
    let anchor = element.select(&title_selector).next()?;

    let title = collapse_whitespace(&anchor.text().collect::<String>());
    if title.is_empty() {
        return None;
    }

    let link = anchor.value().attr("href").unwrap_or("").to_string();
    let score_text = select_text(element, SCORE_SELECTOR);
    let count_text = select_text(element, COUNT_SELECTOR);

    Some(RawEntry {
        title,
        score_text,
        count_text,
        link,
    })
}

fn select_text(element: ElementRef, selector: &str) -> String {
    Selector::parse(selector)
        .ok()
        .and_then(|s| {
            element
                .select(&s)
                .next()
                .map(|e| e.text().collect::<String>().trim().to_string())
        })
        .unwrap_or_default()
}

/// Collapses runs of whitespace (including newlines inside wrapped titles)
/// into single spaces
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
