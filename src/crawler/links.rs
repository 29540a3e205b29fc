//! Category link resolution from the catalog's taxonomy page
//!
//! The taxonomy page groups sub-listing links under a named anchor per
//! category tag. Resolution finds the anchor, walks to its sibling link
//! group, and returns every link as an absolute URL.

use crate::config::CatalogConfig;
use crate::crawler::fetcher::PageFetcher;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Resolves the listing-page URLs belonging to a category tag
///
/// Fetches the taxonomy page and extracts the tag's sibling link group.
/// An unknown tag is a legitimate "no such category" case and yields an
/// empty list, as does a taxonomy page that could not be fetched; neither
/// aborts the run.
pub async fn resolve_links(
    fetcher: &PageFetcher,
    catalog: &CatalogConfig,
    tag: &str,
) -> crate::Result<Vec<String>> {
    let base = Url::parse(&catalog.base_url)?;
    let taxonomy_url = taxonomy_url(&base, &catalog.taxonomy_path)?;

    let body = match fetcher.fetch(taxonomy_url.as_str()).await {
        Ok(body) => body,
        Err(e) if e.degrades_to_empty() => {
            tracing::warn!(url = %taxonomy_url, error = %e, "taxonomy page unavailable, no listings resolved");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let links = extract_tag_links(&body, &base, tag);

    if links.is_empty() {
        tracing::warn!(tag, "no listing links found for tag");
    } else {
        tracing::info!(tag, count = links.len(), "resolved listing links");
    }

    Ok(links)
}

/// Resolves the taxonomy page URL against the configured base
///
/// Joining rather than concatenating keeps a trailing slash on `base-url`
/// from producing a `//` path.
fn taxonomy_url(base: &Url, taxonomy_path: &str) -> Result<Url, url::ParseError> {
    base.join(taxonomy_path)
}

/// Extracts the absolute sub-listing URLs for `tag` from taxonomy HTML
///
/// The tag's anchor (`a[name="<tag>"]`) is a heading; the links live in
/// its next sibling element.
pub fn extract_tag_links(html: &str, base: &Url, tag: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    let Ok(anchor_selector) = Selector::parse(&format!("a[name=\"{}\"]", tag)) else {
        tracing::warn!(tag, "tag produced an invalid selector");
        return links;
    };
    let Ok(link_selector) = Selector::parse("a[href]") else {
        return links;
    };

    let Some(anchor) = document.select(&anchor_selector).next() else {
        return links;
    };

    let Some(group) = anchor.next_siblings().find_map(ElementRef::wrap) else {
        return links;
    };

    for element in group.select(&link_selector) {
        if let Some(href) = element.value().attr("href") {
            match base.join(href) {
                Ok(absolute) => links.push(absolute.to_string()),
                Err(e) => {
                    tracing::debug!(href, error = %e, "skipping unresolvable link");
                }
            }
        }
    }

    links
}
