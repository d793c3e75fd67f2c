//! Extraction engine: raw HTML + source URL → [`PageRecord`].
//!
//! The document is parsed once and each field is pulled out by its own
//! pass over the tree, driven by the ordered candidate lists in
//! [`SelectorCascade`]. A candidate only wins by producing a non-empty
//! match — an empty match falls through to the next candidate, which is
//! what lets one cascade cover several wiki engines.
//!
//! Everything here is synchronous; `scraper`'s types are `!Send`, so
//! async callers wrap [`extract`] in `tokio::task::spawn_blocking`.
//! Derived counts in the record metadata are computed at the end, after
//! every field is final. The engine never sees the fetch strategy — the
//! `scraping_method` metadata field is stamped by the pipeline.

pub mod cascade;

use std::collections::BTreeMap;

use chrono::Utc;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

pub use cascade::SelectorCascade;

use crate::record::{ImageRef, LinkRef, PageRecord, RecordMetadata, Section, TableData};

/// Build the structured record for one page.
pub fn extract(html: &str, source_url: &str, cascade: &SelectorCascade) -> PageRecord {
    let document = Html::parse_document(html);

    let title = extract_title(&document, cascade);
    let (content, summary) = extract_content(&document, cascade);
    let sections = extract_sections(&document, cascade);
    let infobox = extract_infobox(&document, cascade);
    let images = extract_images(&document, source_url, cascade);
    let tables = extract_tables(&document, cascade);
    let links = extract_links(&document, source_url, cascade);

    let word_count = content.split_whitespace().count();
    let metadata = RecordMetadata {
        scraped_at: Utc::now(),
        word_count,
        section_count: sections.len(),
        image_count: images.len(),
        table_count: tables.len(),
        link_count: links.len(),
        scraping_method: String::new(),
    };

    PageRecord {
        url: source_url.to_string(),
        title,
        summary,
        content,
        sections,
        infobox,
        images,
        tables,
        links,
        metadata,
    }
}

/// Parse a cascade entry, skipping (with a warning) anything invalid so
/// a broken per-site profile degrades instead of failing the page.
fn parse_selector(raw: &str) -> Option<Selector> {
    match Selector::parse(raw) {
        Ok(sel) => Some(sel),
        Err(_) => {
            warn!("skipping invalid selector {raw:?}");
            None
        }
    }
}

fn element_text(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// True when any ancestor carries one of the excluded classes.
fn has_excluded_ancestor(el: &ElementRef, classes: &[String]) -> bool {
    el.ancestors().any(|node| {
        ElementRef::wrap(node)
            .map(|a| {
                a.value()
                    .classes()
                    .any(|c| classes.iter().any(|e| e == c))
            })
            .unwrap_or(false)
    })
}

// ── Title ────────────────────────────────────────────────────────────────────

fn extract_title(document: &Html, cascade: &SelectorCascade) -> String {
    for raw in &cascade.title {
        let Some(sel) = parse_selector(raw) else {
            continue;
        };
        if let Some(el) = document.select(&sel).next() {
            let text = element_text(&el);
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

// ── Content & summary ────────────────────────────────────────────────────────

fn extract_content(document: &Html, cascade: &SelectorCascade) -> (String, String) {
    let container = cascade
        .content_containers
        .iter()
        .filter_map(|raw| parse_selector(raw))
        .find_map(|sel| document.select(&sel).next());
    let Some(container) = container else {
        return (String::new(), String::new());
    };

    let blocks = match parse_selector(&cascade.content_blocks) {
        Some(sel) => sel,
        None => return (String::new(), String::new()),
    };
    let content = container
        .select(&blocks)
        .filter(|el| !has_excluded_ancestor(el, &cascade.excluded_ancestor_classes))
        .map(|el| element_text(&el))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    let p = Selector::parse("p").unwrap();
    let summary = container
        .select(&p)
        .next()
        .map(|el| element_text(&el))
        .unwrap_or_default();

    (content, summary)
}

// ── Sections ─────────────────────────────────────────────────────────────────

fn extract_sections(document: &Html, cascade: &SelectorCascade) -> Vec<Section> {
    let headings = Selector::parse("h1, h2, h3, h4, h5, h6").unwrap();
    let edit_suffix = Regex::new(r"\[edit\]").unwrap();

    document
        .select(&headings)
        .filter(|el| !has_excluded_ancestor(el, &cascade.excluded_ancestor_classes))
        .filter_map(|el| {
            let level: u8 = el.value().name().trim_start_matches('h').parse().ok()?;
            let title = edit_suffix
                .replace_all(&element_text(&el), "")
                .trim()
                .to_string();
            if title.is_empty() {
                return None;
            }
            let lowered = title.to_lowercase();
            if cascade.boilerplate_sections.iter().any(|b| *b == lowered) {
                return None;
            }
            Some(Section {
                level,
                title,
                id: el.value().attr("id").unwrap_or_default().to_string(),
            })
        })
        .collect()
}

// ── Infobox ──────────────────────────────────────────────────────────────────

fn extract_infobox(document: &Html, cascade: &SelectorCascade) -> BTreeMap<String, String> {
    let mut infobox = BTreeMap::new();
    let Some(containers) = parse_selector(&cascade.infobox_containers) else {
        return infobox;
    };
    let (Some(keys), Some(values)) = (
        parse_selector(&cascade.infobox_keys),
        parse_selector(&cascade.infobox_values),
    ) else {
        return infobox;
    };
    let row = Selector::parse("tr").unwrap();

    for container in document.select(&containers) {
        for tr in container.select(&row) {
            let key = tr.select(&keys).next().map(|el| element_text(&el));
            let value = tr.select(&values).next().map(|el| element_text(&el));
            // Rows missing either side are layout, not data. Later
            // duplicate keys overwrite earlier ones.
            if let (Some(key), Some(value)) = (key, value) {
                if !key.is_empty() && !value.is_empty() {
                    infobox.insert(key, value);
                }
            }
        }
    }
    infobox
}

// ── Images ───────────────────────────────────────────────────────────────────

fn extract_images(document: &Html, source_url: &str, cascade: &SelectorCascade) -> Vec<ImageRef> {
    let img = Selector::parse("img").unwrap();
    let caption_sel = Selector::parse(".caption, figcaption").unwrap();

    document
        .select(&img)
        .filter_map(|el| {
            let src = el.value().attr("src")?;
            if cascade.image_noise_markers.iter().any(|m| src.contains(m)) {
                return None;
            }
            let caption = el
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|a| {
                    a.value().name() == "figure" || a.value().classes().any(|c| c == "thumb")
                })
                .and_then(|fig| fig.select(&caption_sel).next())
                .map(|c| element_text(&c))
                .unwrap_or_default();
            Some(ImageRef {
                src: absolutize(src, source_url),
                alt: el.value().attr("alt").unwrap_or_default().to_string(),
                title: el.value().attr("title").unwrap_or_default().to_string(),
                caption,
            })
        })
        .collect()
}

// ── Tables ───────────────────────────────────────────────────────────────────

fn extract_tables(document: &Html, cascade: &SelectorCascade) -> Vec<TableData> {
    let table = Selector::parse("table").unwrap();
    let row = Selector::parse("tr").unwrap();
    let cell = Selector::parse("th, td").unwrap();
    let caption_sel = Selector::parse("caption").unwrap();

    document
        .select(&table)
        .filter(|el| {
            !el.value()
                .classes()
                .any(|c| cascade.table_excluded_classes.iter().any(|e| e == c))
        })
        .enumerate()
        .filter_map(|(index, el)| {
            let rows: Vec<Vec<String>> = el
                .select(&row)
                .map(|tr| tr.select(&cell).map(|c| element_text(&c)).collect::<Vec<_>>())
                .filter(|cells: &Vec<String>| cells.iter().any(|c| !c.is_empty()))
                .collect();
            if rows.is_empty() {
                return None;
            }
            let caption = el
                .select(&caption_sel)
                .next()
                .map(|c| element_text(&c))
                .unwrap_or_default();
            Some(TableData {
                index,
                rows,
                caption,
            })
        })
        .collect()
}

// ── Links ────────────────────────────────────────────────────────────────────

fn extract_links(document: &Html, source_url: &str, cascade: &SelectorCascade) -> Vec<LinkRef> {
    let Some(anchors) = parse_selector(&cascade.link_selectors) else {
        return Vec::new();
    };

    document
        .select(&anchors)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            let text = element_text(&el);
            if text.is_empty() {
                return None;
            }
            if cascade.link_excluded_markers.iter().any(|m| href.contains(m)) {
                return None;
            }
            Some(LinkRef {
                url: absolutize(href, source_url),
                text,
            })
        })
        .collect()
}

/// Resolve a possibly-relative reference against the source page.
/// Protocol-relative references are pinned to https.
fn absolutize(href: &str, source_url: &str) -> String {
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{rest}");
    }
    if href.starts_with('/') {
        if let Ok(base) = Url::parse(source_url) {
            if let Some(host) = base.host_str() {
                return format!("{}://{}{}", base.scheme(), host, href);
            }
        }
    }
    href.to_string()
}
