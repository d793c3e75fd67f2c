// Copyright 2026 Quarry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Structured output types: the page record, its training-pair
//! projection, and the batch progress snapshot.
//!
//! Field names serialize in camelCase so emitted JSON is stable for
//! downstream consumers regardless of which fetch strategy produced the
//! page.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A document heading, levels 1-6.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub level: u8,
    pub title: String,
    pub id: String,
}

/// An image with its absolute source URL and surrounding caption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub src: String,
    pub alt: String,
    pub title: String,
    pub caption: String,
}

/// A data table as a row-major cell-text matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableData {
    pub index: usize,
    pub rows: Vec<Vec<String>>,
    pub caption: String,
}

/// An internal link with its resolved absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    pub url: String,
    pub text: String,
}

/// Derived counters, computed once after every field is final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub scraped_at: DateTime<Utc>,
    pub word_count: usize,
    pub section_count: usize,
    pub image_count: usize,
    pub table_count: usize,
    pub link_count: usize,
    /// Which retrieval path produced the HTML ("HTTP", "Browser", ...).
    /// Stamped by the pipeline, not the extraction engine.
    pub scraping_method: String,
}

/// The normalized structured record for one retrieved page.
///
/// `title` and `summary` are empty strings when no selector candidate
/// matched — present-but-empty, never absent, so downstream consumers
/// never have to distinguish missing from blank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub sections: Vec<Section>,
    pub infobox: BTreeMap<String, String>,
    pub images: Vec<ImageRef>,
    pub tables: Vec<TableData>,
    pub links: Vec<LinkRef>,
    pub metadata: RecordMetadata,
}

impl PageRecord {
    /// Instruction-tuning projection. Pages with fewer than 100 content
    /// characters are filtered out (not an error).
    pub fn training_pair(&self) -> Option<TrainingPair> {
        if self.content.len() < 100 {
            return None;
        }
        let input = if self.summary.is_empty() {
            self.content.chars().take(500).collect()
        } else {
            self.summary.clone()
        };
        Some(TrainingPair {
            instruction: format!("Provide information about {}", self.title),
            input,
            output: self.content.clone(),
            metadata: TrainingMetadata {
                source: self.url.clone(),
                title: self.title.clone(),
                word_count: self.metadata.word_count,
                sections: self.sections.iter().map(|s| s.title.clone()).collect(),
            },
        })
    }
}

/// One instruction/input/output example for dataset export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingPair {
    pub instruction: String,
    pub input: String,
    pub output: String,
    pub metadata: TrainingMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingMetadata {
    pub source: String,
    pub title: String,
    pub word_count: usize,
    pub sections: Vec<String>,
}

/// Persisted progress snapshot, written after a batch run so a caller
/// can resume. Reading it back is the caller's responsibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_urls: usize,
    pub processed_urls: Vec<String>,
    pub failed_urls: Vec<String>,
    pub remaining: usize,
    /// Percentage of processed URLs, rounded to one decimal.
    pub success_rate: f64,
}

impl ProgressSnapshot {
    pub fn new(total: usize, processed: Vec<String>, failed: Vec<String>) -> Self {
        let rate = if total == 0 {
            0.0
        } else {
            (processed.len() as f64 / total as f64 * 1000.0).round() / 10.0
        };
        Self {
            timestamp: Utc::now(),
            total_urls: total,
            remaining: total.saturating_sub(processed.len()),
            processed_urls: processed,
            failed_urls: failed,
            success_rate: rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_content(content: &str) -> PageRecord {
        PageRecord {
            url: "https://example.com/wiki/Thing".into(),
            title: "Thing".into(),
            summary: "A thing.".into(),
            content: content.into(),
            sections: vec![Section {
                level: 2,
                title: "History".into(),
                id: "History".into(),
            }],
            infobox: BTreeMap::new(),
            images: Vec::new(),
            tables: Vec::new(),
            links: Vec::new(),
            metadata: RecordMetadata {
                scraped_at: Utc::now(),
                word_count: content.split_whitespace().count(),
                section_count: 1,
                image_count: 0,
                table_count: 0,
                link_count: 0,
                scraping_method: "HTTP".into(),
            },
        }
    }

    #[test]
    fn short_content_yields_no_training_pair() {
        assert!(record_with_content("Too short.").training_pair().is_none());
    }

    #[test]
    fn training_pair_carries_sections_and_source() {
        let long = "word ".repeat(40);
        let pair = record_with_content(&long).training_pair().unwrap();
        assert_eq!(pair.metadata.source, "https://example.com/wiki/Thing");
        assert_eq!(pair.metadata.sections, vec!["History".to_string()]);
        assert!(pair.instruction.contains("Thing"));
        assert_eq!(pair.input, "A thing.");
    }

    #[test]
    fn snapshot_rates_round_to_one_decimal() {
        let snap = ProgressSnapshot::new(
            3,
            vec!["a".into(), "b".into()],
            vec!["c".into()],
        );
        assert_eq!(snap.success_rate, 66.7);
        assert_eq!(snap.remaining, 1);
        assert_eq!(ProgressSnapshot::new(0, vec![], vec![]).success_rate, 0.0);
    }

    #[test]
    fn record_serializes_camel_case() {
        let json = serde_json::to_value(record_with_content("Hello world.")).unwrap();
        assert!(json["metadata"]["wordCount"].is_number());
        assert!(json["metadata"]["scrapedAt"].is_string());
        assert!(json["metadata"]["scrapingMethod"].is_string());
    }
}
