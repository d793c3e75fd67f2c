//! Output collaborators: where finished records go.
//!
//! The pipeline core only ever talks to [`RecordSink`]; everything about
//! file formats and directory layout lives behind it. [`FileSink`] is
//! the standard implementation, writing per-page JSON/CSV/text files,
//! consolidated exports, a JSONL training dataset, and the resumable
//! batch progress snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::record::{PageRecord, ProgressSnapshot};

/// Which projections a [`FileSink`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    All,
    Json,
    Csv,
    Text,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(OutputFormat::All),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "text" => Ok(OutputFormat::Text),
            other => Err(format!("unknown format {other:?} (json, csv, text, all)")),
        }
    }
}

impl OutputFormat {
    fn wants(self, format: OutputFormat) -> bool {
        self == OutputFormat::All || self == format
    }
}

/// Consumer of pipeline output. One call per record as it lands, one
/// consolidated call at batch end, one progress snapshot after that.
pub trait RecordSink: Send + Sync {
    fn on_record(&self, record: &PageRecord) -> Result<()>;
    fn on_failure(&self, _url: &str) {}
    fn on_batch_end(&self, results: &[PageRecord], failed: &[String]) -> Result<()>;
    fn on_progress(&self, snapshot: &ProgressSnapshot) -> Result<()>;
}

/// Discards everything. Useful in tests and dry runs.
pub struct NullSink;

impl RecordSink for NullSink {
    fn on_record(&self, _record: &PageRecord) -> Result<()> {
        Ok(())
    }
    fn on_batch_end(&self, _results: &[PageRecord], _failed: &[String]) -> Result<()> {
        Ok(())
    }
    fn on_progress(&self, _snapshot: &ProgressSnapshot) -> Result<()> {
        Ok(())
    }
}

/// File-writing sink rooted at an output directory.
pub struct FileSink {
    output_dir: PathBuf,
    format: OutputFormat,
}

/// A record flattened to one CSV row. Content is capped so spreadsheet
/// tools keep working on very large pages.
#[derive(Serialize)]
struct CsvRow<'a> {
    url: &'a str,
    title: &'a str,
    summary: &'a str,
    content: String,
    word_count: usize,
    section_count: usize,
    image_count: usize,
    table_count: usize,
    link_count: usize,
    sections: String,
    scraped_at: String,
}

const CSV_CONTENT_CAP: usize = 32_000;

impl<'a> CsvRow<'a> {
    fn from_record(record: &'a PageRecord) -> Self {
        Self {
            url: &record.url,
            title: &record.title,
            summary: &record.summary,
            content: record.content.chars().take(CSV_CONTENT_CAP).collect(),
            word_count: record.metadata.word_count,
            section_count: record.metadata.section_count,
            image_count: record.metadata.image_count,
            table_count: record.metadata.table_count,
            link_count: record.metadata.link_count,
            sections: record
                .sections
                .iter()
                .map(|s| s.title.as_str())
                .collect::<Vec<_>>()
                .join("; "),
            scraped_at: record.metadata.scraped_at.to_rfc3339(),
        }
    }
}

impl FileSink {
    /// Create the sink and ensure the output tree exists.
    pub fn new(output_dir: impl Into<PathBuf>, format: OutputFormat) -> Result<Self> {
        let output_dir = output_dir.into();
        for sub in ["json", "csv", "text"] {
            fs::create_dir_all(output_dir.join(sub))
                .with_context(|| format!("failed to create output directory {sub}/"))?;
        }
        Ok(Self { output_dir, format })
    }

    fn stamp(at: DateTime<Utc>) -> String {
        at.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
    }

    fn record_basename(record: &PageRecord) -> String {
        let title = if record.title.is_empty() {
            "untitled"
        } else {
            &record.title
        };
        format!(
            "{}_{}",
            sanitize_filename(title),
            Self::stamp(record.metadata.scraped_at)
        )
    }

    fn write_csv<P: AsRef<Path>>(path: P, rows: &[CsvRow<'_>]) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())
            .with_context(|| format!("failed to open {}", path.as_ref().display()))?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl RecordSink for FileSink {
    fn on_record(&self, record: &PageRecord) -> Result<()> {
        let base = Self::record_basename(record);

        if self.format.wants(OutputFormat::Json) {
            let path = self.output_dir.join("json").join(format!("{base}.json"));
            fs::write(&path, serde_json::to_string_pretty(record)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        if self.format.wants(OutputFormat::Csv) {
            let path = self.output_dir.join("csv").join(format!("{base}.csv"));
            Self::write_csv(&path, &[CsvRow::from_record(record)])?;
        }
        if self.format.wants(OutputFormat::Text) {
            let path = self.output_dir.join("text").join(format!("{base}.txt"));
            fs::write(&path, format_as_text(record))
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        Ok(())
    }

    fn on_batch_end(&self, results: &[PageRecord], _failed: &[String]) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }
        let stamp = Self::stamp(Utc::now());

        if self.format.wants(OutputFormat::Json) {
            let path = self.output_dir.join(format!("consolidated_{stamp}.json"));
            fs::write(&path, serde_json::to_string_pretty(results)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        if self.format.wants(OutputFormat::Csv) {
            let rows: Vec<CsvRow<'_>> = results.iter().map(CsvRow::from_record).collect();
            Self::write_csv(
                self.output_dir.join(format!("consolidated_{stamp}.csv")),
                &rows,
            )?;
        }
        if self.format.wants(OutputFormat::Text) {
            let divider = format!("\n\n{}\n\n", "=".repeat(80));
            let text = results
                .iter()
                .map(format_as_text)
                .collect::<Vec<_>>()
                .join(&divider);
            let path = self.output_dir.join(format!("consolidated_{stamp}.txt"));
            fs::write(&path, text)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        // The training dataset accompanies every consolidated write.
        let pairs: Vec<String> = results
            .iter()
            .filter_map(|r| r.training_pair())
            .filter_map(|p| serde_json::to_string(&p).ok())
            .collect();
        let path = self
            .output_dir
            .join(format!("training_dataset_{stamp}.jsonl"));
        fs::write(&path, pairs.join("\n"))
            .with_context(|| format!("failed to write {}", path.display()))?;

        info!("consolidated output written to {}", self.output_dir.display());
        Ok(())
    }

    fn on_progress(&self, snapshot: &ProgressSnapshot) -> Result<()> {
        let path = self.output_dir.join("batch_progress.json");
        fs::write(&path, serde_json::to_string_pretty(snapshot)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Human-readable projection of a record.
pub fn format_as_text(record: &PageRecord) -> String {
    let mut text = format!(
        "Title: {}\nURL: {}\nScraped: {}\nWord Count: {}\n\n",
        record.title,
        record.url,
        record.metadata.scraped_at.to_rfc3339(),
        record.metadata.word_count
    );
    if !record.summary.is_empty() {
        text.push_str(&format!("Summary:\n{}\n\n", record.summary));
    }
    text.push_str(&format!("Content:\n{}\n\n", record.content));
    if !record.sections.is_empty() {
        text.push_str("Sections:\n");
        for section in &record.sections {
            text.push_str(&format!(
                "{} {}\n",
                "#".repeat(section.level as usize),
                section.title
            ));
        }
        text.push('\n');
    }
    text
}

/// Keep filenames portable: alphanumerics, space, dash, underscore and
/// dot survive; everything else becomes an underscore.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.chars().take(100).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordMetadata;
    use std::collections::BTreeMap;

    fn sample_record() -> PageRecord {
        let content = "The battle opened at dawn. ".repeat(10);
        PageRecord {
            url: "https://war.example.org/wiki/Battle".into(),
            title: "Battle: The/Redoubt".into(),
            summary: "Opening moves.".into(),
            content: content.trim().to_string(),
            sections: Vec::new(),
            infobox: BTreeMap::new(),
            images: Vec::new(),
            tables: Vec::new(),
            links: Vec::new(),
            metadata: RecordMetadata {
                scraped_at: Utc::now(),
                word_count: 50,
                section_count: 0,
                image_count: 0,
                table_count: 0,
                link_count: 0,
                scraping_method: "HTTP".into(),
            },
        }
    }

    #[test]
    fn sanitize_strips_path_separators() {
        assert_eq!(sanitize_filename("Battle: The/Redoubt"), "Battle_ The_Redoubt");
        assert_eq!(sanitize_filename(""), "untitled");
        assert_eq!(sanitize_filename("///"), "___");
    }

    #[test]
    fn file_sink_writes_all_projections() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path(), OutputFormat::All).unwrap();
        let record = sample_record();
        sink.on_record(&record).unwrap();
        sink.on_batch_end(std::slice::from_ref(&record), &[]).unwrap();
        sink.on_progress(&ProgressSnapshot::new(1, vec![record.url.clone()], vec![]))
            .unwrap();

        let count = |sub: &str| fs::read_dir(dir.path().join(sub)).unwrap().count();
        assert_eq!(count("json"), 1);
        assert_eq!(count("csv"), 1);
        assert_eq!(count("text"), 1);
        assert!(dir.path().join("batch_progress.json").exists());

        let consolidated: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("consolidated_"))
            .collect();
        assert_eq!(consolidated.len(), 3);
        let jsonl: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".jsonl"))
            .collect();
        assert_eq!(jsonl.len(), 1);
    }

    #[test]
    fn json_only_format_skips_other_projections() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path(), OutputFormat::Json).unwrap();
        sink.on_record(&sample_record()).unwrap();
        assert_eq!(fs::read_dir(dir.path().join("json")).unwrap().count(), 1);
        assert_eq!(fs::read_dir(dir.path().join("csv")).unwrap().count(), 0);
        assert_eq!(fs::read_dir(dir.path().join("text")).unwrap().count(), 0);
    }

    #[test]
    fn text_projection_contains_headline_fields() {
        let record = sample_record();
        let text = format_as_text(&record);
        assert!(text.starts_with("Title: Battle: The/Redoubt\n"));
        assert!(text.contains("Summary:\nOpening moves."));
        assert!(text.contains("Content:\n"));
    }
}
