//! Export collaborator: turns a finished, ordered chapter list into a final
//! artifact. Layout engines beyond plain text are out of scope; the trait
//! exists so one can be plugged in.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;

use folio_db::models::Chapter;

/// A compilation job handed to the exporter: the book title, the live
/// outline, and the approved chapters in reading order.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub title: String,
    pub outline: String,
    pub chapters: Vec<Chapter>,
    /// Requested output formats (e.g. `["txt"]`). Implementations may
    /// reject formats they do not produce.
    pub formats: Vec<String>,
}

/// Exporter interface. Returns the path of the primary artifact.
#[async_trait]
pub trait BookExporter: Send + Sync {
    async fn export(&self, job: &ExportJob) -> Result<PathBuf>;
}

// Compile-time assertion: BookExporter must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn BookExporter) {}
};

/// Plain-text exporter: writes `<title>_<timestamp>.txt` into the output
/// directory with a table of contents and one section per chapter.
pub struct TextExporter {
    output_dir: PathBuf,
}

impl TextExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl BookExporter for TextExporter {
    async fn export(&self, job: &ExportJob) -> Result<PathBuf> {
        for format in &job.formats {
            if format != "txt" {
                anyhow::bail!("text exporter cannot produce {format:?} output");
            }
        }

        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "failed to create output directory {}",
                self.output_dir.display()
            )
        })?;

        let filename = generate_filename(&job.title, "txt");
        let path = self.output_dir.join(filename);
        let rendered = render_text(job);

        std::fs::write(&path, rendered)
            .with_context(|| format!("failed to write {}", path.display()))?;

        tracing::info!(path = %path.display(), "book exported");
        Ok(path)
    }
}

fn render_text(job: &ExportJob) -> String {
    let rule = "=".repeat(60);
    let minor_rule = "-".repeat(40);

    let mut out = String::new();
    out.push_str(&format!("{rule}\n{}\n{rule}\n\n", job.title.to_uppercase()));

    if !job.outline.is_empty() {
        out.push_str(&format!(
            "TABLE OF CONTENTS\n{minor_rule}\n{}\n\n{rule}\n\n",
            job.outline
        ));
    }

    for chapter in &job.chapters {
        out.push_str(&format!(
            "\nCHAPTER {}: {}\n{minor_rule}\n\n{}\n\n{rule}\n",
            chapter.number, chapter.title, chapter.content
        ));
    }

    out.push_str(&format!(
        "\n\nGenerated on: {}\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S")
    ));

    out
}

/// `<sanitized title>_<timestamp>.<ext>`, safe for any filesystem.
fn generate_filename(title: &str, extension: &str) -> String {
    let sanitized: String = title
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect();
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    format!("{}_{timestamp}.{extension}", sanitized.trim())
}

/// Exporter used where no artifact should be produced (status probes,
/// tests). Records nothing and returns a placeholder path.
#[derive(Debug, Default)]
pub struct NullExporter;

#[async_trait]
impl BookExporter for NullExporter {
    async fn export(&self, job: &ExportJob) -> Result<PathBuf> {
        Ok(Path::new("/dev/null").join(format!("{}.txt", job.title)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use folio_db::models::ChapterState;
    use uuid::Uuid;

    fn chapter(number: i32, title: &str, content: &str) -> Chapter {
        let now = Utc::now();
        Chapter {
            id: Uuid::new_v4(),
            book_id: Uuid::new_v4(),
            number,
            title: title.to_string(),
            content: content.to_string(),
            summary: String::new(),
            editor_notes: String::new(),
            state: ChapterState::Approved,
            created_at: now,
            updated_at: now,
        }
    }

    fn job(title: &str) -> ExportJob {
        ExportJob {
            title: title.to_string(),
            outline: "1. Start\n2. End".to_string(),
            chapters: vec![chapter(1, "Start", "first body"), chapter(2, "End", "second body")],
            formats: vec!["txt".to_string()],
        }
    }

    #[tokio::test]
    async fn writes_artifact_with_chapters_in_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let exporter = TextExporter::new(dir.path());

        let path = exporter.export(&job("Atlas")).await.unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();

        assert!(contents.contains("ATLAS"));
        assert!(contents.contains("TABLE OF CONTENTS"));
        let first = contents.find("CHAPTER 1: Start").unwrap();
        let second = contents.find("CHAPTER 2: End").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn rejects_unsupported_formats() {
        let dir = tempfile::TempDir::new().unwrap();
        let exporter = TextExporter::new(dir.path());

        let mut bad = job("Atlas");
        bad.formats = vec!["pdf".to_string()];

        let err = exporter.export(&bad).await.unwrap_err();
        assert!(err.to_string().contains("pdf"));
    }

    #[test]
    fn filenames_are_sanitized() {
        let name = generate_filename("a/b: c?", "txt");
        assert!(!name.contains('/'));
        assert!(!name.contains(':'));
        assert!(!name.contains('?'));
        assert!(name.ends_with(".txt"));
    }
}
