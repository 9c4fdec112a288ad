//! Engine configuration: generation limits, deadlines, and concurrency.

use std::time::Duration;

/// Tunables for the workflow engine. All knobs have workable defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for a single backend call (generation or export). An
    /// elapsed deadline rolls lifecycle state back exactly like a backend
    /// failure.
    pub backend_deadline: Duration,
    /// Upper bound on chapter generations running at once for
    /// `generate_all_chapters`.
    pub max_concurrent_generations: usize,
    /// Token budget for outline generation calls.
    pub max_outline_tokens: u32,
    /// Token budget for chapter content calls.
    pub max_chapter_tokens: u32,
    /// Token budget for chapter summary calls.
    pub max_summary_tokens: u32,
    /// Default export formats when the caller does not specify any.
    pub export_formats: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend_deadline: Duration::from_secs(300),
            max_concurrent_generations: 2,
            max_outline_tokens: 2000,
            max_chapter_tokens: 4000,
            max_summary_tokens: 500,
            export_formats: vec!["txt".to_string()],
        }
    }
}
