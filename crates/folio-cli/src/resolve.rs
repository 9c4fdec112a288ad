//! Small shared helpers for CLI commands.

use anyhow::{Context, Result};
use uuid::Uuid;

use folio_core::error::EngineError;

/// Parse a book ID argument.
pub fn parse_book_id(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("invalid book ID: {s}"))
}

/// Map an engine error into CLI output: machine-readable kind in brackets,
/// human-readable message after it.
pub fn engine_error(e: EngineError) -> anyhow::Error {
    anyhow::anyhow!("[{}] {}", e.kind(), e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_ids() {
        assert!(parse_book_id("not-a-uuid").is_err());
        assert!(parse_book_id("7c3e8a80-47e5-4be0-9b0c-111111111111").is_ok());
    }

    #[test]
    fn engine_error_carries_kind_and_message() {
        let err = engine_error(EngineError::MissingBriefing);
        let text = err.to_string();
        assert!(text.starts_with("[missing_briefing]"));
        assert!(text.contains("briefing"));
    }
}
