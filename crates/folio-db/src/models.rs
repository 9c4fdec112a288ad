use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// State of a human review gate.
///
/// Every gate starts at `NeedsDecision` once there is something to review,
/// moves to `ChangesRequested` when the reviewer leaves feedback, and to
/// `NoChangesNeeded` when the reviewer signs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    NeedsDecision,
    ChangesRequested,
    NoChangesNeeded,
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NeedsDecision => "needs_decision",
            Self::ChangesRequested => "changes_requested",
            Self::NoChangesNeeded => "no_changes_needed",
        };
        f.write_str(s)
    }
}

impl FromStr for ReviewState {
    type Err = ReviewStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "needs_decision" => Ok(Self::NeedsDecision),
            "changes_requested" => Ok(Self::ChangesRequested),
            "no_changes_needed" => Ok(Self::NoChangesNeeded),
            other => Err(ReviewStateParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ReviewState`] string.
#[derive(Debug, Clone)]
pub struct ReviewStateParseError(pub String);

impl fmt::Display for ReviewStateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid review state: {:?}", self.0)
    }
}

impl std::error::Error for ReviewStateParseError {}

// ---------------------------------------------------------------------------

/// Output status of a book -- tracks the final artifact, not the review gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutputState {
    Pending,
    InProgress,
    Paused,
    Completed,
    Error,
}

impl fmt::Display for OutputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for OutputState {
    type Err = OutputStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(OutputStateParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`OutputState`] string.
#[derive(Debug, Clone)]
pub struct OutputStateParseError(pub String);

impl fmt::Display for OutputStateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid output state: {:?}", self.0)
    }
}

impl std::error::Error for OutputStateParseError {}

// ---------------------------------------------------------------------------

/// Lifecycle state of a chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChapterState {
    Pending,
    Generating,
    Review,
    Approved,
    Regenerating,
}

impl fmt::Display for ChapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Review => "review",
            Self::Approved => "approved",
            Self::Regenerating => "regenerating",
        };
        f.write_str(s)
    }
}

impl FromStr for ChapterState {
    type Err = ChapterStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "generating" => Ok(Self::Generating),
            "review" => Ok(Self::Review),
            "approved" => Ok(Self::Approved),
            "regenerating" => Ok(Self::Regenerating),
            other => Err(ChapterStateParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ChapterState`] string.
#[derive(Debug, Clone)]
pub struct ChapterStateParseError(pub String);

impl fmt::Display for ChapterStateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid chapter state: {:?}", self.0)
    }
}

impl std::error::Error for ChapterStateParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A book -- the top-level unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    /// Briefing notes supplied at creation; required before an outline can
    /// be generated.
    pub outline_briefing: String,
    /// The live outline text. Empty until generated.
    pub outline: String,
    /// Reviewer feedback for outline regeneration. Meaningful only while
    /// `outline_review_state` is `ChangesRequested`.
    pub outline_feedback: String,
    pub outline_review_state: ReviewState,
    pub chapter_notes_state: ReviewState,
    pub final_review_state: ReviewState,
    pub final_review_notes: String,
    pub output_state: OutputState,
    /// Path of the compiled artifact. Empty until compilation succeeds.
    pub output_artifact_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A chapter -- one decomposed unit of a book.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Chapter {
    pub id: Uuid,
    pub book_id: Uuid,
    /// Positive, unique within a book, defines reading order.
    pub number: i32,
    pub title: String,
    pub content: String,
    /// Condensed summary used as context for later chapters. Only written
    /// after a successful generation, so it always reflects the last good
    /// content.
    pub summary: String,
    pub editor_notes: String,
    pub state: ChapterState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One versioned entry in a book's outline history. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutlineDraft {
    pub id: Uuid,
    pub book_id: Uuid,
    pub content: String,
    /// The briefing or feedback text that produced this draft.
    pub notes_used: String,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

/// One entry in the append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventLogEntry {
    pub id: i64,
    pub book_id: Option<Uuid>,
    pub event_type: String,
    pub message: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_state_display_roundtrip() {
        let variants = [
            ReviewState::NeedsDecision,
            ReviewState::ChangesRequested,
            ReviewState::NoChangesNeeded,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: ReviewState = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn review_state_invalid() {
        let result = "maybe".parse::<ReviewState>();
        assert!(result.is_err());
    }

    #[test]
    fn output_state_display_roundtrip() {
        let variants = [
            OutputState::Pending,
            OutputState::InProgress,
            OutputState::Paused,
            OutputState::Completed,
            OutputState::Error,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: OutputState = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn output_state_invalid() {
        let result = "done".parse::<OutputState>();
        assert!(result.is_err());
    }

    #[test]
    fn chapter_state_display_roundtrip() {
        let variants = [
            ChapterState::Pending,
            ChapterState::Generating,
            ChapterState::Review,
            ChapterState::Approved,
            ChapterState::Regenerating,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: ChapterState = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn chapter_state_invalid() {
        let result = "drafting".parse::<ChapterState>();
        assert!(result.is_err());
    }
}
