//! Error taxonomy for the workflow engine.
//!
//! Three families: precondition failures (detectable before any external
//! call, nothing mutated), not-found lookups, and backend failures (the
//! generation or export call failed after an explicit state rollback).
//! Store faults are wrapped as `Store`.

use thiserror::Error;
use uuid::Uuid;

/// Error returned by every public engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("book {0} not found")]
    BookNotFound(Uuid),

    #[error("chapter {number} not found for book {book_id}")]
    ChapterNotFound { book_id: Uuid, number: i32 },

    #[error("a title is required")]
    EmptyTitle,

    #[error("an outline briefing is required before an outline can be generated")]
    MissingBriefing,

    #[error("an outline already exists; regenerate it instead")]
    OutlineExists,

    #[error("the book has no outline")]
    MissingOutline,

    #[error("the outline has not been approved")]
    OutlineNotApproved,

    #[error("chapters are already initialized for this book")]
    AlreadyInitialized,

    #[error("no feedback notes provided")]
    NoFeedback,

    #[error("no existing content to regenerate")]
    NoExistingContent,

    #[error("chapter is already approved")]
    AlreadyApproved,

    #[error("another generation is already in flight for this chapter")]
    GenerationInFlight,

    #[error("no chapters have been initialized")]
    NoChapters,

    #[error("chapters not yet approved: {0:?}")]
    ChaptersPending(Vec<i32>),

    #[error("final review incomplete: approve it or provide final review notes")]
    FinalReviewIncomplete,

    #[error("generation backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    /// Machine-readable error kind, stable across message wording changes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BookNotFound(_) => "book_not_found",
            Self::ChapterNotFound { .. } => "chapter_not_found",
            Self::EmptyTitle => "empty_title",
            Self::MissingBriefing => "missing_briefing",
            Self::OutlineExists => "outline_exists",
            Self::MissingOutline => "missing_outline",
            Self::OutlineNotApproved => "outline_not_approved",
            Self::AlreadyInitialized => "already_initialized",
            Self::NoFeedback => "no_feedback",
            Self::NoExistingContent => "no_existing_content",
            Self::AlreadyApproved => "already_approved",
            Self::GenerationInFlight => "generation_in_flight",
            Self::NoChapters => "no_chapters",
            Self::ChaptersPending(_) => "chapters_pending",
            Self::FinalReviewIncomplete => "final_review_incomplete",
            Self::Backend(_) => "backend_error",
            Self::Store(_) => "store_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(EngineError::MissingBriefing.kind(), "missing_briefing");
        assert_eq!(EngineError::ChaptersPending(vec![3]).kind(), "chapters_pending");
        assert_eq!(
            EngineError::Backend("boom".to_string()).kind(),
            "backend_error"
        );
    }

    #[test]
    fn messages_are_human_readable() {
        let err = EngineError::ChaptersPending(vec![2, 3]);
        assert!(err.to_string().contains("[2, 3]"));
    }
}
