//! Book lifecycle: stage derivation, outline generation and regeneration,
//! and the outline approval gate.

use std::fmt;

use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing;
use uuid::Uuid;

use folio_db::models::{Book, Chapter, ChapterState, OutputState, ReviewState};
use folio_db::store::{BookPatch, Store};

use crate::chapter::{ChapterLifecycle, truncate};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::generator::{GenerateRequest, Generator, generate_bounded, prompts};
use crate::notify::{Notifier, WorkflowEvent};

/// The stage a book is currently in, derived on demand from its fields and
/// chapter rows. Never persisted, so it can never drift from the
/// underlying state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    OutlinePending,
    OutlineReview,
    ChaptersInit,
    ChaptersInProgress,
    FinalReview,
    Compilation,
    Completed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OutlinePending => "outline_pending",
            Self::OutlineReview => "outline_review",
            Self::ChaptersInit => "chapters_init",
            Self::ChaptersInProgress => "chapters_in_progress",
            Self::FinalReview => "final_review",
            Self::Compilation => "compilation",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// A derived stage plus the human-facing next action for it.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub next_action: String,
}

/// Derive the current stage from book fields and chapter rows.
///
/// Total over every reachable field combination; the checks run in workflow
/// order and the first match wins.
pub fn derive_stage(book: &Book, chapters: &[Chapter]) -> StageReport {
    if book.outline.is_empty() {
        return StageReport {
            stage: Stage::OutlinePending,
            next_action: "Generate an outline".to_string(),
        };
    }
    if book.outline_review_state != ReviewState::NoChangesNeeded {
        return StageReport {
            stage: Stage::OutlineReview,
            next_action: "Review the outline and approve it or request changes".to_string(),
        };
    }
    if chapters.is_empty() {
        return StageReport {
            stage: Stage::ChaptersInit,
            next_action: "Initialize chapters from the outline".to_string(),
        };
    }
    let pending: Vec<i32> = chapters
        .iter()
        .filter(|c| c.state != ChapterState::Approved)
        .map(|c| c.number)
        .collect();
    if !pending.is_empty() {
        return StageReport {
            stage: Stage::ChaptersInProgress,
            next_action: format!("Generate or review chapters: {pending:?}"),
        };
    }
    if book.final_review_state != ReviewState::NoChangesNeeded {
        return StageReport {
            stage: Stage::FinalReview,
            next_action: "Complete the final review".to_string(),
        };
    }
    if book.output_state != OutputState::Completed {
        return StageReport {
            stage: Stage::Compilation,
            next_action: "Compile the final book".to_string(),
        };
    }
    StageReport {
        stage: Stage::Completed,
        next_action: "Book generation complete".to_string(),
    }
}

/// Book-level operations. Borrows its collaborators from the engine.
pub struct BookLifecycle<'a> {
    store: &'a dyn Store,
    generator: &'a dyn Generator,
    notifier: &'a dyn Notifier,
    config: &'a EngineConfig,
    cancel: &'a CancellationToken,
}

impl<'a> BookLifecycle<'a> {
    pub fn new(
        store: &'a dyn Store,
        generator: &'a dyn Generator,
        notifier: &'a dyn Notifier,
        config: &'a EngineConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            store,
            generator,
            notifier,
            config,
            cancel,
        }
    }

    /// Generate the book's first outline from its creation briefing.
    ///
    /// The outline is written exactly once here; later changes go through
    /// [`Self::regenerate_outline`]. Also appends the first
    /// `OutlineDraft`, opens the review gate, and marks the book
    /// in-progress.
    pub async fn generate_outline(&self, book_id: Uuid) -> Result<Book, EngineError> {
        let book = self.require_book(book_id).await?;

        if book.outline_briefing.is_empty() {
            return Err(EngineError::MissingBriefing);
        }
        if !book.outline.is_empty() {
            return Err(EngineError::OutlineExists);
        }

        let request = GenerateRequest::new(
            prompts::outline_generation(&book.title, &book.outline_briefing),
            self.config.max_outline_tokens,
        )
        .with_system(prompts::OUTLINE_SYSTEM);

        let outline = match self.call_backend(&request).await {
            Ok(outline) => outline,
            Err(e) => return self.fail_outline(&book, "outline_generation", e).await,
        };

        let updated = self
            .store
            .update_book(
                book_id,
                BookPatch {
                    outline: Some(outline.clone()),
                    outline_review_state: Some(ReviewState::NeedsDecision),
                    output_state: Some(OutputState::InProgress),
                    ..Default::default()
                },
            )
            .await?;

        self.store
            .append_outline_draft(book_id, &outline, &book.outline_briefing)
            .await?;

        self.log_event(
            book_id,
            "outline_generated",
            &format!("Outline generated for '{}'", book.title),
            json!({"outline_length": outline.len()}),
        )
        .await;
        self.notifier
            .notify(&WorkflowEvent::OutlineReady {
                book_id,
                title: book.title.clone(),
            })
            .await;

        Ok(updated)
    }

    /// Regenerate the outline from reviewer feedback, appending a new
    /// draft version and reopening the review gate.
    pub async fn regenerate_outline(&self, book_id: Uuid) -> Result<Book, EngineError> {
        let book = self.require_book(book_id).await?;

        if book.outline.is_empty() {
            return Err(EngineError::MissingOutline);
        }
        if book.outline_feedback.is_empty() {
            return Err(EngineError::NoFeedback);
        }

        let request = GenerateRequest::new(
            prompts::outline_regeneration(&book.title, &book.outline, &book.outline_feedback),
            self.config.max_outline_tokens,
        )
        .with_system(prompts::OUTLINE_REVISION_SYSTEM);

        let outline = match self.call_backend(&request).await {
            Ok(outline) => outline,
            Err(e) => return self.fail_outline(&book, "outline_regeneration", e).await,
        };

        let updated = self
            .store
            .update_book(
                book_id,
                BookPatch {
                    outline: Some(outline.clone()),
                    outline_review_state: Some(ReviewState::NeedsDecision),
                    ..Default::default()
                },
            )
            .await?;

        self.store
            .append_outline_draft(book_id, &outline, &book.outline_feedback)
            .await?;

        self.log_event(
            book_id,
            "outline_regenerated",
            &format!("Outline regenerated for '{}' based on feedback", book.title),
            json!({"notes": truncate(&book.outline_feedback, 200)}),
        )
        .await;
        self.notifier
            .notify(&WorkflowEvent::OutlineReady {
                book_id,
                title: book.title.clone(),
            })
            .await;

        Ok(updated)
    }

    /// Approve the outline and initialize chapters from it.
    ///
    /// Both steps succeed together or the approval is reported as failed:
    /// when initialization fails, the review gate is restored to its prior
    /// state rather than leaving an approved-but-uninitialized book.
    pub async fn approve_outline(&self, book_id: Uuid) -> Result<Vec<Chapter>, EngineError> {
        let book = self.require_book(book_id).await?;
        let previous = book.outline_review_state;

        self.store
            .update_book(
                book_id,
                BookPatch {
                    outline_review_state: Some(ReviewState::NoChangesNeeded),
                    ..Default::default()
                },
            )
            .await?;

        let chapters = ChapterLifecycle::new(
            self.store,
            self.generator,
            self.notifier,
            self.config,
            self.cancel,
        );

        match chapters.initialize(book_id).await {
            Ok(created) => {
                self.log_event(
                    book_id,
                    "outline_approved",
                    "Outline approved, chapters initialized",
                    json!({"chapter_count": created.len()}),
                )
                .await;
                Ok(created)
            }
            Err(e) => {
                if let Err(revert_err) = self
                    .store
                    .update_book(
                        book_id,
                        BookPatch {
                            outline_review_state: Some(previous),
                            ..Default::default()
                        },
                    )
                    .await
                {
                    tracing::warn!(
                        book_id = %book_id,
                        error = %revert_err,
                        "failed to restore review gate after initialization failure"
                    );
                }
                Err(e)
            }
        }
    }

    /// Store reviewer feedback on the outline and flag the gate as
    /// `ChangesRequested`.
    pub async fn add_outline_feedback(
        &self,
        book_id: Uuid,
        notes: &str,
    ) -> Result<Book, EngineError> {
        if notes.is_empty() {
            return Err(EngineError::NoFeedback);
        }
        self.require_book(book_id).await?;

        let updated = self
            .store
            .update_book(
                book_id,
                BookPatch {
                    outline_feedback: Some(notes.to_owned()),
                    outline_review_state: Some(ReviewState::ChangesRequested),
                    ..Default::default()
                },
            )
            .await?;

        self.log_event(
            book_id,
            "outline_feedback_added",
            "Feedback notes added for outline regeneration",
            json!({"notes": truncate(notes, 200)}),
        )
        .await;

        Ok(updated)
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    async fn require_book(&self, book_id: Uuid) -> Result<Book, EngineError> {
        self.store
            .get_book(book_id)
            .await?
            .ok_or(EngineError::BookNotFound(book_id))
    }

    async fn call_backend(&self, request: &GenerateRequest) -> Result<String, EngineError> {
        generate_bounded(
            self.generator,
            request,
            self.config.backend_deadline,
            self.cancel,
        )
        .await
    }

    /// Record an outline backend failure. Nothing was mutated before the
    /// call, so there is no state to roll back.
    async fn fail_outline(
        &self,
        book: &Book,
        stage: &str,
        error: EngineError,
    ) -> Result<Book, EngineError> {
        self.log_event(
            book.id,
            "error",
            &format!("{stage} failed: {error}"),
            json!({}),
        )
        .await;
        self.notifier
            .notify(&WorkflowEvent::ErrorOccurred {
                book_id: book.id,
                title: book.title.clone(),
                stage: stage.to_owned(),
                message: error.to_string(),
            })
            .await;
        Err(error)
    }

    async fn log_event(
        &self,
        book_id: Uuid,
        event_type: &str,
        message: &str,
        data: serde_json::Value,
    ) {
        if let Err(e) = self
            .store
            .append_event(Some(book_id), event_type, message, data)
            .await
        {
            tracing::warn!(book_id = %book_id, error = %e, "failed to append event log entry");
        }
    }
}
