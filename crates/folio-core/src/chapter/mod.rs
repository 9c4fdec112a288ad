//! Chapter lifecycle: initialization from the outline, generation and
//! regeneration orchestration, approval, and the chapter state machine.

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing;
use uuid::Uuid;

use folio_db::models::{Book, Chapter, ChapterState};
use folio_db::store::{ChapterInit, ChapterPatch, NewChapter, Store};

use crate::config::EngineConfig;
use crate::context;
use crate::error::EngineError;
use crate::generator::{GenerateRequest, Generator, generate_bounded, prompts};
use crate::notify::{Notifier, WorkflowEvent};
use crate::outline;

/// The chapter state machine.
///
/// Enforces the valid transition graph:
///
/// ```text
/// pending      -> generating
/// review       -> generating     (re-run before approval)
/// approved     -> generating     (approved chapters with no content only)
/// generating   -> review         (success)
/// generating   -> pending        (backend failure rollback)
/// review       -> regenerating
/// regenerating -> review         (success or rollback)
/// review       -> approved
/// ```
///
/// Approval itself bypasses the graph: it is unconditional and idempotent.
pub struct ChapterStateMachine;

impl ChapterStateMachine {
    /// Check whether a transition from `from` to `to` is a valid edge in
    /// the state graph.
    pub fn is_valid_transition(from: ChapterState, to: ChapterState) -> bool {
        matches!(
            (from, to),
            (ChapterState::Pending, ChapterState::Generating)
                | (ChapterState::Review, ChapterState::Generating)
                | (ChapterState::Approved, ChapterState::Generating)
                | (ChapterState::Generating, ChapterState::Review)
                | (ChapterState::Generating, ChapterState::Pending)
                | (ChapterState::Review, ChapterState::Regenerating)
                | (ChapterState::Regenerating, ChapterState::Review)
                | (ChapterState::Review, ChapterState::Approved)
        )
    }
}

/// Which unapproved chapter numbers remain, in order.
pub fn unapproved_numbers(chapters: &[Chapter]) -> Vec<i32> {
    let mut numbers: Vec<i32> = chapters
        .iter()
        .filter(|c| c.state != ChapterState::Approved)
        .map(|c| c.number)
        .collect();
    numbers.sort_unstable();
    numbers
}

/// Chapter-level operations. Borrows its collaborators from the engine.
pub struct ChapterLifecycle<'a> {
    store: &'a dyn Store,
    generator: &'a dyn Generator,
    notifier: &'a dyn Notifier,
    config: &'a EngineConfig,
    cancel: &'a CancellationToken,
}

impl<'a> ChapterLifecycle<'a> {
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

    /// Parse the book's outline and create one `Pending` chapter row per
    /// parsed entry.
    ///
    /// Requires an approved outline. Safe under concurrent callers: the
    /// store's insert-if-absent guarantees a single winner, and every other
    /// caller observes [`EngineError::AlreadyInitialized`].
    pub async fn initialize(&self, book_id: Uuid) -> Result<Vec<Chapter>, EngineError> {
        let book = self.require_book(book_id).await?;

        if book.outline.is_empty() {
            return Err(EngineError::MissingOutline);
        }
        if book.outline_review_state != folio_db::models::ReviewState::NoChangesNeeded {
            return Err(EngineError::OutlineNotApproved);
        }

        // Chapter numbers are unique within a book; if the outline repeats
        // a number, the first heading wins.
        let parsed = outline::parse(&book.outline);
        let mut seen = std::collections::HashSet::new();
        let rows: Vec<NewChapter> = parsed
            .iter()
            .filter(|c| seen.insert(c.number))
            .map(|c| NewChapter {
                number: c.number,
                title: c.title.clone(),
            })
            .collect();

        match self.store.create_chapters_if_absent(book_id, rows).await? {
            ChapterInit::Created(chapters) => {
                self.log_event(
                    book_id,
                    "chapters_initialized",
                    &format!("Initialized {} chapters", chapters.len()),
                    json!({
                        "chapters": chapters
                            .iter()
                            .map(|c| json!({"number": c.number, "title": c.title}))
                            .collect::<Vec<_>>(),
                    }),
                )
                .await;
                Ok(chapters)
            }
            ChapterInit::AlreadyInitialized => Err(EngineError::AlreadyInitialized),
        }
    }

    /// Generate content for a chapter.
    ///
    /// Takes the per-chapter generation lease by compare-and-setting the
    /// state to `Generating`; a concurrent generation for the same chapter
    /// observes [`EngineError::GenerationInFlight`]. On backend failure the
    /// chapter rolls back to `Pending` and the error is surfaced.
    pub async fn generate(&self, book_id: Uuid, number: i32) -> Result<Chapter, EngineError> {
        let book = self.require_book(book_id).await?;
        let chapter = self.require_chapter(book_id, number).await?;

        if chapter.state == ChapterState::Approved && !chapter.content.is_empty() {
            return Err(EngineError::AlreadyApproved);
        }
        if !self.take_lease(&chapter, ChapterState::Generating).await? {
            return Err(EngineError::GenerationInFlight);
        }

        // The lease is held from here on; every failure path must release
        // it by rolling back to Pending.
        let outline_body = outline::parse(&book.outline)
            .into_iter()
            .find(|c| c.number == number)
            .map(|c| c.body)
            .unwrap_or_default();

        let previous_summaries = match context::build_context_for_book(self.store, book_id, number)
            .await
        {
            Ok(ctx) => ctx,
            Err(e) => {
                return self
                    .fail_generation(&book, &chapter, ChapterState::Pending, "generation", e.into())
                    .await;
            }
        };

        let content_request = GenerateRequest::new(
            prompts::chapter_generation(
                &book.title,
                number,
                &chapter.title,
                &outline_body,
                &previous_summaries,
                &chapter.editor_notes,
            ),
            self.config.max_chapter_tokens,
        )
        .with_system(prompts::CHAPTER_SYSTEM);

        let content = match self.call_backend(&content_request).await {
            Ok(content) => content,
            Err(e) => {
                return self
                    .fail_generation(&book, &chapter, ChapterState::Pending, "generation", e)
                    .await;
            }
        };

        let summary_request = GenerateRequest::new(
            prompts::chapter_summary(&content, number, &chapter.title),
            self.config.max_summary_tokens,
        );
        let summary = match self.call_backend(&summary_request).await {
            Ok(summary) => summary,
            Err(e) => {
                return self
                    .fail_generation(&book, &chapter, ChapterState::Pending, "generation", e)
                    .await;
            }
        };

        let updated = self
            .store
            .update_chapter(
                chapter.id,
                ChapterPatch {
                    content: Some(content),
                    summary: Some(summary),
                    state: Some(ChapterState::Review),
                    ..Default::default()
                },
            )
            .await?;

        self.log_event(
            book_id,
            "chapter_generated",
            &format!("Chapter {number} generated"),
            json!({"chapter_title": chapter.title, "content_length": updated.content.len()}),
        )
        .await;
        self.notifier
            .notify(&WorkflowEvent::ChapterReady {
                book_id,
                title: book.title.clone(),
                chapter_number: number,
                chapter_title: chapter.title.clone(),
            })
            .await;

        Ok(updated)
    }

    /// Regenerate a chapter from reviewer feedback.
    ///
    /// Requires existing content and non-empty `editor_notes`. On backend
    /// failure the chapter rolls back to `Review` with its old content and
    /// summary intact.
    pub async fn regenerate(&self, book_id: Uuid, number: i32) -> Result<Chapter, EngineError> {
        let book = self.require_book(book_id).await?;
        let chapter = self.require_chapter(book_id, number).await?;

        if chapter.content.is_empty() {
            return Err(EngineError::NoExistingContent);
        }
        if chapter.editor_notes.is_empty() {
            return Err(EngineError::NoFeedback);
        }
        match chapter.state {
            ChapterState::Generating | ChapterState::Regenerating => {
                return Err(EngineError::GenerationInFlight);
            }
            // An approved chapter re-enters Review via add_feedback first.
            ChapterState::Approved => return Err(EngineError::AlreadyApproved),
            _ => {}
        }
        if !self.take_lease(&chapter, ChapterState::Regenerating).await? {
            return Err(EngineError::GenerationInFlight);
        }

        let previous_summaries = match context::build_context_for_book(self.store, book_id, number)
            .await
        {
            Ok(ctx) => ctx,
            Err(e) => {
                return self
                    .fail_generation(&book, &chapter, ChapterState::Review, "regeneration", e.into())
                    .await;
            }
        };

        let content_request = GenerateRequest::new(
            prompts::chapter_regeneration(
                &book.title,
                number,
                &chapter.title,
                &chapter.content,
                &chapter.editor_notes,
                &previous_summaries,
            ),
            self.config.max_chapter_tokens,
        )
        .with_system(prompts::CHAPTER_REVISION_SYSTEM);

        let content = match self.call_backend(&content_request).await {
            Ok(content) => content,
            Err(e) => {
                return self
                    .fail_generation(&book, &chapter, ChapterState::Review, "regeneration", e)
                    .await;
            }
        };

        let summary_request = GenerateRequest::new(
            prompts::chapter_summary(&content, number, &chapter.title),
            self.config.max_summary_tokens,
        );
        let summary = match self.call_backend(&summary_request).await {
            Ok(summary) => summary,
            Err(e) => {
                return self
                    .fail_generation(&book, &chapter, ChapterState::Review, "regeneration", e)
                    .await;
            }
        };

        let updated = self
            .store
            .update_chapter(
                chapter.id,
                ChapterPatch {
                    content: Some(content),
                    summary: Some(summary),
                    state: Some(ChapterState::Review),
                    ..Default::default()
                },
            )
            .await?;

        self.log_event(
            book_id,
            "chapter_regenerated",
            &format!("Chapter {number} regenerated based on feedback"),
            json!({"notes": truncate(&chapter.editor_notes, 200)}),
        )
        .await;
        self.notifier
            .notify(&WorkflowEvent::ChapterReady {
                book_id,
                title: book.title.clone(),
                chapter_number: number,
                chapter_title: chapter.title.clone(),
            })
            .await;

        Ok(updated)
    }

    /// Approve a chapter. Unconditional and idempotent: approving an
    /// already-approved chapter is a no-op success.
    pub async fn approve(&self, book_id: Uuid, number: i32) -> Result<Chapter, EngineError> {
        let chapter = self.require_chapter(book_id, number).await?;

        if chapter.state == ChapterState::Approved {
            return Ok(chapter);
        }

        let updated = self
            .store
            .update_chapter(
                chapter.id,
                ChapterPatch {
                    state: Some(ChapterState::Approved),
                    ..Default::default()
                },
            )
            .await?;

        self.log_event(
            book_id,
            "chapter_approved",
            &format!("Chapter {number} approved"),
            json!({"chapter_title": chapter.title}),
        )
        .await;

        Ok(updated)
    }

    /// Store reviewer feedback for a chapter. A chapter that already has
    /// content moves back to `Review` so it can be regenerated; a chapter
    /// that was never generated keeps its state and picks the notes up on
    /// first generation.
    pub async fn add_feedback(
        &self,
        book_id: Uuid,
        number: i32,
        notes: &str,
    ) -> Result<Chapter, EngineError> {
        if notes.is_empty() {
            return Err(EngineError::NoFeedback);
        }
        let chapter = self.require_chapter(book_id, number).await?;

        let state = if chapter.content.is_empty() {
            None
        } else {
            Some(ChapterState::Review)
        };

        let updated = self
            .store
            .update_chapter(
                chapter.id,
                ChapterPatch {
                    editor_notes: Some(notes.to_owned()),
                    state,
                    ..Default::default()
                },
            )
            .await?;

        self.log_event(
            book_id,
            "chapter_feedback_added",
            &format!("Feedback added for chapter {number}"),
            json!({"notes": truncate(notes, 200)}),
        )
        .await;

        Ok(updated)
    }

    /// Whether every chapter is approved, plus the unapproved chapter
    /// numbers. A book with zero chapters is not "all approved".
    pub async fn all_approved(&self, book_id: Uuid) -> Result<(bool, Vec<i32>), EngineError> {
        let chapters = self.store.list_chapters(book_id).await?;
        if chapters.is_empty() {
            return Ok((false, Vec::new()));
        }
        let pending = unapproved_numbers(&chapters);
        Ok((pending.is_empty(), pending))
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

    async fn require_chapter(&self, book_id: Uuid, number: i32) -> Result<Chapter, EngineError> {
        self.store
            .get_chapter_by_number(book_id, number)
            .await?
            .ok_or(EngineError::ChapterNotFound { book_id, number })
    }

    /// Compare-and-set the chapter into an in-flight state. Returns false
    /// when the transition is not a valid edge or a concurrent writer got
    /// there first.
    async fn take_lease(
        &self,
        chapter: &Chapter,
        to: ChapterState,
    ) -> Result<bool, EngineError> {
        if !ChapterStateMachine::is_valid_transition(chapter.state, to) {
            return Ok(false);
        }
        Ok(self
            .store
            .transition_chapter_state(chapter.id, chapter.state, to)
            .await?)
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

    /// Release the lease after a backend failure: roll the chapter back to
    /// `rollback_to`, record the failure, and surface the error.
    async fn fail_generation(
        &self,
        book: &Book,
        chapter: &Chapter,
        rollback_to: ChapterState,
        stage: &str,
        error: EngineError,
    ) -> Result<Chapter, EngineError> {
        let in_flight = match rollback_to {
            ChapterState::Pending => ChapterState::Generating,
            _ => ChapterState::Regenerating,
        };
        match self
            .store
            .transition_chapter_state(chapter.id, in_flight, rollback_to)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    chapter_id = %chapter.id,
                    "chapter state changed during failed generation; rollback skipped"
                );
            }
            Err(e) => {
                tracing::warn!(chapter_id = %chapter.id, error = %e, "rollback failed");
            }
        }

        let message = format!("Chapter {} {stage} failed: {error}", chapter.number);
        self.log_event(book.id, "error", &message, json!({})).await;
        self.notifier
            .notify(&WorkflowEvent::ErrorOccurred {
                book_id: book.id,
                title: book.title.clone(),
                stage: format!("chapter_{}_{stage}", chapter.number),
                message: error.to_string(),
            })
            .await;

        Err(error)
    }

    /// Best-effort event append; a store fault here must not mask the
    /// operation's own outcome.
    async fn log_event(&self, book_id: Uuid, event_type: &str, message: &str, data: serde_json::Value) {
        if let Err(e) = self
            .store
            .append_event(Some(book_id), event_type, message, data)
            .await
        {
            tracing::warn!(book_id = %book_id, error = %e, "failed to append event log entry");
        }
    }
}

/// Clip a string to at most `max` characters, respecting char boundaries.
pub(crate) fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        use ChapterState::*;
        assert!(ChapterStateMachine::is_valid_transition(Pending, Generating));
        assert!(ChapterStateMachine::is_valid_transition(Generating, Review));
        assert!(ChapterStateMachine::is_valid_transition(Generating, Pending));
        assert!(ChapterStateMachine::is_valid_transition(Review, Regenerating));
        assert!(ChapterStateMachine::is_valid_transition(Regenerating, Review));
        assert!(ChapterStateMachine::is_valid_transition(Review, Approved));
    }

    #[test]
    fn invalid_transitions() {
        use ChapterState::*;
        assert!(!ChapterStateMachine::is_valid_transition(Pending, Review));
        assert!(!ChapterStateMachine::is_valid_transition(Pending, Approved));
        assert!(!ChapterStateMachine::is_valid_transition(Approved, Regenerating));
        assert!(!ChapterStateMachine::is_valid_transition(Generating, Approved));
        assert!(!ChapterStateMachine::is_valid_transition(Regenerating, Pending));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("ééé", 2), "éé");
    }
}
