//! The `Store` trait -- the CRUD contract the workflow engine depends on.
//!
//! Each concrete backend (PostgreSQL, in-memory) implements this trait. The
//! trait is object-safe so engine components can hold it as
//! `Arc<dyn Store>`, with the backend selected by configuration at process
//! start.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{
    Book, Chapter, ChapterState, EventLogEntry, OutlineDraft, OutputState, ReviewState,
};

/// Fields for creating a new book.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub outline_briefing: String,
}

/// Fields for creating a new chapter row (state starts at `Pending`).
#[derive(Debug, Clone)]
pub struct NewChapter {
    pub number: i32,
    pub title: String,
}

/// Partial update for a book. `None` fields are left unchanged.
///
/// Every applied patch refreshes the book's `updated_at`.
#[derive(Debug, Clone, Default)]
pub struct BookPatch {
    pub outline: Option<String>,
    pub outline_feedback: Option<String>,
    pub outline_review_state: Option<ReviewState>,
    pub chapter_notes_state: Option<ReviewState>,
    pub final_review_state: Option<ReviewState>,
    pub final_review_notes: Option<String>,
    pub output_state: Option<OutputState>,
    pub output_artifact_path: Option<String>,
}

/// Partial update for a chapter. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct ChapterPatch {
    pub content: Option<String>,
    pub summary: Option<String>,
    pub editor_notes: Option<String>,
    pub state: Option<ChapterState>,
}

/// Outcome of [`Store::create_chapters_if_absent`].
#[derive(Debug, Clone)]
pub enum ChapterInit {
    /// This caller won the creation; the inserted rows are returned.
    Created(Vec<Chapter>),
    /// Chapter rows already existed for the book; nothing was inserted.
    AlreadyInitialized,
}

/// Persistence contract for books, chapters, outline history, and the
/// event log.
///
/// # Atomicity
///
/// Two operations carry the engine's correctness guarantees and must be
/// atomic in every backend:
///
/// - [`create_chapters_if_absent`](Store::create_chapters_if_absent) is a
///   single insert-if-absent: under concurrent callers for the same book,
///   exactly one observes [`ChapterInit::Created`] and every other
///   observes [`ChapterInit::AlreadyInitialized`]. A check-then-insert
///   sequence is not an acceptable implementation.
/// - [`transition_chapter_state`](Store::transition_chapter_state) is a
///   compare-and-set: the update applies only if the chapter is still in
///   the expected `from` state, and the return value reports whether it
///   did. The engine uses this as the per-chapter generation lease.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_book(&self, new: NewBook) -> Result<Book>;

    async fn get_book(&self, id: Uuid) -> Result<Option<Book>>;

    /// All books, newest first.
    async fn list_books(&self) -> Result<Vec<Book>>;

    /// Apply a partial update and return the updated row. Errors if the
    /// book does not exist.
    async fn update_book(&self, id: Uuid, patch: BookPatch) -> Result<Book>;

    /// Insert the given chapter rows for a book, unless any chapter rows
    /// already exist for it. See the trait-level atomicity notes.
    async fn create_chapters_if_absent(
        &self,
        book_id: Uuid,
        rows: Vec<NewChapter>,
    ) -> Result<ChapterInit>;

    async fn get_chapter(&self, id: Uuid) -> Result<Option<Chapter>>;

    async fn get_chapter_by_number(
        &self,
        book_id: Uuid,
        number: i32,
    ) -> Result<Option<Chapter>>;

    /// All chapters for a book, ordered by chapter number.
    async fn list_chapters(&self, book_id: Uuid) -> Result<Vec<Chapter>>;

    /// Apply a partial update and return the updated row. Errors if the
    /// chapter does not exist.
    async fn update_chapter(&self, id: Uuid, patch: ChapterPatch) -> Result<Chapter>;

    /// Compare-and-set the chapter state. Returns `true` if the chapter was
    /// in `from` and is now in `to`, `false` if the current state did not
    /// match (a concurrent writer won). Errors if the chapter does not
    /// exist.
    async fn transition_chapter_state(
        &self,
        id: Uuid,
        from: ChapterState,
        to: ChapterState,
    ) -> Result<bool>;

    /// Append an outline draft, assigning `1 + max(existing versions)`.
    async fn append_outline_draft(
        &self,
        book_id: Uuid,
        content: &str,
        notes_used: &str,
    ) -> Result<OutlineDraft>;

    /// All drafts for a book, newest version first.
    async fn list_outline_drafts(&self, book_id: Uuid) -> Result<Vec<OutlineDraft>>;

    /// Append an audit event. Write-only; entries are never mutated.
    async fn append_event(
        &self,
        book_id: Option<Uuid>,
        event_type: &str,
        message: &str,
        data: Value,
    ) -> Result<EventLogEntry>;

    /// Events, newest first, optionally filtered to one book.
    async fn list_events(&self, book_id: Option<Uuid>) -> Result<Vec<EventLogEntry>>;
}

// Compile-time assertion: Store must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Store) {}
};
