//! In-memory [`Store`] backend.
//!
//! Keeps all rows behind a single mutex, which makes the two atomicity
//! requirements of the trait trivial: `create_chapters_if_absent` and
//! `transition_chapter_state` each run their check and write under one
//! lock acquisition. Used as the test backend and for ephemeral runs.

use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{
    Book, Chapter, ChapterState, EventLogEntry, OutlineDraft, OutputState, ReviewState,
};
use crate::store::{BookPatch, ChapterInit, ChapterPatch, NewBook, NewChapter, Store};

#[derive(Default)]
struct Inner {
    books: Vec<Book>,
    chapters: Vec<Chapter>,
    drafts: Vec<OutlineDraft>,
    events: Vec<EventLogEntry>,
    next_event_id: i64,
}

/// Mutex-guarded in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_book_patch(book: &mut Book, patch: BookPatch) {
    if let Some(outline) = patch.outline {
        book.outline = outline;
    }
    if let Some(feedback) = patch.outline_feedback {
        book.outline_feedback = feedback;
    }
    if let Some(state) = patch.outline_review_state {
        book.outline_review_state = state;
    }
    if let Some(state) = patch.chapter_notes_state {
        book.chapter_notes_state = state;
    }
    if let Some(state) = patch.final_review_state {
        book.final_review_state = state;
    }
    if let Some(notes) = patch.final_review_notes {
        book.final_review_notes = notes;
    }
    if let Some(state) = patch.output_state {
        book.output_state = state;
    }
    if let Some(path) = patch.output_artifact_path {
        book.output_artifact_path = path;
    }
    book.updated_at = Utc::now();
}

fn apply_chapter_patch(chapter: &mut Chapter, patch: ChapterPatch) {
    if let Some(content) = patch.content {
        chapter.content = content;
    }
    if let Some(summary) = patch.summary {
        chapter.summary = summary;
    }
    if let Some(notes) = patch.editor_notes {
        chapter.editor_notes = notes;
    }
    if let Some(state) = patch.state {
        chapter.state = state;
    }
    chapter.updated_at = Utc::now();
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_book(&self, new: NewBook) -> Result<Book> {
        let now = Utc::now();
        let book = Book {
            id: Uuid::new_v4(),
            title: new.title,
            outline_briefing: new.outline_briefing,
            outline: String::new(),
            outline_feedback: String::new(),
            outline_review_state: ReviewState::NeedsDecision,
            chapter_notes_state: ReviewState::NeedsDecision,
            final_review_state: ReviewState::NeedsDecision,
            final_review_notes: String::new(),
            output_state: OutputState::Pending,
            output_artifact_path: String::new(),
            created_at: now,
            updated_at: now,
        };
        let mut inner = self.inner.lock().unwrap();
        inner.books.push(book.clone());
        Ok(book)
    }

    async fn get_book(&self, id: Uuid) -> Result<Option<Book>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.books.iter().find(|b| b.id == id).cloned())
    }

    async fn list_books(&self) -> Result<Vec<Book>> {
        let inner = self.inner.lock().unwrap();
        let mut books = inner.books.clone();
        books.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(books)
    }

    async fn update_book(&self, id: Uuid, patch: BookPatch) -> Result<Book> {
        let mut inner = self.inner.lock().unwrap();
        let Some(book) = inner.books.iter_mut().find(|b| b.id == id) else {
            bail!("book {id} not found");
        };
        apply_book_patch(book, patch);
        Ok(book.clone())
    }

    async fn create_chapters_if_absent(
        &self,
        book_id: Uuid,
        rows: Vec<NewChapter>,
    ) -> Result<ChapterInit> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.books.iter().any(|b| b.id == book_id) {
            bail!("book {book_id} not found");
        }
        if inner.chapters.iter().any(|c| c.book_id == book_id) {
            return Ok(ChapterInit::AlreadyInitialized);
        }
        let now = Utc::now();
        let mut created = Vec::with_capacity(rows.len());
        for row in rows {
            let chapter = Chapter {
                id: Uuid::new_v4(),
                book_id,
                number: row.number,
                title: row.title,
                content: String::new(),
                summary: String::new(),
                editor_notes: String::new(),
                state: ChapterState::Pending,
                created_at: now,
                updated_at: now,
            };
            inner.chapters.push(chapter.clone());
            created.push(chapter);
        }
        Ok(ChapterInit::Created(created))
    }

    async fn get_chapter(&self, id: Uuid) -> Result<Option<Chapter>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.chapters.iter().find(|c| c.id == id).cloned())
    }

    async fn get_chapter_by_number(
        &self,
        book_id: Uuid,
        number: i32,
    ) -> Result<Option<Chapter>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .chapters
            .iter()
            .find(|c| c.book_id == book_id && c.number == number)
            .cloned())
    }

    async fn list_chapters(&self, book_id: Uuid) -> Result<Vec<Chapter>> {
        let inner = self.inner.lock().unwrap();
        let mut chapters: Vec<Chapter> = inner
            .chapters
            .iter()
            .filter(|c| c.book_id == book_id)
            .cloned()
            .collect();
        chapters.sort_by_key(|c| c.number);
        Ok(chapters)
    }

    async fn update_chapter(&self, id: Uuid, patch: ChapterPatch) -> Result<Chapter> {
        let mut inner = self.inner.lock().unwrap();
        let Some(chapter) = inner.chapters.iter_mut().find(|c| c.id == id) else {
            bail!("chapter {id} not found");
        };
        apply_chapter_patch(chapter, patch);
        Ok(chapter.clone())
    }

    async fn transition_chapter_state(
        &self,
        id: Uuid,
        from: ChapterState,
        to: ChapterState,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(chapter) = inner.chapters.iter_mut().find(|c| c.id == id) else {
            bail!("chapter {id} not found");
        };
        if chapter.state != from {
            return Ok(false);
        }
        chapter.state = to;
        chapter.updated_at = Utc::now();
        Ok(true)
    }

    async fn append_outline_draft(
        &self,
        book_id: Uuid,
        content: &str,
        notes_used: &str,
    ) -> Result<OutlineDraft> {
        let mut inner = self.inner.lock().unwrap();
        let version = inner
            .drafts
            .iter()
            .filter(|d| d.book_id == book_id)
            .map(|d| d.version)
            .max()
            .unwrap_or(0)
            + 1;
        let draft = OutlineDraft {
            id: Uuid::new_v4(),
            book_id,
            content: content.to_owned(),
            notes_used: notes_used.to_owned(),
            version,
            created_at: Utc::now(),
        };
        inner.drafts.push(draft.clone());
        Ok(draft)
    }

    async fn list_outline_drafts(&self, book_id: Uuid) -> Result<Vec<OutlineDraft>> {
        let inner = self.inner.lock().unwrap();
        let mut drafts: Vec<OutlineDraft> = inner
            .drafts
            .iter()
            .filter(|d| d.book_id == book_id)
            .cloned()
            .collect();
        drafts.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(drafts)
    }

    async fn append_event(
        &self,
        book_id: Option<Uuid>,
        event_type: &str,
        message: &str,
        data: Value,
    ) -> Result<EventLogEntry> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_event_id += 1;
        let entry = EventLogEntry {
            id: inner.next_event_id,
            book_id,
            event_type: event_type.to_owned(),
            message: message.to_owned(),
            data,
            created_at: Utc::now(),
        };
        inner.events.push(entry.clone());
        Ok(entry)
    }

    async fn list_events(&self, book_id: Option<Uuid>) -> Result<Vec<EventLogEntry>> {
        let inner = self.inner.lock().unwrap();
        let mut events: Vec<EventLogEntry> = inner
            .events
            .iter()
            .filter(|e| book_id.is_none() || e.book_id == book_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(events)
    }
}
