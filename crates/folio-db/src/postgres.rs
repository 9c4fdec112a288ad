//! PostgreSQL [`Store`] backend built on sqlx.
//!
//! Atomicity notes:
//!
//! - `create_chapters_if_absent` runs inside a transaction that takes a
//!   `FOR UPDATE` row lock on the book, so concurrent initializers for the
//!   same book serialize and exactly one inserts. The
//!   `UNIQUE (book_id, number)` constraint backstops the lock.
//! - `transition_chapter_state` is a single conditional `UPDATE` whose
//!   affected-row count reports whether the compare-and-set applied.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{Book, Chapter, ChapterState, EventLogEntry, OutlineDraft};
use crate::store::{BookPatch, ChapterInit, ChapterPatch, NewBook, NewChapter, Store};

/// Store backend over a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for callers that need a clean shutdown.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_book(&self, new: NewBook) -> Result<Book> {
        let book = sqlx::query_as::<_, Book>(
            "INSERT INTO books (title, outline_briefing) VALUES ($1, $2) RETURNING *",
        )
        .bind(&new.title)
        .bind(&new.outline_briefing)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert book")?;

        Ok(book)
    }

    async fn get_book(&self, id: Uuid) -> Result<Option<Book>> {
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch book")?;

        Ok(book)
    }

    async fn list_books(&self) -> Result<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>("SELECT * FROM books ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .context("failed to list books")?;

        Ok(books)
    }

    async fn update_book(&self, id: Uuid, patch: BookPatch) -> Result<Book> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("UPDATE books SET updated_at = now()");
        if let Some(outline) = &patch.outline {
            qb.push(", outline = ").push_bind(outline);
        }
        if let Some(feedback) = &patch.outline_feedback {
            qb.push(", outline_feedback = ").push_bind(feedback);
        }
        if let Some(state) = patch.outline_review_state {
            qb.push(", outline_review_state = ").push_bind(state);
        }
        if let Some(state) = patch.chapter_notes_state {
            qb.push(", chapter_notes_state = ").push_bind(state);
        }
        if let Some(state) = patch.final_review_state {
            qb.push(", final_review_state = ").push_bind(state);
        }
        if let Some(notes) = &patch.final_review_notes {
            qb.push(", final_review_notes = ").push_bind(notes);
        }
        if let Some(state) = patch.output_state {
            qb.push(", output_state = ").push_bind(state);
        }
        if let Some(path) = &patch.output_artifact_path {
            qb.push(", output_artifact_path = ").push_bind(path);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(" RETURNING *");

        let book = qb
            .build_query_as::<Book>()
            .fetch_optional(&self.pool)
            .await
            .context("failed to update book")?;

        match book {
            Some(book) => Ok(book),
            None => bail!("book {id} not found"),
        }
    }

    async fn create_chapters_if_absent(
        &self,
        book_id: Uuid,
        rows: Vec<NewChapter>,
    ) -> Result<ChapterInit> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;

        // Lock the book row so concurrent initializers serialize here.
        let book: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM books WHERE id = $1 FOR UPDATE")
                .bind(book_id)
                .fetch_optional(&mut *tx)
                .await
                .context("failed to lock book row")?;

        if book.is_none() {
            bail!("book {book_id} not found");
        }

        let (existing,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM chapters WHERE book_id = $1")
                .bind(book_id)
                .fetch_one(&mut *tx)
                .await
                .context("failed to count existing chapters")?;

        if existing > 0 {
            return Ok(ChapterInit::AlreadyInitialized);
        }

        let mut created = Vec::with_capacity(rows.len());
        for row in &rows {
            let chapter = sqlx::query_as::<_, Chapter>(
                "INSERT INTO chapters (book_id, number, title) VALUES ($1, $2, $3) RETURNING *",
            )
            .bind(book_id)
            .bind(row.number)
            .bind(&row.title)
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("failed to insert chapter {}", row.number))?;
            created.push(chapter);
        }

        tx.commit().await.context("failed to commit transaction")?;

        Ok(ChapterInit::Created(created))
    }

    async fn get_chapter(&self, id: Uuid) -> Result<Option<Chapter>> {
        let chapter = sqlx::query_as::<_, Chapter>("SELECT * FROM chapters WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch chapter")?;

        Ok(chapter)
    }

    async fn get_chapter_by_number(
        &self,
        book_id: Uuid,
        number: i32,
    ) -> Result<Option<Chapter>> {
        let chapter = sqlx::query_as::<_, Chapter>(
            "SELECT * FROM chapters WHERE book_id = $1 AND number = $2",
        )
        .bind(book_id)
        .bind(number)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch chapter by number")?;

        Ok(chapter)
    }

    async fn list_chapters(&self, book_id: Uuid) -> Result<Vec<Chapter>> {
        let chapters = sqlx::query_as::<_, Chapter>(
            "SELECT * FROM chapters WHERE book_id = $1 ORDER BY number ASC",
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list chapters")?;

        Ok(chapters)
    }

    async fn update_chapter(&self, id: Uuid, patch: ChapterPatch) -> Result<Chapter> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("UPDATE chapters SET updated_at = now()");
        if let Some(content) = &patch.content {
            qb.push(", content = ").push_bind(content);
        }
        if let Some(summary) = &patch.summary {
            qb.push(", summary = ").push_bind(summary);
        }
        if let Some(notes) = &patch.editor_notes {
            qb.push(", editor_notes = ").push_bind(notes);
        }
        if let Some(state) = patch.state {
            qb.push(", state = ").push_bind(state);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(" RETURNING *");

        let chapter = qb
            .build_query_as::<Chapter>()
            .fetch_optional(&self.pool)
            .await
            .context("failed to update chapter")?;

        match chapter {
            Some(chapter) => Ok(chapter),
            None => bail!("chapter {id} not found"),
        }
    }

    async fn transition_chapter_state(
        &self,
        id: Uuid,
        from: ChapterState,
        to: ChapterState,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE chapters SET state = $1, updated_at = now() WHERE id = $2 AND state = $3",
        )
        .bind(to)
        .bind(id)
        .bind(from)
        .execute(&self.pool)
        .await
        .context("failed to transition chapter state")?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Distinguish "lost the race" from "no such chapter".
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM chapters WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to check chapter existence")?;

        match exists {
            Some(_) => Ok(false),
            None => bail!("chapter {id} not found"),
        }
    }

    async fn append_outline_draft(
        &self,
        book_id: Uuid,
        content: &str,
        notes_used: &str,
    ) -> Result<OutlineDraft> {
        // The subselect and insert run as one statement, so versions are
        // assigned without a read-modify-write window; UNIQUE (book_id,
        // version) rejects any collision under concurrency.
        let draft = sqlx::query_as::<_, OutlineDraft>(
            "INSERT INTO outline_drafts (book_id, content, notes_used, version) \
             SELECT $1, $2, $3, COALESCE(MAX(version), 0) + 1 \
             FROM outline_drafts WHERE book_id = $1 \
             RETURNING *",
        )
        .bind(book_id)
        .bind(content)
        .bind(notes_used)
        .fetch_one(&self.pool)
        .await
        .context("failed to append outline draft")?;

        Ok(draft)
    }

    async fn list_outline_drafts(&self, book_id: Uuid) -> Result<Vec<OutlineDraft>> {
        let drafts = sqlx::query_as::<_, OutlineDraft>(
            "SELECT * FROM outline_drafts WHERE book_id = $1 ORDER BY version DESC",
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list outline drafts")?;

        Ok(drafts)
    }

    async fn append_event(
        &self,
        book_id: Option<Uuid>,
        event_type: &str,
        message: &str,
        data: Value,
    ) -> Result<EventLogEntry> {
        let entry = sqlx::query_as::<_, EventLogEntry>(
            "INSERT INTO event_logs (book_id, event_type, message, data) \
             VALUES ($1, $2, $3, $4) \
             RETURNING *",
        )
        .bind(book_id)
        .bind(event_type)
        .bind(message)
        .bind(&data)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to insert event {event_type}"))?;

        Ok(entry)
    }

    async fn list_events(&self, book_id: Option<Uuid>) -> Result<Vec<EventLogEntry>> {
        let events = match book_id {
            Some(id) => {
                sqlx::query_as::<_, EventLogEntry>(
                    "SELECT * FROM event_logs WHERE book_id = $1 ORDER BY id DESC",
                )
                .bind(id)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, EventLogEntry>("SELECT * FROM event_logs ORDER BY id DESC")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .context("failed to list events")?;

        Ok(events)
    }
}
