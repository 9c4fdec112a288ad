//! The workflow driver: the top-level sequencer over book and chapter
//! lifecycles, the compilation gate, and the collaborator backends.
//!
//! All stage logic is a pure function of persisted state plus the single
//! request being serviced; the engine holds no mutable state of its own, so
//! any number of engine instances (or processes) may share one store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing;
use uuid::Uuid;

use folio_db::models::{
    Book, Chapter, ChapterState, EventLogEntry, OutlineDraft, OutputState, ReviewState,
};
use folio_db::store::{BookPatch, NewBook, Store};

use crate::book::{BookLifecycle, Stage, StageReport, derive_stage};
use crate::chapter::{ChapterLifecycle, truncate};
use crate::compile::CompilationGate;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::export::BookExporter;
use crate::generator::Generator;
use crate::notify::{Notifier, WorkflowEvent};

/// Comprehensive status of one book.
#[derive(Debug, Clone, Serialize)]
pub struct BookStatus {
    pub book_id: Uuid,
    pub title: String,
    pub stage: Stage,
    pub next_action: String,
    pub outline_review_state: ReviewState,
    pub chapter_notes_state: ReviewState,
    pub final_review_state: ReviewState,
    pub output_state: OutputState,
    pub output_artifact_path: String,
    pub chapters: Vec<ChapterOverview>,
}

/// One chapter line in a status report.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterOverview {
    pub number: i32,
    pub title: String,
    pub state: ChapterState,
}

/// A book that still needs operator attention.
#[derive(Debug, Clone, Serialize)]
pub struct PendingAction {
    pub book_id: Uuid,
    pub title: String,
    pub stage: Stage,
    pub next_action: String,
}

/// One row of a bulk import.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportEntry {
    pub title: String,
    #[serde(default)]
    pub briefing: String,
}

/// Result of a bulk import: what was created and which rows failed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub created: Vec<ImportedBook>,
    pub errors: Vec<ImportError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportedBook {
    pub book_id: Uuid,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportError {
    /// 1-based row number in the import source.
    pub row: usize,
    pub title: String,
    pub error: String,
}

/// Per-chapter outcome of `generate_all_chapters`.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterRunOutcome {
    pub number: i32,
    pub status: ChapterRunStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterRunStatus {
    Generated,
    AutoApproved,
    /// Already approved before the run started.
    Skipped,
    Failed {
        message: String,
    },
}

/// Options for the automated end-to-end workflow.
#[derive(Debug, Clone, Default)]
pub struct WorkflowOptions {
    pub auto_approve_outline: bool,
    pub auto_approve_chapters: bool,
    /// Export formats for the compilation step; engine defaults when
    /// `None`.
    pub formats: Option<Vec<String>>,
}

/// Outcome of the automated workflow: one entry per executed stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowOutcome {
    pub stages: Vec<StageOutcome>,
    pub completed: bool,
    pub artifact_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    pub stage: String,
    pub success: bool,
    pub detail: String,
}

impl WorkflowOutcome {
    fn record(&mut self, stage: &str, success: bool, detail: impl Into<String>) {
        self.stages.push(StageOutcome {
            stage: stage.to_string(),
            success,
            detail: detail.into(),
        });
    }
}

/// The workflow engine. Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    generator: Arc<dyn Generator>,
    notifier: Arc<dyn Notifier>,
    exporter: Arc<dyn BookExporter>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<dyn Generator>,
        notifier: Arc<dyn Notifier>,
        exporter: Arc<dyn BookExporter>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            generator,
            notifier,
            exporter,
            config,
        }
    }

    // -----------------------------------------------------------------
    // Book management
    // -----------------------------------------------------------------

    /// Create a new book. Title and briefing are both required; the
    /// briefing is what the first outline will be generated from.
    pub async fn create_book(&self, title: &str, briefing: &str) -> Result<Book, EngineError> {
        if title.trim().is_empty() {
            return Err(EngineError::EmptyTitle);
        }
        if briefing.trim().is_empty() {
            return Err(EngineError::MissingBriefing);
        }

        let book = self
            .store
            .create_book(NewBook {
                title: title.to_owned(),
                outline_briefing: briefing.to_owned(),
            })
            .await?;

        self.log_event(
            book.id,
            "book_created",
            &format!("New book created: {title}"),
            json!({"briefing": truncate(briefing, 200)}),
        )
        .await;

        Ok(book)
    }

    /// Bulk-create books. Rows that fail validation are reported, not
    /// fatal; the rest are created.
    pub async fn import_books(
        &self,
        entries: Vec<ImportEntry>,
    ) -> Result<ImportReport, EngineError> {
        let mut report = ImportReport::default();

        for (index, entry) in entries.into_iter().enumerate() {
            match self.create_book(&entry.title, &entry.briefing).await {
                Ok(book) => report.created.push(ImportedBook {
                    book_id: book.id,
                    title: book.title,
                }),
                Err(e) => report.errors.push(ImportError {
                    row: index + 1,
                    title: entry.title,
                    error: e.to_string(),
                }),
            }
        }

        Ok(report)
    }

    pub async fn list_books(&self) -> Result<Vec<Book>, EngineError> {
        Ok(self.store.list_books().await?)
    }

    /// Status of one book: derived stage, next action, and chapter
    /// overview.
    pub async fn status(&self, book_id: Uuid) -> Result<BookStatus, EngineError> {
        let book = self.require_book(book_id).await?;
        let chapters = self.store.list_chapters(book_id).await?;
        let StageReport { stage, next_action } = derive_stage(&book, &chapters);

        Ok(BookStatus {
            book_id,
            title: book.title,
            stage,
            next_action,
            outline_review_state: book.outline_review_state,
            chapter_notes_state: book.chapter_notes_state,
            final_review_state: book.final_review_state,
            output_state: book.output_state,
            output_artifact_path: book.output_artifact_path,
            chapters: chapters
                .into_iter()
                .map(|c| ChapterOverview {
                    number: c.number,
                    title: c.title,
                    state: c.state,
                })
                .collect(),
        })
    }

    /// Every book that has not reached `Completed`, with its next action.
    pub async fn list_pending_actions(&self) -> Result<Vec<PendingAction>, EngineError> {
        let books = self.store.list_books().await?;
        let mut pending = Vec::new();

        for book in books {
            let chapters = self.store.list_chapters(book.id).await?;
            let report = derive_stage(&book, &chapters);
            if report.stage != Stage::Completed {
                pending.push(PendingAction {
                    book_id: book.id,
                    title: book.title,
                    stage: report.stage,
                    next_action: report.next_action,
                });
            }
        }

        Ok(pending)
    }

    /// Audit trail, newest first, optionally filtered to one book.
    pub async fn logs(&self, book_id: Option<Uuid>) -> Result<Vec<EventLogEntry>, EngineError> {
        Ok(self.store.list_events(book_id).await?)
    }

    /// Outline version history, newest first.
    pub async fn outline_drafts(&self, book_id: Uuid) -> Result<Vec<OutlineDraft>, EngineError> {
        self.require_book(book_id).await?;
        Ok(self.store.list_outline_drafts(book_id).await?)
    }

    // -----------------------------------------------------------------
    // Outline operations
    // -----------------------------------------------------------------

    pub async fn generate_outline(&self, book_id: Uuid) -> Result<Book, EngineError> {
        let cancel = CancellationToken::new();
        self.books(&cancel).generate_outline(book_id).await
    }

    pub async fn regenerate_outline(&self, book_id: Uuid) -> Result<Book, EngineError> {
        let cancel = CancellationToken::new();
        self.books(&cancel).regenerate_outline(book_id).await
    }

    pub async fn approve_outline(&self, book_id: Uuid) -> Result<Vec<Chapter>, EngineError> {
        let cancel = CancellationToken::new();
        self.books(&cancel).approve_outline(book_id).await
    }

    pub async fn add_outline_feedback(
        &self,
        book_id: Uuid,
        notes: &str,
    ) -> Result<Book, EngineError> {
        let cancel = CancellationToken::new();
        self.books(&cancel).add_outline_feedback(book_id, notes).await
    }

    // -----------------------------------------------------------------
    // Chapter operations
    // -----------------------------------------------------------------

    pub async fn initialize_chapters(&self, book_id: Uuid) -> Result<Vec<Chapter>, EngineError> {
        let cancel = CancellationToken::new();
        self.chapters(&cancel).initialize(book_id).await
    }

    pub async fn generate_chapter(
        &self,
        book_id: Uuid,
        number: i32,
    ) -> Result<Chapter, EngineError> {
        let cancel = CancellationToken::new();
        self.chapters(&cancel).generate(book_id, number).await
    }

    pub async fn regenerate_chapter(
        &self,
        book_id: Uuid,
        number: i32,
    ) -> Result<Chapter, EngineError> {
        let cancel = CancellationToken::new();
        self.chapters(&cancel).regenerate(book_id, number).await
    }

    /// Approve a chapter; fires `AllChaptersComplete` when this approval
    /// was the last one outstanding.
    pub async fn approve_chapter(
        &self,
        book_id: Uuid,
        number: i32,
    ) -> Result<Chapter, EngineError> {
        let cancel = CancellationToken::new();
        let lifecycle = self.chapters(&cancel);
        let approved = lifecycle.approve(book_id, number).await?;

        let (all, _) = lifecycle.all_approved(book_id).await?;
        if all {
            self.notify_all_complete(book_id).await?;
        }

        Ok(approved)
    }

    pub async fn add_chapter_feedback(
        &self,
        book_id: Uuid,
        number: i32,
        notes: &str,
    ) -> Result<Chapter, EngineError> {
        let cancel = CancellationToken::new();
        self.chapters(&cancel).add_feedback(book_id, number, notes).await
    }

    /// Generate every non-approved chapter, distinct chapters running
    /// concurrently under the configured cap. Outcomes are returned in
    /// chapter order.
    pub async fn generate_all_chapters(
        &self,
        book_id: Uuid,
        auto_approve: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChapterRunOutcome>, EngineError> {
        self.require_book(book_id).await?;
        let chapters = self.store.list_chapters(book_id).await?;
        if chapters.is_empty() {
            return Err(EngineError::NoChapters);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_generations.max(1)));
        let mut join_set: JoinSet<(i32, Result<ChapterRunStatus, EngineError>)> = JoinSet::new();
        let mut outcomes = Vec::new();

        for chapter in &chapters {
            if chapter.state == ChapterState::Approved {
                outcomes.push(ChapterRunOutcome {
                    number: chapter.number,
                    status: ChapterRunStatus::Skipped,
                });
                continue;
            }
            if cancel.is_cancelled() {
                outcomes.push(ChapterRunOutcome {
                    number: chapter.number,
                    status: ChapterRunStatus::Failed {
                        message: "cancelled".to_string(),
                    },
                });
                continue;
            }

            let engine = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let token = cancel.clone();
            let number = chapter.number;

            join_set.spawn(async move {
                let result = async {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| EngineError::Backend(e.to_string()))?;
                    engine.chapters(&token).generate(book_id, number).await?;
                    if auto_approve {
                        engine.chapters(&token).approve(book_id, number).await?;
                        Ok(ChapterRunStatus::AutoApproved)
                    } else {
                        Ok(ChapterRunStatus::Generated)
                    }
                }
                .await;
                (number, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((number, Ok(status))) => {
                    outcomes.push(ChapterRunOutcome { number, status });
                }
                Ok((number, Err(e))) => {
                    outcomes.push(ChapterRunOutcome {
                        number,
                        status: ChapterRunStatus::Failed {
                            message: e.to_string(),
                        },
                    });
                }
                Err(join_err) => {
                    tracing::error!(error = %join_err, "chapter generation task panicked");
                }
            }
        }

        outcomes.sort_by_key(|o| o.number);

        let cancel_probe = CancellationToken::new();
        let (all, _) = self.chapters(&cancel_probe).all_approved(book_id).await?;
        if all {
            self.notify_all_complete(book_id).await?;
        }

        Ok(outcomes)
    }

    // -----------------------------------------------------------------
    // Compilation
    // -----------------------------------------------------------------

    /// Attempt final compilation. The gate is strict: it never signs the
    /// final review off on the caller's behalf.
    pub async fn compile(
        &self,
        book_id: Uuid,
        formats: Option<Vec<String>>,
    ) -> Result<Book, EngineError> {
        let cancel = CancellationToken::new();
        self.gate(&cancel).attempt(book_id, formats).await
    }

    // -----------------------------------------------------------------
    // Automated workflow
    // -----------------------------------------------------------------

    /// Run the whole pipeline for one book: outline, gate, chapters, gate,
    /// compilation. Human gates pause the run (raising `WaitingForNotes`)
    /// unless the corresponding auto-approve option is set.
    ///
    /// Returns a per-stage record. A stage failure stops the run and is
    /// recorded in the outcome rather than returned as an error; only
    /// unknown-book and store faults surface as `Err`.
    pub async fn run_automated_workflow(
        &self,
        book_id: Uuid,
        options: WorkflowOptions,
        cancel: CancellationToken,
    ) -> Result<WorkflowOutcome, EngineError> {
        let mut outcome = WorkflowOutcome::default();
        let book = self.require_book(book_id).await?;

        // Stage 1: outline.
        if book.outline.is_empty() {
            match self.books(&cancel).generate_outline(book_id).await {
                Ok(_) => outcome.record("outline_generation", true, "outline generated"),
                Err(e) => {
                    outcome.record("outline_generation", false, e.to_string());
                    return Ok(outcome);
                }
            }
        }

        let book = self.require_book(book_id).await?;
        if book.outline_review_state != ReviewState::NoChangesNeeded {
            if !options.auto_approve_outline {
                self.notifier
                    .notify(&WorkflowEvent::WaitingForNotes {
                        book_id,
                        title: book.title.clone(),
                        stage: "outline_review".to_string(),
                    })
                    .await;
                outcome.record("outline_review", true, "waiting for outline review");
                return Ok(outcome);
            }
            match self.books(&cancel).approve_outline(book_id).await {
                Ok(chapters) => outcome.record(
                    "outline_approval",
                    true,
                    format!("outline approved, {} chapters initialized", chapters.len()),
                ),
                Err(e) => {
                    outcome.record("outline_approval", false, e.to_string());
                    return Ok(outcome);
                }
            }
        }

        if cancel.is_cancelled() {
            outcome.record("chapter_generation", false, "cancelled");
            return Ok(outcome);
        }

        // Stage 2: chapters.
        if self.store.list_chapters(book_id).await?.is_empty() {
            match self.chapters(&cancel).initialize(book_id).await {
                Ok(chapters) => outcome.record(
                    "chapter_initialization",
                    true,
                    format!("{} chapters initialized", chapters.len()),
                ),
                Err(e) => {
                    outcome.record("chapter_initialization", false, e.to_string());
                    return Ok(outcome);
                }
            }
        }

        let runs = self
            .generate_all_chapters(book_id, options.auto_approve_chapters, &cancel)
            .await?;
        let failed: Vec<i32> = runs
            .iter()
            .filter(|r| matches!(r.status, ChapterRunStatus::Failed { .. }))
            .map(|r| r.number)
            .collect();
        outcome.record(
            "chapter_generation",
            failed.is_empty(),
            if failed.is_empty() {
                format!("{} chapters processed", runs.len())
            } else {
                format!("chapters failed: {failed:?}")
            },
        );
        if !failed.is_empty() {
            return Ok(outcome);
        }

        if !options.auto_approve_chapters {
            let probe = CancellationToken::new();
            let (all, _) = self.chapters(&probe).all_approved(book_id).await?;
            if !all {
                let book = self.require_book(book_id).await?;
                self.notifier
                    .notify(&WorkflowEvent::WaitingForNotes {
                        book_id,
                        title: book.title,
                        stage: "chapter_review".to_string(),
                    })
                    .await;
                outcome.record("chapter_review", true, "waiting for chapter review");
                return Ok(outcome);
            }
        }

        if cancel.is_cancelled() {
            outcome.record("compilation", false, "cancelled");
            return Ok(outcome);
        }

        // Stage 3: compilation. The automated runner signs off the final
        // review gate when nobody has touched it.
        let book = self.require_book(book_id).await?;
        if book.final_review_state == ReviewState::NeedsDecision {
            self.store
                .update_book(
                    book_id,
                    BookPatch {
                        final_review_state: Some(ReviewState::NoChangesNeeded),
                        ..Default::default()
                    },
                )
                .await?;
        }

        match self.gate(&cancel).attempt(book_id, options.formats.clone()).await {
            Ok(book) => {
                outcome.completed = true;
                outcome.artifact_path = Some(book.output_artifact_path.clone());
                outcome.record("compilation", true, book.output_artifact_path);
            }
            Err(e) => outcome.record("compilation", false, e.to_string()),
        }

        Ok(outcome)
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn books<'s>(&'s self, cancel: &'s CancellationToken) -> BookLifecycle<'s> {
        BookLifecycle::new(
            self.store.as_ref(),
            self.generator.as_ref(),
            self.notifier.as_ref(),
            &self.config,
            cancel,
        )
    }

    fn chapters<'s>(&'s self, cancel: &'s CancellationToken) -> ChapterLifecycle<'s> {
        ChapterLifecycle::new(
            self.store.as_ref(),
            self.generator.as_ref(),
            self.notifier.as_ref(),
            &self.config,
            cancel,
        )
    }

    fn gate<'s>(&'s self, cancel: &'s CancellationToken) -> CompilationGate<'s> {
        CompilationGate::new(
            self.store.as_ref(),
            self.exporter.as_ref(),
            self.notifier.as_ref(),
            &self.config,
            cancel,
        )
    }

    async fn require_book(&self, book_id: Uuid) -> Result<Book, EngineError> {
        self.store
            .get_book(book_id)
            .await?
            .ok_or(EngineError::BookNotFound(book_id))
    }

    async fn notify_all_complete(&self, book_id: Uuid) -> Result<(), EngineError> {
        let book = self.require_book(book_id).await?;
        let chapter_count = self.store.list_chapters(book_id).await?.len();
        self.notifier
            .notify(&WorkflowEvent::AllChaptersComplete {
                book_id,
                title: book.title,
                chapter_count,
            })
            .await;
        Ok(())
    }

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
