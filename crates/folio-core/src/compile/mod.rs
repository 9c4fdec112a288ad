//! Compilation gate: decides whether a book is eligible for final export
//! and hands the finished chapter list to the exporter.

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing;
use uuid::Uuid;

use folio_db::models::{Book, ChapterState, OutputState, ReviewState};
use folio_db::store::{BookPatch, Store};

use crate::chapter::unapproved_numbers;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::export::{BookExporter, ExportJob};
use crate::notify::{Notifier, WorkflowEvent};

/// The compilation gate. Borrows its collaborators from the engine.
pub struct CompilationGate<'a> {
    store: &'a dyn Store,
    exporter: &'a dyn BookExporter,
    notifier: &'a dyn Notifier,
    config: &'a EngineConfig,
    cancel: &'a CancellationToken,
}

impl<'a> CompilationGate<'a> {
    pub fn new(
        store: &'a dyn Store,
        exporter: &'a dyn BookExporter,
        notifier: &'a dyn Notifier,
        config: &'a EngineConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            store,
            exporter,
            notifier,
            config,
            cancel,
        }
    }

    /// Attempt to compile the book.
    ///
    /// Eligibility is recomputed here, never cached: every chapter must be
    /// `Approved`, and the final review gate must be signed off
    /// (`NoChangesNeeded`) or carry reviewer notes (`ChangesRequested` with
    /// non-empty notes). On exporter success the artifact path is
    /// persisted and `output_state` becomes `Completed`; on exporter
    /// failure it becomes `Error` and chapter rows are untouched.
    pub async fn attempt(
        &self,
        book_id: Uuid,
        formats: Option<Vec<String>>,
    ) -> Result<Book, EngineError> {
        let book = self
            .store
            .get_book(book_id)
            .await?
            .ok_or(EngineError::BookNotFound(book_id))?;

        let chapters = self.store.list_chapters(book_id).await?;
        let pending = unapproved_numbers(&chapters);
        if chapters.is_empty() || !pending.is_empty() {
            return Err(EngineError::ChaptersPending(pending));
        }

        match book.final_review_state {
            ReviewState::NoChangesNeeded => {}
            ReviewState::ChangesRequested if !book.final_review_notes.is_empty() => {}
            _ => return Err(EngineError::FinalReviewIncomplete),
        }

        let approved: Vec<_> = chapters
            .into_iter()
            .filter(|c| c.state == ChapterState::Approved)
            .collect();

        let job = ExportJob {
            title: book.title.clone(),
            outline: book.outline.clone(),
            chapters: approved,
            formats: formats.unwrap_or_else(|| self.config.export_formats.clone()),
        };

        let export_result = tokio::select! {
            result = tokio::time::timeout(self.config.backend_deadline, self.exporter.export(&job)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(anyhow::anyhow!(
                        "export exceeded the {}s deadline",
                        self.config.backend_deadline.as_secs()
                    )),
                }
            }
            _ = self.cancel.cancelled() => Err(anyhow::anyhow!("export cancelled")),
        };

        match export_result {
            Ok(path) => {
                let artifact_path = path.display().to_string();
                let updated = self
                    .store
                    .update_book(
                        book_id,
                        BookPatch {
                            output_state: Some(OutputState::Completed),
                            output_artifact_path: Some(artifact_path.clone()),
                            ..Default::default()
                        },
                    )
                    .await?;

                self.log_event(
                    book_id,
                    "book_compiled",
                    &format!("Book '{}' compiled successfully", book.title),
                    json!({"artifact_path": artifact_path}),
                )
                .await;
                self.notifier
                    .notify(&WorkflowEvent::FinalDraftReady {
                        book_id,
                        title: book.title.clone(),
                        artifact_path,
                    })
                    .await;

                Ok(updated)
            }
            Err(e) => {
                let error = EngineError::Backend(format!("{e:#}"));
                self.store
                    .update_book(
                        book_id,
                        BookPatch {
                            output_state: Some(OutputState::Error),
                            ..Default::default()
                        },
                    )
                    .await?;

                self.log_event(
                    book_id,
                    "error",
                    &format!("Compilation failed: {error}"),
                    json!({}),
                )
                .await;
                self.notifier
                    .notify(&WorkflowEvent::ErrorOccurred {
                        book_id,
                        title: book.title.clone(),
                        stage: "compilation".to_string(),
                        message: error.to_string(),
                    })
                    .await;

                Err(error)
            }
        }
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
