//! Compilation gate tests: eligibility recomputation, the final review
//! gate, and exporter success/failure handling.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use folio_core::config::EngineConfig;
use folio_core::error::EngineError;
use folio_core::export::{BookExporter, ExportJob, TextExporter};
use folio_core::generator::Generator;
use folio_core::notify::Notifier;
use folio_core::workflow::Engine;
use folio_db::memory::MemoryStore;
use folio_db::models::{ChapterState, OutputState, ReviewState};
use folio_db::store::{BookPatch, Store};

use common::{CannedGenerator, RecordingNotifier, book_with_chapters, canned_harness};

struct FailingExporter;

#[async_trait]
impl BookExporter for FailingExporter {
    async fn export(&self, _job: &ExportJob) -> Result<PathBuf> {
        anyhow::bail!("disk full")
    }
}

/// Engine wired to a real text exporter writing into a temp dir.
fn engine_with_exporter(
    exporter: Arc<dyn BookExporter>,
) -> (Engine, Arc<MemoryStore>, Arc<RecordingNotifier>) {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = Engine::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::new(CannedGenerator::default()) as Arc<dyn Generator>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        exporter,
        EngineConfig::default(),
    );
    (engine, store, notifier)
}

async fn approve_all(engine: &Engine, store: &MemoryStore, book_id: Uuid) {
    let chapters = store.list_chapters(book_id).await.unwrap();
    for chapter in chapters {
        engine.generate_chapter(book_id, chapter.number).await.unwrap();
        engine.approve_chapter(book_id, chapter.number).await.unwrap();
    }
}

#[tokio::test]
async fn gate_reports_unapproved_chapter_numbers() {
    let h = canned_harness();
    let book_id = book_with_chapters(&h).await;

    // Approve chapters 1 and 2, leave 3 in Review.
    for number in [1, 2] {
        h.engine.generate_chapter(book_id, number).await.unwrap();
        h.engine.approve_chapter(book_id, number).await.unwrap();
    }
    h.engine.generate_chapter(book_id, 3).await.unwrap();

    let err = h.engine.compile(book_id, None).await.unwrap_err();
    match err {
        EngineError::ChaptersPending(pending) => assert_eq!(pending, vec![3]),
        other => panic!("expected ChaptersPending, got {other}"),
    }
}

#[tokio::test]
async fn gate_requires_final_review_sign_off() {
    let h = canned_harness();
    let book_id = book_with_chapters(&h).await;
    approve_all(&h.engine, &h.store, book_id).await;

    // All chapters approved but the final gate untouched.
    let err = h.engine.compile(book_id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::FinalReviewIncomplete));

    // ChangesRequested without notes is still not eligible.
    h.store
        .update_book(
            book_id,
            BookPatch {
                final_review_state: Some(ReviewState::ChangesRequested),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let err = h.engine.compile(book_id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::FinalReviewIncomplete));

    // ChangesRequested with notes passes.
    h.store
        .update_book(
            book_id,
            BookPatch {
                final_review_notes: Some("soften the intro".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let book = h.engine.compile(book_id, None).await.unwrap();
    assert_eq!(book.output_state, OutputState::Completed);
}

#[tokio::test]
async fn successful_compilation_writes_artifact_and_completes() {
    let dir = tempfile::TempDir::new().unwrap();
    let (engine, store, notifier) =
        engine_with_exporter(Arc::new(TextExporter::new(dir.path())));

    let book = engine
        .create_book("Atlas", "a beginner's guide")
        .await
        .unwrap();
    engine.generate_outline(book.id).await.unwrap();
    engine.approve_outline(book.id).await.unwrap();
    approve_all(&engine, &store, book.id).await;
    store
        .update_book(
            book.id,
            BookPatch {
                final_review_state: Some(ReviewState::NoChangesNeeded),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let compiled = engine.compile(book.id, None).await.unwrap();

    assert_eq!(compiled.output_state, OutputState::Completed);
    assert!(!compiled.output_artifact_path.is_empty());
    let contents = std::fs::read_to_string(&compiled.output_artifact_path).unwrap();
    assert!(contents.contains("ATLAS"));
    assert!(contents.contains("CHAPTER 1"));
    assert!(notifier.contains("final_draft_ready"));
}

#[tokio::test]
async fn exporter_failure_sets_error_state_and_keeps_chapters() {
    let (engine, store, notifier) = engine_with_exporter(Arc::new(FailingExporter));

    let book = engine
        .create_book("Atlas", "a beginner's guide")
        .await
        .unwrap();
    engine.generate_outline(book.id).await.unwrap();
    engine.approve_outline(book.id).await.unwrap();
    approve_all(&engine, &store, book.id).await;
    store
        .update_book(
            book.id,
            BookPatch {
                final_review_state: Some(ReviewState::NoChangesNeeded),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = engine.compile(book.id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::Backend(_)));

    let after = store.get_book(book.id).await.unwrap().unwrap();
    assert_eq!(after.output_state, OutputState::Error);
    assert!(after.output_artifact_path.is_empty());

    // Chapter state is not corrupted by the failed export.
    let chapters = store.list_chapters(book.id).await.unwrap();
    assert!(chapters.iter().all(|c| c.state == ChapterState::Approved));
    assert!(notifier.contains("error_occurred"));
}

#[tokio::test]
async fn unsupported_format_is_a_backend_failure() {
    let dir = tempfile::TempDir::new().unwrap();
    let (engine, store, _notifier) =
        engine_with_exporter(Arc::new(TextExporter::new(dir.path())));

    let book = engine
        .create_book("Atlas", "a beginner's guide")
        .await
        .unwrap();
    engine.generate_outline(book.id).await.unwrap();
    engine.approve_outline(book.id).await.unwrap();
    approve_all(&engine, &store, book.id).await;
    store
        .update_book(
            book.id,
            BookPatch {
                final_review_state: Some(ReviewState::NoChangesNeeded),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = engine
        .compile(book.id, Some(vec!["pdf".to_string()]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Backend(_)));

    let after = store.get_book(book.id).await.unwrap().unwrap();
    assert_eq!(after.output_state, OutputState::Error);
}
