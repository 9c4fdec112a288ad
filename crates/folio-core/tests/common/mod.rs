//! Shared test doubles: an in-memory engine, scripted generators, and a
//! recording notifier.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use folio_core::config::EngineConfig;
use folio_core::export::NullExporter;
use folio_core::generator::{GenerateRequest, Generator};
use folio_core::notify::{Notifier, WorkflowEvent};
use folio_core::workflow::Engine;
use folio_db::memory::MemoryStore;
use folio_db::store::Store;

/// The outline every canned generation produces; parses into 3 chapters.
pub const CANNED_OUTLINE: &str = "Chapter 1: Foundations\n- the basics\n- key terms\n\nChapter 2: Deep Dive\n- details\n- examples\n\nChapter 3: Conclusion\n- wrap up";

/// Generator producing deterministic text keyed off the prompt shape.
#[derive(Default)]
pub struct CannedGenerator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Generator for CannedGenerator {
    fn name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.prompt.starts_with("Create a book outline")
            || request.prompt.starts_with("Revise the following book outline")
        {
            return Ok(CANNED_OUTLINE.to_string());
        }
        if request.prompt.starts_with("Create a concise summary") {
            return Ok(format!("summary of: {}", first_line(&request.prompt)));
        }
        Ok(format!("generated content for: {}", first_line(&request.prompt)))
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or_default()
}

/// Generator that always fails.
pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _request: &GenerateRequest) -> Result<String> {
        anyhow::bail!("simulated backend outage")
    }
}

/// Generator that succeeds until `fail_from` calls have happened, then
/// fails. `fail_from = 1` makes the second call (the summary pass) fail.
pub struct FailAfterGenerator {
    calls: AtomicUsize,
    fail_from: usize,
}

impl FailAfterGenerator {
    pub fn new(fail_from: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_from,
        }
    }
}

#[async_trait]
impl Generator for FailAfterGenerator {
    fn name(&self) -> &str {
        "fail-after"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.fail_from {
            anyhow::bail!("simulated backend outage on call {call}")
        }
        Ok(format!("ok: {}", first_line(&request.prompt)))
    }
}

/// Generator that blocks until released, for overlap tests. Each backend
/// call consumes one `notify_one` permit.
#[derive(Default)]
pub struct BlockingGenerator {
    pub release: Arc<Notify>,
}

#[async_trait]
impl Generator for BlockingGenerator {
    fn name(&self) -> &str {
        "blocking"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        self.release.notified().await;
        Ok(format!("released: {}", first_line(&request.prompt)))
    }
}

/// Notifier that records event names in order.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn names(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.events.lock().unwrap().iter().any(|e| e == name)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &WorkflowEvent) {
        self.events.lock().unwrap().push(event.name().to_string());
    }
}

/// An engine over a fresh in-memory store with the given generator.
pub struct TestHarness {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness(generator: Arc<dyn Generator>) -> TestHarness {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = Engine::new(
        Arc::clone(&store) as Arc<dyn Store>,
        generator,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        Arc::new(NullExporter),
        EngineConfig::default(),
    );
    TestHarness {
        engine,
        store,
        notifier,
    }
}

pub fn canned_harness() -> TestHarness {
    harness(Arc::new(CannedGenerator::default()))
}

/// Create a book and walk it to the point where chapters exist: outline
/// generated and approved, chapters initialized as Pending.
pub async fn book_with_chapters(h: &TestHarness) -> Uuid {
    let book = h
        .engine
        .create_book("Atlas", "a beginner's guide")
        .await
        .expect("create_book");
    h.engine
        .generate_outline(book.id)
        .await
        .expect("generate_outline");
    h.engine.approve_outline(book.id).await.expect("approve_outline");
    book.id
}
