//! Notification events and the delivery trait over them.
//!
//! The engine raises named events; delivery is fire-and-forget and a failed
//! delivery never fails the operation that raised it.

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

/// A workflow event raised by the engine.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    OutlineReady {
        book_id: Uuid,
        title: String,
    },
    ChapterReady {
        book_id: Uuid,
        title: String,
        chapter_number: i32,
        chapter_title: String,
    },
    WaitingForNotes {
        book_id: Uuid,
        title: String,
        stage: String,
    },
    AllChaptersComplete {
        book_id: Uuid,
        title: String,
        chapter_count: usize,
    },
    FinalDraftReady {
        book_id: Uuid,
        title: String,
        artifact_path: String,
    },
    ErrorOccurred {
        book_id: Uuid,
        title: String,
        stage: String,
        message: String,
    },
}

impl WorkflowEvent {
    /// Stable event name used in payloads and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OutlineReady { .. } => "outline_ready",
            Self::ChapterReady { .. } => "chapter_ready",
            Self::WaitingForNotes { .. } => "waiting_for_notes",
            Self::AllChaptersComplete { .. } => "all_chapters_complete",
            Self::FinalDraftReady { .. } => "final_draft_ready",
            Self::ErrorOccurred { .. } => "error_occurred",
        }
    }

    pub fn book_id(&self) -> Uuid {
        match self {
            Self::OutlineReady { book_id, .. }
            | Self::ChapterReady { book_id, .. }
            | Self::WaitingForNotes { book_id, .. }
            | Self::AllChaptersComplete { book_id, .. }
            | Self::FinalDraftReady { book_id, .. }
            | Self::ErrorOccurred { book_id, .. } => *book_id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::OutlineReady { title, .. }
            | Self::ChapterReady { title, .. }
            | Self::WaitingForNotes { title, .. }
            | Self::AllChaptersComplete { title, .. }
            | Self::FinalDraftReady { title, .. }
            | Self::ErrorOccurred { title, .. } => title,
        }
    }

    /// Stage-specific payload fields, excluding book id and title.
    pub fn payload(&self) -> Value {
        match self {
            Self::OutlineReady { .. } => json!({}),
            Self::ChapterReady {
                chapter_number,
                chapter_title,
                ..
            } => json!({
                "chapter_number": chapter_number,
                "chapter_title": chapter_title,
            }),
            Self::WaitingForNotes { stage, .. } => json!({ "stage": stage }),
            Self::AllChaptersComplete { chapter_count, .. } => {
                json!({ "chapter_count": chapter_count })
            }
            Self::FinalDraftReady { artifact_path, .. } => {
                json!({ "artifact_path": artifact_path })
            }
            Self::ErrorOccurred { stage, message, .. } => json!({
                "stage": stage,
                "message": message,
            }),
        }
    }
}

/// Delivery interface for workflow events.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver the event. Implementations swallow delivery failures (after
    /// logging them); the engine never observes them.
    async fn notify(&self, event: &WorkflowEvent);
}

// Compile-time assertion: Notifier must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Notifier) {}
};

/// Notifier that emits each event as a structured log line.
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &WorkflowEvent) {
        tracing::info!(
            event = event.name(),
            book_id = %event.book_id(),
            title = event.title(),
            payload = %event.payload(),
            "workflow event"
        );
    }
}

/// Notifier that POSTs each event as JSON to a webhook URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &WorkflowEvent) {
        let body = json!({
            "event": event.name(),
            "book_id": event.book_id(),
            "title": event.title(),
            "data": event.payload(),
        });

        match self.client.post(&self.url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::warn!(
                    event = event.name(),
                    status = %response.status(),
                    "webhook delivery rejected"
                );
            }
            Err(e) => {
                tracing::warn!(event = event.name(), error = %e, "webhook delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_stable() {
        let event = WorkflowEvent::OutlineReady {
            book_id: Uuid::new_v4(),
            title: "Atlas".to_string(),
        };
        assert_eq!(event.name(), "outline_ready");
    }

    #[test]
    fn payload_carries_stage_data() {
        let event = WorkflowEvent::ChapterReady {
            book_id: Uuid::new_v4(),
            title: "Atlas".to_string(),
            chapter_number: 2,
            chapter_title: "Middle".to_string(),
        };
        let payload = event.payload();
        assert_eq!(payload["chapter_number"], 2);
        assert_eq!(payload["chapter_title"], "Middle");
    }

    #[tokio::test]
    async fn tracing_notifier_accepts_every_event() {
        let notifier = TracingNotifier;
        let book_id = Uuid::new_v4();
        let events = [
            WorkflowEvent::OutlineReady {
                book_id,
                title: "t".to_string(),
            },
            WorkflowEvent::ErrorOccurred {
                book_id,
                title: "t".to_string(),
                stage: "compilation".to_string(),
                message: "boom".to_string(),
            },
        ];
        for event in &events {
            notifier.notify(event).await;
        }
    }
}
