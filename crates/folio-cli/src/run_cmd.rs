//! `folio run`: the automated end-to-end workflow for one book.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use folio_core::workflow::{Engine, WorkflowOptions};

use crate::resolve::{engine_error, parse_book_id};

/// Run the full pipeline, pausing at human gates unless the corresponding
/// auto-approve flag is set. Ctrl-C cancels the in-flight backend call and
/// stops the run with lifecycle state rolled back.
pub async fn run_workflow(
    engine: &Engine,
    book_id: &str,
    approve_outline: bool,
    approve_chapters: bool,
    formats: Vec<String>,
) -> Result<()> {
    let id = parse_book_id(book_id)?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    let options = WorkflowOptions {
        auto_approve_outline: approve_outline,
        auto_approve_chapters: approve_chapters,
        formats: if formats.is_empty() {
            None
        } else {
            Some(formats)
        },
    };

    let outcome = engine
        .run_automated_workflow(id, options, cancel)
        .await
        .map_err(engine_error)?;

    println!("Workflow stages:");
    for stage in &outcome.stages {
        let icon = if stage.success { "+" } else { "!" };
        println!("  [{}] {}: {}", icon, stage.stage, stage.detail);
    }

    if outcome.completed {
        println!();
        println!(
            "Book complete: {}",
            outcome.artifact_path.as_deref().unwrap_or("(no artifact)")
        );
    } else if outcome.stages.iter().all(|s| s.success) {
        println!();
        println!("Paused at a review gate. Use `folio status {book_id}` for the next action.");
    } else {
        anyhow::bail!("workflow stopped on a failed stage");
    }

    Ok(())
}
