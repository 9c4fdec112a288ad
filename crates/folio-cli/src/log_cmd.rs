//! `folio logs` and `folio drafts`: the audit trail and outline history.

use anyhow::Result;

use folio_core::workflow::Engine;

use crate::resolve::{engine_error, parse_book_id};

/// Show the event log, optionally filtered to one book. Newest first.
pub async fn run_logs(engine: &Engine, book_id_str: Option<&str>) -> Result<()> {
    let book_id = match book_id_str {
        Some(s) => Some(parse_book_id(s)?),
        None => None,
    };

    let events = engine.logs(book_id).await.map_err(engine_error)?;

    if events.is_empty() {
        println!("No events recorded.");
        return Ok(());
    }

    for event in &events {
        let scope = event
            .book_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} {:<22} {} {}",
            event.created_at.format("%Y-%m-%d %H:%M:%S"),
            event.event_type,
            scope,
            event.message,
        );
    }

    Ok(())
}

/// Show a book's outline draft history, newest version first.
pub async fn run_drafts(engine: &Engine, book_id_str: &str) -> Result<()> {
    let book_id = parse_book_id(book_id_str)?;
    let drafts = engine.outline_drafts(book_id).await.map_err(engine_error)?;

    if drafts.is_empty() {
        println!("No outline drafts recorded.");
        return Ok(());
    }

    for draft in &drafts {
        println!(
            "version {} ({})",
            draft.version,
            draft.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
        if !draft.notes_used.is_empty() {
            println!("  notes: {}", draft.notes_used);
        }
    }

    Ok(())
}
