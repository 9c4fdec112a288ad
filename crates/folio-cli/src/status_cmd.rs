//! `folio status` command: show one book's stage and chapters, or list all
//! books.

use anyhow::Result;

use folio_core::workflow::Engine;

use crate::resolve::{engine_error, parse_book_id};

/// Run the status command.
///
/// When `book_id_str` is `Some`, shows detailed status for that book.
/// When `None`, lists all books with a one-line summary.
pub async fn run_status(engine: &Engine, book_id_str: Option<&str>) -> Result<()> {
    match book_id_str {
        Some(id_str) => run_book_status(engine, id_str).await,
        None => run_shelf_status(engine).await,
    }
}

/// Show detailed status for a single book.
async fn run_book_status(engine: &Engine, book_id_str: &str) -> Result<()> {
    let book_id = parse_book_id(book_id_str)?;
    let status = engine.status(book_id).await.map_err(engine_error)?;

    println!("Book: {} ({})", status.title, status.book_id);
    println!("Stage: {}", status.stage);
    println!("Next action: {}", status.next_action);
    println!("Outline review: {}", status.outline_review_state);
    println!("Final review: {}", status.final_review_state);
    println!("Output: {}", status.output_state);
    if !status.output_artifact_path.is_empty() {
        println!("Artifact: {}", status.output_artifact_path);
    }
    println!();

    if status.chapters.is_empty() {
        println!("No chapters initialized.");
        return Ok(());
    }

    println!("Chapters:");
    for chapter in &status.chapters {
        let icon = match chapter.state.to_string().as_str() {
            "pending" => ".",
            "generating" => "*",
            "review" => "?",
            "approved" => "+",
            "regenerating" => "~",
            _ => " ",
        };
        println!(
            "  [{}] {}. {} ({})",
            icon, chapter.number, chapter.title, chapter.state
        );
    }

    Ok(())
}

/// List all books with a one-line summary.
async fn run_shelf_status(engine: &Engine) -> Result<()> {
    let books = engine.list_books().await.map_err(engine_error)?;

    if books.is_empty() {
        println!("No books found.");
        return Ok(());
    }

    println!("{:<38} {:<30} {:<12} {:<20}", "ID", "TITLE", "OUTPUT", "CREATED");
    println!("{}", "-".repeat(102));

    for book in &books {
        let title_display = if book.title.len() > 28 {
            format!("{}...", &book.title[..25])
        } else {
            book.title.clone()
        };
        println!(
            "{:<38} {:<30} {:<12} {:<20}",
            book.id,
            title_display,
            book.output_state,
            book.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }

    Ok(())
}

/// `folio pending`: every book still needing attention.
pub async fn run_pending(engine: &Engine) -> Result<()> {
    let pending = engine.list_pending_actions().await.map_err(engine_error)?;

    if pending.is_empty() {
        println!("Nothing pending; all books are complete.");
        return Ok(());
    }

    for action in &pending {
        println!(
            "{} {} [{}] -- {}",
            action.book_id, action.title, action.stage, action.next_action
        );
    }

    Ok(())
}
