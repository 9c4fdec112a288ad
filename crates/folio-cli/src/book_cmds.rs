//! Book and outline commands: create, import, and the outline review loop.

use anyhow::{Context, Result};

use folio_core::workflow::{Engine, ImportEntry};

use crate::OutlineCommands;
use crate::resolve::{engine_error, parse_book_id};

/// `folio create`: create a book from a title and briefing.
pub async fn run_create(engine: &Engine, title: &str, briefing: &str) -> Result<()> {
    let book = engine
        .create_book(title, briefing)
        .await
        .map_err(engine_error)?;

    println!("Book '{}' created.", book.title);
    println!("  id: {}", book.id);
    println!("Next: run `folio outline generate {}`.", book.id);

    Ok(())
}

/// `folio import`: bulk-create books from a JSON file containing an array
/// of `{"title": ..., "briefing": ...}` entries.
pub async fn run_import(engine: &Engine, file: &str) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read import file {file}"))?;
    let entries: Vec<ImportEntry> =
        serde_json::from_str(&contents).context("import file is not a JSON array of books")?;

    let report = engine.import_books(entries).await.map_err(engine_error)?;

    println!(
        "Imported {} books, {} errors.",
        report.created.len(),
        report.errors.len()
    );
    for created in &report.created {
        println!("  + {} ({})", created.title, created.book_id);
    }
    for error in &report.errors {
        println!("  ! row {}: {} -- {}", error.row, error.title, error.error);
    }

    Ok(())
}

/// Dispatch an outline subcommand.
pub async fn run_outline_command(command: OutlineCommands, engine: &Engine) -> Result<()> {
    match command {
        OutlineCommands::Generate { book_id } => {
            let id = parse_book_id(&book_id)?;
            let book = engine.generate_outline(id).await.map_err(engine_error)?;
            println!("Outline generated for '{}'. Awaiting review.", book.title);
            println!();
            println!("{}", book.outline);
        }
        OutlineCommands::Regenerate { book_id } => {
            let id = parse_book_id(&book_id)?;
            let book = engine.regenerate_outline(id).await.map_err(engine_error)?;
            println!("Outline regenerated for '{}'. Awaiting review.", book.title);
            println!();
            println!("{}", book.outline);
        }
        OutlineCommands::Approve { book_id } => {
            let id = parse_book_id(&book_id)?;
            let chapters = engine.approve_outline(id).await.map_err(engine_error)?;
            println!("Outline approved. {} chapters initialized:", chapters.len());
            for chapter in &chapters {
                println!("  {}. {}", chapter.number, chapter.title);
            }
        }
        OutlineCommands::Feedback { book_id, notes } => {
            let id = parse_book_id(&book_id)?;
            engine
                .add_outline_feedback(id, &notes)
                .await
                .map_err(engine_error)?;
            println!("Feedback recorded. Next: `folio outline regenerate {book_id}`.");
        }
    }

    Ok(())
}
