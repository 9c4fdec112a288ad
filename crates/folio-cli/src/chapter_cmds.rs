//! Chapter commands: the per-chapter generation/review loop and the
//! all-chapters fan-out.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use folio_core::workflow::{ChapterRunStatus, Engine};

use crate::ChapterCommands;
use crate::resolve::{engine_error, parse_book_id};

/// Dispatch a chapter subcommand.
pub async fn run_chapter_command(command: ChapterCommands, engine: &Engine) -> Result<()> {
    match command {
        ChapterCommands::Generate { book_id, number } => {
            let id = parse_book_id(&book_id)?;
            let chapter = engine
                .generate_chapter(id, number)
                .await
                .map_err(engine_error)?;
            println!(
                "Chapter {} ('{}') generated; now in review.",
                chapter.number, chapter.title
            );
        }
        ChapterCommands::Regenerate { book_id, number } => {
            let id = parse_book_id(&book_id)?;
            let chapter = engine
                .regenerate_chapter(id, number)
                .await
                .map_err(engine_error)?;
            println!(
                "Chapter {} ('{}') regenerated; now in review.",
                chapter.number, chapter.title
            );
        }
        ChapterCommands::Approve { book_id, number } => {
            let id = parse_book_id(&book_id)?;
            let chapter = engine
                .approve_chapter(id, number)
                .await
                .map_err(engine_error)?;
            println!("Chapter {} approved.", chapter.number);
        }
        ChapterCommands::Feedback {
            book_id,
            number,
            notes,
        } => {
            let id = parse_book_id(&book_id)?;
            engine
                .add_chapter_feedback(id, number, &notes)
                .await
                .map_err(engine_error)?;
            println!("Feedback recorded. Next: `folio chapter regenerate {book_id} {number}`.");
        }
    }

    Ok(())
}

/// `folio chapters`: generate every non-approved chapter, concurrently up
/// to the configured cap. Ctrl-C cancels cleanly between backend calls.
pub async fn run_generate_all(engine: &Engine, book_id: &str, auto_approve: bool) -> Result<()> {
    let id = parse_book_id(book_id)?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    let outcomes = engine
        .generate_all_chapters(id, auto_approve, &cancel)
        .await
        .map_err(engine_error)?;

    for outcome in &outcomes {
        match &outcome.status {
            ChapterRunStatus::Generated => {
                println!("  [?] chapter {} generated (in review)", outcome.number);
            }
            ChapterRunStatus::AutoApproved => {
                println!("  [+] chapter {} generated and approved", outcome.number);
            }
            ChapterRunStatus::Skipped => {
                println!("  [=] chapter {} already approved, skipped", outcome.number);
            }
            ChapterRunStatus::Failed { message } => {
                println!("  [!] chapter {} failed: {message}", outcome.number);
            }
        }
    }

    let failed = outcomes
        .iter()
        .filter(|o| matches!(o.status, ChapterRunStatus::Failed { .. }))
        .count();
    if failed > 0 {
        anyhow::bail!("{failed} chapters failed");
    }

    Ok(())
}
