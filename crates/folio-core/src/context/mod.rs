//! Context chaining: the narrative-continuity string fed into chapter
//! generation, built from the summaries of strictly earlier chapters.

use anyhow::Result;
use uuid::Uuid;

use folio_db::models::Chapter;
use folio_db::store::Store;

/// Header line prepended when any prior summary exists.
const CONTEXT_HEADER: &str = "Summary of previous chapters:";

/// Build the context string for generating chapter `before_number`.
///
/// Pure over the given chapter slice: includes, in ascending chapter-number
/// order, every chapter with `number < before_number` and a non-empty
/// summary. Returns an empty string when none qualify.
///
/// A chapter in its first generation has never had a summary written, so it
/// is excluded by the non-empty filter; a chapter mid-regeneration still
/// carries its last good summary and is included.
pub fn build_context(chapters: &[Chapter], before_number: i32) -> String {
    let mut entries: Vec<&Chapter> = chapters
        .iter()
        .filter(|c| c.number < before_number && !c.summary.is_empty())
        .collect();
    entries.sort_by_key(|c| c.number);

    if entries.is_empty() {
        return String::new();
    }

    let lines: Vec<String> = entries
        .iter()
        .map(|c| format!("Chapter {} ({}): {}", c.number, c.title, c.summary))
        .collect();

    format!("{CONTEXT_HEADER}\n{}", lines.join("\n\n"))
}

/// Store-facing wrapper: fetch the book's chapters and build the context.
pub async fn build_context_for_book(
    store: &dyn Store,
    book_id: Uuid,
    before_number: i32,
) -> Result<String> {
    let chapters = store.list_chapters(book_id).await?;
    Ok(build_context(&chapters, before_number))
}
