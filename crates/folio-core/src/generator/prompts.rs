//! Prompt construction for outline, chapter, and summary generation.
//!
//! Pure string assembly; every backend receives the same prompts.

/// System prompt for first-pass outline generation.
pub const OUTLINE_SYSTEM: &str = "You are an expert book outline creator. Create detailed, \
well-structured book outlines that provide a clear roadmap for comprehensive book content. \
Each chapter should have clear objectives and flow logically from one to the next.";

/// System prompt for feedback-driven outline revision.
pub const OUTLINE_REVISION_SYSTEM: &str = "You are an expert book outline editor. Improve the \
outline based on the provided feedback while maintaining coherence and structure.";

/// System prompt for chapter content generation.
pub const CHAPTER_SYSTEM: &str = "You are an expert book writer. Write engaging, informative, \
and well-structured chapter content. Maintain consistency with the book's overall tone and \
build upon concepts from previous chapters when applicable.";

/// System prompt for feedback-driven chapter revision.
pub const CHAPTER_REVISION_SYSTEM: &str = "You are an expert book editor. Improve the chapter \
based on the provided feedback while maintaining the book's overall coherence.";

/// Prompt for generating a fresh outline from the creation briefing.
pub fn outline_generation(title: &str, briefing: &str) -> String {
    let mut prompt = format!(
        "Create a book outline for \"{title}\".\n\n\
         Provide:\n\
         1. Brief book overview (2-3 sentences)\n\
         2. 5-6 chapter titles with 2-3 bullet points each\n\n\
         Keep it concise."
    );
    if !briefing.is_empty() {
        prompt.push_str(&format!("\n\nNotes: {briefing}"));
    }
    prompt
}

/// Prompt for revising an outline against reviewer feedback.
pub fn outline_regeneration(title: &str, current_outline: &str, feedback: &str) -> String {
    format!(
        "Revise the following book outline for \"{title}\" based on the editor's feedback.\n\n\
         Current Outline:\n{current_outline}\n\n\
         Editor's Feedback and Requested Changes:\n{feedback}\n\n\
         Please create an improved outline that addresses all the feedback while maintaining \
         a coherent structure.\n\
         Keep what works well from the original outline and modify/add/remove sections as \
         needed based on the feedback."
    )
}

/// Prompt for generating a chapter's content.
pub fn chapter_generation(
    title: &str,
    chapter_number: i32,
    chapter_title: &str,
    chapter_outline: &str,
    previous_summaries: &str,
    editor_notes: &str,
) -> String {
    let mut prompt = format!(
        "Write Chapter {chapter_number} of the book \"{title}\".\n\n\
         Chapter Title: {chapter_title}\n\n\
         Chapter Outline/Topics to Cover:\n{chapter_outline}"
    );

    if !previous_summaries.is_empty() {
        prompt.push_str(&format!(
            "\n\nContext from Previous Chapters:\n{previous_summaries}\n\n\
             Ensure continuity with the previous chapters while avoiding repetition."
        ));
    }

    if !editor_notes.is_empty() {
        prompt.push_str(&format!(
            "\n\nEditor's Notes for This Chapter:\n{editor_notes}\n\n\
             Please incorporate these notes into the chapter."
        ));
    }

    prompt.push_str(
        "\n\nWrite engaging, well-structured content with:\n\
         - Clear explanations and examples\n\
         - Smooth transitions between sections\n\
         - Appropriate depth for the target audience\n\
         - A brief introduction and conclusion for the chapter",
    );

    prompt
}

/// Prompt for revising a chapter against reviewer feedback.
pub fn chapter_regeneration(
    title: &str,
    chapter_number: i32,
    chapter_title: &str,
    current_content: &str,
    feedback: &str,
    previous_summaries: &str,
) -> String {
    let mut prompt = format!(
        "Revise Chapter {chapter_number} (\"{chapter_title}\") of the book \"{title}\" based \
         on the editor's feedback.\n\n\
         Current Chapter Content:\n{current_content}\n\n\
         Editor's Feedback and Requested Changes:\n{feedback}"
    );

    if !previous_summaries.is_empty() {
        prompt.push_str(&format!(
            "\n\nContext from Previous Chapters (for continuity):\n{previous_summaries}"
        ));
    }

    prompt.push_str(
        "\n\nPlease create an improved version of this chapter that:\n\
         1. Addresses all the feedback points\n\
         2. Maintains consistency with the book's overall flow\n\
         3. Keeps the content engaging and well-structured",
    );

    prompt
}

/// Prompt for condensing a chapter into a context summary.
pub fn chapter_summary(content: &str, chapter_number: i32, chapter_title: &str) -> String {
    format!(
        "Create a concise summary of Chapter {chapter_number} (\"{chapter_title}\") for use \
         as context in generating subsequent chapters.\n\n\
         Chapter Content:\n{content}\n\n\
         Provide a summary (200-300 words) that captures:\n\
         1. Main topics and key points covered\n\
         2. Important concepts, terms, or ideas introduced\n\
         3. Any significant conclusions or decisions made\n\
         4. Elements that might be referenced in later chapters\n\n\
         Focus on information that would be relevant for maintaining continuity in \
         subsequent chapters."
    )
}
