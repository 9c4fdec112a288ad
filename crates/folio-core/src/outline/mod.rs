//! Outline parser: decomposes a free-text outline into ordered chapter stubs.
//!
//! The parser is pure and deterministic: the same outline text always yields
//! the same chapter list. It is re-run from the stored outline whenever a
//! chapter's outline body is needed, so nothing it produces is persisted.
//!
//! Heading classification, in priority order:
//! 1. `Chapter N: Title` / `Chapter N - Title` (number from the heading)
//! 2. `N. Title` / `N: Title` / `N - Title` with N <= 20 (caps false
//!    positives from numbered sub-bullets)
//! 3. A markdown heading line containing the word "chapter" (number
//!    auto-incremented from the last seen, starting at 1)
//!
//! Lines between headings accumulate as the open chapter's body; lines
//! before the first heading are dropped. When no heading matches at all,
//! the raw text is split three ways into Introduction / Main Content /
//! Conclusion so the parser always returns at least one chapter.

/// One chapter stub produced from the outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChapter {
    pub number: i32,
    pub title: String,
    /// The outline lines under this chapter's heading, newline-joined.
    pub body: String,
}

/// Largest value accepted for a bare `N.` / `N:` / `N -` heading.
const MAX_BARE_HEADING_NUMBER: i32 = 20;

/// Split points for the no-headings fallback, in bytes.
const FALLBACK_SPLITS: (usize, usize) = (500, 1000);

/// Parse an outline into ordered chapter stubs. Never fails; falls back to
/// a fixed 3-way split when no heading is recognized.
pub fn parse(outline: &str) -> Vec<ParsedChapter> {
    let mut chapters: Vec<ParsedChapter> = Vec::new();
    let mut current: Option<(i32, String)> = None;
    let mut body: Vec<&str> = Vec::new();
    let mut last_number = 0;

    let mut flush = |current: &mut Option<(i32, String)>, body: &mut Vec<&str>| {
        if let Some((number, title)) = current.take() {
            chapters.push(ParsedChapter {
                number,
                title,
                body: body.join("\n"),
            });
        }
        body.clear();
    };

    for raw_line in outline.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        let heading = match_chapter_heading(line)
            .or_else(|| match_numbered_heading(line))
            .or_else(|| match_markdown_heading(line).map(|title| (last_number + 1, title)));

        match heading {
            Some((number, title)) => {
                flush(&mut current, &mut body);
                last_number = number;
                current = Some((number, title));
            }
            None => {
                if current.is_some() {
                    body.push(line);
                }
            }
        }
    }
    flush(&mut current, &mut body);

    if chapters.is_empty() {
        return fallback_split(outline);
    }

    chapters
}

/// Match `Chapter N: Title` / `Chapter N - Title` (case-insensitive).
fn match_chapter_heading(line: &str) -> Option<(i32, String)> {
    let rest = strip_prefix_ignore_case(line, "chapter")?;
    let rest = rest.trim_start();
    let (number, rest) = take_number(rest)?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix([':', '-'])?;
    let title = rest.trim();
    if title.is_empty() {
        return None;
    }
    Some((number, title.to_string()))
}

/// Match `N. Title` / `N: Title` / `N - Title` with N <= 20.
fn match_numbered_heading(line: &str) -> Option<(i32, String)> {
    let (number, rest) = take_number(line)?;
    if number > MAX_BARE_HEADING_NUMBER {
        return None;
    }
    let rest = rest.trim_start();
    let rest = rest.strip_prefix(['.', ':', '-'])?;
    let title = rest.trim();
    if title.is_empty() {
        return None;
    }
    Some((number, title.to_string()))
}

/// Match a markdown heading line mentioning "chapter"; returns the title
/// with any leading `Chapter N:` prefix stripped.
fn match_markdown_heading(line: &str) -> Option<String> {
    if !line.starts_with('#') {
        return None;
    }
    if !line.to_lowercase().contains("chapter") {
        return None;
    }
    let rest = line.trim_start_matches('#').trim_start();

    // Strip an optional "Chapter N:" / "Chapter N -" prefix; the number is
    // auto-assigned by the caller regardless.
    let title = match match_chapter_heading(rest) {
        Some((_, title)) => title,
        None => rest.trim().to_string(),
    };
    if title.is_empty() {
        return None;
    }
    Some(title)
}

/// Take a leading run of ASCII digits as an i32.
fn take_number(s: &str) -> Option<(i32, &str)> {
    let digits_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if digits_end == 0 {
        return None;
    }
    let number = s[..digits_end].parse::<i32>().ok()?;
    Some((number, &s[digits_end..]))
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Fixed 3-way split used when the outline has no recognizable headings.
/// A deliberately crude safety net, not a layout algorithm.
fn fallback_split(outline: &str) -> Vec<ParsedChapter> {
    let (first, second) = FALLBACK_SPLITS;
    let a = floor_char_boundary(outline, first);
    let b = floor_char_boundary(outline, second);

    vec![
        ParsedChapter {
            number: 1,
            title: "Introduction".to_string(),
            body: outline[..a].to_string(),
        },
        ParsedChapter {
            number: 2,
            title: "Main Content".to_string(),
            body: outline[a..b].to_string(),
        },
        ParsedChapter {
            number: 3,
            title: "Conclusion".to_string(),
            body: outline[b..].to_string(),
        },
    ]
}

/// Largest char boundary at or below `index`.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chapter_colon_headings() {
        let outline = "Chapter 1: The Beginning\n- first point\n- second point\n\nChapter 2: The Middle\n- third point\n";
        let chapters = parse(outline);

        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].number, 1);
        assert_eq!(chapters[0].title, "The Beginning");
        assert_eq!(chapters[0].body, "- first point\n- second point");
        assert_eq!(chapters[1].number, 2);
        assert_eq!(chapters[1].title, "The Middle");
        assert_eq!(chapters[1].body, "- third point");
    }

    #[test]
    fn parses_chapter_dash_headings() {
        let chapters = parse("Chapter 4 - Endgame\ncontent here");
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].number, 4);
        assert_eq!(chapters[0].title, "Endgame");
    }

    #[test]
    fn chapter_prefix_is_case_insensitive() {
        let chapters = parse("CHAPTER 2: Loud\nbody");
        assert_eq!(chapters[0].number, 2);
        assert_eq!(chapters[0].title, "Loud");
    }

    #[test]
    fn parses_numbered_headings() {
        let outline = "1. Getting Started\nintro text\n2: Fundamentals\nmore text\n3 - Advanced Topics\nfinal text";
        let chapters = parse(outline);

        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].title, "Getting Started");
        assert_eq!(chapters[1].title, "Fundamentals");
        assert_eq!(chapters[2].title, "Advanced Topics");
    }

    #[test]
    fn numbered_headings_above_cap_become_body() {
        // "21." reads as a numbered sub-bullet, not a chapter heading.
        let outline = "1. Only Chapter\n21. not a chapter\nmore body";
        let chapters = parse(outline);

        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].body, "21. not a chapter\nmore body");
    }

    #[test]
    fn markdown_headings_auto_increment() {
        let outline = "# Chapter One: ignored numbering\ntext a\n## The second chapter\ntext b";
        let chapters = parse(outline);

        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].number, 1);
        assert_eq!(chapters[1].number, 2);
        assert_eq!(chapters[1].title, "The second chapter");
    }

    #[test]
    fn markdown_heading_without_chapter_word_is_body() {
        let outline = "Chapter 1: Real\n# Just a section\nbody line";
        let chapters = parse(outline);

        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].body, "# Just a section\nbody line");
    }

    #[test]
    fn markdown_heading_strips_embedded_chapter_prefix() {
        let chapters = parse("## Chapter 7: The Real Title\nbody");
        assert_eq!(chapters.len(), 1);
        // The embedded number is ignored; markdown headings auto-increment.
        assert_eq!(chapters[0].number, 1);
        assert_eq!(chapters[0].title, "The Real Title");
    }

    #[test]
    fn lines_before_first_heading_are_dropped() {
        let outline = "A brief overview of the book.\n\nChapter 1: Start\nbody";
        let chapters = parse(outline);

        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].body, "body");
    }

    #[test]
    fn heading_without_title_is_not_a_heading() {
        let chapters = parse("Chapter 1:\n1. Real Heading\nbody");
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "Real Heading");
    }

    #[test]
    fn falls_back_to_three_way_split() {
        let outline = "just some prose with no structure at all";
        let chapters = parse(outline);

        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].title, "Introduction");
        assert_eq!(chapters[1].title, "Main Content");
        assert_eq!(chapters[2].title, "Conclusion");
        assert_eq!(chapters[0].body, outline);
        assert_eq!(chapters[1].body, "");
        assert_eq!(chapters[2].body, "");
    }

    #[test]
    fn fallback_split_respects_char_boundaries() {
        // Multi-byte characters straddling the 500/1000 byte marks must not
        // panic the slicing.
        let outline = "é".repeat(700);
        let chapters = parse(&outline);

        assert_eq!(chapters.len(), 3);
        let total: usize = chapters.iter().map(|c| c.body.len()).sum();
        assert_eq!(total, outline.len());
    }

    #[test]
    fn empty_outline_still_yields_chapters() {
        let chapters = parse("");
        assert_eq!(chapters.len(), 3);
    }

    #[test]
    fn parsing_is_deterministic() {
        let outline = "Chapter 1: A\nx\n2. B\ny\n# chapter heading\nz";
        let first = parse(outline);
        let second = parse(outline);
        assert_eq!(first, second);
    }

    #[test]
    fn mixed_heading_styles_in_one_outline() {
        let outline = "Chapter 1: Alpha\na\n2. Beta\nb\n# Chapter Gamma\nc";
        let chapters = parse(outline);

        assert_eq!(chapters.len(), 3);
        assert_eq!(
            chapters.iter().map(|c| c.number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(chapters[2].title, "Chapter Gamma");
    }
}
