//! Post-extraction cleanup pipeline for page text.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.
//! PDF text extraction leaves control characters, ragged spacing, and long
//! runs of empty lines; none of that carries meaning for classification.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on raw extracted text.
pub(crate) fn run_pipeline(text: &str) -> String {
    let mut result = text.to_string();

    result = strip_control_chars(&result);
    result = join_hyphenated_breaks(&result);
    result = collapse_spaces(&result);
    result = clean_blank_lines(&result);

    result.trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 1: Control characters
// ---------------------------------------------------------------------------

/// Drop control characters except newlines and tabs. CRLF and lone CR line
/// endings become `\n`; form feeds become newlines.
fn strip_control_chars(text: &str) -> String {
    text.replace("\r\n", "\n")
        .chars()
        .filter_map(|c| match c {
            '\n' | '\t' => Some(c),
            '\r' | '\u{0c}' => Some('\n'),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Pass 2: Hyphenated line breaks
// ---------------------------------------------------------------------------

/// Re-join words split across lines with a trailing hyphen (`indem-\nnity`).
fn join_hyphenated_breaks(text: &str) -> String {
    static HYPHEN_BREAK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(\p{L})-\n[ \t]*(\p{Ll})").expect("valid regex"));

    HYPHEN_BREAK_RE.replace_all(text, "$1$2").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Horizontal whitespace
// ---------------------------------------------------------------------------

/// Collapse runs of spaces/tabs and strip trailing whitespace on each line.
fn collapse_spaces(text: &str) -> String {
    static SPACES_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t\u{a0}]{2,}").expect("valid regex"));

    text.lines()
        .map(|line| SPACES_RE.replace_all(line, " ").trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 4: Blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of 2+ blank lines into exactly 1.
fn clean_blank_lines(text: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(text, "\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_characters() {
        assert_eq!(strip_control_chars("a\u{0}b\u{7}c"), "abc");
        assert_eq!(strip_control_chars("a\r\nb"), "a\nb");
        assert_eq!(strip_control_chars("a\rb"), "a\nb");
        assert_eq!(strip_control_chars("a\tb\u{0c}c"), "a\tb\nc");
    }

    #[test]
    fn joins_hyphenated_words() {
        assert_eq!(
            join_hyphenated_breaks("The party shall indem-\nnify the other."),
            "The party shall indemnify the other."
        );
        // Capitalised continuation is a list item or heading, not a split word.
        assert_eq!(join_hyphenated_breaks("Term-\nSheet"), "Term-\nSheet");
    }

    #[test]
    fn collapses_spaces_per_line() {
        assert_eq!(collapse_spaces("a    b\t\tc   \nd"), "a b c\nd");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(clean_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(clean_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn full_pipeline() {
        let raw = "  1. Termination  \r\n\r\n\r\n\r\nEither party may termi-\nnate   this Agreement.\u{0}  ";
        assert_eq!(
            run_pipeline(raw),
            "1. Termination\n\nEither party may terminate this Agreement."
        );
    }

    #[test]
    fn crlf_line_breaks_stay_single() {
        assert_eq!(
            run_pipeline("line one\r\nline two\r\nline three"),
            "line one\nline two\nline three"
        );
        assert_eq!(run_pipeline("para one\r\n\r\npara two"), "para one\n\npara two");
    }

    #[test]
    fn whitespace_only_becomes_empty() {
        assert_eq!(run_pipeline(" \n\t\n \u{0c} "), "");
    }
}
