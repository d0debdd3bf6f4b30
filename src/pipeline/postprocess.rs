//! Final Markdown cleanup shared by every successful result.
//!
//! Remote pages, lopdf text, converter stdout and OCR transcripts each
//! arrive with their own quirks: CRLF from Windows converters, a BOM at the
//! start of stdout, models wrapping the whole answer in a ```` ```markdown ````
//! fence, and long blank runs where a page had no text. [`clean_markdown`]
//! folds all of them into one canonical form, so the same document always
//! yields the same bytes whichever backend won.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

type Rule = fn(&str) -> Cow<'_, str>;

/// Applied in order. Fences go first so a fenced CRLF payload still
/// matches; invisible characters go before the closing newline pass.
const RULES: &[Rule] = &[
    unwrap_fence,
    unix_newlines,
    trim_line_ends,
    collapse_blank_runs,
    drop_invisible,
];

static WHOLE_DOC_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A```(?:markdown|md)?\r?\n(.*?)\r?\n```\s*\z").unwrap());

static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

const INVISIBLE: [char; 6] = [
    '\u{FEFF}', '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{00AD}',
];

/// Normalise backend output: unwrap a whole-document fence, use `\n` line
/// endings, strip trailing spaces, keep at most one blank line in a row,
/// drop zero-width characters and end with exactly one newline.
pub fn clean_markdown(input: &str) -> String {
    let mut text = input.to_string();
    for rule in RULES {
        let next = match rule(&text) {
            Cow::Borrowed(_) => continue,
            Cow::Owned(next) => next,
        };
        text = next;
    }
    match text.trim_end() {
        "" => "\n".to_string(),
        body => format!("{body}\n"),
    }
}

fn unwrap_fence(s: &str) -> Cow<'_, str> {
    match WHOLE_DOC_FENCE.captures(s.trim()) {
        Some(caps) => Cow::Owned(caps[1].to_string()),
        None => Cow::Borrowed(s),
    }
}

fn unix_newlines(s: &str) -> Cow<'_, str> {
    if s.contains('\r') {
        Cow::Owned(s.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(s)
    }
}

fn trim_line_ends(s: &str) -> Cow<'_, str> {
    Cow::Owned(s.split('\n').map(str::trim_end).collect::<Vec<_>>().join("\n"))
}

fn collapse_blank_runs(s: &str) -> Cow<'_, str> {
    BLANK_RUN.replace_all(s, "\n\n")
}

fn drop_invisible(s: &str) -> Cow<'_, str> {
    if s.contains(INVISIBLE) {
        Cow::Owned(s.replace(INVISIBLE, ""))
    } else {
        Cow::Borrowed(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converter_stdout_with_bom_and_crlf() {
        let stdout = "\u{FEFF}# Randomised Trial\r\n\r\n\r\n\r\n| Arm | n |\r\n|---|---|\r\n| A | 120 |\r\n";
        assert_eq!(
            clean_markdown(stdout),
            "# Randomised Trial\n\n| Arm | n |\n|---|---|\n| A | 120 |\n"
        );
    }

    #[test]
    fn fenced_ocr_transcript_is_unwrapped() {
        let ocr = "```markdown\n## Page 1\n\nScanned abstract.   \n```\n";
        assert_eq!(clean_markdown(ocr), "## Page 1\n\nScanned abstract.\n");
    }

    #[test]
    fn code_blocks_inside_pages_survive() {
        let md = "## Page 2\n\n```\ndose = 5 mg\n```\n\nDiscussion.\n";
        assert_eq!(clean_markdown(md), md);
    }

    #[test]
    fn empty_pages_leave_one_blank_line() {
        let md = "## Page 1\n\nIntro\n\n\n\n\n## Page 2\n\n\n\n\n## Page 3\n\nEnd";
        assert_eq!(
            clean_markdown(md),
            "## Page 1\n\nIntro\n\n## Page 2\n\n## Page 3\n\nEnd\n"
        );
    }

    #[test]
    fn soft_hyphens_and_zero_width_spaces_are_dropped() {
        assert_eq!(
            clean_markdown("hyper\u{00AD}tension\u{200B} cohort"),
            "hypertension cohort\n"
        );
    }

    #[test]
    fn blank_output_is_a_single_newline() {
        assert_eq!(clean_markdown("  \r\n\u{FEFF}\n"), "\n");
    }

    #[test]
    fn cleaning_twice_changes_nothing() {
        let raw = "\u{FEFF}## Page 1\r\n\r\n\r\nMethods\u{200B}  \r\n\n\n";
        let once = clean_markdown(raw);
        assert_eq!(clean_markdown(&once), once);
    }
}
