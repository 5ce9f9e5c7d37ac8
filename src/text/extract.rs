//! Markup stripping for narration.
//!
//! Turns a raw Markdown/MDX document into plain text a speech model can read
//! aloud. Every rule is a no-op when its construct is absent, so `extract` is
//! total and never fails.

use regex::Regex;
use std::sync::LazyLock;

// Patterns are compile-time constants covered by the tests below.
#[allow(clippy::expect_used)]
fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("invalid extraction pattern")
}

static FRONT_MATTER: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?s)\A\s*(?:---[ \t]*\n.*?\n---|\+\+\+[ \t]*\n.*?\n\+\+\+)[ \t]*(?:\n|\z)")
});
static IMPORT_EXPORT: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?m)^[ \t]*(?:import|export)\s[^\n]*$"));
static FENCED_CODE: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)(?:```.*?```|~~~.*?~~~)"));
static HTML_COMMENT: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<!--.*?-->"));
static MDX_COMMENT: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)\{/\*.*?\*/\}"));
static TAG: LazyLock<Regex> = LazyLock::new(|| re(r"</?[A-Za-z][^<>]*>"));
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| re(r"`[^`\n]+`"));
static IMAGE: LazyLock<Regex> = LazyLock::new(|| re(r"!\[([^\]]*)\]\([^)]*\)"));
static LINK: LazyLock<Regex> = LazyLock::new(|| re(r"\[([^\]]+)\]\([^)]*\)"));
static REF_LINK: LazyLock<Regex> = LazyLock::new(|| re(r"\[([^\]]+)\]\[[^\]]*\]"));
static LINK_DEFINITION: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?m)^[ \t]*\[[^\]]+\]:[ \t]+\S[^\n]*$"));
static HEADING: LazyLock<Regex> = LazyLock::new(|| re(r"(?m)^[ \t]*#{1,6}[ \t]+"));
static HORIZONTAL_RULE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?m)^[ \t]*(?:[-*_][ \t]*){3,}$"));
static BLOCKQUOTE: LazyLock<Regex> = LazyLock::new(|| re(r"(?m)^[ \t]*(?:>[ \t]?)+"));
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?m)^[ \t]*(?:[-*+]|\d+[.)])[ \t]+"));
static BOLD_STARS: LazyLock<Regex> = LazyLock::new(|| re(r"\*\*([^*\n]+?)\*\*"));
static BOLD_UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| re(r"__([^_\n]+?)__"));
// Emphasis needs a non-space just inside each delimiter, so `2 * 3 * 4` stays.
static ITALIC_STAR: LazyLock<Regex> =
    LazyLock::new(|| re(r"\*([^*\s](?:[^*\n]*?[^*\s])?)\*"));
static ITALIC_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(^|[^\w])_([^_\s](?:[^_\n]*?[^_\s])?)_([^\w]|$)"));
static STRIKETHROUGH: LazyLock<Regex> = LazyLock::new(|| re(r"~~([^~\n]+?)~~"));
static TRAILING_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| re(r"(?m)[ \t]+$"));
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| re(r"\n{3,}"));

/// Extract narratable plain text from a marked-up document.
pub fn extract(raw: &str) -> String {
    let mut text = raw.replace("\r\n", "\n");

    text = FRONT_MATTER.replace(&text, "").into_owned();
    text = FENCED_CODE.replace_all(&text, "").into_owned();
    text = IMPORT_EXPORT.replace_all(&text, "").into_owned();
    text = HTML_COMMENT.replace_all(&text, "").into_owned();
    text = MDX_COMMENT.replace_all(&text, "").into_owned();
    text = replace_to_fixed_point(&TAG, &text, "");
    text = INLINE_CODE.replace_all(&text, "").into_owned();

    text = IMAGE.replace_all(&text, "${1}").into_owned();
    text = LINK.replace_all(&text, "${1}").into_owned();
    text = REF_LINK.replace_all(&text, "${1}").into_owned();
    text = LINK_DEFINITION.replace_all(&text, "").into_owned();

    // Rules before list markers so `***` and `- - -` are not read as bullets.
    text = HORIZONTAL_RULE.replace_all(&text, "").into_owned();
    text = HEADING.replace_all(&text, "").into_owned();
    text = BLOCKQUOTE.replace_all(&text, "").into_owned();
    text = LIST_MARKER.replace_all(&text, "").into_owned();

    text = BOLD_STARS.replace_all(&text, "${1}").into_owned();
    text = BOLD_UNDERSCORES.replace_all(&text, "${1}").into_owned();
    text = ITALIC_STAR.replace_all(&text, "${1}").into_owned();
    // The surrounding characters are part of each match, so adjacent spans take more passes
    text = replace_to_fixed_point(&ITALIC_UNDERSCORE, &text, "${1}${2}${3}");
    text = STRIKETHROUGH.replace_all(&text, "${1}").into_owned();

    text = TRAILING_WHITESPACE.replace_all(&text, "").into_owned();
    text = BLANK_RUN.replace_all(&text, "\n\n").into_owned();
    text.trim().to_string()
}

/// Apply `pattern` until the text stops changing.
///
/// A single pass over `<a<b>>` only removes the inner tag and leaves a new
/// `<a>` behind. Every rule this is used with shortens the text, so the loop
/// terminates.
fn replace_to_fixed_point(pattern: &Regex, text: &str, replacement: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = pattern.replace_all(&current, replacement);
        if next == current {
            return current;
        }
        current = next.into_owned();
    }
}
