//! Normalisation: deterministic cleanup of one page's extracted text.
//!
//! pdfium hands back text segments exactly as they sit in the content
//! stream: CRLF pairs inside a run, tabs used as column gaps, zero-width
//! joiners and soft hyphens from the producer. None of that carries meaning
//! for a chat prompt, and a stray newline inside page text could even line
//! up as a page delimiter. Every page therefore goes through
//! [`clean_page_text`] before it is assembled, so the text stored in a
//! document and embedded in prompts is this normalised form, not the raw
//! fragment text.
//!
//! ## Rule Order
//!
//! Invisible characters go first so that `foo\u{200B} bar` does not leave a
//! double space behind; whitespace folding runs before the final trim. The
//! delimiter escape runs last, on the exact line that will be assembled.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all normalisation rules to one page's text.
///
/// Rules (applied in order):
/// 1. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 2. Fold every whitespace run (including line breaks and tabs) into one space
/// 3. Trim both ends
/// 4. Escape a page whose whole text looks like a page delimiter
///
/// The result never contains `\n` or `\r` and is never itself a delimiter
/// line, so it cannot change the page count of the assembled document.
pub fn clean_page_text(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = fold_whitespace(&s);
    escape_delimiter_shape(s.trim())
}

// ── Rule 1: Strip invisible Unicode ──────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 2: Fold whitespace ──────────────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn fold_whitespace(input: &str) -> String {
    RE_WHITESPACE.replace_all(input, " ").into_owned()
}

// ── Rule 4: Escape delimiter-shaped pages ────────────────────────────────────

static RE_DELIMITER_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^--- Page [0-9]+ ---$").unwrap());

fn escape_delimiter_shape(line: &str) -> String {
    if RE_DELIMITER_SHAPE.is_match(line) {
        format!("\\{line}")
    } else {
        line.to_string()
    }
}
