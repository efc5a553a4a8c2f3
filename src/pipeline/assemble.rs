//! Assembly: per-page cleanup, page headings and control-character stripping.
//!
//! Model output is cleaned with a few deterministic rules before it is
//! stitched together:
//!
//! 1. strip an outer ```` ``` ```` / ```` ```markdown ```` fence
//! 2. normalise line endings (CRLF and lone CR → LF)
//! 3. remove C0 control characters (except `\n` and `\t`) and DEL
//! 4. remove invisible Unicode (zero-width spaces, BOM, soft hyphen)
//! 5. trim trailing whitespace per line
//! 6. collapse runs of blank lines to at most two
//!
//! Every page then gets a `## Page N` heading. The assembled document goes
//! through [`sanitize`] once more, so no control character can reach the
//! caller whatever the per-page rules did.

use crate::pipeline::extract::PageText;
use once_cell::sync::Lazy;
use regex::Regex;

/// Clean one page of model output.
pub fn clean_page(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = sanitize(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

/// Join pages, in page-number order, into one document.
///
/// The input does not need to be sorted.
pub fn assemble(pages: &[PageText]) -> String {
    let mut ordered: Vec<&PageText> = pages.iter().collect();
    ordered.sort_by_key(|p| p.page_num);

    let mut out = String::new();
    for page in ordered {
        out.push_str(&format!("## Page {}\n\n", page.page_num));
        let body = clean_page(&page.text);
        if !body.is_empty() {
            out.push_str(&body);
            out.push_str("\n\n");
        }
    }
    let out = sanitize(&out);
    let trimmed = out.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

/// Normalise line endings, then drop every C0 control character except
/// `\n` and `\t`, and DEL.
pub fn sanitize(input: &str) -> String {
    normalise_line_endings(input)
        .chars()
        .filter(|&c| !is_stripped_control(c))
        .collect()
}

fn is_stripped_control(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{1F}' | '\u{7F}') && c != '\n' && c != '\t'
}

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md)?\n(.*)\n```\s*$").expect("valid fence regex")
});

fn strip_markdown_fences(input: &str) -> String {
    let normalised = normalise_line_endings(input);
    match RE_OUTER_FENCES.captures(normalised.trim()) {
        Some(caps) => caps[1].to_string(),
        None => normalised,
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

static RE_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{4,}").expect("valid blank-line regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").into_owned()
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}
