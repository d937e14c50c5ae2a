//! Text-to-text passes over raw message markdown.
//!
//! - [`normalize`]: display-safe markdown. Repairs fences (including the unterminated fence of a
//!   message that is still streaming), disambiguates constructs the parser would misread, and keeps
//!   reasoning/tool-call annotation blocks for the renderer.
//! - [`sanitize`]: copy/export-safe markdown. Annotation blocks and link reference definitions are
//!   removed.
//! - [`to_plain_text`]: speech-safe text with every piece of markup removed.
//!
//! All passes are total: malformed input is repaired or passed through, never rejected.
use crate::annotations;
use crate::scan;
use crate::scan::FenceMarker;
use crate::scan::FenceTracker;
use crate::scan::LineKind;
use once_cell::sync::Lazy;
use pulldown_cmark::Options;
use pulldown_cmark::Parser;
use regex::Captures;
use regex::Regex;
use std::borrow::Cow;

/// Zero-width joiner used to stop `## 1. Title` from reading as a list item.
pub const HEADING_NUMBER_GUARD: char = '\u{200D}';
/// Zero-width space inserted by [`soften_inline_code`].
pub const SOFT_BREAK: char = '\u{200B}';

static LIST_MARKER_FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([ \t]*)([-*+]|\d{1,9}[.)])[ \t]+((?:`{3,}|~{3,}).*)$").expect("valid regex")
});
static DASH_RULE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ \t]*-{3,}[ \t]*$").expect("valid regex"));
static BOLD_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*[^*\n]+\*\*").expect("valid regex"));
static NUMBERED_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([ \t]{0,3}#{1,6}[ \t]+\d+)\.([ \t]|$)").expect("valid regex"));
static LINK_ONLY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[ \t]*\[[^\]\n]+\]\([^)\n]+\)([ \t]*)$").expect("valid regex")
});
static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

static INLINE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`{1,3}([^`]+?)`{1,3}").expect("valid regex"));
static REF_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]\n]+)\]\[[^\]\n]*\]").expect("valid regex"));
static BOLD_STAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*").expect("valid regex"));
static BOLD_UNDERSCORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"__([^_\n]+?)__").expect("valid regex"));
static STRIKE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"~~([^~\n]+?)~~").expect("valid regex"));
/// Left- and right-flanking only: `2*3*4` is arithmetic, not emphasis.
static ITALIC_STAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^\w*])\*([^\s*](?:[^*\n]*?[^\s*])?)\*([^\w*]|$)").expect("valid regex")
});
static ITALIC_UNDERSCORE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^\w])_([^\s_](?:[^_\n]*?[^\s_])?)_([^\w]|$)").expect("valid regex")
});
static HEADING_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]+|[ \t]+#+[ \t]*$").expect("valid regex"));
static LIST_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:[-*+]|\d{1,9}[.)])[ \t]+").expect("valid regex"));
static QUOTE_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:>[ \t]?)+").expect("valid regex"));
static RULE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:(?:-[ \t]*){3,}|(?:\*[ \t]*){3,}|(?:_[ \t]*){3,})$")
        .expect("valid regex")
});
static TABLE_DELIMITER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*\|?(?:[ \t]*:?-{3,}:?[ \t]*\|)+[ \t]*(?::?-{3,}:?)?[ \t]*$")
        .expect("valid regex")
});
static HTML_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[A-Za-z][^<>\n]*>").expect("valid regex"));
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z][A-Za-z0-9]{1,31});")
        .expect("valid regex")
});
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Display-safe markdown. See the module docs for the pass order.
pub fn normalize(input: &str) -> String {
    let input = input.replace("\r\n", "\n");
    let text = strip_link_references(&input);
    let text = repair_fences(&text);
    let text = disambiguate(&text);
    separate_link_lines(&text)
}

/// Copy-safe markdown: link reference definitions and annotation blocks removed, runs of three
/// or more newlines collapsed to two, trimmed.
///
/// Idempotent: the passes are repeated until the text stops changing, so removing one construct
/// can never expose another on a later call.
pub fn sanitize(input: &str) -> String {
    let mut current = sanitize_once(input);
    loop {
        let next = sanitize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn sanitize_once(input: &str) -> String {
    let text = strip_link_references(input);
    let text = annotations::strip_annotations(&text);
    let text = BLANK_RUN_RE.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Speech-safe plain text built on [`sanitize`].
///
/// Lone `*` and `_` are left alone: they are too often math or identifiers.
pub fn to_plain_text(input: &str) -> String {
    let text = sanitize(input);
    if text.trim().is_empty() {
        return String::new();
    }

    let text = strip_fenced_code(&text);
    let text = INLINE_CODE_RE.replace_all(&text, "$1");
    let text = strip_inline_links(&text);
    let text = REF_LINK_RE.replace_all(&text, "$1");
    let text = BOLD_STAR_RE.replace_all(&text, "$1");
    let text = BOLD_UNDERSCORE_RE.replace_all(&text, "$1");
    let text = STRIKE_RE.replace_all(&text, "$1");
    let text = replace_until_stable(&ITALIC_STAR_RE, &text, "$1$2$3");
    let text = replace_until_stable(&ITALIC_UNDERSCORE_RE, &text, "$1$2$3");
    let text = HEADING_MARKER_RE.replace_all(&text, "");
    let text = LIST_MARKER_RE.replace_all(&text, "");
    let text = QUOTE_MARKER_RE.replace_all(&text, "");
    let text = RULE_RE.replace_all(&text, "");
    let text = TABLE_DELIMITER_RE.replace_all(&text, "");
    let text = HTML_TAG_RE.replace_all(&text, "");
    let text = decode_entities(&text);
    let text: String = text
        .chars()
        .filter(|ch| !is_emoji(*ch) && !is_zero_width(*ch))
        .map(|ch| match ch {
            '#' | '`' | '|' => ' ',
            other => other,
        })
        .collect();
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

/// Inserts a [`SOFT_BREAK`] every `chunk_size` characters inside inline code spans longer than
/// `chunk_size`, so long identifiers and paths can wrap. Fenced code is untouched.
pub fn soften_inline_code(input: &str, chunk_size: usize) -> String {
    if chunk_size == 0 || !input.contains('`') {
        return input.to_string();
    }
    let fences = scan::fenced_ranges(input);
    let spans = scan::inline_code_spans(input, &fences);
    if spans.is_empty() {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len() + input.len() / chunk_size.max(1));
    let mut cursor = 0usize;
    for span in spans {
        let inner = &input[span.inner.clone()];
        if inner.chars().count() <= chunk_size {
            continue;
        }
        out.push_str(&input[cursor..span.inner.start]);
        for (i, ch) in inner.chars().enumerate() {
            if i > 0 && i % chunk_size == 0 {
                out.push(SOFT_BREAK);
            }
            out.push(ch);
        }
        cursor = span.inner.end;
    }
    out.push_str(&input[cursor..]);
    out
}

/// Removes `[label]: target "title"` lines, but only for labels the parser itself resolves as
/// link reference definitions. Text that merely looks like one is kept.
fn strip_link_references(input: &str) -> String {
    if !input.contains("]:") {
        return input.to_string();
    }

    let parser = Parser::new_ext(input, parser_options());
    let labels: Vec<String> = parser
        .reference_definitions()
        .iter()
        .map(|(label, _)| label.to_string())
        .collect();
    if labels.is_empty() {
        return input.to_string();
    }

    let alternatives = labels
        .iter()
        .map(|label| {
            label
                .split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect::<Vec<_>>()
        .join("|");
    let title = r#"(?:[ \t]+(?:"[^"]*"|'[^']*'|\([^)]*\)))?"#;
    let pattern =
        format!(r"(?i)^[ \t]{{0,3}}\[\s*(?:{alternatives})\s*\]:[ \t]*\S+{title}[ \t]*$");
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(err) => {
            tracing::debug!(%err, "link reference pattern rejected, keeping definitions");
            return input.to_string();
        }
    };

    let mut tracker = FenceTracker::default();
    let mut removed = 0usize;
    let kept: Vec<&str> = input
        .split('\n')
        .filter(|line| {
            let keep = tracker.step(line) != LineKind::Prose || !re.is_match(line);
            if !keep {
                removed += 1;
            }
            keep
        })
        .collect();
    tracing::trace!(labels = labels.len(), removed, "stripped link reference definitions");
    kept.join("\n")
}

/// Puts every fence on its own unindented line and closes a fence left open at the end.
///
/// Inside a block only a run of the opener's character that is at least as long can close it.
/// Such a run followed by prose (`` ```Then we run it. ``) is a closer glued to the next line and
/// gets split. One followed by a bare info string (`` ```js ``) is nested content and is kept.
fn repair_fences(input: &str) -> String {
    let mut out: Vec<Cow<'_, str>> = Vec::new();
    let mut open: Option<FenceMarker> = None;
    let mut repaired = 0usize;

    for line in input.split('\n') {
        let marker_fence = if open.is_some() {
            None
        } else {
            LIST_MARKER_FENCE_RE
                .captures(line)
                .and_then(|caps| scan::fence_marker(&caps[3]).map(|m| (caps, m)))
        };
        if let Some((caps, marker)) = marker_fence {
            out.push(Cow::Owned(format!("{}{}", &caps[1], &caps[2])));
            out.push(Cow::Owned(caps[3].to_string()));
            open = Some(marker);
            repaired += 1;
            continue;
        }

        let Some(marker) = scan::fence_marker(line) else {
            out.push(Cow::Borrowed(line));
            continue;
        };
        let trimmed = line.trim_start();
        let Some(opener) = open else {
            if trimmed.len() != line.len() {
                repaired += 1;
            }
            out.push(Cow::Borrowed(trimmed));
            open = Some(marker);
            continue;
        };

        if marker.closes(&opener) {
            if trimmed.len() != line.len() {
                repaired += 1;
            }
            out.push(Cow::Borrowed(trimmed.trim_end()));
            open = None;
        } else if marker.matches(&opener) && is_glued_prose(&trimmed[marker.len()..]) {
            out.push(Cow::Borrowed(&trimmed[..marker.len()]));
            out.push(Cow::Borrowed(trimmed[marker.len()..].trim()));
            open = None;
            repaired += 1;
        } else {
            out.push(Cow::Borrowed(line));
        }
    }

    if let Some(opener) = open {
        tracing::debug!(len = opener.len(), "closing unterminated code fence");
        out.push(Cow::Owned(opener.closing_line()));
    }
    if repaired > 0 {
        tracing::debug!(repaired, "repaired malformed fences");
    }
    out.join("\n")
}

/// Text after a closing run reads as prose rather than an info string.
fn is_glued_prose(rest: &str) -> bool {
    let rest = rest.trim();
    rest.contains(char::is_whitespace) || rest.ends_with(['.', '!', '?', ':', ','])
}

/// Breaks up constructs the parser would otherwise misread:
/// a bold line directly above `---` (a setext heading) and `## 1. Title` (a list item).
fn disambiguate(input: &str) -> String {
    let mut out: Vec<Cow<'_, str>> = Vec::new();
    let mut tracker = FenceTracker::default();
    let mut prev_prose = false;

    for line in input.split('\n') {
        let kind = tracker.step(line);
        if kind != LineKind::Prose {
            out.push(Cow::Borrowed(line));
            prev_prose = false;
            continue;
        }

        if prev_prose
            && DASH_RULE_RE.is_match(line)
            && out
                .last()
                .is_some_and(|prev| BOLD_LABEL_RE.is_match(prev) && !prev.trim().is_empty())
        {
            out.push(Cow::Borrowed(""));
        }

        let line = NUMBERED_HEADING_RE.replace(line, |caps: &Captures<'_>| {
            format!("{}.{}{}", &caps[1], HEADING_NUMBER_GUARD, &caps[2])
        });
        prev_prose = !line.trim().is_empty();
        out.push(line);
    }
    out.join("\n")
}

/// Inserts a blank line after a link-only line ending in a hard break when another link-only line
/// follows, so each link keeps its own line.
fn separate_link_lines(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut tracker = FenceTracker::default();
    let mut prev_hard_break_link = false;

    for line in input.split('\n') {
        let kind = tracker.step(line);
        let link = if kind == LineKind::Prose {
            LINK_ONLY_RE.captures(line)
        } else {
            None
        };
        if prev_hard_break_link && link.is_some() {
            out.push("");
        }
        prev_hard_break_link = link.is_some_and(|caps| caps[1].chars().count() >= 2);
        out.push(line);
    }
    out.join("\n")
}

fn strip_fenced_code(text: &str) -> String {
    let fences = scan::fenced_ranges(text);
    if fences.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    for keep in scan::gaps(text.len(), &fences) {
        out.push_str(&text[keep]);
        out.push('\n');
    }
    out
}

/// Replaces inline links with their label and drops inline images. Brackets in the label and
/// parentheses in the destination nest, so `[a [b]](u)` and `[w](u_(x))` are matched whole.
fn strip_inline_links(text: &str) -> String {
    if !text.contains("](") {
        return text.to_string();
    }
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] != b'[' || (i > 0 && bytes[i - 1] == b'\\') {
            i += 1;
            continue;
        }
        let Some(close) = matching_bracket(bytes, i, b'[', b']') else {
            i += 1;
            continue;
        };
        let Some(end) = (bytes.get(close + 1) == Some(&b'('))
            .then(|| matching_bracket(bytes, close + 1, b'(', b')'))
            .flatten()
        else {
            i += 1;
            continue;
        };

        let image = i > 0 && bytes[i - 1] == b'!';
        out.push_str(&text[copied..if image { i - 1 } else { i }]);
        if !image {
            let label = strip_inline_links(&text[i + 1..close]);
            out.extend(label.chars().filter(|c| !matches!(c, '[' | ']')));
        }
        copied = end + 1;
        i = end + 1;
    }
    out.push_str(&text[copied..]);
    out
}

/// Index of the `close` byte balancing the `open` byte at `at`, on the same line.
fn matching_bracket(bytes: &[u8], at: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut j = at;
    while j < bytes.len() {
        match bytes[j] {
            b'\n' => return None,
            b'\\' => {
                j += 2;
                continue;
            }
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(j);
                }
            }
            _ => {}
        }
        j += 1;
    }
    None
}

fn replace_until_stable<'t>(re: &Regex, text: &'t str, rep: &str) -> Cow<'t, str> {
    let mut current = Cow::Borrowed(text);
    for _ in 0..4 {
        let next = re.replace_all(&current, rep).into_owned();
        if next == current {
            break;
        }
        current = Cow::Owned(next);
    }
    current
}

/// Decodes numeric and the common named HTML entities in a single pass. Unknown names are kept.
pub(crate) fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    ENTITY_RE.replace_all(text, |caps: &Captures<'_>| {
        let body = &caps[1];
        let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X"))
        {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = body.strip_prefix('#') {
            dec.parse::<u32>().ok().and_then(char::from_u32)
        } else {
            named_entity(body)
        };
        match decoded {
            Some(ch) => ch.to_string(),
            None => caps[0].to_string(),
        }
    })
}

fn named_entity(name: &str) -> Option<char> {
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "laquo" => '«',
        "raquo" => '»',
        "bull" => '•',
        "middot" => '·',
        "times" => '×',
        "divide" => '÷',
        "plusmn" => '±',
        "deg" => '°',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "euro" => '€',
        "pound" => '£',
        "yen" => '¥',
        "cent" => '¢',
        "sect" => '§',
        "para" => '¶',
        _ => return None,
    };
    Some(ch)
}

const EMOJI_RANGES: &[(u32, u32)] = &[
    (0x1F000, 0x1F0FF),
    (0x1F100, 0x1F1FF),
    (0x1F200, 0x1F2FF),
    (0x1F300, 0x1F5FF),
    (0x1F600, 0x1F64F),
    (0x1F680, 0x1F6FF),
    (0x1F700, 0x1F7FF),
    (0x1F800, 0x1F8FF),
    (0x1F900, 0x1F9FF),
    (0x1FA00, 0x1FAFF),
    (0x2600, 0x26FF),
    (0x2700, 0x27BF),
    (0x2B50, 0x2B55),
    (0xFE00, 0xFE0F),
    (0x20E3, 0x20E3),
    (0xE0020, 0xE007F),
];

/// Emoji and the invisible characters that glue emoji sequences together.
pub fn is_emoji(ch: char) -> bool {
    let cp = ch as u32;
    EMOJI_RANGES
        .iter()
        .any(|(lo, hi)| (*lo..=*hi).contains(&cp))
}

fn is_zero_width(ch: char) -> bool {
    matches!(
        ch,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{2063}' | '\u{FEFF}'
    )
}

pub(crate) fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fence_count(text: &str) -> usize {
        text.split('\n').filter(|l| scan::fence_marker(l).is_some()).count()
    }

    #[test]
    fn bold_label_above_dashes_gets_blank_line() {
        let out = normalize("**Bold** then\n---");
        assert_eq!(out, "**Bold** then\n\n---");
    }

    #[test]
    fn plain_setext_heading_is_left_alone() {
        assert_eq!(normalize("Title\n---"), "Title\n---");
    }

    #[test]
    fn truncated_code_block_is_closed() {
        let out = normalize("Here is code:\n```python\nprint(1)");
        assert_eq!(out, "Here is code:\n```python\nprint(1)\n```");
        assert_eq!(fence_count(&out) % 2, 0);
    }

    #[test]
    fn fence_after_list_marker_moves_to_own_line() {
        let out = normalize("- ```rust\nfn main() {}\n```");
        assert_eq!(out, "-\n```rust\nfn main() {}\n```");
    }

    #[test]
    fn indented_fences_are_dedented() {
        let out = normalize("intro\n   ```js\n   let a = 1;\n   ```\n");
        assert_eq!(out, "intro\n```js\n   let a = 1;\n```\n");
    }

    #[test]
    fn closer_glued_to_prose_is_split() {
        let out = normalize("```\ncode\n```And then prose");
        assert_eq!(out, "```\ncode\n```\nAnd then prose");
    }

    #[test]
    fn nested_fence_inside_longer_fence_is_kept() {
        let md = "````markdown\n```js\nlet a = 1;\n```\n````";
        assert_eq!(normalize(md), md);
    }

    #[test]
    fn truncated_long_fence_closes_with_its_own_length() {
        let out = normalize("````markdown\n```js\nlet a");
        assert_eq!(out, "````markdown\n```js\nlet a\n````");
    }

    #[test]
    fn info_string_inside_open_fence_is_content() {
        assert_eq!(normalize("```\n```js\nx"), "```\n```js\nx\n```");
        assert_eq!(normalize("~~~\n```\nx\n~~~"), "~~~\n```\nx\n~~~");
    }

    #[test]
    fn numbered_heading_gets_joiner() {
        let out = normalize("## 1. Introduction");
        assert_eq!(out, format!("## 1.{HEADING_NUMBER_GUARD} Introduction"));
    }

    #[test]
    fn numbered_heading_inside_code_is_untouched() {
        let md = "```\n## 1. not a heading\n```";
        assert_eq!(normalize(md), md);
    }

    #[test]
    fn hard_break_link_lines_are_separated() {
        let out = normalize("[a](http://a.test)  \n[b](http://b.test)");
        assert_eq!(out, "[a](http://a.test)  \n\n[b](http://b.test)");
    }

    #[test]
    fn link_lines_without_hard_break_stay_together() {
        let md = "[a](http://a.test)\n[b](http://b.test)";
        assert_eq!(normalize(md), md);
    }

    #[test]
    fn resolved_link_references_are_stripped() {
        let md = "See [docs][1].\n\n[1]: https://example.com \"Docs\"\n";
        let out = normalize(md);
        assert!(!out.contains("https://example.com"));
        assert!(out.contains("See [docs][1]."));
    }

    #[test]
    fn reference_lookalikes_in_code_are_kept() {
        let md = "```\n[x]: not a definition\n```";
        assert_eq!(normalize(md), md);
    }

    #[test]
    fn normalize_keeps_annotation_blocks() {
        let md = "<details type=\"reasoning\" done=\"true\">\n<summary>Thought</summary>\n> hmm\n</details>\nAnswer";
        assert_eq!(normalize(md), md);
    }

    #[test]
    fn sanitize_removes_annotations_and_collapses_blank_runs() {
        let md = "Intro\n\n\n\n<details type=\"reasoning\" done=\"true\">\n> secret\n</details>\n\n\nAnswer  ";
        let out = sanitize(md);
        assert_eq!(out, "Intro\n\nAnswer");
        assert!(!out.contains("secret"));
    }

    #[test]
    fn sanitize_removes_simple_tag_form() {
        assert_eq!(sanitize("<think>\nplan\n</think>\nDone"), "Done");
    }

    #[test]
    fn sanitize_is_idempotent_on_tricky_inputs() {
        let inputs = [
            "",
            "   ",
            "a\n\n\n\nb",
            "<det<details>x</details>ails>y</details>",
            "[a]: http://x\n\n\n[a]: http://y\ntext",
            "<details>\nunterminated",
            "\n\n\n<think>a</think>\n\n\n[r]: /u\n\n\nz\n",
            "```\n[x]: y\n```\n\n\n",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn plain_text_strips_markup() {
        let md = "# Title\n\nSome **bold**, *it*, ~~gone~~ and `code`.\n\n- [link](http://x.test)\n> quote\n\n---\n\n![img](a.png)\n\n```rust\nfn main() {}\n```\n<b>tag</b> &amp; &#x41; 🎉";
        let out = to_plain_text(md);
        assert_eq!(
            out,
            "Title Some bold, it, gone and code. link quote tag & A"
        );
    }

    #[test]
    fn plain_text_keeps_lone_markers() {
        assert_eq!(to_plain_text("a * b and snake_case_name"), "a * b and snake_case_name");
    }

    #[test]
    fn plain_text_unwraps_nested_link_labels() {
        assert_eq!(to_plain_text("see [a [b]](http://x.test) end"), "see a b end");
        assert_eq!(to_plain_text("[wiki](https://w.test/Foo_(bar)) page"), "wiki page");
        assert_eq!(to_plain_text("[![badge](b.svg)](https://ci.test) ok"), "ok");
        assert_eq!(to_plain_text("a \\[not](link) b"), "a \\[not](link) b");
    }

    #[test]
    fn plain_text_keeps_unflanked_stars() {
        assert_eq!(to_plain_text("2*3*4"), "2*3*4");
        assert_eq!(to_plain_text("a*b* and *c*"), "a*b* and c");
        assert_eq!(to_plain_text("(*aside*)"), "(aside)");
    }

    #[test]
    fn plain_text_of_blank_is_empty() {
        assert_eq!(to_plain_text(" \n\t "), "");
    }

    #[test]
    fn plain_text_drops_annotation_content() {
        let md = "<details type=\"reasoning\" done=\"true\">\n> private chain\n</details>\nVisible";
        assert_eq!(to_plain_text(md), "Visible");
    }

    #[test]
    fn softens_long_inline_code_only() {
        let out = soften_inline_code("`abcdef` and `ab`", 3);
        assert_eq!(out, format!("`abc{SOFT_BREAK}def` and `ab`"));
        let fenced = "```\nabcdefgh\n```";
        assert_eq!(soften_inline_code(fenced, 3), fenced);
    }

    #[test]
    fn entity_decoding_is_single_pass() {
        assert_eq!(decode_entities("&amp;lt; &bogus; &#9731;"), "&lt; &bogus; ☃");
    }
}
