//! Reasoning and tool-call annotation blocks embedded in model output.
//!
//! Two forms are recognised, each starting at the beginning of a line:
//!
//! - `<details type="reasoning" done="true" …>…</details>` with any attribute set. Tool calls
//!   carry `id`, `name`, `arguments` and `result`.
//! - `<think>…</think>`, `<thinking>…</thinking>` and `<reasoning>…</reasoning>`.
//!
//! A block whose closing tag has not arrived yet runs to the end of the text and is reported as not
//! done.
use crate::pipeline::decode_entities;
use crate::scan;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::ops::Range;

static OPEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*<(details|thinking|think|reasoning)\b([^<>]*)>").expect("valid regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(/?)(details|thinking|think|reasoning)\b[^<>]*>").expect("valid regex")
});
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_:.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});
static SUMMARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*<summary>(.*?)</summary>[ \t]*\n?").expect("valid regex"));
static TAG_STRIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[A-Za-z][^<>]*>").expect("valid regex"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnnotationKind {
    Reasoning,
    ToolCall,
    CodeInterpreter,
    Other(String),
}

impl AnnotationKind {
    fn from_type(ty: Option<&str>) -> Self {
        match ty.map(str::trim) {
            Some("reasoning") | Some("thinking") => Self::Reasoning,
            Some("tool_calls") | Some("tool_call") => Self::ToolCall,
            Some("code_interpreter") => Self::CodeInterpreter,
            Some(other) if !other.is_empty() => Self::Other(other.to_string()),
            _ => Self::Other("details".to_string()),
        }
    }

    /// Header label used when the block carries no `<summary>`.
    pub fn label(&self) -> &str {
        match self {
            Self::Reasoning => "Reasoning",
            Self::ToolCall => "Tool call",
            Self::CodeInterpreter => "Code interpreter",
            Self::Other(name) => name.as_str(),
        }
    }
}

/// One recognised annotation block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub done: bool,
    pub title: Option<String>,
    /// Decoded attribute values, keyed by lowercased attribute name.
    pub attributes: BTreeMap<String, String>,
    /// Markdown between the opening tag (and summary) and the closing tag, with one level of `>`
    /// quoting removed when every line carries it.
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Chunk {
    Markdown(String),
    Annotation(Annotation),
}

struct Found {
    /// Whole block, including a single trailing newline after the closing tag.
    span: Range<usize>,
    body: Range<usize>,
    name: String,
    raw_attributes: String,
    closed: bool,
}

fn find_blocks(text: &str) -> Vec<Found> {
    if !text.contains('<') {
        return Vec::new();
    }
    let fences = scan::fenced_ranges(text);
    let in_fence = |at: usize| fences.iter().any(|r| r.contains(&at));

    let mut out = Vec::new();
    let mut cursor = 0usize;
    while cursor < text.len() {
        let Some(open) = OPEN_RE.captures_at(text, cursor) else {
            break;
        };
        let whole = open.get(0).map_or(cursor..cursor, |m| m.range());
        if in_fence(whole.start) {
            cursor = whole.end.max(cursor + 1);
            continue;
        }
        let name = open[1].to_ascii_lowercase();
        let raw_attributes = open[2].to_string();

        let (body_end, end, closed) = match find_close(text, whole.end, &name) {
            Some(close) => {
                let mut end = close.end;
                if text[end..].starts_with('\n') {
                    end += 1;
                }
                (close.start, end, true)
            }
            None => (text.len(), text.len(), false),
        };
        out.push(Found {
            span: whole.start..end,
            body: whole.end..body_end,
            name,
            raw_attributes,
            closed,
        });
        cursor = end.max(whole.end);
    }
    out
}

/// Finds the closing tag matching an opener of `name`, counting nested openers of the same name.
fn find_close(text: &str, from: usize, name: &str) -> Option<Range<usize>> {
    let mut depth = 1usize;
    for caps in TAG_RE.captures_iter(&text[from..]) {
        if !caps[2].eq_ignore_ascii_case(name) {
            continue;
        }
        let m = caps.get(0)?;
        if caps[1].is_empty() {
            depth += 1;
            continue;
        }
        depth -= 1;
        if depth == 0 {
            return Some(from + m.start()..from + m.end());
        }
    }
    None
}

/// Splits `text` into markdown runs and annotation blocks, in order. Whitespace-only markdown
/// runs are dropped.
pub fn split_annotations(text: &str) -> Vec<Chunk> {
    let blocks = find_blocks(text);
    if blocks.is_empty() {
        return vec![Chunk::Markdown(text.to_string())];
    }

    let mut out = Vec::new();
    let mut cursor = 0usize;
    for found in blocks {
        let before = &text[cursor..found.span.start];
        if !before.trim().is_empty() {
            out.push(Chunk::Markdown(before.to_string()));
        }
        out.push(Chunk::Annotation(build(text, &found)));
        cursor = found.span.end;
    }
    let rest = &text[cursor..];
    if !rest.trim().is_empty() {
        out.push(Chunk::Markdown(rest.to_string()));
    }
    tracing::trace!(chunks = out.len(), "split annotation blocks");
    out
}

/// Removes every annotation block, including an unterminated trailing one.
pub fn strip_annotations(text: &str) -> String {
    let blocks = find_blocks(text);
    if blocks.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for found in &blocks {
        out.push_str(&text[cursor..found.span.start]);
        cursor = found.span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

fn build(text: &str, found: &Found) -> Annotation {
    let attributes = parse_attributes(&found.raw_attributes);
    let (kind, done) = if found.name == "details" {
        let kind = AnnotationKind::from_type(attributes.get("type").map(String::as_str));
        let done = match attributes.get("done") {
            Some(value) => found.closed && value.trim().eq_ignore_ascii_case("true"),
            None => found.closed,
        };
        (kind, done)
    } else {
        (AnnotationKind::Reasoning, found.closed)
    };

    let mut body = &text[found.body.clone()];
    let mut title = None;
    if let Some(caps) = SUMMARY_RE.captures(body) {
        let raw = TAG_STRIP_RE.replace_all(&caps[1], "");
        let decoded = decode_entities(raw.trim()).into_owned();
        if !decoded.is_empty() {
            title = Some(decoded);
        }
        let consumed = caps.get(0).map_or(0, |m| m.end());
        body = &body[consumed..];
    }

    Annotation {
        kind,
        done,
        title,
        attributes,
        body: unquote(body.trim_matches('\n')),
    }
}

fn parse_attributes(raw: &str) -> BTreeMap<String, String> {
    ATTR_RE
        .captures_iter(raw)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            (
                caps[1].to_ascii_lowercase(),
                decode_entities(value).into_owned(),
            )
        })
        .collect()
}

fn unquote(body: &str) -> String {
    let quoted = body
        .lines()
        .filter(|l| !l.trim().is_empty())
        .all(|l| l.trim_start().starts_with('>'));
    if !quoted || body.trim().is_empty() {
        return body.to_string();
    }
    body.lines()
        .map(|l| {
            let l = l.trim_start();
            let l = l.strip_prefix('>').unwrap_or(l);
            l.strip_prefix(' ').unwrap_or(l)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
