//! Shields `$…$` and `$$…$$` math from the markdown parser.
//!
//! [`LatexShield::extract`] swaps every math span for a placeholder token built from
//! [`PLACEHOLDER_MARKER`], an invisible separator that is stripped from the input first, so a
//! token can only come from the shield that issued it. After parsing,
//! [`LatexShield::split_on_placeholders`] cuts any text fragment back into plain and math
//! [`Segment`]s.
//!
//! One shield belongs to one render pass. Tokens are numbered per shield and never resolve in
//! another.
use crate::scan;
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;

/// U+2063 INVISIBLE SEPARATOR.
pub const PLACEHOLDER_MARKER: char = '\u{2063}';

static BLOCK_MATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\$\$(.+?)\$\$").expect("valid regex"));
static DETAILS_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<details\b[^<>]*>").expect("valid regex"));
/// `](destination "title")` of an inline link or image, one level of nested parentheses.
static LINK_DEST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\]\((?:[^()\n]|\([^()\n]*\))*\)").expect("valid regex"));
static AUTOLINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<[A-Za-z][A-Za-z0-9+.\-]{1,31}:[^<>\s]*>").expect("valid regex")
});
static LINK_DEF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^ {0,3}\[[^\]\n]+\]:[ \t]*\S.*$").expect("valid regex"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Math {
        expression: String,
        block: bool,
        /// The exact token text this segment replaced, padding included.
        placeholder: String,
    },
}

impl Segment {
    /// The text this segment covers in the split input.
    pub fn content(&self) -> &str {
        match self {
            Segment::Text(text) => text,
            Segment::Math { placeholder, .. } => placeholder,
        }
    }

    /// The segment written back as markdown source.
    pub fn source(&self) -> String {
        match self {
            Segment::Text(text) => text.clone(),
            Segment::Math {
                expression,
                block: true,
                ..
            } => format!("$${expression}$$"),
            Segment::Math { expression, .. } => format!("${expression}$"),
        }
    }
}

#[derive(Clone, Debug)]
struct MathEntry {
    expression: String,
    block: bool,
}

/// Per-pass placeholder map.
#[derive(Debug, Default)]
pub struct LatexShield {
    entries: Vec<MathEntry>,
    by_token: HashMap<String, usize>,
    pattern: OnceCell<Option<Regex>>,
}

impl LatexShield {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces math spans in `content` with placeholder tokens.
    ///
    /// Block math (`$$…$$`, may span lines) goes first and its token is surrounded by blank lines
    /// so it parses as a paragraph of its own. Inline math needs a non-space character just inside
    /// both delimiters, an unescaped closer on the same line, and no adjacent `$`, so `$5` and
    /// `$ x $` stay literal. Fenced code, inline code, link destinations, autolinks and
    /// `<details …>` tags are never touched.
    pub fn extract(&mut self, content: &str) -> String {
        let text: String = content
            .chars()
            .filter(|ch| *ch != PLACEHOLDER_MARKER)
            .collect();
        if !text.contains('$') {
            return text;
        }

        let protected = protected_ranges(&text);
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0usize;
        for gap in scan::gaps(text.len(), &protected) {
            out.push_str(&text[cursor..gap.start]);
            let with_blocks = self.replace_block_math(&text[gap.clone()]);
            out.push_str(&self.replace_inline_math(&with_blocks));
            cursor = gap.end;
        }
        out.push_str(&text[cursor..]);

        self.pattern = OnceCell::new();
        tracing::trace!(placeholders = self.entries.len(), "extracted math");
        out
    }

    /// Splits `text` into plain and math segments. Concatenating [`Segment::content`] over the
    /// result gives back `text`.
    pub fn split_on_placeholders(&self, text: &str) -> Vec<Segment> {
        if !self.contains_placeholder(text) {
            return vec![Segment::Text(text.to_string())];
        }
        let Some(re) = self.pattern() else {
            return vec![Segment::Text(text.to_string())];
        };

        let mut out = Vec::new();
        let mut cursor = 0usize;
        for m in re.find_iter(text) {
            let token = m.as_str();
            let Some(entry) = self.resolve(token) else {
                continue;
            };
            if m.start() > cursor {
                out.push(Segment::Text(text[cursor..m.start()].to_string()));
            }
            out.push(Segment::Math {
                expression: entry.expression.clone(),
                block: entry.block,
                placeholder: token.to_string(),
            });
            cursor = m.end();
        }
        if cursor < text.len() || out.is_empty() {
            out.push(Segment::Text(text[cursor..].to_string()));
        }
        out
    }

    /// Cheap check run before [`Self::split_on_placeholders`] on every text node.
    pub fn contains_placeholder(&self, text: &str) -> bool {
        !self.entries.is_empty() && text.contains(PLACEHOLDER_MARKER)
    }

    /// Writes placeholders in `text` back as `$…$` / `$$…$$` source.
    pub fn restore_source(&self, text: &str) -> String {
        if !self.contains_placeholder(text) {
            return text.to_string();
        }
        self.split_on_placeholders(text)
            .iter()
            .map(Segment::source)
            .collect()
    }

    fn resolve(&self, token: &str) -> Option<&MathEntry> {
        let core = token.trim_matches('\n');
        self.by_token.get(core).and_then(|&i| self.entries.get(i))
    }

    fn pattern(&self) -> Option<&Regex> {
        self.pattern
            .get_or_init(|| {
                let mut padded = Vec::new();
                let mut cores = Vec::new();
                for (token, &i) in &self.by_token {
                    if self.entries.get(i).is_some_and(|e| e.block) {
                        padded.push(regex::escape(&format!("\n\n{token}\n\n")));
                    }
                    cores.push(regex::escape(token));
                }
                let alternatives = padded.into_iter().chain(cores).collect::<Vec<_>>();
                match Regex::new(&alternatives.join("|")) {
                    Ok(re) => Some(re),
                    Err(err) => {
                        tracing::debug!(%err, "placeholder pattern rejected, math left as text");
                        None
                    }
                }
            })
            .as_ref()
    }

    fn register(&mut self, expression: &str, block: bool) -> String {
        let id = self.entries.len();
        let token = format!(
            "{m}M{kind}{id}{m}",
            m = PLACEHOLDER_MARKER,
            kind = if block { 'B' } else { 'I' }
        );
        self.entries.push(MathEntry {
            expression: expression.to_string(),
            block,
        });
        self.by_token.insert(token.clone(), id);
        token
    }

    fn replace_block_math(&mut self, text: &str) -> String {
        if !text.contains("$$") {
            return text.to_string();
        }
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0usize;
        for caps in BLOCK_MATH_RE.captures_iter(text) {
            let (Some(whole), Some(expr)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&text[cursor..whole.start()]);
            let token = self.register(expr.as_str(), true);
            out.push_str("\n\n");
            out.push_str(&token);
            out.push_str("\n\n");
            cursor = whole.end();
        }
        out.push_str(&text[cursor..]);
        out
    }

    fn replace_inline_math(&mut self, text: &str) -> String {
        let bytes = text.as_bytes();
        let mut out = String::with_capacity(text.len());
        let mut copied = 0usize;
        let mut i = 0usize;
        while i < bytes.len() {
            if bytes[i] != b'$' || !is_inline_opener(bytes, i) {
                i += 1;
                continue;
            }
            match find_inline_closer(bytes, i + 1) {
                Some(close) => {
                    out.push_str(&text[copied..i]);
                    let token = self.register(&text[i + 1..close], false);
                    out.push_str(&token);
                    copied = close + 1;
                    i = close + 1;
                }
                None => i += 1,
            }
        }
        out.push_str(&text[copied..]);
        out
    }
}

fn is_inline_opener(bytes: &[u8], at: usize) -> bool {
    let prev = at.checked_sub(1).map(|p| bytes[p]);
    if matches!(prev, Some(b'$') | Some(b'\\')) {
        return false;
    }
    match bytes.get(at + 1) {
        Some(next) => *next != b'$' && !next.is_ascii_whitespace(),
        None => false,
    }
}

/// Next `$` on the same line that can close an inline span opened just before `from`.
///
/// Only the first unescaped `$` is considered: when it cannot close (space before it, or another
/// `$` after it) the opener fails and the scan resumes from that `$`.
fn find_inline_closer(bytes: &[u8], from: usize) -> Option<usize> {
    let mut j = from;
    while j < bytes.len() {
        match bytes[j] {
            b'\n' => return None,
            b'$' if bytes[j - 1] == b'\\' => j += 1,
            b'$' => {
                let ok = !bytes[j - 1].is_ascii_whitespace() && bytes.get(j + 1) != Some(&b'$');
                return ok.then_some(j);
            }
            _ => j += 1,
        }
    }
    None
}

fn protected_ranges(text: &str) -> Vec<Range<usize>> {
    let fences = scan::fenced_ranges(text);
    let mut ranges = fences.clone();
    ranges.extend(
        scan::inline_code_spans(text, &fences)
            .into_iter()
            .map(|span| span.outer),
    );
    ranges.extend(DETAILS_TAG_RE.find_iter(text).map(|m| m.range()));
    for re in [&*LINK_DEST_RE, &*AUTOLINK_RE, &*LINK_DEF_RE] {
        ranges.extend(re.find_iter(text).map(|m| m.range()));
    }
    ranges.sort_by_key(|r| r.start);

    let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
    for r in ranges {
        match merged.last_mut() {
            Some(last) if r.start <= last.end => last.end = last.end.max(r.end),
            _ => merged.push(r),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn math(segments: &[Segment]) -> Vec<(&str, bool)> {
        segments
            .iter()
            .filter_map(|s| match s {
                Segment::Math {
                    expression, block, ..
                } => Some((expression.as_str(), *block)),
                Segment::Text(_) => None,
            })
            .collect()
    }

    fn rejoin(segments: &[Segment]) -> String {
        segments.iter().map(Segment::source).collect()
    }

    #[test]
    fn currency_is_not_math() {
        let mut shield = LatexShield::new();
        let out = shield.extract("Price is $5 and $x+y$ is math");
        assert!(out.starts_with("Price is $5 and "));
        assert!(out.ends_with(" is math"));
        assert_eq!(shield.len(), 1);
        let segments = shield.split_on_placeholders(&out);
        assert_eq!(math(&segments), vec![("x+y", false)]);
    }

    #[test]
    fn block_math_is_isolated_and_extracted_first() {
        let mut shield = LatexShield::new();
        let input = "before $$\\sum_{i=1}^n i$$ after $a$";
        let out = shield.extract(input);
        assert!(out.contains(&format!("\n\n{PLACEHOLDER_MARKER}MB0{PLACEHOLDER_MARKER}\n\n")));
        let segments = shield.split_on_placeholders(&out);
        assert_eq!(
            math(&segments),
            vec![("\\sum_{i=1}^n i", true), ("a", false)]
        );
        assert_eq!(rejoin(&segments), input);
    }

    #[test]
    fn multiline_block_math() {
        let mut shield = LatexShield::new();
        let input = "$$\na + b\n= c\n$$";
        let out = shield.extract(input);
        let segments = shield.split_on_placeholders(&out);
        assert_eq!(math(&segments), vec![("\na + b\n= c\n", true)]);
        assert_eq!(rejoin(&segments), input);
    }

    #[test]
    fn boundary_rules_leave_literals() {
        for input in [
            "$ x $",
            "from $ 5 - $ 10",
            "escaped \\$5 and \\$6",
            "unterminated $x",
            "lonely $$ pair",
            "split $a\nb$",
        ] {
            let mut shield = LatexShield::new();
            let out = shield.extract(input);
            assert_eq!(out, input, "input: {input:?}");
            assert!(shield.is_empty());
        }
    }

    #[test]
    fn code_is_protected() {
        let mut shield = LatexShield::new();
        let input = "`$a$` and\n```\n$b$ $$c$$\n```\n<details type=\"x\" name=\"$d$\">";
        assert_eq!(shield.extract(input), input);
        assert!(shield.is_empty());
    }

    #[test]
    fn round_trip_and_coverage() {
        let corpus = [
            "plain text",
            "$x$",
            "a $x$ b $$y$$ c",
            "edge\n\n$$z$$\n\nmore",
            "$$\nm\n$$ and $n$, `$code$`",
            "costs $5, $6 or $7$ maybe",
        ];
        for input in corpus {
            let mut shield = LatexShield::new();
            let out = shield.extract(input);
            let segments = shield.split_on_placeholders(&out);
            assert_eq!(rejoin(&segments), input, "round trip: {input:?}");
            let covered: String = segments.iter().map(Segment::content).collect();
            assert_eq!(covered, out, "coverage: {input:?}");
        }
    }

    #[test]
    fn forged_markers_never_resolve() {
        let forged = format!("{m}MI0{m} and $y$", m = PLACEHOLDER_MARKER);
        let mut shield = LatexShield::new();
        let out = shield.extract(&forged);
        assert!(out.starts_with("MI0 and "));
        let segments = shield.split_on_placeholders(&out);
        assert_eq!(math(&segments), vec![("y", false)]);
    }

    #[test]
    fn tokens_do_not_cross_shields() {
        let mut first = LatexShield::new();
        let out = first.extract("$a$");
        let second = LatexShield::new();
        assert!(!second.contains_placeholder(&out));
        assert_eq!(
            second.split_on_placeholders(&out),
            vec![Segment::Text(out.clone())]
        );
    }

    #[test]
    fn restore_source_rewrites_tokens() {
        let mut shield = LatexShield::new();
        let out = shield.extract("let $v$ be");
        assert_eq!(shield.restore_source(&out), "let $v$ be");
    }

    #[test]
    fn link_and_image_destinations_are_not_math() {
        for input in [
            "See [docs](https://x.test/?a=$1&b=$2) now",
            "![c](https://x.test/$a$.png)",
            "[w](https://w.test/Foo_(bar$x$)) and <https://x.test/$a$b>",
            "[ref]: https://x.test/$a$",
        ] {
            let mut shield = LatexShield::new();
            assert_eq!(shield.extract(input), input);
            assert!(shield.is_empty(), "math in {input:?}");
        }
    }

    #[test]
    fn link_text_still_carries_math() {
        let mut shield = LatexShield::new();
        let out = shield.extract("[$x$](https://x.test/$y$)");
        assert_eq!(shield.len(), 1);
        assert!(out.ends_with("](https://x.test/$y$)"));
    }
}
