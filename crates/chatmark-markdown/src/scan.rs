//! Line and code-region scanning shared by the text passes.
use std::ops::Range;

/// A backtick or tilde fence run found at the start of a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FenceMarker {
    ch: u8,
    len: usize,
    has_info: bool,
}

impl FenceMarker {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// A closer uses the opener's character, is at least as long and carries no info string.
    pub(crate) fn closes(&self, opener: &FenceMarker) -> bool {
        self.ch == opener.ch && self.len >= opener.len && !self.has_info
    }

    /// Same character and at least as long as `opener`, whatever follows the run.
    pub(crate) fn matches(&self, opener: &FenceMarker) -> bool {
        self.ch == opener.ch && self.len >= opener.len
    }

    /// The bare closing line for a block opened by this marker.
    pub(crate) fn closing_line(&self) -> String {
        char::from(self.ch).to_string().repeat(self.len)
    }
}

/// Parses the fence run of `line`, ignoring leading whitespace (the repair pass dedents it).
///
/// Three or more backticks or tildes count. A backtick info string may not contain another
/// backtick, so inline code written on its own line (```` ```x``` ````) is not a fence.
pub(crate) fn fence_marker(line: &str) -> Option<FenceMarker> {
    let trimmed = line.trim_start();
    let ch = match trimmed.as_bytes().first()? {
        b'`' => b'`',
        b'~' => b'~',
        _ => return None,
    };
    let len = trimmed.bytes().take_while(|b| *b == ch).count();
    if len < 3 {
        return None;
    }
    let rest = trimmed[len..].trim();
    if ch == b'`' && rest.contains('`') {
        return None;
    }
    Some(FenceMarker {
        ch,
        len,
        has_info: !rest.is_empty(),
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LineKind {
    Fence,
    Code,
    Prose,
}

/// Classifies lines one at a time. Inside a block only a matching closer ends it, so a shorter
/// fence or one with an info string is code.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct FenceTracker {
    open: Option<FenceMarker>,
}

impl FenceTracker {
    pub(crate) fn step(&mut self, line: &str) -> LineKind {
        let marker = fence_marker(line);
        match (self.open, marker) {
            (None, Some(m)) => {
                self.open = Some(m);
                LineKind::Fence
            }
            (Some(opener), Some(m)) if m.closes(&opener) => {
                self.open = None;
                LineKind::Fence
            }
            (Some(_), _) => LineKind::Code,
            (None, None) => LineKind::Prose,
        }
    }

    pub(crate) fn open(&self) -> Option<FenceMarker> {
        self.open
    }
}

/// Byte ranges of fenced code blocks, fence lines included. An unclosed fence runs to the end.
pub(crate) fn fenced_ranges(text: &str) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut tracker = FenceTracker::default();
    let mut start = 0usize;
    let mut offset = 0usize;
    for line in text.split('\n') {
        let end = (offset + line.len() + 1).min(text.len());
        let was_open = tracker.open().is_some();
        if tracker.step(line) == LineKind::Fence {
            if was_open {
                out.push(start..end);
            } else {
                start = offset;
            }
        }
        offset = end;
    }
    if tracker.open().is_some() {
        out.push(start..text.len());
    }
    out
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CodeSpan {
    pub(crate) outer: Range<usize>,
    pub(crate) inner: Range<usize>,
}

/// Inline code spans (matching backtick runs) outside of `fences`.
///
/// An opening run without a closing run of the same length is literal text.
pub(crate) fn inline_code_spans(text: &str, fences: &[Range<usize>]) -> Vec<CodeSpan> {
    let mut out = Vec::new();
    let mut cursor = 0usize;
    for gap in gaps(text.len(), fences) {
        cursor = cursor.max(gap.start);
        while let Some(open_rel) = text[cursor..gap.end].find('`') {
            let open = cursor + open_rel;
            let run = backtick_run(&text[open..gap.end]);
            let search_from = open + run;
            match find_run(&text[search_from..gap.end], run) {
                Some(close_rel) => {
                    let close = search_from + close_rel;
                    out.push(CodeSpan {
                        outer: open..close + run,
                        inner: search_from..close,
                    });
                    cursor = close + run;
                }
                None => cursor = search_from,
            }
        }
    }
    out
}

/// The complement of `ranges` (sorted, non-overlapping) within `0..len`.
pub(crate) fn gaps(len: usize, ranges: &[Range<usize>]) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = 0usize;
    for r in ranges {
        if r.start > start {
            out.push(start..r.start);
        }
        start = start.max(r.end);
    }
    if start < len {
        out.push(start..len);
    }
    out
}

fn backtick_run(s: &str) -> usize {
    s.bytes().take_while(|b| *b == b'`').count()
}

fn find_run(s: &str, run: usize) -> Option<usize> {
    let mut idx = 0usize;
    while let Some(rel) = s[idx..].find('`') {
        let at = idx + rel;
        let len = backtick_run(&s[at..]);
        if len == run {
            return Some(at);
        }
        idx = at + len;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_line_detection() {
        assert!(fence_marker("```").is_some());
        assert!(fence_marker("   ```python").is_some());
        assert!(fence_marker("````").is_some());
        assert!(fence_marker("```inline```").is_none());
        assert!(fence_marker("``").is_none());
        assert!(fence_marker("text ```").is_none());
    }

    #[test]
    fn fence_markers_carry_length_and_info() {
        let opener = fence_marker("````markdown").expect("opener");
        assert_eq!(opener.len(), 4);
        assert!(!fence_marker("```js").expect("fence").closes(&opener));
        assert!(!fence_marker("```").expect("fence").closes(&opener));
        assert!(fence_marker("`````").expect("fence").closes(&opener));
        assert!(!fence_marker("~~~~").expect("fence").closes(&opener));
        assert_eq!(opener.closing_line(), "````");
        assert!(fence_marker("~~~ text with ` ticks").is_some());
    }

    #[test]
    fn nested_fences_stay_inside_the_outer_block() {
        let mut tracker = FenceTracker::default();
        let kinds: Vec<LineKind> = ["````md", "```js", "x", "```", "````", "after"]
            .into_iter()
            .map(|l| tracker.step(l))
            .collect();
        assert_eq!(
            kinds,
            vec![
                LineKind::Fence,
                LineKind::Code,
                LineKind::Code,
                LineKind::Code,
                LineKind::Fence,
                LineKind::Prose
            ]
        );

        let text = "````md\n```js\nx\n```\n````\nafter";
        assert_eq!(fenced_ranges(text), vec![0..text.len() - "after".len()]);
    }

    #[test]
    fn unclosed_fence_runs_to_end() {
        let text = "a\n```\ncode";
        assert_eq!(fenced_ranges(text), vec![2..text.len()]);
    }

    #[test]
    fn inline_spans_skip_fences_and_unmatched_runs() {
        let text = "`a` and ``b`c`` and `open\n```\n`x`\n```\n";
        let fences = fenced_ranges(text);
        let spans = inline_code_spans(text, &fences);
        let inner: Vec<&str> = spans.iter().map(|s| &text[s.inner.clone()]).collect();
        assert_eq!(inner, vec!["a", "b`c"]);
    }
}
