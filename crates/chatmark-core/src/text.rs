use ratatui::style::Style;
use ratatui::text::Line;
use ratatui::text::Span;
use unicode_width::UnicodeWidthChar;
use unicode_width::UnicodeWidthStr;

/// Syntax highlighting seam for fenced code blocks.
///
/// Highlighting itself is delegated; implementors map `code` to one styled [`Line`] per source
/// line. Returning fewer lines than the source has is allowed, missing lines render unstyled.
pub trait CodeHighlighter {
    fn highlight(&self, language: Option<&str>, code: &str) -> Vec<Line<'static>>;
}

/// Leaves code unstyled.
pub struct PlainCode;

impl CodeHighlighter for PlainCode {
    fn highlight(&self, _language: Option<&str>, code: &str) -> Vec<Line<'static>> {
        code.split('\n')
            .map(|l| Line::from(Span::raw(l.to_string())))
            .collect()
    }
}

/// Horizontal alignment of a table cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

pub fn spans_plain(spans: &[Span<'_>]) -> String {
    let mut out = String::new();
    for s in spans {
        out.push_str(s.content.as_ref());
    }
    out
}

pub fn spans_width(spans: &[Span<'_>]) -> usize {
    spans
        .iter()
        .map(|s| UnicodeWidthStr::width(s.content.as_ref()))
        .sum()
}

/// Pads `spans` with `pad_style` spaces up to `width` columns.
pub fn pad_spans(
    mut spans: Vec<Span<'static>>,
    width: usize,
    align: Align,
    pad_style: Style,
) -> Vec<Span<'static>> {
    let pad = width.saturating_sub(spans_width(&spans));
    let (left, right) = match align {
        Align::Left => (0, pad),
        Align::Right => (pad, 0),
        Align::Center => (pad / 2, pad - pad / 2),
    };
    if left > 0 {
        spans.insert(0, Span::styled(" ".repeat(left), pad_style));
    }
    if right > 0 {
        spans.push(Span::styled(" ".repeat(right), pad_style));
    }
    spans
}

/// Cuts `spans` down to `max_cols` columns, ending in `…` when anything was dropped.
pub fn truncate_spans(
    spans: Vec<Span<'static>>,
    max_cols: usize,
    ellipsis_style: Style,
) -> Vec<Span<'static>> {
    if spans_width(&spans) <= max_cols {
        return spans;
    }
    if max_cols == 0 {
        return Vec::new();
    }

    let target = max_cols - 1;
    let mut out: Vec<Span<'static>> = Vec::new();
    let mut cols = 0usize;
    'outer: for span in spans {
        let mut buf = String::new();
        for ch in span.content.chars() {
            let w = UnicodeWidthChar::width(ch).unwrap_or(0);
            if cols + w > target {
                if !buf.is_empty() {
                    out.push(Span::styled(buf, span.style));
                }
                break 'outer;
            }
            cols += w;
            buf.push(ch);
        }
        if !buf.is_empty() {
            out.push(Span::styled(buf, span.style));
        }
    }
    out.push(Span::styled("…".to_string(), ellipsis_style));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_alignment() {
        let spans = vec![Span::raw("ab")];
        let left = pad_spans(spans.clone(), 5, Align::Left, Style::default());
        assert_eq!(spans_plain(&left), "ab   ");
        let right = pad_spans(spans.clone(), 5, Align::Right, Style::default());
        assert_eq!(spans_plain(&right), "   ab");
        let center = pad_spans(spans, 5, Align::Center, Style::default());
        assert_eq!(spans_plain(&center), " ab  ");
    }

    #[test]
    fn truncates_with_ellipsis() {
        let spans = vec![Span::raw("hello"), Span::raw(" world")];
        let out = truncate_spans(spans, 7, Style::default());
        assert_eq!(spans_plain(&out), "hello …");
        assert_eq!(spans_width(&out), 7);
    }

    #[test]
    fn short_spans_are_untouched() {
        let spans = vec![Span::raw("hi")];
        assert_eq!(spans_plain(&truncate_spans(spans, 4, Style::default())), "hi");
    }

    #[test]
    fn plain_code_keeps_line_count() {
        let lines = PlainCode.highlight(Some("rs"), "a\nb\n");
        assert_eq!(lines.len(), 3);
    }
}
