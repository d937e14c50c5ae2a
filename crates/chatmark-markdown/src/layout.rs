//! Lays a visual tree out as terminal lines.
//!
//! Containers (quotes, lists, alerts, annotations) lay their children out at a reduced width and
//! prepend a prefix: the first line gets the initial prefix (a list marker, say) and the rest get
//! the continuation prefix of the same width.
use crate::annotations::AnnotationKind;
use crate::handles::SpanHandle;
use crate::visual::AlertKind;
use crate::visual::InlineSpan;
use crate::visual::ListItemContent;
use crate::visual::TableColumn;
use crate::visual::VisualBlock;
use chatmark_core::text::pad_spans;
use chatmark_core::text::spans_plain;
use chatmark_core::text::spans_width;
use chatmark_core::text::truncate_spans;
use chatmark_core::text::Align;
use chatmark_core::theme::Theme;
use ratatui::style::Modifier;
use ratatui::style::Style;
use ratatui::text::Line;
use ratatui::text::Span;
use ratatui::text::Text;
use std::collections::HashMap;
use unicode_width::UnicodeWidthChar;
use unicode_width::UnicodeWidthStr;

/// Resolved link destinations for the pass being laid out.
pub type LinkTargets = HashMap<SpanHandle, String>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TableStyle {
    #[default]
    Glow,
    Box,
}

#[derive(Clone, Debug)]
pub struct LayoutOptions {
    pub width: u16,
    pub table_style: TableStyle,
    pub blockquote_prefix: String,
    pub code_block_indent: u16,
    /// Show annotation bodies under their header instead of the header alone.
    pub expand_annotations: bool,
    /// Append ` (href)` after link text.
    pub show_link_destinations: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            width: 80,
            table_style: TableStyle::Glow,
            blockquote_prefix: "│ ".to_string(),
            code_block_indent: 2,
            expand_annotations: false,
            show_link_destinations: false,
        }
    }
}

pub fn layout(
    blocks: &[VisualBlock],
    theme: &Theme,
    options: &LayoutOptions,
    links: &LinkTargets,
) -> Text<'static> {
    let l = Layout {
        theme,
        options,
        links,
    };
    let width = usize::from(options.width.max(1));
    Text::from(l.blocks(blocks, width, true))
}

struct Layout<'a> {
    theme: &'a Theme,
    options: &'a LayoutOptions,
    links: &'a LinkTargets,
}

type Spans = Vec<Span<'static>>;

impl Layout<'_> {
    fn blocks(&self, blocks: &[VisualBlock], width: usize, spaced: bool) -> Vec<Line<'static>> {
        let mut out: Vec<Line<'static>> = Vec::new();
        for block in blocks.iter().filter(|b| !b.is_empty()) {
            let lines = self.block(block, width);
            if lines.is_empty() {
                continue;
            }
            if spaced && !out.is_empty() {
                out.push(Line::default());
            }
            out.extend(lines);
        }
        out
    }

    fn block(&self, block: &VisualBlock, width: usize) -> Vec<Line<'static>> {
        let t = self.theme;
        match block {
            VisualBlock::Paragraph(spans) => self.prose(spans, width),
            VisualBlock::Heading { spans, .. } => self.prose(spans, width),
            VisualBlock::Code { code, lines, .. } => self.code(code, lines),
            VisualBlock::Math { expression, style } => expression
                .split('\n')
                .filter(|l| !l.trim().is_empty())
                .map(|l| {
                    Line::from(vec![
                        Span::raw("  "),
                        Span::styled(l.trim().to_string(), *style),
                    ])
                })
                .collect(),
            VisualBlock::Quote(children) => {
                let prefix = Span::styled(self.options.blockquote_prefix.clone(), t.quote);
                let inner = width.saturating_sub(prefix.width()).max(1);
                let lines = self.blocks(children, inner, true);
                prefixed(lines, vec![prefix.clone()], vec![prefix])
            }
            VisualBlock::List { items, .. } => {
                let marker_w = items
                    .iter()
                    .map(|i| UnicodeWidthStr::width(i.marker.as_str()))
                    .max()
                    .unwrap_or(1)
                    + 1;
                let inner = width.saturating_sub(marker_w).max(1);
                let mut out = Vec::new();
                for item in items {
                    let lines = match &item.content {
                        ListItemContent::Inline(spans) => self.prose(spans, inner),
                        ListItemContent::Blocks(children) => self.blocks(children, inner, false),
                    };
                    let lines = if lines.is_empty() {
                        vec![Line::default()]
                    } else {
                        lines
                    };
                    let marker = pad_spans(
                        vec![Span::styled(item.marker.clone(), t.text_muted)],
                        marker_w,
                        Align::Left,
                        Style::default(),
                    );
                    let indent = vec![Span::raw(" ".repeat(marker_w))];
                    out.extend(prefixed(lines, marker, indent));
                }
                out
            }
            VisualBlock::Table { columns, rows } => match self.options.table_style {
                TableStyle::Glow => self.table_glow(columns, rows, width),
                TableStyle::Box => self.table_box(columns, rows, width),
            },
            VisualBlock::Rule => vec![Line::from(Span::styled("─".repeat(width.min(40)), t.rule))],
            VisualBlock::Alert { kind, body } => {
                let style = alert_style(t, *kind);
                let header = Line::from(vec![
                    Span::styled("│ ", style),
                    Span::styled(
                        format!("{} {}", kind.icon(), kind.label()),
                        style.add_modifier(Modifier::BOLD),
                    ),
                ]);
                let bar = Span::styled("│ ", style);
                let inner = width.saturating_sub(2).max(1);
                let mut out = vec![header];
                out.extend(prefixed(self.blocks(body, inner, true), vec![bar.clone()], vec![bar]));
                out
            }
            VisualBlock::Image { src, alt, .. } => {
                let label = alt.as_deref().filter(|a| !a.is_empty()).unwrap_or("image");
                vec![Line::from(vec![
                    Span::styled(format!("Image: {label}"), t.text_muted),
                    Span::styled(" → ", t.text_muted),
                    Span::styled(src.clone(), t.link),
                ])]
            }
            VisualBlock::ImageError { alt, message } => {
                let label = alt.as_deref().filter(|a| !a.is_empty()).unwrap_or("image");
                vec![Line::from(Span::styled(
                    format!("Image unavailable: {label} ({message})"),
                    t.danger,
                ))]
            }
            VisualBlock::Annotation {
                kind,
                done,
                title,
                attributes,
                body,
            } => {
                let expanded = self.options.expand_annotations;
                let label = match (title, kind) {
                    (Some(title), _) => title.clone(),
                    (None, AnnotationKind::ToolCall) => match attributes.get("name") {
                        Some(name) => format!("{}: {name}", kind.label()),
                        None => kind.label().to_string(),
                    },
                    (None, _) => kind.label().to_string(),
                };
                let arrow = if expanded { "▾ " } else { "▸ " };
                let status = if *done { "" } else { " …" };
                let header =
                    Line::from(Span::styled(format!("{arrow}{label}{status}"), t.annotation));
                let mut out = vec![header];
                if expanded {
                    let bar = Span::styled("│ ", t.text_muted);
                    let inner = width.saturating_sub(2).max(1);
                    let body = self.blocks(body, inner, true);
                    out.extend(prefixed(body, vec![bar.clone()], vec![bar]));
                }
                out
            }
            VisualBlock::Group(children) => self.blocks(children, width, true),
            VisualBlock::Empty => Vec::new(),
        }
    }

    fn code(&self, code: &str, highlighted: &[Line<'static>]) -> Vec<Line<'static>> {
        let base = self.theme.code_block;
        let indent = " ".repeat(usize::from(self.options.code_block_indent));
        code.split('\n')
            .enumerate()
            .map(|(i, raw)| {
                let mut spans = vec![Span::styled(indent.clone(), base)];
                match highlighted.get(i) {
                    Some(line) => spans.extend(
                        line.spans
                            .iter()
                            .map(|s| Span::styled(s.content.to_string(), base.patch(s.style))),
                    ),
                    None => spans.push(Span::styled(raw.to_string(), base)),
                }
                Line::from(spans)
            })
            .collect()
    }

    fn prose(&self, spans: &[InlineSpan], width: usize) -> Vec<Line<'static>> {
        self.logical_lines(spans)
            .into_iter()
            .flat_map(|logical| wrap_spans(logical, width))
            .map(Line::from)
            .collect()
    }

    /// Converts inline spans to styled spans, one vector per hard line.
    fn logical_lines(&self, spans: &[InlineSpan]) -> Vec<Spans> {
        let mut lines: Vec<Spans> = vec![Vec::new()];
        let mut open_link: Option<SpanHandle> = None;
        for span in spans {
            let link = match span {
                InlineSpan::Text { link, .. } => *link,
                _ => None,
            };
            if open_link.is_some() && open_link != link {
                self.close_link(open_link, &mut lines);
            }
            open_link = link;
            let current = lines.len() - 1;
            match span {
                InlineSpan::Text { text, style, .. } => {
                    lines[current].push(Span::styled(text.clone(), *style));
                }
                InlineSpan::Math { expression, style, .. } => {
                    lines[current].push(Span::styled(expression.clone(), *style));
                }
                InlineSpan::Code { code, style, .. } => {
                    lines[current].push(Span::styled(code.clone(), *style));
                }
                InlineSpan::LineBreak => lines.push(Vec::new()),
            }
        }
        self.close_link(open_link, &mut lines);
        lines
    }

    fn close_link(&self, handle: Option<SpanHandle>, lines: &mut [Spans]) {
        if !self.options.show_link_destinations {
            return;
        }
        let Some(href) = handle.and_then(|h| self.links.get(&h)) else {
            return;
        };
        if let Some(line) = lines.last_mut() {
            line.push(Span::styled(format!(" ({href})"), self.theme.text_muted));
        }
    }

    fn cell_spans(&self, spans: &[InlineSpan]) -> Spans {
        self.logical_lines(spans).into_iter().flatten().collect()
    }

    fn column_widths(
        &self,
        columns: &[TableColumn],
        rows: &[Vec<Vec<InlineSpan>>],
        available: usize,
        min_col_w: usize,
    ) -> Vec<usize> {
        let cols = columns.len();
        let mut col_w: Vec<usize> = columns
            .iter()
            .map(|c| spans_width(&self.cell_spans(&c.header)).max(min_col_w))
            .collect();
        for row in rows {
            for (ci, cell) in row.iter().enumerate().take(cols) {
                col_w[ci] = col_w[ci].max(spans_width(&self.cell_spans(cell)));
            }
        }

        if min_col_w * cols > available {
            col_w.fill((available / cols).max(1));
            return col_w;
        }
        let mut total: usize = col_w.iter().sum();
        while total > available {
            let Some((idx, _)) = col_w
                .iter()
                .enumerate()
                .filter(|(_, w)| **w > min_col_w)
                .max_by_key(|(_, w)| **w)
            else {
                break;
            };
            col_w[idx] -= 1;
            total -= 1;
        }
        col_w
    }

    fn table_glow(
        &self,
        columns: &[TableColumn],
        rows: &[Vec<Vec<InlineSpan>>],
        width: usize,
    ) -> Vec<Line<'static>> {
        let cols = columns.len();
        let chrome = cols.saturating_sub(1) + 2 * cols;
        if cols == 0 {
            return Vec::new();
        }
        if chrome >= width {
            return self.table_stacked(columns, rows, width);
        }
        let col_w = self.column_widths(columns, rows, width - chrome, 1);
        let sep = Span::styled("│", self.theme.text_muted);

        let mut out = Vec::new();
        out.push(self.table_header(columns, &col_w, Some(sep.clone()), None));
        let rule = col_w
            .iter()
            .map(|w| "─".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("┼");
        out.push(Line::from(Span::styled(rule, self.theme.text_muted)));
        for row in rows {
            out.extend(self.table_row(columns, row, &col_w, Some(sep.clone()), None));
        }
        out
    }

    fn table_box(
        &self,
        columns: &[TableColumn],
        rows: &[Vec<Vec<InlineSpan>>],
        width: usize,
    ) -> Vec<Line<'static>> {
        let cols = columns.len();
        let chrome = 3 * cols + 1;
        if cols == 0 {
            return Vec::new();
        }
        if chrome >= width {
            return self.table_stacked(columns, rows, width);
        }
        let col_w = self.column_widths(columns, rows, width - chrome, 3);
        let muted = self.theme.text_muted;
        let border = |left: char, mid: char, right: char| {
            let inner = col_w
                .iter()
                .map(|w| "─".repeat(w + 2))
                .collect::<Vec<_>>()
                .join(&mid.to_string());
            Line::from(Span::styled(format!("{left}{inner}{right}"), muted))
        };
        let sep = Span::styled("│", muted);

        let mut out = vec![border('┌', '┬', '┐')];
        out.push(self.table_header(columns, &col_w, Some(sep.clone()), Some(sep.clone())));
        out.push(border('├', '┼', '┤'));
        for row in rows {
            out.extend(self.table_row(columns, row, &col_w, Some(sep.clone()), Some(sep.clone())));
        }
        out.push(border('└', '┴', '┘'));
        out
    }

    /// Too narrow for a grid: each cell becomes a wrapped `header: value` line and rows are
    /// separated by blank lines. A table without rows lists its headers.
    fn table_stacked(
        &self,
        columns: &[TableColumn],
        rows: &[Vec<Vec<InlineSpan>>],
        width: usize,
    ) -> Vec<Line<'static>> {
        let width = width.max(1);
        let muted = self.theme.text_muted;
        let mut out = Vec::new();
        if rows.is_empty() {
            for column in columns {
                let header = self.cell_spans(&column.header);
                out.extend(wrap_spans(header, width).into_iter().map(Line::from));
            }
            return out;
        }
        for (ri, row) in rows.iter().enumerate() {
            if ri > 0 {
                out.push(Line::default());
            }
            for (ci, column) in columns.iter().enumerate() {
                let mut spans = self.cell_spans(&column.header);
                spans.push(Span::styled(": ", muted));
                spans.extend(row.get(ci).map(|c| self.cell_spans(c)).unwrap_or_default());
                out.extend(wrap_spans(spans, width).into_iter().map(Line::from));
            }
        }
        out
    }

    /// Headers stay on one line and are truncated with an ellipsis.
    fn table_header(
        &self,
        columns: &[TableColumn],
        col_w: &[usize],
        sep: Option<Span<'static>>,
        edge: Option<Span<'static>>,
    ) -> Line<'static> {
        let cells: Vec<Spans> = columns
            .iter()
            .zip(col_w)
            .map(|(c, w)| truncate_spans(self.cell_spans(&c.header), *w, self.theme.text_primary))
            .collect();
        let aligns: Vec<Align> = columns.iter().map(|c| c.align).collect();
        Line::from(self.row_line(&cells, col_w, &aligns, sep.as_ref(), edge.as_ref()))
    }

    /// Body cells wrap; the row is as tall as its tallest cell.
    fn table_row(
        &self,
        columns: &[TableColumn],
        row: &[Vec<InlineSpan>],
        col_w: &[usize],
        sep: Option<Span<'static>>,
        edge: Option<Span<'static>>,
    ) -> Vec<Line<'static>> {
        let wrapped: Vec<Vec<Spans>> = col_w
            .iter()
            .enumerate()
            .map(|(ci, w)| {
                let spans = row.get(ci).map(|c| self.cell_spans(c)).unwrap_or_default();
                wrap_spans(spans, *w)
            })
            .collect();
        let height = wrapped.iter().map(Vec::len).max().unwrap_or(1).max(1);
        let aligns: Vec<Align> = columns.iter().map(|c| c.align).collect();
        (0..height)
            .map(|li| {
                let cells: Vec<Spans> = wrapped
                    .iter()
                    .map(|lines| lines.get(li).cloned().unwrap_or_default())
                    .collect();
                Line::from(self.row_line(&cells, col_w, &aligns, sep.as_ref(), edge.as_ref()))
            })
            .collect()
    }

    fn row_line(
        &self,
        cells: &[Spans],
        col_w: &[usize],
        aligns: &[Align],
        sep: Option<&Span<'static>>,
        edge: Option<&Span<'static>>,
    ) -> Spans {
        let pad_style = self.theme.text_primary;
        let mut spans: Spans = Vec::new();
        if let Some(edge) = edge {
            spans.push(edge.clone());
        }
        for (ci, w) in col_w.iter().enumerate() {
            if ci > 0
                && let Some(sep) = sep
            {
                spans.push(sep.clone());
            }
            let cell = cells.get(ci).cloned().unwrap_or_default();
            let align = aligns.get(ci).copied().unwrap_or_default();
            spans.push(Span::styled(" ", pad_style));
            spans.extend(pad_spans(cell, *w, align, pad_style));
            spans.push(Span::styled(" ", pad_style));
        }
        if let Some(edge) = edge {
            spans.push(edge.clone());
        }
        spans
    }
}

fn alert_style(theme: &Theme, kind: AlertKind) -> Style {
    match kind {
        AlertKind::Note => theme.alert_note,
        AlertKind::Tip => theme.alert_tip,
        AlertKind::Important => theme.alert_important,
        AlertKind::Warning => theme.alert_warning,
        AlertKind::Caution => theme.alert_caution,
    }
}

fn prefixed(lines: Vec<Line<'static>>, initial: Spans, subsequent: Spans) -> Vec<Line<'static>> {
    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let prefix = if i == 0 { &initial } else { &subsequent };
            if line.spans.is_empty() && i > 0 {
                let trimmed: Spans = prefix
                    .iter()
                    .map(|s| Span::styled(s.content.trim_end().to_string(), s.style))
                    .collect();
                return Line::from(trimmed);
            }
            let mut spans = prefix.clone();
            spans.extend(line.spans);
            Line::from(spans)
        })
        .collect()
}

/// Greedy word wrap. Whitespace and zero-width spaces are break opportunities; words wider than
/// the line are split, preferring URL punctuation.
fn wrap_spans(spans: Spans, width: usize) -> Vec<Spans> {
    let width = width.max(1);
    let mut out: Vec<Spans> = Vec::new();
    let mut cur: Spans = Vec::new();
    let mut cur_cols = 0usize;

    for tok in split_tokens(&spans) {
        let tok_ws = is_all_ws(&tok.content);
        if cur.is_empty() && tok_ws {
            continue;
        }
        let tok_cols = tok.width();
        if cur_cols + tok_cols <= width {
            cur_cols += tok_cols;
            cur.push(tok);
            continue;
        }
        if !cur.is_empty() {
            out.push(finish_line(std::mem::take(&mut cur)));
            cur_cols = 0;
            if tok_ws {
                continue;
            }
        }
        let mut remaining = tok;
        loop {
            let remaining_cols = remaining.width();
            if remaining_cols <= width {
                cur_cols = remaining_cols;
                cur.push(remaining);
                break;
            }
            let (head, tail) = split_to_width(&remaining, width);
            out.push(vec![head]);
            remaining = tail;
        }
    }
    if !cur.is_empty() {
        out.push(finish_line(cur));
    }
    if out.is_empty() {
        out.push(Vec::new());
    }
    out
}

fn finish_line(mut line: Spans) -> Spans {
    while line.last().is_some_and(|s| is_all_ws(&s.content)) {
        line.pop();
    }
    line
}

fn split_tokens(spans: &[Span<'static>]) -> Vec<Span<'static>> {
    let mut out = Vec::new();
    for span in spans {
        let mut buf = String::new();
        let mut last_ws: Option<bool> = None;
        for ch in span.content.chars() {
            let ws = ch.is_whitespace();
            if last_ws.is_some_and(|prev| prev != ws) {
                out.push(Span::styled(std::mem::take(&mut buf), span.style));
            }
            buf.push(ch);
            last_ws = Some(ws);
            if ch == '\u{200B}' {
                out.push(Span::styled(std::mem::take(&mut buf), span.style));
                last_ws = None;
            }
        }
        if !buf.is_empty() {
            out.push(Span::styled(buf, span.style));
        }
    }
    out
}

fn split_to_width(span: &Span<'static>, max_cols: usize) -> (Span<'static>, Span<'static>) {
    let text = span.content.as_ref();
    let mut cols = 0usize;
    let mut idx = 0usize;
    let mut url_break: Option<usize> = None;
    for (byte_idx, ch) in text.char_indices() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if cols + w > max_cols {
            break;
        }
        cols += w;
        idx = byte_idx + ch.len_utf8();
        if matches!(ch, '/' | '.' | '-' | '_' | '?' | '&' | '#' | '=') {
            url_break = Some(idx);
        }
    }
    let looks_like_url = text.starts_with("https://") || text.starts_with("http://");
    if looks_like_url && let Some(b) = url_break {
        idx = b;
    }
    if idx == 0 {
        idx = text.chars().next().map_or(text.len(), char::len_utf8);
    }
    let (a, b) = text.split_at(idx);
    (
        Span::styled(a.to_string(), span.style),
        Span::styled(b.to_string(), span.style),
    )
}

fn is_all_ws(s: &str) -> bool {
    s.chars().all(char::is_whitespace)
}

/// Plain text of laid-out lines, for tests and the dump example.
pub fn text_plain(text: &Text<'_>) -> String {
    text.lines
        .iter()
        .map(|l| spans_plain(&l.spans))
        .collect::<Vec<_>>()
        .join("\n")
}
