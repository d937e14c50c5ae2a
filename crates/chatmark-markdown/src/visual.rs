//! The rendered visual tree. Built fresh by every render pass and never mutated afterwards.
use crate::annotations::AnnotationKind;
use crate::handles::SpanHandle;
use chatmark_core::text::Align;
use ratatui::style::Style;
use ratatui::text::Line;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
pub enum InlineSpan {
    Text {
        text: String,
        style: Style,
        /// Shared by every span of one link.
        link: Option<SpanHandle>,
    },
    /// Inline or display math, carrying the style of the text it sits in.
    Math {
        expression: String,
        display: bool,
        style: Style,
    },
    /// Copy-on-tap code chip.
    Code {
        code: String,
        style: Style,
        handle: SpanHandle,
    },
    LineBreak,
}

impl InlineSpan {
    pub fn text(text: impl Into<String>, style: Style) -> Self {
        InlineSpan::Text {
            text: text.into(),
            style,
            link: None,
        }
    }

    /// Text as displayed; math shows its LaTeX source.
    pub fn plain(&self) -> &str {
        match self {
            InlineSpan::Text { text, .. } => text,
            InlineSpan::Math { expression, .. } => expression,
            InlineSpan::Code { code, .. } => code,
            InlineSpan::LineBreak => "\n",
        }
    }

    pub fn handle(&self) -> Option<SpanHandle> {
        match self {
            InlineSpan::Text { link, .. } => *link,
            InlineSpan::Code { handle, .. } => Some(*handle),
            _ => None,
        }
    }
}

pub fn spans_plain(spans: &[InlineSpan]) -> String {
    spans.iter().map(InlineSpan::plain).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertKind {
    Note,
    Tip,
    Important,
    Warning,
    Caution,
}

impl AlertKind {
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker.to_ascii_uppercase().as_str() {
            "NOTE" => Some(Self::Note),
            "TIP" => Some(Self::Tip),
            "IMPORTANT" => Some(Self::Important),
            "WARNING" => Some(Self::Warning),
            "CAUTION" => Some(Self::Caution),
            _ => None,
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Note => "ℹ️",
            Self::Tip => "💡",
            Self::Important => "❗",
            Self::Warning => "⚠️",
            Self::Caution => "🔴",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Note => "Note",
            Self::Tip => "Tip",
            Self::Important => "Important",
            Self::Warning => "Warning",
            Self::Caution => "Caution",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ListItemContent {
    Inline(Vec<InlineSpan>),
    Blocks(Vec<VisualBlock>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListItem {
    /// `•` or `N.`
    pub marker: String,
    pub content: ListItemContent,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableColumn {
    pub header: Vec<InlineSpan>,
    pub align: Align,
}

#[derive(Clone, Debug, PartialEq)]
pub enum VisualBlock {
    Paragraph(Vec<InlineSpan>),
    Heading {
        level: u8,
        spans: Vec<InlineSpan>,
    },
    Code {
        language: Option<String>,
        code: String,
        /// Highlighted lines, one per source line.
        lines: Vec<Line<'static>>,
    },
    /// A display-math block on its own line.
    Math {
        expression: String,
        style: Style,
    },
    Quote(Vec<VisualBlock>),
    List {
        ordered: bool,
        items: Vec<ListItem>,
    },
    /// Every row holds exactly `columns.len()` cells.
    Table {
        columns: Vec<TableColumn>,
        rows: Vec<Vec<Vec<InlineSpan>>>,
    },
    Rule,
    Alert {
        kind: AlertKind,
        body: Vec<VisualBlock>,
    },
    Image {
        src: String,
        alt: Option<String>,
        title: Option<String>,
    },
    ImageError {
        alt: Option<String>,
        message: String,
    },
    Annotation {
        kind: AnnotationKind,
        done: bool,
        title: Option<String>,
        attributes: BTreeMap<String, String>,
        body: Vec<VisualBlock>,
    },
    /// Blocks rendered without framing (footnote sections, unknown containers).
    Group(Vec<VisualBlock>),
    Empty,
}

impl VisualBlock {
    pub fn is_empty(&self) -> bool {
        match self {
            VisualBlock::Empty => true,
            VisualBlock::Group(children) => children.iter().all(VisualBlock::is_empty),
            _ => false,
        }
    }

    /// Plain-text projection used by tests and the dump example.
    pub fn plain(&self) -> String {
        let mut out = String::new();
        self.write_plain(&mut out);
        out
    }

    fn write_plain(&self, out: &mut String) {
        let blocks = |out: &mut String, children: &[VisualBlock]| {
            let parts: Vec<String> = children
                .iter()
                .filter(|b| !b.is_empty())
                .map(VisualBlock::plain)
                .collect();
            out.push_str(&parts.join("\n"));
        };
        match self {
            VisualBlock::Paragraph(spans) => out.push_str(&spans_plain(spans)),
            VisualBlock::Heading { level, spans } => {
                out.push_str(&"#".repeat(usize::from(*level)));
                out.push(' ');
                out.push_str(&spans_plain(spans));
            }
            VisualBlock::Code { code, .. } => out.push_str(code),
            VisualBlock::Math { expression, .. } => out.push_str(expression),
            VisualBlock::Quote(children)
            | VisualBlock::Group(children)
            | VisualBlock::Alert { body: children, .. }
            | VisualBlock::Annotation { body: children, .. } => blocks(out, children),
            VisualBlock::List { items, .. } => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| {
                        let body = match &item.content {
                            ListItemContent::Inline(spans) => spans_plain(spans),
                            ListItemContent::Blocks(children) => {
                                let mut s = String::new();
                                blocks(&mut s, children);
                                s
                            }
                        };
                        format!("{} {}", item.marker, body)
                    })
                    .collect();
                out.push_str(&parts.join("\n"));
            }
            VisualBlock::Table { columns, rows } => {
                let head: Vec<String> = columns.iter().map(|c| spans_plain(&c.header)).collect();
                out.push_str(&head.join(" | "));
                for row in rows {
                    out.push('\n');
                    let cells: Vec<String> = row.iter().map(|c| spans_plain(c)).collect();
                    out.push_str(&cells.join(" | "));
                }
            }
            VisualBlock::Rule => out.push_str("---"),
            VisualBlock::Image { src, alt, .. } => {
                out.push_str(&format!("[image: {}]({src})", alt.as_deref().unwrap_or("")));
            }
            VisualBlock::ImageError { message, .. } => {
                out.push_str(&format!("[image error: {message}]"));
            }
            VisualBlock::Empty => {}
        }
    }

    /// Calls `f` with every inline span in the tree, depth first.
    pub fn for_each_span(&self, f: &mut dyn FnMut(&InlineSpan)) {
        let each = |spans: &[InlineSpan], f: &mut dyn FnMut(&InlineSpan)| {
            for span in spans {
                f(span);
            }
        };
        match self {
            VisualBlock::Paragraph(spans) | VisualBlock::Heading { spans, .. } => each(spans, f),
            VisualBlock::Quote(children)
            | VisualBlock::Group(children)
            | VisualBlock::Alert { body: children, .. }
            | VisualBlock::Annotation { body: children, .. } => {
                for child in children {
                    child.for_each_span(f);
                }
            }
            VisualBlock::List { items, .. } => {
                for item in items {
                    match &item.content {
                        ListItemContent::Inline(spans) => each(spans, f),
                        ListItemContent::Blocks(children) => {
                            for child in children {
                                child.for_each_span(f);
                            }
                        }
                    }
                }
            }
            VisualBlock::Table { columns, rows } => {
                for column in columns {
                    each(&column.header, f);
                }
                for cell in rows.iter().flatten() {
                    each(cell, f);
                }
            }
            _ => {}
        }
    }
}
