//! BlockRenderer: block-level AST nodes to [`VisualBlock`]s.
//!
//! Dispatch is a plain match on the node tag. Nested block content (quotes, alert bodies, list
//! items) is rendered by a fresh renderer over the same pass context. Nothing here fails: unknown
//! tags render their children and empty leaves become [`VisualBlock::Empty`].
use crate::ast::BlockTag;
use crate::ast::Element;
use crate::ast::InlineTag;
use crate::ast::Node;
use crate::ast::Tag;
use crate::ast::ALERT_CLASS;
use crate::inline::InlineRenderer;
use crate::latex::Segment;
use crate::render::RenderContext;
use crate::urls::resolve_image;
use crate::urls::resolve_url;
use crate::visual::AlertKind;
use crate::visual::InlineSpan;
use crate::visual::ListItem;
use crate::visual::ListItemContent;
use crate::visual::TableColumn;
use crate::visual::VisualBlock;
use chatmark_core::text::Align;
use chatmark_core::text::CodeHighlighter;
use chatmark_core::text::PlainCode;
use once_cell::sync::Lazy;
use ratatui::style::Modifier;
use ratatui::style::Style;
use regex::Regex;

static ALERT_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*\[!(NOTE|TIP|IMPORTANT|WARNING|CAUTION)\][ \t]*\n?").expect("valid regex")
});

pub struct BlockRenderer<'c, 'a> {
    ctx: &'c mut RenderContext<'a>,
}

impl<'c, 'a> BlockRenderer<'c, 'a> {
    pub fn new(ctx: &'c mut RenderContext<'a>) -> Self {
        Self { ctx }
    }

    /// Renders sibling nodes, dropping the ones that produced nothing.
    pub fn render(&mut self, nodes: &[Node]) -> Vec<VisualBlock> {
        nodes
            .iter()
            .map(|node| self.render_node(node))
            .filter(|block| !block.is_empty())
            .collect()
    }

    pub fn render_node(&mut self, node: &Node) -> VisualBlock {
        match node {
            Node::Text(text) if text.trim().is_empty() => VisualBlock::Empty,
            Node::Text(_) => self.paragraph(std::slice::from_ref(node)),
            Node::Element(el) => self.element(el),
        }
    }

    fn nested(&mut self, nodes: &[Node]) -> Vec<VisualBlock> {
        BlockRenderer {
            ctx: &mut *self.ctx,
        }
        .render(nodes)
    }

    fn inline(&mut self, nodes: &[Node], style: Style) -> Vec<InlineSpan> {
        InlineRenderer::new(&mut *self.ctx).render(nodes, style)
    }

    fn element(&mut self, el: &Element) -> VisualBlock {
        match &el.tag {
            Tag::Block(BlockTag::Paragraph) => self.paragraph(&el.children),
            Tag::Block(BlockTag::Heading(level)) => {
                let level = (*level).clamp(1, 6);
                let spans = self.inline(&el.children, self.ctx.theme.heading(level));
                if spans.is_empty() {
                    VisualBlock::Empty
                } else {
                    VisualBlock::Heading { level, spans }
                }
            }
            Tag::Block(BlockTag::Pre) => self.code(el),
            Tag::Block(BlockTag::Blockquote) => VisualBlock::Quote(self.nested(&el.children)),
            Tag::Block(BlockTag::Div) if el.has_class(ALERT_CLASS) => self.alert(el),
            Tag::Block(BlockTag::UnorderedList) => self.list(el, false),
            Tag::Block(BlockTag::OrderedList) => self.list(el, true),
            Tag::Block(BlockTag::ListItem) => match self.list_item(el) {
                ListItemContent::Inline(spans) if spans.is_empty() => VisualBlock::Empty,
                ListItemContent::Inline(spans) => VisualBlock::Paragraph(spans),
                ListItemContent::Blocks(blocks) => VisualBlock::Group(blocks),
            },
            Tag::Block(BlockTag::Table) => self.table(el),
            Tag::Block(BlockTag::Rule) => VisualBlock::Rule,
            Tag::Block(BlockTag::Image) | Tag::Inline(InlineTag::Image) => self.image(el),
            Tag::Block(BlockTag::Section) => group(self.nested(&el.children)),
            Tag::Inline(_) => self.paragraph(std::slice::from_ref(&Node::Element(el.clone()))),
            Tag::Block(_) | Tag::Unknown(_) => self.fallback(el),
        }
    }

    fn fallback(&mut self, el: &Element) -> VisualBlock {
        if el.children.is_empty() {
            let text = el.text_content();
            if text.trim().is_empty() {
                return VisualBlock::Empty;
            }
            return self.paragraph(&[Node::Text(text)]);
        }
        if el.children.iter().any(Node::is_block) {
            group(self.nested(&el.children))
        } else {
            self.paragraph(&el.children)
        }
    }

    fn paragraph(&mut self, children: &[Node]) -> VisualBlock {
        let mut content = children.iter().filter(|c| !c.is_blank_text());
        if let (Some(Node::Element(only)), None) = (content.next(), content.next())
            && only.tag == Tag::Inline(InlineTag::Image)
        {
            return self.image(only);
        }

        if let Some(block) = self.display_math(children) {
            return block;
        }

        let spans = self.inline(children, self.ctx.theme.text_primary);
        if spans.iter().all(|s| s.plain().trim().is_empty()) {
            VisualBlock::Empty
        } else {
            VisualBlock::Paragraph(spans)
        }
    }

    /// A paragraph holding nothing but one block-math token renders as a math block.
    fn display_math(&self, children: &[Node]) -> Option<VisualBlock> {
        let [Node::Text(text)] = children else {
            return None;
        };
        let text = text.trim();
        if !self.ctx.shield.contains_placeholder(text) {
            return None;
        }
        match self.ctx.shield.split_on_placeholders(text).as_slice() {
            [Segment::Math {
                expression,
                block: true,
                ..
            }] => Some(VisualBlock::Math {
                expression: expression.clone(),
                style: self.ctx.theme.math,
            }),
            _ => None,
        }
    }

    fn code(&mut self, pre: &Element) -> VisualBlock {
        let code_el = pre.children.iter().find_map(|c| match c {
            Node::Element(el) if el.tag == Tag::Inline(InlineTag::Code) => Some(el),
            _ => None,
        });
        let (language, raw) = match code_el {
            Some(el) => (
                el.attr("class")
                    .and_then(|c| c.split_whitespace().find_map(|c| c.strip_prefix("language-")))
                    .map(str::to_string),
                el.text_content(),
            ),
            None => (None, pre.text_content()),
        };
        let code = self.ctx.shield.restore_source(&raw);
        let code = code.strip_suffix('\n').unwrap_or(&code).to_string();

        let line_count = code.split('\n').count();
        let lines = if line_count <= self.ctx.options.max_highlight_lines {
            self.ctx.highlighter.highlight(language.as_deref(), &code)
        } else {
            tracing::debug!(line_count, "code block too long to highlight");
            PlainCode.highlight(language.as_deref(), &code)
        };
        VisualBlock::Code {
            language,
            code,
            lines,
        }
    }

    fn alert(&mut self, div: &Element) -> VisualBlock {
        let first = div.children.iter().position(|c| !c.is_blank_text());
        let marker = first.and_then(|i| match &div.children[i] {
            Node::Element(p) if p.tag == Tag::Block(BlockTag::Paragraph) => strip_alert_marker(p),
            _ => None,
        });
        let Some((kind, rest)) = marker else {
            return VisualBlock::Quote(self.nested(&div.children));
        };

        let mut body_nodes: Vec<Node> = Vec::with_capacity(div.children.len());
        if rest.children.iter().any(|c| !c.is_blank_text()) {
            body_nodes.push(Node::Element(rest));
        }
        if let Some(i) = first {
            body_nodes.extend(div.children[i + 1..].iter().cloned());
        }
        VisualBlock::Alert {
            kind,
            body: self.nested(&body_nodes),
        }
    }

    fn list(&mut self, list: &Element, ordered: bool) -> VisualBlock {
        let mut number = list
            .attr("start")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(1);
        let mut items = Vec::new();
        for child in &list.children {
            let Node::Element(item) = child else {
                continue;
            };
            let content = if item.tag == Tag::Block(BlockTag::ListItem) {
                self.list_item(item)
            } else {
                ListItemContent::Blocks(vec![self.element(item)])
            };
            let marker = if ordered {
                let m = format!("{number}.");
                number = number.saturating_add(1);
                m
            } else {
                "•".to_string()
            };
            items.push(ListItem { marker, content });
        }
        if items.is_empty() {
            VisualBlock::Empty
        } else {
            VisualBlock::List { ordered, items }
        }
    }

    /// Items without block children stay a single inline run; anything else renders as blocks,
    /// with loose inline runs wrapped into paragraphs.
    fn list_item(&mut self, item: &Element) -> ListItemContent {
        if !item.children.iter().any(Node::is_block) {
            let spans = self.inline(&item.children, self.ctx.theme.text_primary);
            return ListItemContent::Inline(trim_spans(spans));
        }

        let mut blocks = Vec::new();
        let mut run: Vec<Node> = Vec::new();
        for child in &item.children {
            if child.is_block() {
                if !run.is_empty() {
                    let block = self.paragraph(&std::mem::take(&mut run));
                    push_block(&mut blocks, block);
                }
                let block = self.render_node(child);
                push_block(&mut blocks, block);
            } else {
                run.push(child.clone());
            }
        }
        if !run.is_empty() {
            let block = self.paragraph(&run);
            push_block(&mut blocks, block);
        }
        ListItemContent::Blocks(blocks)
    }

    fn table(&mut self, table: &Element) -> VisualBlock {
        let mut head_rows: Vec<&Element> = Vec::new();
        let mut body_rows: Vec<&Element> = Vec::new();
        for part in table.children.iter().filter_map(Node::as_element) {
            match part.tag {
                Tag::Block(BlockTag::TableHead) => collect_rows(part, &mut head_rows),
                Tag::Block(BlockTag::TableBody) => collect_rows(part, &mut body_rows),
                Tag::Block(BlockTag::TableRow) => body_rows.push(part),
                _ => {}
            }
        }

        let header_row = match head_rows.first() {
            Some(row) if row_cells(row).next().is_some() => Some(*row),
            _ if !body_rows.is_empty() => Some(body_rows.remove(0)),
            _ => None,
        };
        let Some(header_row) = header_row else {
            return VisualBlock::Empty;
        };

        let header_style = self.ctx.theme.text_primary.add_modifier(Modifier::BOLD);
        let mut columns = Vec::new();
        for cell in row_cells(header_row) {
            columns.push(TableColumn {
                header: trim_spans(self.inline(&cell.children, header_style)),
                align: cell_align(cell),
            });
        }
        if columns.is_empty() {
            return VisualBlock::Empty;
        }

        let body_style = self.ctx.theme.text_primary;
        let mut rows = Vec::with_capacity(body_rows.len());
        for row in body_rows {
            let mut cells: Vec<Vec<InlineSpan>> = Vec::with_capacity(columns.len());
            for cell in row_cells(row) {
                cells.push(trim_spans(self.inline(&cell.children, body_style)));
            }
            if cells.len() != columns.len() {
                tracing::trace!(
                    cells = cells.len(),
                    columns = columns.len(),
                    "reconciling table row"
                );
                cells.resize_with(columns.len(), Vec::new);
            }
            rows.push(cells);
        }
        VisualBlock::Table { columns, rows }
    }

    fn image(&mut self, el: &Element) -> VisualBlock {
        let shield = self.ctx.shield;
        let src = shield.restore_source(el.attr("src").unwrap_or_default());
        let src = src.as_str();
        let alt = el
            .attr("alt")
            .filter(|a| !a.is_empty())
            .map(|a| shield.restore_source(a));
        let title = el
            .attr("title")
            .filter(|t| !t.is_empty())
            .map(|t| shield.restore_source(t));

        if let Some(builder) = self.ctx.image_builder {
            let resolved = resolve_url(self.ctx.base_url(), src);
            return builder(&resolved, alt.as_deref(), title.as_deref());
        }
        match resolve_image(self.ctx.base_url(), src) {
            Ok(src) => VisualBlock::Image { src, alt, title },
            Err(err) => {
                tracing::warn!(src, error = %err, "image source not displayable");
                VisualBlock::ImageError {
                    alt,
                    message: err.to_string(),
                }
            }
        }
    }
}

fn group(blocks: Vec<VisualBlock>) -> VisualBlock {
    if blocks.is_empty() {
        VisualBlock::Empty
    } else {
        VisualBlock::Group(blocks)
    }
}

fn push_block(blocks: &mut Vec<VisualBlock>, block: VisualBlock) {
    if !block.is_empty() {
        blocks.push(block);
    }
}

fn collect_rows<'e>(section: &'e Element, rows: &mut Vec<&'e Element>) {
    let mut direct_cells = false;
    for child in section.children.iter().filter_map(Node::as_element) {
        match child.tag {
            Tag::Block(BlockTag::TableRow) => rows.push(child),
            Tag::Block(BlockTag::TableHeaderCell) | Tag::Block(BlockTag::TableCell) => {
                direct_cells = true
            }
            _ => {}
        }
    }
    if direct_cells {
        rows.push(section);
    }
}

fn row_cells(row: &Element) -> impl Iterator<Item = &Element> {
    row.children.iter().filter_map(Node::as_element).filter(|c| {
        matches!(
            c.tag,
            Tag::Block(BlockTag::TableHeaderCell) | Tag::Block(BlockTag::TableCell)
        )
    })
}

fn cell_align(cell: &Element) -> Align {
    match cell.attr("align") {
        Some("center") => Align::Center,
        Some("right") => Align::Right,
        _ => Align::Left,
    }
}

/// Returns the alert kind and the first paragraph with its marker removed.
fn strip_alert_marker(p: &Element) -> Option<(AlertKind, Element)> {
    let Some(Node::Text(first)) = p.children.first() else {
        return None;
    };
    let caps = ALERT_MARKER_RE.captures(first)?;
    let kind = AlertKind::from_marker(&caps[1])?;
    let consumed = caps.get(0).map_or(0, |m| m.end());
    let remainder = first[consumed..].trim_start();

    let mut rest = p.clone();
    rest.children.remove(0);
    if !remainder.is_empty() {
        rest.children.insert(0, Node::Text(remainder.to_string()));
    } else if matches!(
        rest.children.first(),
        Some(Node::Element(el)) if el.tag == Tag::Inline(InlineTag::LineBreak)
    ) {
        rest.children.remove(0);
    }
    Some((kind, rest))
}

fn trim_spans(mut spans: Vec<InlineSpan>) -> Vec<InlineSpan> {
    while matches!(spans.last(), Some(InlineSpan::LineBreak)) {
        spans.pop();
    }
    if let Some(InlineSpan::Text { text, .. }) = spans.first_mut() {
        let trimmed = text.trim_start();
        if trimmed.len() != text.len() {
            *text = trimmed.to_string();
        }
    }
    if let Some(InlineSpan::Text { text, .. }) = spans.last_mut() {
        let trimmed = text.trim_end();
        if trimmed.len() != text.len() {
            *text = trimmed.to_string();
        }
    }
    spans.retain(|s| !matches!(s, InlineSpan::Text { text, .. } if text.is_empty()));
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse;
    use crate::ast::ParseOptions;
    use crate::handles::HandleScope;
    use crate::latex::LatexShield;
    use crate::render::RenderOptions;
    use crate::visual::spans_plain;
    use chatmark_core::theme::Theme;

    fn render_with(shield: &LatexShield, nodes: &[Node]) -> Vec<VisualBlock> {
        let theme = Theme::default();
        let options = RenderOptions::default();
        let mut handles = HandleScope::new();
        let mut ctx = RenderContext::new(&theme, &options, shield, &mut handles);
        BlockRenderer::new(&mut ctx).render(nodes)
    }

    fn render_md(md: &str) -> Vec<VisualBlock> {
        let mut shield = LatexShield::new();
        let text = shield.extract(md);
        let nodes = parse(&text, ParseOptions::default());
        render_with(&shield, &nodes)
    }

    fn cell(tag: BlockTag, text: &str) -> Node {
        Element::block(tag)
            .with_children(vec![Node::text(text)])
            .into()
    }

    #[test]
    fn short_rows_are_padded_to_header_width() {
        let head_row = Element::block(BlockTag::TableRow).with_children(
            ["A", "B", "C", "D"]
                .iter()
                .map(|h| cell(BlockTag::TableHeaderCell, h))
                .collect(),
        );
        let body_row = Element::block(BlockTag::TableRow).with_children(vec![
            cell(BlockTag::TableCell, "1"),
            cell(BlockTag::TableCell, "2"),
        ]);
        let table = Element::block(BlockTag::Table).with_children(vec![
            Element::block(BlockTag::TableHead)
                .with_children(vec![head_row.into()])
                .into(),
            Element::block(BlockTag::TableBody)
                .with_children(vec![body_row.into()])
                .into(),
        ]);
        let blocks = render_with(&LatexShield::new(), &[table.into()]);
        let VisualBlock::Table { columns, rows } = &blocks[0] else {
            panic!("expected table, got {blocks:?}");
        };
        assert_eq!(columns.len(), 4);
        assert_eq!(rows[0].len(), 4);
        assert_eq!(spans_plain(&rows[0][1]), "2");
        assert!(rows[0][2].is_empty());
        assert!(rows[0][3].is_empty());
    }

    #[test]
    fn long_rows_are_truncated() {
        let md = "| a | b |\n|---|---|\n| 1 | 2 |\n";
        let mut nodes = parse(md, ParseOptions::default());
        if let Some(Node::Element(table)) = nodes.first_mut()
            && let Some(Node::Element(body)) = table.children.get_mut(1)
            && let Some(Node::Element(row)) = body.children.first_mut()
        {
            row.children.push(cell(BlockTag::TableCell, "3"));
        }
        let blocks = render_with(&LatexShield::new(), &nodes);
        let VisualBlock::Table { rows, .. } = &blocks[0] else {
            panic!("expected table");
        };
        assert_eq!(rows[0].len(), 2);
    }

    #[test]
    fn headings_carry_level() {
        let blocks = render_md("### Three");
        assert!(matches!(&blocks[0], VisualBlock::Heading { level: 3, .. }));
        assert_eq!(blocks[0].plain(), "### Three");
    }

    #[test]
    fn lone_image_paragraph_is_an_image_block() {
        let blocks = render_md("![cat](https://img.test/cat.png)\n\ntext ![inline](x.png)");
        assert_eq!(
            blocks[0],
            VisualBlock::Image {
                src: "https://img.test/cat.png".to_string(),
                alt: Some("cat".to_string()),
                title: None
            }
        );
        assert_eq!(blocks[1].plain(), "text inline");
    }

    #[test]
    fn bad_image_becomes_error_block() {
        let blocks = render_md("![x](javascript:alert(1))");
        assert!(matches!(&blocks[0], VisualBlock::ImageError { .. }));
    }

    #[test]
    fn image_builder_overrides_default() {
        let builder = |src: &str, alt: Option<&str>, _title: Option<&str>| {
            VisualBlock::Paragraph(vec![InlineSpan::text(
                format!("{}@{src}", alt.unwrap_or("")),
                Style::default(),
            )])
        };
        let theme = Theme::default();
        let options = RenderOptions {
            base_url: Some("https://cdn.test/".to_string()),
            ..RenderOptions::default()
        };
        let shield = LatexShield::new();
        let mut handles = HandleScope::new();
        let nodes = parse("![logo](logo.svg)", ParseOptions::default());
        let mut ctx = RenderContext::new(&theme, &options, &shield, &mut handles)
            .with_image_builder(Some(&builder));
        let blocks = BlockRenderer::new(&mut ctx).render(&nodes);
        assert_eq!(blocks[0].plain(), "logo@https://cdn.test/logo.svg");
    }

    #[test]
    fn ordered_list_honors_start() {
        let blocks = render_md("3. three\n4. four\n");
        let VisualBlock::List { ordered, items } = &blocks[0] else {
            panic!("expected list");
        };
        assert!(*ordered);
        let markers: Vec<&str> = items.iter().map(|i| i.marker.as_str()).collect();
        assert_eq!(markers, vec!["3.", "4."]);
        assert!(matches!(items[0].content, ListItemContent::Inline(_)));
    }

    #[test]
    fn nested_list_item_renders_as_blocks() {
        let blocks = render_md("- outer\n  - inner\n");
        let VisualBlock::List { items, .. } = &blocks[0] else {
            panic!("expected list");
        };
        let ListItemContent::Blocks(children) = &items[0].content else {
            panic!("expected block content");
        };
        assert_eq!(children[0].plain(), "outer");
        assert!(matches!(&children[1], VisualBlock::List { ordered: false, .. }));
    }

    #[test]
    fn alert_marker_selects_kind_and_is_stripped() {
        let blocks = render_md("> [!TIP]\n> Use the *fast* path.\n>\n> Second paragraph.");
        let VisualBlock::Alert { kind, body } = &blocks[0] else {
            panic!("expected alert, got {blocks:?}");
        };
        assert_eq!(*kind, AlertKind::Tip);
        assert_eq!(body.len(), 2);
        assert_eq!(body[0].plain(), "Use the fast path.");
        assert_eq!(body[1].plain(), "Second paragraph.");
    }

    #[test]
    fn blockquote_recurses_into_blocks() {
        let blocks = render_md("> # Title\n>\n> - item");
        let VisualBlock::Quote(children) = &blocks[0] else {
            panic!("expected quote");
        };
        assert!(matches!(&children[0], VisualBlock::Heading { level: 1, .. }));
        assert!(matches!(&children[1], VisualBlock::List { .. }));
    }

    #[test]
    fn code_block_restores_dollar_source() {
        let blocks = render_md("```sh\necho $HOME $x$\n```");
        let VisualBlock::Code { language, code, lines } = &blocks[0] else {
            panic!("expected code");
        };
        assert_eq!(language.as_deref(), Some("sh"));
        assert_eq!(code, "echo $HOME $x$");
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn block_math_paragraph_is_a_math_block() {
        let blocks = render_md("Euler:\n\n$$e^{i\\pi}+1=0$$\n\ndone");
        assert_eq!(blocks.len(), 3);
        assert!(matches!(
            &blocks[1],
            VisualBlock::Math { expression, .. } if expression == "e^{i\\pi}+1=0"
        ));
    }

    #[test]
    fn footnotes_render_as_trailing_group() {
        let blocks = render_md("See[^n].\n\n[^n]: Note text.");
        let last = blocks.last().map(VisualBlock::plain);
        assert_eq!(last.as_deref(), Some("1. Note text."));
    }

    #[test]
    fn unknown_and_empty_nodes_never_fail() {
        let nodes = vec![
            Element::new(Tag::Unknown("custom".to_string())).into(),
            Element::new(Tag::Unknown("wrapper".to_string()))
                .with_children(vec![Element::block(BlockTag::Paragraph)
                    .with_children(vec![Node::text("inside")])
                    .into()])
                .into(),
            Element::block(BlockTag::Paragraph).into(),
            Node::text("   "),
        ];
        let blocks = render_with(&LatexShield::new(), &nodes);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].plain(), "inside");
    }
}
