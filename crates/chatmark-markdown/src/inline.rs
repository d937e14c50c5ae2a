//! InlineRenderer: one block's inline nodes to a flat span sequence.
use crate::ast::Element;
use crate::ast::InlineTag;
use crate::ast::Node;
use crate::ast::Tag;
use crate::handles::SpanHandle;
use crate::latex::Segment;
use crate::render::RenderContext;
use crate::urls::resolve_url;
use crate::visual::InlineSpan;
use ratatui::style::Modifier;
use ratatui::style::Style;

pub struct InlineRenderer<'c, 'a> {
    ctx: &'c mut RenderContext<'a>,
}

impl<'c, 'a> InlineRenderer<'c, 'a> {
    pub fn new(ctx: &'c mut RenderContext<'a>) -> Self {
        Self { ctx }
    }

    /// Renders `nodes` under `style`. Adjacent text with the same style and link is merged.
    pub fn render(&mut self, nodes: &[Node], style: Style) -> Vec<InlineSpan> {
        let mut out = Vec::new();
        for node in nodes {
            self.node(node, style, None, &mut out);
        }
        out
    }

    fn node(
        &mut self,
        node: &Node,
        style: Style,
        link: Option<SpanHandle>,
        out: &mut Vec<InlineSpan>,
    ) {
        match node {
            Node::Text(text) => self.text(text, style, link, out),
            Node::Element(el) => self.element(el, style, link, out),
        }
    }

    fn children(
        &mut self,
        el: &Element,
        style: Style,
        link: Option<SpanHandle>,
        out: &mut Vec<InlineSpan>,
    ) {
        for child in &el.children {
            self.node(child, style, link, out);
        }
    }

    fn element(
        &mut self,
        el: &Element,
        style: Style,
        link: Option<SpanHandle>,
        out: &mut Vec<InlineSpan>,
    ) {
        match &el.tag {
            Tag::Inline(InlineTag::Strong) => {
                self.children(el, style.add_modifier(Modifier::BOLD), link, out)
            }
            Tag::Inline(InlineTag::Emphasis) => {
                self.children(el, style.add_modifier(Modifier::ITALIC), link, out)
            }
            Tag::Inline(InlineTag::Strikethrough) => {
                self.children(el, style.add_modifier(Modifier::CROSSED_OUT), link, out)
            }
            Tag::Inline(InlineTag::Code) => {
                let code = el.text_content();
                let handle = self.ctx.handles.create_copy(&code);
                out.push(InlineSpan::Code {
                    code,
                    style: style.patch(self.ctx.theme.code_inline),
                    handle,
                });
            }
            Tag::Inline(InlineTag::Link) => {
                let shield = self.ctx.shield;
                let raw = shield.restore_source(el.attr("href").unwrap_or_default());
                let href = resolve_url(self.ctx.base_url(), &raw);
                let title = shield.restore_source(el.attr("title").unwrap_or_default());
                let handle = self.ctx.handles.create_link(&href, &title);
                let link_style = style.patch(self.ctx.theme.link);
                if el.children.is_empty() {
                    self.text(&href, link_style, Some(handle), out);
                } else {
                    self.children(el, link_style, Some(handle), out);
                }
            }
            Tag::Inline(InlineTag::Image) => {
                let alt = el.attr("alt").unwrap_or_default();
                if !alt.is_empty() {
                    self.text(alt, style, link, out);
                }
            }
            Tag::Inline(InlineTag::LineBreak) => out.push(InlineSpan::LineBreak),
            Tag::Block(_) | Tag::Unknown(_) => {
                if el.children.is_empty() {
                    let text = el.text_content();
                    self.text(&text, style, link, out);
                } else {
                    self.children(el, style, link, out);
                }
            }
        }
    }

    fn text(
        &mut self,
        text: &str,
        style: Style,
        link: Option<SpanHandle>,
        out: &mut Vec<InlineSpan>,
    ) {
        if text.is_empty() {
            return;
        }
        let shield = self.ctx.shield;
        if !shield.contains_placeholder(text) {
            push_text(out, text, style, link);
            return;
        }
        for segment in shield.split_on_placeholders(text) {
            match segment {
                Segment::Text(t) => push_text(out, &t, style, link),
                Segment::Math {
                    expression, block, ..
                } => out.push(InlineSpan::Math {
                    expression,
                    display: block,
                    style: style.patch(self.ctx.theme.math),
                }),
            }
        }
    }
}

fn push_text(out: &mut Vec<InlineSpan>, text: &str, style: Style, link: Option<SpanHandle>) {
    if text.is_empty() {
        return;
    }
    if let Some(InlineSpan::Text {
        text: prev,
        style: prev_style,
        link: prev_link,
    }) = out.last_mut()
        && *prev_style == style
        && *prev_link == link
    {
        prev.push_str(text);
        return;
    }
    out.push(InlineSpan::Text {
        text: text.to_string(),
        style,
        link,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse;
    use crate::ast::ParseOptions;
    use crate::handles::HandleScope;
    use crate::handles::TapAction;
    use crate::latex::LatexShield;
    use crate::render::RenderOptions;
    use crate::visual::spans_plain;
    use chatmark_core::theme::Theme;

    fn first_paragraph(md: &str) -> Vec<Node> {
        let nodes = parse(md, ParseOptions::default());
        match nodes.into_iter().next() {
            Some(Node::Element(el)) => el.children,
            _ => Vec::new(),
        }
    }

    fn with_ctx<T>(
        shield: &LatexShield,
        handles: &mut HandleScope,
        f: impl FnOnce(&mut InlineRenderer<'_, '_>) -> T,
    ) -> T {
        let theme = Theme::default();
        let options = RenderOptions::default();
        let mut ctx = RenderContext::new(&theme, &options, shield, handles);
        let mut r = InlineRenderer::new(&mut ctx);
        f(&mut r)
    }

    #[test]
    fn emphasis_adds_one_modifier_each() {
        let nodes = first_paragraph("***both*** and *it*");
        let shield = LatexShield::new();
        let mut handles = HandleScope::new();
        let spans = with_ctx(&shield, &mut handles, |r| r.render(&nodes, Style::default()));
        let styles: Vec<Style> = spans
            .iter()
            .filter_map(|s| match s {
                InlineSpan::Text { style, .. } => Some(*style),
                _ => None,
            })
            .collect();
        assert_eq!(
            styles[0],
            Style::default().add_modifier(Modifier::BOLD | Modifier::ITALIC)
        );
        assert_eq!(styles[1], Style::default());
        assert_eq!(styles[2], Style::default().add_modifier(Modifier::ITALIC));
    }

    #[test]
    fn link_children_share_one_handle() {
        let nodes = first_paragraph("[plain **bold**](https://a.test \"T\")");
        let shield = LatexShield::new();
        let mut handles = HandleScope::new();
        let spans = with_ctx(&shield, &mut handles, |r| r.render(&nodes, Style::default()));
        let link_handles: Vec<_> = spans.iter().filter_map(InlineSpan::handle).collect();
        assert_eq!(link_handles.len(), 2);
        assert_eq!(link_handles[0], link_handles[1]);
        assert_eq!(handles.live(), 1);
        assert_eq!(
            handles.activate(link_handles[0]),
            Some(TapAction::OpenLink {
                href: "https://a.test".to_string(),
                title: "T".to_string()
            })
        );
    }

    #[test]
    fn math_placeholders_become_math_spans() {
        let mut shield = LatexShield::new();
        let text = shield.extract("**area $\\pi r^2$ here**");
        let nodes = first_paragraph(&text);
        let mut handles = HandleScope::new();
        let spans = with_ctx(&shield, &mut handles, |r| r.render(&nodes, Style::default()));
        let math = spans.iter().find_map(|s| match s {
            InlineSpan::Math {
                expression, style, ..
            } => Some((expression.clone(), *style)),
            _ => None,
        });
        let (expression, style) = math.expect("math span");
        assert_eq!(expression, "\\pi r^2");
        assert!(style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(spans_plain(&spans), "area \\pi r^2 here");
    }

    #[test]
    fn code_is_a_copy_chip_and_images_show_alt() {
        let nodes = first_paragraph("run `cargo test` ![diagram](d.png) now");
        let shield = LatexShield::new();
        let mut handles = HandleScope::new();
        let spans = with_ctx(&shield, &mut handles, |r| r.render(&nodes, Style::default()));
        assert_eq!(spans_plain(&spans), "run cargo test diagram now");
        let chip = spans.iter().find_map(|s| match s {
            InlineSpan::Code { handle, .. } => Some(*handle),
            _ => None,
        });
        let chip = chip.expect("code chip");
        assert_eq!(
            handles.activate(chip),
            Some(TapAction::CopyRequested("cargo test".to_string()))
        );
    }

    #[test]
    fn unknown_elements_fall_back_to_text() {
        let nodes = vec![
            Node::Element(Element::new(Tag::Unknown("kbd".to_string())).with_children(vec![
                Node::text("Ctrl"),
            ])),
            Node::Element(Element::inline(InlineTag::LineBreak)),
            Node::Element(Element::new(Tag::Unknown("empty".to_string()))),
        ];
        let shield = LatexShield::new();
        let mut handles = HandleScope::new();
        let spans = with_ctx(&shield, &mut handles, |r| r.render(&nodes, Style::default()));
        assert_eq!(spans_plain(&spans), "Ctrl\n");
    }
}
