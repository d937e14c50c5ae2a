//! Read-only document tree folded from `pulldown-cmark` events.
//!
//! The renderers dispatch on [`Tag`]; anything the parser produces that has no dedicated variant
//! becomes [`Tag::Unknown`] and is rendered through its children.
use crate::pipeline::decode_entities;
use crate::pipeline::parser_options;
use once_cell::sync::Lazy;
use pulldown_cmark::Alignment;
use pulldown_cmark::CodeBlockKind;
use pulldown_cmark::CowStr;
use pulldown_cmark::Event;
use pulldown_cmark::HeadingLevel;
use pulldown_cmark::Parser;
use pulldown_cmark::Tag as CmarkTag;
use pulldown_cmark::TagEnd;
use regex::Captures;
use regex::Regex;
use std::collections::BTreeMap;

static BR_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*<br\s*/?>\s*$").expect("valid regex"));
static HTML_HIDDEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?is)<script\b[^>]*>.*?</script\s*>",
        r"|<style\b[^>]*>.*?</style\s*>",
        r"|<!--.*?(?:-->|$)"
    ))
    .expect("valid regex")
});
static HTML_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?([A-Za-z][A-Za-z0-9-]*)[^<>]*>").expect("valid regex"));
static ALERT_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*\[!(NOTE|TIP|IMPORTANT|WARNING|CAUTION)\]").expect("valid regex")
});

pub const ALERT_CLASS: &str = "markdown-alert";
pub const FOOTNOTES_CLASS: &str = "footnotes";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockTag {
    Paragraph,
    Heading(u8),
    Pre,
    Blockquote,
    UnorderedList,
    OrderedList,
    ListItem,
    Table,
    TableHead,
    TableBody,
    TableRow,
    TableHeaderCell,
    TableCell,
    Rule,
    Div,
    Section,
    Image,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InlineTag {
    Strong,
    Emphasis,
    Strikethrough,
    Code,
    Link,
    Image,
    LineBreak,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tag {
    Block(BlockTag),
    Inline(InlineTag),
    Unknown(String),
}

impl Tag {
    pub fn is_block(&self) -> bool {
        match self {
            Tag::Block(_) => true,
            Tag::Inline(_) => false,
            Tag::Unknown(name) => name == "html",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    pub tag: Tag,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<Node>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn block(tag: BlockTag) -> Self {
        Self::new(Tag::Block(tag))
    }

    pub fn inline(tag: InlineTag) -> Self {
        Self::new(Tag::Inline(tag))
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }

    /// Flattened text: line breaks become `\n`, images contribute their alt text.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match &self.tag {
            Tag::Inline(InlineTag::LineBreak) => out.push('\n'),
            Tag::Inline(InlineTag::Image) | Tag::Block(BlockTag::Image) => {
                out.push_str(self.attr("alt").unwrap_or_default());
            }
            _ => {
                for child in &self.children {
                    child.collect_text(out);
                }
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_string()));
        }
    }
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn is_block(&self) -> bool {
        self.as_element().is_some_and(|el| el.tag.is_block())
    }

    pub fn is_blank_text(&self) -> bool {
        matches!(self, Node::Text(t) if t.trim().is_empty())
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text(t) => out.push_str(t),
            Node::Element(el) => el.collect_text(out),
        }
    }
}

impl From<Element> for Node {
    fn from(el: Element) -> Self {
        Node::Element(el)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ParseOptions {
    /// Soft line breaks become hard line breaks instead of spaces.
    pub preserve_new_lines: bool,
}

/// Parses `text` into top-level block nodes.
pub fn parse(text: &str, options: ParseOptions) -> Vec<Node> {
    let mut b = TreeBuilder::new(options);
    for ev in Parser::new_ext(text, parser_options()) {
        b.event(ev);
    }
    b.finish()
}

struct TreeBuilder {
    stack: Vec<Element>,
    footnotes: Vec<Node>,
    table_aligns: Vec<Alignment>,
    table_cell: usize,
    in_table_head: bool,
    options: ParseOptions,
}

impl TreeBuilder {
    fn new(options: ParseOptions) -> Self {
        Self {
            stack: vec![Element::new(Tag::Unknown("root".to_string()))],
            footnotes: Vec::new(),
            table_aligns: Vec::new(),
            table_cell: 0,
            in_table_head: false,
            options,
        }
    }

    fn top(&mut self) -> &mut Element {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn open(&mut self, el: Element) {
        self.stack.push(el);
    }

    /// Pops the innermost element. The root is never popped.
    fn close(&mut self) -> Option<Element> {
        if self.stack.len() > 1 {
            self.stack.pop()
        } else {
            None
        }
    }

    fn close_into_parent(&mut self) {
        if let Some(el) = self.close() {
            self.top().children.push(Node::Element(el));
        }
    }

    fn leaf(&mut self, el: Element) {
        self.top().children.push(Node::Element(el));
    }

    fn event(&mut self, ev: Event<'_>) {
        match ev {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.top().push_text(&text),
            Event::Code(code) => {
                let el = Element::inline(InlineTag::Code).with_children(vec![Node::text(&*code)]);
                self.leaf(el);
            }
            Event::Html(html) | Event::InlineHtml(html) => self.html(&html),
            Event::SoftBreak => {
                if self.options.preserve_new_lines {
                    self.leaf(Element::inline(InlineTag::LineBreak));
                } else {
                    self.top().push_text(" ");
                }
            }
            Event::HardBreak => self.leaf(Element::inline(InlineTag::LineBreak)),
            Event::Rule => self.leaf(Element::block(BlockTag::Rule)),
            Event::FootnoteReference(label) => {
                let link = Element::inline(InlineTag::Link)
                    .with_attr("href", format!("#fn-{label}"))
                    .with_children(vec![Node::text(&*label)]);
                let sup = Element::new(Tag::Unknown("sup".to_string()))
                    .with_children(vec![link.into()]);
                self.leaf(sup);
            }
            Event::TaskListMarker(checked) => {
                let marker = if checked { "[✓] " } else { "[ ] " };
                let input = Element::new(Tag::Unknown("input".to_string()))
                    .with_attr("type", "checkbox")
                    .with_children(vec![Node::text(marker)]);
                let input = if checked {
                    input.with_attr("checked", "true")
                } else {
                    input
                };
                self.leaf(input);
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: CmarkTag<'_>) {
        match tag {
            CmarkTag::Paragraph => self.open(Element::block(BlockTag::Paragraph)),
            CmarkTag::Heading { level, .. } => {
                self.open(Element::block(BlockTag::Heading(heading_level(level))));
            }
            CmarkTag::BlockQuote(_) => self.open(Element::block(BlockTag::Blockquote)),
            CmarkTag::CodeBlock(kind) => {
                let code = Element::inline(InlineTag::Code);
                let code = match &kind {
                    CodeBlockKind::Fenced(info) => match fence_language(info) {
                        Some(lang) => code.with_attr("class", format!("language-{lang}")),
                        None => code,
                    },
                    CodeBlockKind::Indented => code,
                };
                self.open(Element::block(BlockTag::Pre));
                self.open(code);
            }
            CmarkTag::List(Some(start)) => {
                self.open(
                    Element::block(BlockTag::OrderedList).with_attr("start", start.to_string()),
                );
            }
            CmarkTag::List(None) => self.open(Element::block(BlockTag::UnorderedList)),
            CmarkTag::Item => self.open(Element::block(BlockTag::ListItem)),
            CmarkTag::Table(aligns) => {
                self.table_aligns = aligns;
                self.in_table_head = false;
                self.open(Element::block(BlockTag::Table));
            }
            CmarkTag::TableHead => {
                self.in_table_head = true;
                self.table_cell = 0;
                self.open(Element::block(BlockTag::TableHead));
                self.open(Element::block(BlockTag::TableRow));
            }
            CmarkTag::TableRow => {
                self.table_cell = 0;
                self.open(Element::block(BlockTag::TableRow));
            }
            CmarkTag::TableCell => {
                let tag = if self.in_table_head {
                    BlockTag::TableHeaderCell
                } else {
                    BlockTag::TableCell
                };
                let cell = Element::block(tag);
                let cell = match self.table_aligns.get(self.table_cell) {
                    Some(Alignment::Left) => cell.with_attr("align", "left"),
                    Some(Alignment::Center) => cell.with_attr("align", "center"),
                    Some(Alignment::Right) => cell.with_attr("align", "right"),
                    _ => cell,
                };
                self.table_cell += 1;
                self.open(cell);
            }
            CmarkTag::Emphasis => self.open(Element::inline(InlineTag::Emphasis)),
            CmarkTag::Strong => self.open(Element::inline(InlineTag::Strong)),
            CmarkTag::Strikethrough => self.open(Element::inline(InlineTag::Strikethrough)),
            CmarkTag::Link {
                dest_url, title, ..
            } => {
                let link = Element::inline(InlineTag::Link).with_attr("href", dest_url.to_string());
                let link = if title.is_empty() {
                    link
                } else {
                    link.with_attr("title", title.to_string())
                };
                self.open(link);
            }
            CmarkTag::Image {
                dest_url, title, ..
            } => {
                let img = Element::inline(InlineTag::Image).with_attr("src", dest_url.to_string());
                let img = if title.is_empty() {
                    img
                } else {
                    img.with_attr("title", title.to_string())
                };
                self.open(img);
            }
            CmarkTag::FootnoteDefinition(label) => {
                self.open(
                    Element::block(BlockTag::ListItem).with_attr("id", format!("fn-{label}")),
                );
            }
            CmarkTag::HtmlBlock => self.open(Element::new(Tag::Unknown("html".to_string()))),
            _ => self.open(Element::new(Tag::Unknown("other".to_string()))),
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::CodeBlock => {
                self.close_into_parent();
                self.close_into_parent();
            }
            TagEnd::TableHead => {
                self.close_into_parent();
                self.close_into_parent();
                self.in_table_head = false;
                self.open(Element::block(BlockTag::TableBody));
            }
            TagEnd::Table => {
                if matches!(self.top().tag, Tag::Block(BlockTag::TableBody)) {
                    self.close_into_parent();
                }
                self.close_into_parent();
            }
            TagEnd::Image => {
                if let Some(mut img) = self.close() {
                    let alt = img.children.iter().map(Node::text_content).collect::<String>();
                    img.children.clear();
                    img.attributes.insert("alt".to_string(), alt);
                    self.top().children.push(Node::Element(img));
                }
            }
            TagEnd::BlockQuote(_) => {
                if let Some(mut quote) = self.close() {
                    if is_alert(&quote) {
                        quote.tag = Tag::Block(BlockTag::Div);
                        quote.attributes.insert("class".to_string(), ALERT_CLASS.to_string());
                    }
                    self.top().children.push(Node::Element(quote));
                }
            }
            TagEnd::FootnoteDefinition => {
                if let Some(def) = self.close() {
                    self.footnotes.push(Node::Element(def));
                }
            }
            _ => self.close_into_parent(),
        }
    }

    fn html(&mut self, html: &CowStr<'_>) {
        if BR_TAG_RE.is_match(html) {
            self.leaf(Element::inline(InlineTag::LineBreak));
            return;
        }
        let text = html_to_text(html);
        if text.is_empty() {
            return;
        }
        let in_html_block = matches!(&self.top().tag, Tag::Unknown(name) if name == "html");
        let top = self.top();
        if in_html_block && !top.children.is_empty() {
            top.push_text(" ");
        }
        top.push_text(&text);
    }

    fn finish(mut self) -> Vec<Node> {
        while self.stack.len() > 1 {
            self.close_into_parent();
        }
        let mut root = self.stack.pop().map(|r| r.children).unwrap_or_default();
        if !self.footnotes.is_empty() {
            let list = Element::block(BlockTag::OrderedList)
                .with_attr("start", "1")
                .with_children(std::mem::take(&mut self.footnotes));
            let section = Element::block(BlockTag::Section)
                .with_attr("class", FOOTNOTES_CLASS)
                .with_children(vec![list.into()]);
            root.push(section.into());
        }
        root
    }
}

fn is_alert(quote: &Element) -> bool {
    let Some(first) = quote.children.iter().find(|c| !c.is_blank_text()) else {
        return false;
    };
    match first {
        Node::Element(p) if p.tag == Tag::Block(BlockTag::Paragraph) => p
            .children
            .first()
            .is_some_and(|c| matches!(c, Node::Text(t) if ALERT_MARKER_RE.is_match(t))),
        _ => false,
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Highlighter key for a fence info string: the first word, lowercased, without a `language-`
/// prefix, a pandoc `{.lang}` / `{lang, opts}` wrapper or rustdoc-style `,attrs`.
fn fence_language(info: &str) -> Option<String> {
    let info = info.trim().trim_start_matches('{');
    let word = info
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '}'))
        .next()
        .unwrap_or_default()
        .trim_start_matches('.');
    let word = word.strip_prefix("language-").unwrap_or(word);
    (!word.is_empty()).then(|| word.to_ascii_lowercase())
}

/// Visible text of a raw HTML fragment. Comments and `<script>`/`<style>` bodies are dropped,
/// block-level tags become word breaks, inline tags vanish, entities are decoded.
fn html_to_text(html: &str) -> String {
    let visible = HTML_HIDDEN_RE.replace_all(html, " ");
    let text = HTML_TAG_RE.replace_all(&visible, |caps: &Captures<'_>| {
        if is_block_tag(&caps[1]) { " " } else { "" }
    });
    decode_entities(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_block_tag(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "p" | "div"
            | "br"
            | "hr"
            | "li"
            | "ul"
            | "ol"
            | "table"
            | "tr"
            | "td"
            | "th"
            | "pre"
            | "blockquote"
            | "section"
            | "details"
            | "summary"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elements(nodes: &[Node]) -> Vec<&Element> {
        nodes.iter().filter_map(Node::as_element).collect()
    }

    #[test]
    fn fenced_code_becomes_pre_code_with_language() {
        let nodes = parse("```rs\nfn main() {}\n```\n", ParseOptions::default());
        let pre = elements(&nodes)[0];
        assert_eq!(pre.tag, Tag::Block(BlockTag::Pre));
        let code = pre.children[0].as_element().map(|c| (c.attr("class"), c.text_content()));
        assert_eq!(
            code,
            Some((Some("language-rs"), "fn main() {}\n".to_string()))
        );
    }

    #[test]
    fn table_has_head_row_and_body() {
        let md = "| a | b |\n|:--|--:|\n| 1 | 2 |\n";
        let nodes = parse(md, ParseOptions::default());
        let table = elements(&nodes)[0];
        assert_eq!(table.tag, Tag::Block(BlockTag::Table));
        let parts = elements(&table.children);
        assert_eq!(parts[0].tag, Tag::Block(BlockTag::TableHead));
        assert_eq!(parts[1].tag, Tag::Block(BlockTag::TableBody));
        let head_row = elements(&parts[0].children)[0];
        let heads = elements(&head_row.children);
        assert_eq!(heads[0].tag, Tag::Block(BlockTag::TableHeaderCell));
        assert_eq!(heads[0].attr("align"), Some("left"));
        assert_eq!(heads[1].attr("align"), Some("right"));
        assert_eq!(parts[1].text_content(), "12");
    }

    #[test]
    fn alert_blockquote_becomes_div() {
        let nodes = parse("> [!WARNING]\n> Careful", ParseOptions::default());
        let div = elements(&nodes)[0];
        assert_eq!(div.tag, Tag::Block(BlockTag::Div));
        assert!(div.has_class(ALERT_CLASS));
        assert_eq!(div.text_content(), "[!WARNING] Careful");

        let plain = parse("> [link](x) quote", ParseOptions::default());
        assert_eq!(elements(&plain)[0].tag, Tag::Block(BlockTag::Blockquote));
    }

    #[test]
    fn soft_breaks_follow_options() {
        let md = "one\ntwo";
        let joined = parse(md, ParseOptions::default());
        assert_eq!(joined[0].text_content(), "one two");
        let kept = parse(
            md,
            ParseOptions {
                preserve_new_lines: true,
            },
        );
        assert_eq!(kept[0].text_content(), "one\ntwo");
    }

    #[test]
    fn image_alt_moves_to_attribute() {
        let nodes = parse("![a *cat*](cat.png \"Cat\")", ParseOptions::default());
        let p = elements(&nodes)[0];
        let img = elements(&p.children)[0];
        assert_eq!(img.tag, Tag::Inline(InlineTag::Image));
        assert_eq!(img.attr("alt"), Some("a cat"));
        assert_eq!(img.attr("src"), Some("cat.png"));
        assert_eq!(img.attr("title"), Some("Cat"));
        assert!(img.children.is_empty());
    }

    #[test]
    fn footnotes_collect_into_trailing_section() {
        let md = "Claim[^1].\n\n[^1]: Source.\n";
        let nodes = parse(md, ParseOptions::default());
        let section = *elements(&nodes).last().expect("section");
        assert_eq!(section.tag, Tag::Block(BlockTag::Section));
        assert!(section.has_class(FOOTNOTES_CLASS));
        assert_eq!(section.text_content(), "Source.");
        assert_eq!(nodes[0].text_content(), "Claim1.");
    }

    #[test]
    fn task_markers_become_text() {
        let nodes = parse("- [x] done\n- [ ] todo\n", ParseOptions::default());
        assert_eq!(nodes[0].text_content(), "[✓] done[ ] todo");
    }

    #[test]
    fn inline_html_keeps_text_and_breaks() {
        let nodes = parse("a<br>b <b>c</b>", ParseOptions::default());
        assert_eq!(nodes[0].text_content(), "a\nb c");
    }

    #[test]
    fn fence_info_strings_reduce_to_a_language() {
        assert_eq!(fence_language("rust,ignore").as_deref(), Some("rust"));
        assert_eq!(fence_language("{.Python .numberLines}").as_deref(), Some("python"));
        assert_eq!(fence_language("{r, echo=FALSE}").as_deref(), Some("r"));
        assert_eq!(fence_language("language-ts title=\"a.ts\"").as_deref(), Some("ts"));
        assert_eq!(fence_language("  {} "), None);
    }

    #[test]
    fn html_blocks_keep_only_visible_text() {
        assert_eq!(
            html_to_text("<div>one</div><div>two &amp; three</div>"),
            "one two & three"
        );
        assert_eq!(
            html_to_text("<style>p { color: red }</style><p>shown</p><!-- hidden -->"),
            "shown"
        );
        assert_eq!(html_to_text("<script>alert(1)</script>"), "");
        assert_eq!(html_to_text("<b>bo</b>ld"), "bold");
    }
}
