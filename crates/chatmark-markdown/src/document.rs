//! One render pass, end to end.
//!
//! ```rust,no_run
//! use chatmark_core::theme::Theme;
//! use chatmark_markdown::document::MessageRenderer;
//! use chatmark_markdown::layout::LayoutOptions;
//!
//! let mut renderer = MessageRenderer::new();
//! let rendered = renderer.render("Hello *world*, $e^{i\\pi}$");
//! let text = rendered.to_text(&Theme::default(), &LayoutOptions::default());
//! # let _ = text;
//! ```
//!
//! A pass runs normalize, soften, LaTeX extraction, annotation split, parse and render. The handles
//! of the previous pass are released before anything new is built, so a renderer reused across a
//! stream never accumulates them.
use crate::annotations::split_annotations;
use crate::annotations::Annotation;
use crate::annotations::Chunk;
use crate::ast;
use crate::ast::ParseOptions;
use crate::block::BlockRenderer;
use crate::handles::HandleScope;
use crate::handles::LinkCallback;
use crate::handles::SpanHandle;
use crate::handles::TapAction;
use crate::latex::LatexShield;
use crate::layout;
use crate::layout::LayoutOptions;
use crate::layout::LinkTargets;
use crate::pipeline;
use crate::render::ImageBuilder;
use crate::render::RenderContext;
use crate::render::RenderOptions;
use crate::visual::VisualBlock;
use chatmark_core::text::CodeHighlighter;
use chatmark_core::text::PlainCode;
use chatmark_core::theme::Theme;
use ratatui::text::Text;
use std::sync::Arc;

/// Output of one pass. Span handles inside resolve only until the next pass.
#[derive(Clone, Debug, Default)]
pub struct RenderedMessage {
    blocks: Vec<VisualBlock>,
    links: LinkTargets,
    generation: u64,
    placeholders: usize,
}

impl RenderedMessage {
    pub fn blocks(&self) -> &[VisualBlock] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<VisualBlock> {
        self.blocks
    }

    /// Handle generation of the pass that built this message.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Math spans extracted during the pass.
    pub fn placeholders(&self) -> usize {
        self.placeholders
    }

    pub fn link_target(&self, handle: SpanHandle) -> Option<&str> {
        self.links.get(&handle).map(String::as_str)
    }

    /// Every span handle in document order.
    pub fn handles(&self) -> Vec<SpanHandle> {
        let mut out = Vec::new();
        for block in &self.blocks {
            block.for_each_span(&mut |span| {
                if let Some(h) = span.handle() {
                    if out.last() != Some(&h) {
                        out.push(h);
                    }
                }
            });
        }
        out
    }

    pub fn to_text(&self, theme: &Theme, options: &LayoutOptions) -> Text<'static> {
        layout::layout(&self.blocks, theme, options, &self.links)
    }

    /// Block-per-paragraph plain projection.
    pub fn plain(&self) -> String {
        self.blocks
            .iter()
            .map(VisualBlock::plain)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub struct MessageRenderer {
    theme: Theme,
    options: RenderOptions,
    handles: HandleScope,
    highlighter: Option<Arc<dyn CodeHighlighter + Send + Sync>>,
    image_builder: Option<Arc<ImageBuilder>>,
}

impl Default for MessageRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageRenderer {
    pub fn new() -> Self {
        Self::with_options(RenderOptions::default())
    }

    pub fn with_options(options: RenderOptions) -> Self {
        Self {
            theme: Theme::default(),
            options,
            handles: HandleScope::new(),
            highlighter: None,
            image_builder: None,
        }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: RenderOptions) {
        self.options = options;
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    pub fn set_link_callback(&mut self, on_link: Option<LinkCallback>) {
        self.handles.set_link_callback(on_link);
    }

    pub fn set_highlighter(&mut self, highlighter: Option<Arc<dyn CodeHighlighter + Send + Sync>>) {
        self.highlighter = highlighter;
    }

    pub fn set_image_builder(&mut self, builder: Option<Arc<ImageBuilder>>) {
        self.image_builder = builder;
    }

    pub fn handles(&self) -> &HandleScope {
        &self.handles
    }

    /// Activates a span handle from the latest pass.
    pub fn activate(&self, handle: SpanHandle) -> Option<TapAction> {
        self.handles.activate(handle)
    }

    /// Releases the latest pass's handles, e.g. when its output leaves the screen.
    pub fn release(&mut self) -> usize {
        self.handles.release_all()
    }

    pub fn render(&mut self, raw: &str) -> RenderedMessage {
        let released = self.handles.release_all();

        let normalized = pipeline::normalize(raw);
        let softened = match self.options.soften_inline_code {
            Some(chunk) => pipeline::soften_inline_code(&normalized, chunk),
            None => normalized,
        };
        let mut shield = LatexShield::new();
        let extracted = shield.extract(&softened);
        let parse_options = ParseOptions {
            preserve_new_lines: self.options.preserve_new_lines,
        };

        let highlighter: &dyn CodeHighlighter = match &self.highlighter {
            Some(h) => h.as_ref(),
            None => &PlainCode,
        };
        let mut ctx = RenderContext::new(&self.theme, &self.options, &shield, &mut self.handles)
            .with_highlighter(highlighter)
            .with_image_builder(self.image_builder.as_deref());

        let mut blocks = Vec::new();
        for chunk in split_annotations(&extracted) {
            match chunk {
                Chunk::Markdown(text) => {
                    let nodes = ast::parse(&text, parse_options);
                    blocks.extend(BlockRenderer::new(&mut ctx).render(&nodes));
                }
                Chunk::Annotation(annotation) => {
                    blocks.push(annotation_block(&mut ctx, annotation, parse_options));
                }
            }
        }

        let mut links = LinkTargets::new();
        for block in &blocks {
            block.for_each_span(&mut |span| {
                if let Some(h) = span.handle()
                    && let Some(href) = ctx.handles.link_href(h)
                {
                    links.insert(h, href.to_string());
                }
            });
        }

        tracing::trace!(
            blocks = blocks.len(),
            placeholders = shield.len(),
            handles = ctx.handles.live(),
            released,
            "render pass"
        );
        RenderedMessage {
            blocks,
            links,
            generation: ctx.handles.generation(),
            placeholders: shield.len(),
        }
    }
}

fn annotation_block(
    ctx: &mut RenderContext<'_>,
    annotation: Annotation,
    parse_options: ParseOptions,
) -> VisualBlock {
    let nodes = ast::parse(&annotation.body, parse_options);
    let body = BlockRenderer::new(ctx).render(&nodes);
    let shield = ctx.shield;
    VisualBlock::Annotation {
        kind: annotation.kind,
        done: annotation.done,
        title: annotation.title.map(|t| shield.restore_source(&t)),
        attributes: annotation
            .attributes
            .into_iter()
            .map(|(k, v)| (k, shield.restore_source(&v)))
            .collect(),
        body,
    }
}
