//! Per-pass render configuration shared by the block and inline renderers.
use crate::handles::HandleScope;
use crate::latex::LatexShield;
use crate::visual::VisualBlock;
use chatmark_core::text::CodeHighlighter;
use chatmark_core::text::PlainCode;
use chatmark_core::theme::Theme;

/// Builds the visual for a standalone image: `(src, alt, title)`.
pub type ImageBuilder = dyn Fn(&str, Option<&str>, Option<&str>) -> VisualBlock + Send + Sync;

#[derive(Clone, Debug)]
pub struct RenderOptions {
    /// Soft line breaks inside paragraphs render as line breaks.
    pub preserve_new_lines: bool,
    /// Inline code longer than this many characters gets wrap opportunities. `None` disables it.
    pub soften_inline_code: Option<usize>,
    /// Base for relative link and image destinations.
    pub base_url: Option<String>,
    /// Code blocks longer than this are not sent to the highlighter.
    pub max_highlight_lines: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            preserve_new_lines: false,
            soften_inline_code: Some(24),
            base_url: None,
            max_highlight_lines: 400,
        }
    }
}

/// Everything one render pass reads, plus the handle scope it writes into.
pub struct RenderContext<'a> {
    pub theme: &'a Theme,
    pub options: &'a RenderOptions,
    pub shield: &'a LatexShield,
    pub handles: &'a mut HandleScope,
    pub highlighter: &'a dyn CodeHighlighter,
    pub image_builder: Option<&'a ImageBuilder>,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        theme: &'a Theme,
        options: &'a RenderOptions,
        shield: &'a LatexShield,
        handles: &'a mut HandleScope,
    ) -> Self {
        Self {
            theme,
            options,
            shield,
            handles,
            highlighter: &PlainCode,
            image_builder: None,
        }
    }

    pub fn with_highlighter(mut self, highlighter: &'a dyn CodeHighlighter) -> Self {
        self.highlighter = highlighter;
        self
    }

    pub fn with_image_builder(mut self, builder: Option<&'a ImageBuilder>) -> Self {
        self.image_builder = builder;
        self
    }

    pub(crate) fn base_url(&self) -> Option<&str> {
        self.options.base_url.as_deref()
    }
}
