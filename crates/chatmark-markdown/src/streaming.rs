use crate::document::MessageRenderer;
use crate::document::RenderedMessage;
use crate::pipeline;
use crate::render::RenderOptions;

/// Accumulates a streamed message and keeps one rendered pass of the whole text.
///
/// Every update re-runs the full pipeline over the accumulated text, so incomplete constructs
/// (open fences, unterminated math, an annotation still being written) render the same way they
/// would if the stream stopped right there. Handles from the previous pass are released first.
///
/// ```rust,no_run
/// use chatmark_markdown::streaming::MessageStream;
///
/// let mut stream = MessageStream::default();
/// stream.append("```rust\nfn main() {");
/// stream.append("}\n```\n");
/// stream.finalize();
/// assert_eq!(stream.copy_text(), "```rust\nfn main() {}\n```");
/// ```
#[derive(Default)]
pub struct MessageStream {
    raw: String,
    renderer: MessageRenderer,
    rendered: RenderedMessage,
    finished: bool,
    derived: Derived,
}

#[derive(Default)]
struct Derived {
    display: Option<String>,
    copy: Option<String>,
    speech: Option<String>,
}

impl MessageStream {
    pub fn new(options: RenderOptions) -> Self {
        Self::with_renderer(MessageRenderer::with_options(options))
    }

    pub fn with_renderer(renderer: MessageRenderer) -> Self {
        Self {
            raw: String::new(),
            renderer,
            rendered: RenderedMessage::default(),
            finished: false,
            derived: Derived::default(),
        }
    }

    pub fn append(&mut self, delta: &str) -> &RenderedMessage {
        if self.finished {
            tracing::debug!(len = delta.len(), "append after finalize; reopening stream");
            self.finished = false;
        }
        self.raw.push_str(delta);
        self.rerender()
    }

    /// The whole message was replaced (edit, regenerate). Renders `text` from scratch.
    pub fn replace(&mut self, text: &str) -> &RenderedMessage {
        self.raw.clear();
        self.raw.push_str(text);
        self.rerender()
    }

    /// Marks the stream complete and renders the final pass.
    pub fn finalize(&mut self) -> &RenderedMessage {
        self.finished = true;
        self.rerender()
    }

    pub fn reset(&mut self) {
        self.raw.clear();
        self.renderer.release();
        self.rendered = RenderedMessage::default();
        self.finished = false;
        self.derived = Derived::default();
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn rendered(&self) -> &RenderedMessage {
        &self.rendered
    }

    pub fn renderer(&self) -> &MessageRenderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut MessageRenderer {
        &mut self.renderer
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn display_markdown(&mut self) -> &str {
        self.derived
            .display
            .get_or_insert_with(|| pipeline::normalize(&self.raw))
    }

    /// Clipboard text: the sanitized message.
    pub fn copy_text(&mut self) -> &str {
        self.derived
            .copy
            .get_or_insert_with(|| pipeline::sanitize(&self.raw))
    }

    /// Text-to-speech input.
    pub fn speech_text(&mut self) -> &str {
        self.derived
            .speech
            .get_or_insert_with(|| pipeline::to_plain_text(&self.raw))
    }

    fn rerender(&mut self) -> &RenderedMessage {
        self.derived = Derived::default();
        self.rendered = self.renderer.render(&self.raw);
        &self.rendered
    }
}
