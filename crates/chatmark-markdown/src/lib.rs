//! Streaming-safe rendering of LLM chat messages for terminal UIs.
//!
//! A message arrives token by token and may contain half-written code fences, LaTeX math that a
//! markdown parser would mangle, reasoning / tool-call annotation blocks and link reference
//! definitions nobody wants on screen. This crate turns such text into styled visuals.
//!
//! ## Layers
//!
//! - [`pipeline`]: pure text transforms (`normalize`, `sanitize`, `to_plain_text`,
//!   `soften_inline_code`). Also usable on their own for copy and speech strings.
//! - [`latex::LatexShield`]: swaps math spans for placeholders before parsing and resolves them
//!   afterwards.
//! - [`block::BlockRenderer`] / [`inline::InlineRenderer`]: render the parsed tree ([`ast`]) into
//!   [`visual`] nodes.
//! - [`document::MessageRenderer`]: one full pass, raw text in, [`document::RenderedMessage`] out.
//! - [`streaming::MessageStream`]: accumulates deltas and re-renders on every update.
//! - [`layout`]: flattens visuals into `ratatui` `Text` for a given width.
pub mod annotations;
pub mod ast;
pub mod block;
pub mod document;
pub mod error;
pub mod handles;
pub mod inline;
pub mod latex;
pub mod layout;
pub mod pipeline;
pub mod render;
pub mod streaming;
pub mod visual;

mod scan;
mod urls;

pub use document::MessageRenderer;
pub use document::RenderedMessage;
pub use handles::SpanHandle;
pub use handles::TapAction;
pub use latex::LatexShield;
pub use latex::Segment;
pub use pipeline::normalize;
pub use pipeline::sanitize;
pub use pipeline::soften_inline_code;
pub use pipeline::to_plain_text;
pub use render::RenderOptions;
pub use streaming::MessageStream;
