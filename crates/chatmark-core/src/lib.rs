//! `chatmark-core` holds the small pieces the chatmark renderers share with host applications.
//!
//! - [`theme::Theme`]: the immutable style record a render pass reads from.
//! - [`text::CodeHighlighter`]: the seam for delegated syntax highlighting.
//! - [`text`] span helpers used when laying out tables and prefixes.
//!
//! Nothing here parses markdown; that lives in `chatmark-markdown`.
pub mod text;
pub mod theme;
