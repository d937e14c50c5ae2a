//! Interaction handles for tappable spans.
//!
//! A [`HandleScope`] lives across render passes and hands out [`SpanHandle`]s while one pass is
//! being built. Before the next pass starts, [`HandleScope::release_all`] drops every binding and
//! bumps the generation, so a handle kept from a superseded pass resolves to nothing.
use std::fmt;
use std::sync::Arc;

/// Link-tap callback: `(href, title)`.
pub type LinkCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpanHandle {
    generation: u64,
    index: usize,
}

impl SpanHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// What the host should do after a handle was activated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TapAction {
    /// A link was tapped. The link callback, when set, has already been invoked.
    OpenLink { href: String, title: String },
    /// A code chip was tapped; the host owns the clipboard.
    CopyRequested(String),
}

#[derive(Clone, Debug)]
enum Binding {
    Link { href: String, title: String },
    Copy(String),
}

#[derive(Default)]
pub struct HandleScope {
    generation: u64,
    bindings: Vec<Binding>,
    on_link: Option<LinkCallback>,
}

impl fmt::Debug for HandleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleScope")
            .field("generation", &self.generation)
            .field("live", &self.bindings.len())
            .field("on_link", &self.on_link.is_some())
            .finish()
    }
}

impl HandleScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_link_callback(on_link: LinkCallback) -> Self {
        Self {
            on_link: Some(on_link),
            ..Self::default()
        }
    }

    pub fn set_link_callback(&mut self, on_link: Option<LinkCallback>) {
        self.on_link = on_link;
    }

    pub fn create_link(&mut self, href: &str, title: &str) -> SpanHandle {
        self.bind(Binding::Link {
            href: href.to_string(),
            title: title.to_string(),
        })
    }

    /// Binds a copy-on-tap action. Zero-width break characters are removed from `text`.
    pub fn create_copy(&mut self, text: &str) -> SpanHandle {
        let text: String = text.chars().filter(|ch| !is_zero_width(*ch)).collect();
        self.bind(Binding::Copy(text))
    }

    fn bind(&mut self, binding: Binding) -> SpanHandle {
        self.bindings.push(binding);
        SpanHandle {
            generation: self.generation,
            index: self.bindings.len() - 1,
        }
    }

    /// Runs the action bound to `handle`. Handles from a released generation return `None`.
    pub fn activate(&self, handle: SpanHandle) -> Option<TapAction> {
        if handle.generation != self.generation {
            tracing::debug!(
                handle = handle.generation,
                current = self.generation,
                "stale span handle"
            );
            return None;
        }
        match self.bindings.get(handle.index)? {
            Binding::Link { href, title } => {
                if let Some(on_link) = &self.on_link {
                    on_link(href, title);
                }
                Some(TapAction::OpenLink {
                    href: href.clone(),
                    title: title.clone(),
                })
            }
            Binding::Copy(text) => Some(TapAction::CopyRequested(text.clone())),
        }
    }

    /// Releases every handle of the current generation and returns how many were live.
    pub fn release_all(&mut self) -> usize {
        let released = self.bindings.len();
        self.bindings.clear();
        self.generation = self.generation.wrapping_add(1);
        tracing::trace!(released, generation = self.generation, "released span handles");
        released
    }

    /// Destination of a live link handle, without activating it.
    pub fn link_href(&self, handle: SpanHandle) -> Option<&str> {
        if handle.generation != self.generation {
            return None;
        }
        match self.bindings.get(handle.index)? {
            Binding::Link { href, .. } => Some(href),
            Binding::Copy(_) => None,
        }
    }

    pub fn live(&self) -> usize {
        self.bindings.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

fn is_zero_width(ch: char) -> bool {
    matches!(ch, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}')
}
