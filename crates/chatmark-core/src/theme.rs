use ratatui::style::Modifier;
use ratatui::style::Style;

/// The immutable style record a render pass reads from.
///
/// Resolve it once from the host theme and pass it by reference; the renderers never mutate it.
#[derive(Clone, Debug)]
pub struct Theme {
    pub text_primary: Style,
    pub text_muted: Style,
    pub accent: Style,
    pub danger: Style,
    pub link: Style,
    pub code_inline: Style,
    pub code_block: Style,
    pub math: Style,
    pub quote: Style,
    pub rule: Style,
    /// Heading tiers, `headings[0]` is `#`, `headings[5]` is `######`.
    pub headings: [Style; 6],
    pub alert_note: Style,
    pub alert_tip: Style,
    pub alert_important: Style,
    pub alert_warning: Style,
    pub alert_caution: Style,
    pub annotation: Style,
}

impl Theme {
    /// Style tier for a heading level. Levels outside `1..=6` clamp to the nearest tier.
    pub fn heading(&self, level: u8) -> Style {
        let idx = usize::from(level.clamp(1, 6)) - 1;
        self.headings[idx]
    }
}

impl Default for Theme {
    fn default() -> Self {
        use ratatui::style::Stylize;

        let bold = Style::default().add_modifier(Modifier::BOLD);
        Self {
            text_primary: Style::default(),
            text_muted: Style::default().dark_gray(),
            accent: Style::default().cyan(),
            danger: Style::default().red(),
            link: Style::default().cyan().add_modifier(Modifier::UNDERLINED),
            code_inline: Style::default().cyan(),
            code_block: Style::default(),
            math: Style::default().magenta(),
            quote: Style::default().dark_gray(),
            rule: Style::default().dark_gray(),
            headings: [
                bold.add_modifier(Modifier::UNDERLINED),
                bold,
                bold.cyan(),
                bold.dark_gray(),
                Style::default().add_modifier(Modifier::ITALIC),
                Style::default().dark_gray().add_modifier(Modifier::ITALIC),
            ],
            alert_note: Style::default().blue(),
            alert_tip: Style::default().green(),
            alert_important: Style::default().magenta(),
            alert_warning: Style::default().yellow(),
            alert_caution: Style::default().red(),
            annotation: Style::default().dark_gray().add_modifier(Modifier::ITALIC),
        }
    }
}
