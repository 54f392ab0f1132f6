//! cliclack theme

use cliclack::ThemeState;
use console::Style;

/// Green-on-dim theme for lifecycle output
#[derive(Debug, Clone, Default)]
pub struct SwcacheTheme;

impl cliclack::Theme for SwcacheTheme {
    fn bar_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().green(),
            ThemeState::Error(_) => Style::new().red(),
            ThemeState::Cancel => Style::new().dim(),
            ThemeState::Submit => Style::new().green().dim(),
        }
    }

    fn state_symbol_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().green(),
            ThemeState::Error(_) => Style::new().red(),
            ThemeState::Cancel => Style::new().dim(),
            ThemeState::Submit => Style::new().cyan(),
        }
    }
}

/// Install the theme globally. Call once before any output.
pub fn init_theme() {
    cliclack::set_theme(SwcacheTheme);
}
