use crate::storage::Preferences;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dark" => Some(Self::Dark),
            "light" => Some(Self::Light),
            _ => None,
        }
    }
}

/// Stored preference wins; without one the system preference is followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemeController {
    stored: Option<Theme>,
    system: Theme,
}

impl ThemeController {
    pub fn new(stored: Option<Theme>, system: Theme) -> Self {
        Self { stored, system }
    }

    pub fn from_prefs(prefs: &Preferences, system: Theme) -> Self {
        Self::new(prefs.theme, system)
    }

    pub fn current(&self) -> Theme {
        self.stored.unwrap_or(self.system)
    }

    pub fn follows_system(&self) -> bool {
        self.stored.is_none()
    }

    /// Flips the active theme and pins it as an explicit preference.
    pub fn toggle(&mut self) -> Theme {
        let next = self.current().flipped();
        self.stored = Some(next);
        next
    }

    pub fn set(&mut self, theme: Option<Theme>) {
        self.stored = theme;
    }

    /// Returns the new active theme when the change is visible.
    pub fn system_changed(&mut self, system: Theme) -> Option<Theme> {
        let before = self.current();
        self.system = system;
        let after = self.current();
        (before != after).then_some(after)
    }

    /// Value for the root element's `data-theme` attribute.
    pub fn data_theme(&self) -> Option<&'static str> {
        match self.current() {
            Theme::Dark => Some("dark"),
            Theme::Light => None,
        }
    }

    pub fn store_into(&self, prefs: &mut Preferences) {
        prefs.theme = self.stored;
    }
}

/// Best-effort guess at the desktop preference; honours `COLORFGBG` as
/// exported by most terminals and defaults to dark.
pub fn detect_system_theme() -> Theme {
    let Ok(raw) = std::env::var("COLORFGBG") else {
        return Theme::Dark;
    };
    match raw.rsplit(';').next().and_then(|bg| bg.parse::<u8>().ok()) {
        Some(7) | Some(15) => Theme::Light,
        _ => Theme::Dark,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_preference_follows_system() {
        let mut theme = ThemeController::new(None, Theme::Light);
        assert_eq!(theme.current(), Theme::Light);
        assert_eq!(theme.system_changed(Theme::Dark), Some(Theme::Dark));
        assert!(theme.follows_system());
    }

    #[test]
    fn stored_preference_ignores_system_changes() {
        let mut theme = ThemeController::new(Some(Theme::Light), Theme::Dark);
        assert_eq!(theme.system_changed(Theme::Light), None);
        assert_eq!(theme.system_changed(Theme::Dark), None);
        assert_eq!(theme.current(), Theme::Light);
    }

    #[test]
    fn toggle_pins_preference() {
        let mut theme = ThemeController::new(None, Theme::Dark);
        assert_eq!(theme.toggle(), Theme::Light);
        let mut prefs = Preferences::default();
        theme.store_into(&mut prefs);
        assert_eq!(prefs.theme, Some(Theme::Light));
        assert_eq!(theme.data_theme(), None);
    }
}
