use indexmap::IndexMap;

use crate::model::category::validate_color;

/// Named accent colours accepted in config alongside raw `#rrggbb` values.
#[derive(Debug, Clone)]
pub struct AccentPalette {
    presets: IndexMap<&'static str, &'static str>,
}

impl AccentPalette {
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn all(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.presets.iter().map(|(name, hex)| (*name, *hex))
    }

    /// Resolves a preset name (case-insensitive) or passes a valid hex value through.
    pub fn resolve(&self, value: &str) -> Option<String> {
        let value = value.trim();
        if let Some(hex) = self.lookup(value) {
            return Some(hex.to_owned());
        }
        validate_color(value).ok().map(|()| value.to_owned())
    }

    fn lookup(&self, name: &str) -> Option<&'static str> {
        self.presets
            .iter()
            .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
            .map(|(_, hex)| *hex)
    }
}

impl Default for AccentPalette {
    fn default() -> Self {
        let presets = [
            ("ocean", "#0077b6"),
            ("forest", "#2d6a4f"),
            ("sunset", "#f77f00"),
            ("rose", "#e5383b"),
            ("lavender", "#7b2cbf"),
            ("slate", "#475569"),
        ]
        .into_iter()
        .collect();
        Self { presets }
    }
}
