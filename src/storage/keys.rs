use strum::{EnumIter, IntoEnumIterator};

pub const DEFAULT_KEY_PREFIX: &str = "@ThousandMonths";

/// Onboarding wizard progress lives outside the application namespace.
pub const ONBOARDING_KEY: &str = "onboardingProgress";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum EntityKey {
    UserData,
    ContentItems,
    Seasons,
    FocusAreas,
    UserSettings,
    Categories,
    UserBirthDate,
    Theme,
}

impl EntityKey {
    pub fn name(self) -> &'static str {
        match self {
            EntityKey::UserData => "userData",
            EntityKey::ContentItems => "contentItems",
            EntityKey::Seasons => "seasons",
            EntityKey::FocusAreas => "focusAreas",
            EntityKey::UserSettings => "userSettings",
            EntityKey::Categories => "categories",
            EntityKey::UserBirthDate => "userBirthDate",
            EntityKey::Theme => "theme",
        }
    }
}

/// Namespaces entity keys as `<prefix>:<entityName>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key(&self, entity: EntityKey) -> String {
        format!("{}:{}", self.prefix, entity.name())
    }

    pub fn all(&self) -> Vec<String> {
        EntityKey::iter().map(|entity| self.key(entity)).collect()
    }

    /// Whether a raw storage key belongs to this application.
    pub fn owns(&self, key: &str) -> bool {
        key == ONBOARDING_KEY
            || key
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|rest| rest.starts_with(':'))
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}
