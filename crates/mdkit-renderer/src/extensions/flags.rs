use std::sync::Arc;

use mdkit_plugin::Settings;

use crate::capability::{Capability, Extension, SettingsProvider};

/// Contributes its instance settings to the environment configuration.
///
/// Used for syntax the backend already implements behind a flag, such as
/// `tables = true`.
#[derive(Debug, Clone, Default)]
pub struct Flags {
    settings: Settings,
}

impl Flags {
    /// Contribute `settings` verbatim.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

impl SettingsProvider for Flags {
    fn settings(&self) -> Settings {
        self.settings.clone()
    }
}

impl Extension for Flags {
    fn capabilities(&self) -> &[Capability] {
        &[Capability::Settings]
    }

    fn as_settings_provider(self: Arc<Self>) -> Option<Arc<dyn SettingsProvider>> {
        Some(self)
    }
}
