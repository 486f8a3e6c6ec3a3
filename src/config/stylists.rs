//! Maps stylist user ids to display names.
//!
//! Names come from the `[[stylists]]` entries in config.toml. Ids that are not
//! configured are shown as-is.

use std::collections::HashMap;

use crate::config::settings::StylistConfig;

/// Lookup table from user id to display name.
#[derive(Debug, Clone, Default)]
pub struct StylistDirectory {
    names: HashMap<String, String>,
}

impl StylistDirectory {
    /// Builds the directory from configured stylists. Later entries win on duplicate ids.
    #[must_use]
    pub fn from_config(stylists: &[StylistConfig]) -> Self {
        let names = stylists
            .iter()
            .map(|s| (s.id.clone(), s.name.clone()))
            .collect();
        Self { names }
    }

    /// Registers or renames a stylist.
    pub fn insert(&mut self, user_id: impl Into<String>, name: impl Into<String>) {
        self.names.insert(user_id.into(), name.into());
    }

    /// The configured name, if any.
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<&str> {
        self.names.get(user_id).map(String::as_str)
    }

    /// The configured name, or the user id itself.
    #[must_use]
    pub fn display_name(&self, user_id: &str) -> String {
        self.get(user_id).unwrap_or(user_id).to_string()
    }
}
