//! Flat, case-insensitive configuration data.

use std::collections::BTreeMap;

/// Separator between hierarchy levels in configuration keys.
pub const KEY_DELIMITER: &str = ":";

/// Flat `section:key -> value` mapping.
///
/// Lookups ignore ASCII case. When two keys differ only in case the later
/// insert wins, keeping the later spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationData {
    // lowercased key -> (original key, value)
    entries: BTreeMap<String, (String, String)>,
}

impl ConfigurationData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.entries.insert(key.to_ascii_lowercase(), (key, value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order, with their original spelling.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Overlays `other` on top of `self`.
    pub fn merge(&mut self, other: &ConfigurationData) {
        for (lowered, entry) in &other.entries {
            self.entries.insert(lowered.clone(), entry.clone());
        }
    }

    /// Entries below `section`, keyed relative to it.
    pub fn section(&self, section: &str) -> Vec<(&str, &str)> {
        if section.is_empty() {
            return self.iter().collect();
        }

        let prefix = format!("{}{}", section.to_ascii_lowercase(), KEY_DELIMITER);
        self.entries
            .range(prefix.clone()..)
            .take_while(|(lowered, _)| lowered.starts_with(&prefix))
            .map(|(_, (key, value))| (&key[prefix.len()..], value.as_str()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConfigurationData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut data = Self::new();
        for (key, value) in iter {
            data.insert(key, value);
        }
        data
    }
}
