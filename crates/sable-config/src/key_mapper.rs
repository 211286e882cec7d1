//! Registry key to configuration key mapping.

use crate::data::KEY_DELIMITER;
use sable_registry::KvPair;
use tracing::warn;

/// Decides which registry pairs are loaded and how they are named locally.
pub trait KeyMapper: Send + Sync {
    /// Registry prefix the mapper covers.
    fn prefix(&self) -> &str;

    fn should_load(&self, pair: &KvPair) -> bool;

    /// Local configuration key for a registry key accepted by `should_load`.
    fn map_key(&self, key: &str) -> String;

    /// Text of the value stored at registry `key`.
    fn decode_value(&self, key: &str, value: &[u8]) -> String;
}

/// Strips the prefix and turns `/` into `:`.
///
/// `config/orders/ns/name` under prefix `config/orders` becomes `ns:name`.
/// Folder entries (trailing `/`, or no value) and the prefix key itself are
/// skipped. Values are read as UTF-8; invalid bytes are replaced and logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultKeyMapper {
    prefix: String,
}

impl DefaultKeyMapper {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    fn relative<'a>(&self, key: &'a str) -> Option<&'a str> {
        let key = key.trim_start_matches('/');
        if self.prefix.is_empty() {
            return Some(key);
        }
        key.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }
}

impl KeyMapper for DefaultKeyMapper {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn should_load(&self, pair: &KvPair) -> bool {
        if pair.value.is_none() || pair.key.ends_with('/') {
            return false;
        }
        matches!(self.relative(&pair.key), Some(rest) if !rest.is_empty())
    }

    fn map_key(&self, key: &str) -> String {
        self.relative(key)
            .unwrap_or(key)
            .split('/')
            .collect::<Vec<_>>()
            .join(KEY_DELIMITER)
    }

    fn decode_value(&self, key: &str, value: &[u8]) -> String {
        match std::str::from_utf8(value) {
            Ok(text) => text.to_string(),
            Err(e) => {
                warn!(key = %key, "Configuration value is not valid UTF-8, replacing invalid bytes: {}", e);
                String::from_utf8_lossy(value).into_owned()
            }
        }
    }
}
