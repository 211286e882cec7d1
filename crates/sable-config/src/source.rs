//! Configuration sources and the layered root.

use crate::binder;
use crate::change_token::{ChangeToken, CompositeChangeToken, ReloadToken};
use crate::data::{ConfigurationData, KEY_DELIMITER};
use sable_common::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// One layer of configuration.
pub trait ConfigurationSource: Send + Sync {
    fn name(&self) -> &str;

    /// Current contents of the layer.
    fn data(&self) -> Arc<ConfigurationData>;

    /// Fires the next time `data` changes.
    fn reload_token(&self) -> Box<dyn ChangeToken>;
}

/// Fixed in-memory layer.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    data: Arc<ConfigurationData>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: ConfigurationData) -> Self {
        Self {
            name: name.into(),
            data: Arc::new(data),
        }
    }

    /// Layer from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::from(e).context(format!("Failed to read {}", path.display())))?;
        let data = yaml_to_data(&content).map_err(|e| e.context(format!("Failed to parse {}", path.display())))?;
        debug!("Loaded {} keys from {}", data.len(), path.display());
        Ok(Self::new(path.display().to_string(), data))
    }

    /// Layer from environment variables starting with `prefix`.
    ///
    /// `SABLE_NS__NAME=orders` with prefix `SABLE_` becomes `NS:NAME`.
    pub fn from_env_vars(prefix: &str, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let data = vars
            .into_iter()
            .filter_map(|(key, value)| {
                let head = key.get(..prefix.len())?;
                if !head.eq_ignore_ascii_case(prefix) {
                    return None;
                }
                let rest = &key[prefix.len()..];
                if rest.is_empty() {
                    return None;
                }
                Some((rest.replace("__", KEY_DELIMITER), value))
            })
            .collect();
        Self::new("environment", data)
    }

    /// Layer from `key=value` overrides.
    pub fn from_overrides<S: AsRef<str>>(name: impl Into<String>, overrides: &[S]) -> Result<Self> {
        let data = overrides
            .iter()
            .map(|o| parse_override(o.as_ref()))
            .collect::<Result<ConfigurationData>>()?;
        Ok(Self::new(name, data))
    }
}

impl ConfigurationSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn data(&self) -> Arc<ConfigurationData> {
        Arc::clone(&self.data)
    }

    fn reload_token(&self) -> Box<dyn ChangeToken> {
        // Never fires.
        Box::new(ReloadToken::new())
    }
}

/// Splits `key=value`.
pub fn parse_override(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| Error::validation(format!("Expected key=value, got '{}'", s)))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::validation(format!("Empty key in '{}'", s)));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Flattens a YAML document into `a:b:0` style keys.
pub fn yaml_to_data(content: &str) -> Result<ConfigurationData> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| Error::validation(format!("Invalid YAML: {}", e)))?;

    let mut data = ConfigurationData::new();
    match &value {
        serde_yaml::Value::Null => {}
        serde_yaml::Value::Mapping(_) => flatten_yaml("", &value, &mut data),
        _ => return Err(Error::validation("Top level YAML must be a mapping")),
    }
    Ok(data)
}

fn flatten_yaml(path: &str, value: &serde_yaml::Value, out: &mut ConfigurationData) {
    let join = |segment: &str| {
        if path.is_empty() {
            segment.to_string()
        } else {
            format!("{}{}{}", path, KEY_DELIMITER, segment)
        }
    };

    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, child) in map {
                if let Some(segment) = yaml_scalar(key) {
                    flatten_yaml(&join(&segment), child, out);
                }
            }
        }
        serde_yaml::Value::Sequence(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten_yaml(&join(&i.to_string()), child, out);
            }
        }
        serde_yaml::Value::Tagged(tagged) => flatten_yaml(path, &tagged.value, out),
        scalar => {
            if let Some(text) = yaml_scalar(scalar) {
                out.insert(path, text);
            }
        }
    }
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        _ => None,
    }
}

/// Ordered configuration layers; later layers override earlier ones.
pub struct ConfigurationRoot {
    sources: Vec<Arc<dyn ConfigurationSource>>,
}

impl ConfigurationRoot {
    pub fn new(sources: Vec<Arc<dyn ConfigurationSource>>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[Arc<dyn ConfigurationSource>] {
        &self.sources
    }

    /// Merged view of all layers.
    pub fn snapshot(&self) -> ConfigurationData {
        let mut merged = ConfigurationData::new();
        for source in &self.sources {
            merged.merge(&source.data());
        }
        merged
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.sources
            .iter()
            .rev()
            .find_map(|source| source.data().get(key).map(str::to_string))
    }

    /// Fires when any layer reloads.
    pub fn reload_token(&self) -> CompositeChangeToken {
        CompositeChangeToken::new(self.sources.iter().map(|s| s.reload_token()).collect())
    }

    pub fn bind<T: DeserializeOwned>(&self, section: &str) -> Result<T> {
        binder::bind(&self.snapshot(), section)
    }
}

impl std::fmt::Debug for ConfigurationRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("ConfigurationRoot").field("sources", &names).finish()
    }
}
