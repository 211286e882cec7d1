//! Binds configuration sections to typed options.
//!
//! # Rust Learning Note
//!
//! Instead of a reflection based binder, the flat keys of a section are
//! folded into a `serde_json::Value` tree and handed to serde:
//!
//! ```text
//! ns:Name          = orders        {
//! ns:Tags:0        = blue     =>     "name": "orders",
//! ns:Tags:1        = green           "tags": ["blue", "green"],
//! ns:checkInterval = 15s             "check_interval": "15s"
//!                                  }
//! ```
//!
//! - key segments are normalized to snake_case so `checkInterval`,
//!   `CHECK_INTERVAL` and `check-interval` all land on `check_interval`
//! - objects whose keys are all numbers become arrays, ordered by index
//! - every leaf stays a string; option types parse text with the helpers in
//!   [`sable_common::serde_ext`]

use crate::data::{ConfigurationData, KEY_DELIMITER};
use sable_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Binds `section` of `data` to `T`.
pub fn bind<T: DeserializeOwned>(data: &ConfigurationData, section: &str) -> Result<T> {
    let tree = section_tree(data, section);
    serde_json::from_value(tree).map_err(|e| Error::binding(section, e))
}

/// The JSON tree `bind` deserializes from.
pub fn section_tree(data: &ConfigurationData, section: &str) -> Value {
    let mut root = Value::Object(Map::new());

    for (key, value) in data.section(section) {
        let segments: Vec<String> = key.split(KEY_DELIMITER).map(normalize_segment).collect();
        insert_path(&mut root, &segments, value);
    }

    arrayify(root)
}

fn insert_path(node: &mut Value, segments: &[String], value: &str) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };

    if !node.is_object() {
        // A leaf that also has children: the children win.
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };

    if rest.is_empty() {
        // Don't let a leaf clobber an existing subtree.
        if !matches!(map.get(first), Some(Value::Object(_))) {
            map.insert(first.clone(), Value::String(value.to_string()));
        }
        return;
    }

    let child = map.entry(first.clone()).or_insert_with(|| Value::Object(Map::new()));
    insert_path(child, rest, value);
}

fn arrayify(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let all_indexed = !map.is_empty() && map.keys().all(|k| k.parse::<usize>().is_ok());
            if all_indexed {
                let mut items: Vec<(usize, Value)> = map
                    .into_iter()
                    .filter_map(|(k, v)| k.parse::<usize>().ok().map(|i| (i, arrayify(v))))
                    .collect();
                items.sort_by_key(|(i, _)| *i);
                Value::Array(items.into_iter().map(|(_, v)| v).collect())
            } else {
                Value::Object(map.into_iter().map(|(k, v)| (k, arrayify(v))).collect())
            }
        }
        other => other,
    }
}

/// `checkInterval` / `CHECK_INTERVAL` / `check-interval` -> `check_interval`.
pub fn normalize_segment(segment: &str) -> String {
    let chars: Vec<char> = segment.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if matches!(c, '-' | ' ' | '.' | '_') {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }

        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
        }

        out.extend(c.to_lowercase());
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}
