//! Serde helpers for values that arrive as text.
//!
//! Configuration layers (files, environment, command line, registry KV)
//! all deliver strings, so typed options need deserializers that parse
//! numbers, booleans and durations out of text.

use std::time::Duration;

/// Parses a duration.
///
/// Accepted forms: `250ms`, `30s`, `5m`, `1h` and `hh:mm:ss`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.contains(':') {
        return parse_clock_duration(s);
    }

    // Check for "ms" BEFORE "s" since "ms" ends with 's'
    if let Some(num_str) = s.strip_suffix("ms") {
        let millis: u64 = num_str.parse().map_err(|_| format!("Invalid duration: {}", s))?;
        Ok(Duration::from_millis(millis))
    } else if let Some(num_str) = s.strip_suffix('s') {
        let secs: u64 = num_str.parse().map_err(|_| format!("Invalid duration: {}", s))?;
        Ok(Duration::from_secs(secs))
    } else if let Some(num_str) = s.strip_suffix('m') {
        let mins: u64 = num_str.parse().map_err(|_| format!("Invalid duration: {}", s))?;
        Ok(Duration::from_secs(mins * 60))
    } else if let Some(num_str) = s.strip_suffix('h') {
        let hours: u64 = num_str.parse().map_err(|_| format!("Invalid duration: {}", s))?;
        Ok(Duration::from_secs(hours * 3600))
    } else {
        Err(format!(
            "Duration must end with 'ms', 's', 'm' or 'h', or be hh:mm:ss: {}",
            s
        ))
    }
}

fn parse_clock_duration(s: &str) -> Result<Duration, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return Err(format!("Invalid duration: {}", s));
    }

    let hours: u64 = parts[0].parse().map_err(|_| format!("Invalid duration: {}", s))?;
    let mins: u64 = parts[1].parse().map_err(|_| format!("Invalid duration: {}", s))?;
    let secs: f64 = parts[2].parse().map_err(|_| format!("Invalid duration: {}", s))?;
    if mins >= 60 || !(0.0..60.0).contains(&secs) {
        return Err(format!("Invalid duration: {}", s));
    }

    Ok(Duration::from_secs(hours * 3600 + mins * 60) + Duration::from_secs_f64(secs))
}

/// Formats a duration the way the registry expects it (`30s`, `100ms`).
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        format!("{}s", duration.as_secs())
    } else if duration.subsec_nanos() % 1_000_000 == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}ns", duration.as_nanos())
    }
}

/// `#[serde(with = "...")]` module for `Duration`.
pub mod duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// `#[serde(with = "...")]` module for `Option<Duration>`.
///
/// Empty strings bind to `None`.
pub mod option_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&super::format_duration(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => super::parse_duration(&s).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// Deserializes any `FromStr` type from a string (or a bare number).
pub mod from_str {
    use serde::de::{self, Deserializer, Visitor};
    use std::fmt;
    use std::marker::PhantomData;
    use std::str::FromStr;

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: fmt::Display,
    {
        struct FromStrVisitor<T>(PhantomData<T>);

        impl<'de, T> Visitor<'de> for FromStrVisitor<T>
        where
            T: FromStr,
            T::Err: fmt::Display,
        {
            type Value = T;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<T, E> {
                v.trim().parse().map_err(|e| E::custom(format!("'{}': {}", v, e)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<T, E> {
                self.visit_str(&v.to_string())
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<T, E> {
                self.visit_str(&v.to_string())
            }
        }

        deserializer.deserialize_any(FromStrVisitor(PhantomData))
    }
}

/// Deserializes a bool from `true`/`false` (any case), `1`/`0`, or a bool.
pub mod flexible_bool {
    use serde::de::{self, Deserializer, Visitor};
    use std::fmt;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct BoolVisitor;

        impl<'de> Visitor<'de> for BoolVisitor {
            type Value = bool;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a boolean")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
                Ok(v)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<bool, E> {
                let v = v.trim();
                if v.eq_ignore_ascii_case("true") || v == "1" {
                    Ok(true)
                } else if v.eq_ignore_ascii_case("false") || v == "0" || v.is_empty() {
                    Ok(false)
                } else {
                    Err(E::custom(format!("'{}' is not a boolean", v)))
                }
            }
        }

        deserializer.deserialize_any(BoolVisitor)
    }
}
