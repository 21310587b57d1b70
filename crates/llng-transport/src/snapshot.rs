//! Configuration snapshots and their metadata.

use crate::error::{Result, TransportError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Key holding the configuration version number.
pub const CFG_NUM: &str = "cfgNum";
/// Key holding the author of a configuration.
pub const CFG_AUTHOR: &str = "cfgAuthor";
/// Key holding the author's address.
pub const CFG_AUTHOR_IP: &str = "cfgAuthorIP";
/// Key holding the save date (epoch seconds).
pub const CFG_DATE: &str = "cfgDate";
/// Key holding the change log message.
pub const CFG_LOG: &str = "cfgLog";

/// One stored configuration version: metadata keys plus arbitrary settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigSnapshot(Map<String, Value>);

impl ConfigSnapshot {
    /// Wrap a JSON value, which must be an object.
    ///
    /// # Errors
    ///
    /// Returns a parse error if `value` is not an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(TransportError::parse(
                "configuration",
                format!("expected an object, got {}", kind(&other)),
            )),
        }
    }

    /// The version number, if present. Numeric strings are accepted.
    #[must_use]
    pub fn version(&self) -> Option<u64> {
        match self.0.get(CFG_NUM)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// The version number.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the snapshot has no usable `cfgNum`.
    pub fn require_version(&self) -> Result<u64> {
        self.version()
            .ok_or_else(|| TransportError::parse("configuration", "missing cfgNum"))
    }

    /// Read a top-level key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a top-level key.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Borrow the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Mutably borrow the underlying map.
    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Unwrap into a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Summary of the current configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigInfo {
    /// Version number.
    pub version: Option<u64>,
    /// Author.
    pub author: Option<String>,
    /// Author's address.
    pub author_ip: Option<String>,
    /// Save date as reported by the source.
    pub date: Option<String>,
    /// Change log message.
    pub log: Option<String>,
    /// Every field as reported.
    pub fields: BTreeMap<String, String>,
}

impl ConfigInfo {
    /// Build from `lemonldap-ng-cli info` fields (`Num`, `Author`, `Author IP`,
    /// `Date`, `Log`; matched case-insensitively).
    #[must_use]
    pub fn from_fields(fields: BTreeMap<String, String>) -> Self {
        let find = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        };
        Self {
            version: find("Num").and_then(|v| v.parse().ok()),
            author: find("Author"),
            author_ip: find("Author IP"),
            date: find("Date"),
            log: find("Log"),
            fields,
        }
    }

    /// Build from a snapshot's metadata keys.
    #[must_use]
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Self {
        let mut fields = BTreeMap::new();
        for key in [CFG_NUM, CFG_AUTHOR, CFG_AUTHOR_IP, CFG_DATE, CFG_LOG] {
            if let Some(value) = snapshot.text(key) {
                fields.insert(key.to_string(), value);
            }
        }
        Self {
            version: snapshot.version(),
            author: snapshot.text(CFG_AUTHOR),
            author_ip: snapshot.text(CFG_AUTHOR_IP),
            date: snapshot.text(CFG_DATE),
            log: snapshot.text(CFG_LOG),
            fields,
        }
    }

    /// The save date, when it is expressed in epoch seconds.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let secs: i64 = self.date.as_deref()?.trim().parse().ok()?;
        DateTime::from_timestamp(secs, 0)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
