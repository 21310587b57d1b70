//! Session filters, backend resolution and search result normalization.
//!
//! A single [`SessionFilter`] record describes which backend to address and
//! which sessions to select. Shell-family transports turn it into CLI flags
//! with [`SessionFilter::cli_args`]; the API transport resolves it to one
//! physical backend with [`SessionFilter::backend_name`] and query pairs with
//! [`SessionFilter::query_pairs`].

use crate::error::{Result, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Backend used when nothing else is requested.
pub const GLOBAL_BACKEND: &str = "global";
/// Backend selected by the `persistent` flag.
pub const PERSISTENT_BACKEND: &str = "persistent";
/// Backend selected by the `refresh_tokens` flag.
pub const OIDC_BACKEND: &str = "oidc";
/// Attribute holding the session kind.
pub const SESSION_KIND_FIELD: &str = "_session_kind";
/// Attribute holding the OIDC session type.
pub const SESSION_TYPE_FIELD: &str = "_type";
/// Value of [`SESSION_TYPE_FIELD`] for refresh tokens.
pub const REFRESH_TOKEN_TYPE: &str = "refresh_token";
/// Attribute holding the session id in CLI output.
pub const SESSION_ID_FIELD: &str = "_session_id";

/// Which sessions to address and how.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionFilter {
    /// Attribute equality clauses.
    #[serde(rename = "where")]
    pub where_clauses: BTreeMap<String, String>,
    /// Attributes to return.
    pub select: Vec<String>,
    /// Explicit backend name.
    pub backend: Option<String>,
    /// Return only the number of matches.
    pub count: bool,
    /// Return only session ids.
    pub id_only: bool,
    /// Address OIDC refresh tokens.
    pub refresh_tokens: bool,
    /// Address the persistent backend.
    pub persistent: bool,
    /// Ids are hashed (CLI only; the REST API has no equivalent).
    pub hash: bool,
    /// Session kind shortcut, expanded to a `_session_kind` clause.
    pub kind: Option<String>,
}

impl SessionFilter {
    /// An empty filter addressing the global backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality clause.
    #[must_use]
    pub fn with_where(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.where_clauses.insert(field.into(), value.into());
        self
    }

    /// Set the explicit backend.
    #[must_use]
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Where clauses with the kind shortcut expanded.
    #[must_use]
    pub fn effective_where(&self) -> BTreeMap<String, String> {
        let mut clauses = self.where_clauses.clone();
        if let Some(kind) = self.kind.as_ref().filter(|k| !k.is_empty()) {
            clauses.insert(SESSION_KIND_FIELD.to_string(), kind.clone());
        }
        clauses
    }

    /// Whether the filter selects sessions by attribute.
    #[must_use]
    pub fn has_selection(&self) -> bool {
        !self.effective_where().is_empty()
    }

    /// The one physical backend this filter addresses.
    ///
    /// Precedence: `persistent`, then `refresh_tokens`, then `backend`, then
    /// `global`.
    #[must_use]
    pub fn backend_name(&self) -> &str {
        if self.persistent {
            PERSISTENT_BACKEND
        } else if self.refresh_tokens {
            OIDC_BACKEND
        } else {
            self.backend
                .as_deref()
                .filter(|b| !b.is_empty())
                .unwrap_or(GLOBAL_BACKEND)
        }
    }

    /// Where clauses for the REST API: the kind shortcut expanded and, when
    /// refresh tokens resolve the backend, a `_type=refresh_token` clause.
    #[must_use]
    pub fn api_where(&self) -> BTreeMap<String, String> {
        let mut clauses = self.effective_where();
        if !self.persistent && self.refresh_tokens {
            clauses.insert(
                SESSION_TYPE_FIELD.to_string(),
                REFRESH_TOKEN_TYPE.to_string(),
            );
        }
        clauses
    }

    /// Flags that pick the backend: `--backend`, `--refresh-tokens`,
    /// `--persistent`, `--hash`.
    #[must_use]
    pub fn backend_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(backend) = self.backend.as_ref().filter(|b| !b.is_empty()) {
            args.push("--backend".to_string());
            args.push(backend.clone());
        }
        if self.refresh_tokens {
            args.push("--refresh-tokens".to_string());
        }
        if self.persistent {
            args.push("--persistent".to_string());
        }
        if self.hash {
            args.push("--hash".to_string());
        }
        args
    }

    /// Full `lemonldap-ng-sessions` flag list.
    #[must_use]
    pub fn cli_args(&self) -> Vec<String> {
        let mut args = self.where_args();
        if !self.select.is_empty() {
            args.push("--select".to_string());
            args.push(self.select.join(","));
        }
        if let Some(backend) = self.backend.as_ref().filter(|b| !b.is_empty()) {
            args.push("--backend".to_string());
            args.push(backend.clone());
        }
        if self.count {
            args.push("--count".to_string());
        }
        if self.refresh_tokens {
            args.push("--refresh-tokens".to_string());
        }
        if self.persistent {
            args.push("--persistent".to_string());
        }
        if self.hash {
            args.push("--hash".to_string());
        }
        if self.id_only {
            args.push("--id-only".to_string());
        }
        args
    }

    /// Repeated `--where field=value` flags.
    #[must_use]
    pub fn where_args(&self) -> Vec<String> {
        self.effective_where()
            .into_iter()
            .flat_map(|(field, value)| ["--where".to_string(), format!("{field}={value}")])
            .collect()
    }

    /// Query pairs for `GET /api/v1/sessions/{backend}`.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .api_where()
            .into_iter()
            .map(|(field, value)| ("where".to_string(), format!("{field}={value}")))
            .collect();
        if !self.select.is_empty() {
            pairs.push(("select".to_string(), self.select.join(",")));
        }
        if self.count {
            pairs.push(("count".to_string(), "1".to_string()));
        }
        if self.id_only {
            pairs.push(("idOnly".to_string(), "1".to_string()));
        }
        pairs
    }
}

/// Resolve the physical backend for `filter`.
#[must_use]
pub fn resolve_backend(filter: &SessionFilter) -> &str {
    filter.backend_name()
}

/// Reject empty identifiers. An empty path segment or argv slot would
/// address the whole collection instead of one entry.
pub(crate) fn require_ids<'a, I>(what: &str, ids: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    if ids.into_iter().any(str::is_empty) {
        return Err(TransportError::invalid_argument(format!("{what} must not be empty")));
    }
    Ok(())
}

/// One session: its id and every other attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session id.
    pub id: String,
    /// All other attributes.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl SessionRecord {
    /// Build a record from an attribute object, taking the id from `id` or
    /// `_session_id`, or from `fallback_id` when neither is present.
    #[must_use]
    pub fn from_attributes(mut attributes: Map<String, Value>, fallback_id: Option<&str>) -> Self {
        let id = match attributes.remove("id") {
            Some(Value::String(id)) => id,
            Some(other) => other.to_string(),
            None => attributes
                .get(SESSION_ID_FIELD)
                .and_then(Value::as_str)
                .or(fallback_id)
                .unwrap_or_default()
                .to_string(),
        };
        Self { id, attributes }
    }
}

/// Normalized result of a session search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "lowercase")]
pub enum SessionSearch {
    /// Full records.
    Records(Vec<SessionRecord>),
    /// Bare ids.
    Ids(Vec<String>),
    /// Number of matches.
    Count(u64),
}

impl SessionSearch {
    /// Normalize CLI or API search output.
    ///
    /// - an array of strings becomes `Ids`
    /// - an array of objects becomes `Records`
    /// - an `{id: {...attrs}}` object becomes `Records`, or `Ids` in id-only mode
    /// - a number, or `{"count": n}`, becomes `Count`
    ///
    /// # Errors
    ///
    /// Returns a parse error for any other shape.
    pub fn from_value(value: Value, id_only: bool) -> Result<Self> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .map(Self::Count)
                .ok_or_else(|| TransportError::parse("session count", n.to_string())),
            Value::Null => Ok(if id_only {
                Self::Ids(Vec::new())
            } else {
                Self::Records(Vec::new())
            }),
            Value::Array(items) => Self::from_array(items, id_only),
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(n) = map.get("count").and_then(Value::as_u64) {
                        return Ok(Self::Count(n));
                    }
                }
                if id_only {
                    return Ok(Self::Ids(map.into_iter().map(|(id, _)| id).collect()));
                }
                let records = map
                    .into_iter()
                    .map(|(id, attrs)| match attrs {
                        Value::Object(attrs) => {
                            let mut record = SessionRecord::from_attributes(attrs, Some(&id));
                            record.id = id;
                            record
                        }
                        other => {
                            let mut attributes = Map::new();
                            attributes.insert("value".to_string(), other);
                            SessionRecord { id, attributes }
                        }
                    })
                    .collect();
                Ok(Self::Records(records))
            }
            other => Err(TransportError::parse(
                "session search",
                format!("unexpected output: {other}"),
            )),
        }
    }

    fn from_array(items: Vec<Value>, id_only: bool) -> Result<Self> {
        if items.iter().all(Value::is_string) && (id_only || !items.is_empty()) {
            return Ok(Self::Ids(
                items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ));
        }
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::Object(attrs) => records.push(SessionRecord::from_attributes(attrs, None)),
                other => {
                    return Err(TransportError::parse(
                        "session search",
                        format!("unexpected array item: {other}"),
                    ));
                }
            }
        }
        if id_only {
            return Ok(Self::Ids(records.into_iter().map(|r| r.id).collect()));
        }
        Ok(Self::Records(records))
    }

    /// Session ids, when the result carries them.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        match self {
            Self::Records(records) => records.iter().map(|r| r.id.clone()).collect(),
            Self::Ids(ids) => ids.clone(),
            Self::Count(_) => Vec::new(),
        }
    }

    /// Number of matches.
    #[must_use]
    pub fn len(&self) -> u64 {
        match self {
            Self::Records(records) => records.len() as u64,
            Self::Ids(ids) => ids.len() as u64,
            Self::Count(n) => *n,
        }
    }

    /// Whether nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of a session deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDeleteReport {
    /// Ids that were deleted. Empty for a batched CLI filter deletion, which
    /// does not report ids.
    pub deleted: Vec<String>,
    /// Whether the deletion was driven by a where filter.
    pub by_filter: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn flags(persistent: bool, refresh: bool, backend: Option<&str>) -> SessionFilter {
        SessionFilter {
            persistent,
            refresh_tokens: refresh,
            backend: backend.map(str::to_string),
            ..Default::default()
        }
    }

    #[test_case(flags(true, true, Some("saml")), "persistent" ; "persistent wins")]
    #[test_case(flags(false, true, Some("saml")), "oidc" ; "refresh over backend")]
    #[test_case(flags(false, false, Some("saml")), "saml" ; "explicit backend")]
    #[test_case(flags(false, false, None), "global" ; "default")]
    #[test_case(flags(false, false, Some("")), "global" ; "empty backend")]
    fn test_backend_precedence(filter: SessionFilter, expected: &str) {
        assert_eq!(resolve_backend(&filter), expected);
    }

    #[test]
    fn test_refresh_tokens_inject_type_clause() {
        let filter = flags(false, true, None).with_where("uid", "dwho");
        let clauses = filter.api_where();
        assert_eq!(clauses["_type"], "refresh_token");
        assert_eq!(clauses["uid"], "dwho");
    }

    #[test]
    fn test_persistent_suppresses_type_clause() {
        let filter = flags(true, true, None);
        assert!(!filter.api_where().contains_key("_type"));
    }

    #[test]
    fn test_kind_expands_into_where() {
        let filter = SessionFilter {
            kind: Some("SSO".to_string()),
            ..Default::default()
        };
        assert_eq!(filter.effective_where()["_session_kind"], "SSO");
        assert!(filter.has_selection());
        assert_eq!(filter.where_args(), vec!["--where", "_session_kind=SSO"]);
    }

    #[test]
    fn test_cli_args_full_mapping() {
        let filter = SessionFilter {
            where_clauses: BTreeMap::from([("uid".to_string(), "john".to_string())]),
            select: vec!["uid".to_string(), "ipAddr".to_string()],
            backend: Some("saml".to_string()),
            count: true,
            id_only: true,
            refresh_tokens: true,
            persistent: true,
            hash: true,
            kind: None,
        };
        assert_eq!(
            filter.cli_args(),
            vec![
                "--where", "uid=john", "--select", "uid,ipAddr", "--backend", "saml", "--count",
                "--refresh-tokens", "--persistent", "--hash", "--id-only"
            ]
        );
    }

    #[test]
    fn test_cli_args_empty() {
        assert!(SessionFilter::new().cli_args().is_empty());
    }

    #[test]
    fn test_backend_args() {
        let filter = SessionFilter {
            backend: Some("oidc".to_string()),
            hash: true,
            ..Default::default()
        };
        assert_eq!(filter.backend_args(), vec!["--backend", "oidc", "--hash"]);
    }

    #[test]
    fn test_query_pairs() {
        let filter = SessionFilter {
            select: vec!["uid".to_string()],
            count: true,
            id_only: true,
            hash: true,
            ..Default::default()
        }
        .with_where("uid", "john");
        let pairs = filter.query_pairs();
        assert_eq!(
            pairs,
            vec![
                ("where".to_string(), "uid=john".to_string()),
                ("select".to_string(), "uid".to_string()),
                ("count".to_string(), "1".to_string()),
                ("idOnly".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_filter_deserializes_where_key() {
        let filter: SessionFilter =
            serde_json::from_value(json!({"where": {"uid": "john"}, "persistent": true})).unwrap();
        assert_eq!(filter.where_clauses["uid"], "john");
        assert_eq!(filter.backend_name(), "persistent");
    }

    #[test]
    fn test_search_keyed_object_becomes_records() {
        let result = SessionSearch::from_value(
            json!({"abc": {"uid": "john"}, "def": {"uid": "jane"}}),
            false,
        )
        .unwrap();
        let SessionSearch::Records(records) = result else {
            panic!("expected records");
        };
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "abc");
        assert_eq!(records[0].attributes["uid"], "john");
    }

    #[test]
    fn test_search_keyed_object_id_only() {
        let result = SessionSearch::from_value(json!({"abc": {}, "def": {}}), true).unwrap();
        assert_eq!(result, SessionSearch::Ids(vec!["abc".to_string(), "def".to_string()]));
    }

    #[test]
    fn test_search_array_of_objects_uses_session_id() {
        let result = SessionSearch::from_value(
            json!([{"_session_id": "abc", "uid": "john"}]),
            false,
        )
        .unwrap();
        assert_eq!(result.ids(), vec!["abc"]);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_search_array_of_strings() {
        let result = SessionSearch::from_value(json!(["abc", "def"]), false).unwrap();
        assert_eq!(result, SessionSearch::Ids(vec!["abc".to_string(), "def".to_string()]));
    }

    #[test]
    fn test_search_empty_array() {
        assert_eq!(
            SessionSearch::from_value(json!([]), false).unwrap(),
            SessionSearch::Records(Vec::new())
        );
        assert_eq!(
            SessionSearch::from_value(json!([]), true).unwrap(),
            SessionSearch::Ids(Vec::new())
        );
    }

    #[test]
    fn test_search_count_shapes() {
        assert_eq!(SessionSearch::from_value(json!(42), false).unwrap(), SessionSearch::Count(42));
        assert_eq!(
            SessionSearch::from_value(json!({"count": 3}), false).unwrap(),
            SessionSearch::Count(3)
        );
    }

    #[test]
    fn test_search_rejects_scalars() {
        assert!(SessionSearch::from_value(json!("abc"), false).is_err());
        assert!(SessionSearch::from_value(json!([1, 2]), false).is_err());
    }

    #[test]
    fn test_record_serializes_flat() {
        let mut attributes = Map::new();
        attributes.insert("uid".to_string(), json!("john"));
        let record = SessionRecord {
            id: "abc".to_string(),
            attributes,
        };
        assert_eq!(serde_json::to_value(&record).unwrap(), json!({"id": "abc", "uid": "john"}));
    }

    #[test]
    fn test_require_ids_rejects_empty() {
        assert!(require_ids("session id", ["a", "b"]).is_ok());
        let err = require_ids("session id", ["a", ""]).unwrap_err();
        assert_eq!(err.to_string(), "invalid argument: session id must not be empty");
    }
}
