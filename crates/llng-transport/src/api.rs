//! REST management API transport.
//!
//! Talks to `/api/v1/...` under the configured base URL with an optional
//! Basic-Auth header. Configuration writes are read-modify-write against
//! `config/latest` and are not transactional.

use crate::config::{ApiParams, Mode};
use crate::error::{Result, TransportError};
use crate::merge::deep_merge;
use crate::session::{SessionDeleteReport, SessionFilter, SessionSearch, require_ids};
use crate::snapshot::{CFG_LOG, ConfigInfo, ConfigSnapshot};
use crate::transport::{Transport, USE_SSH_MODE, unsupported};
use reqwest::{Client, Method, Url};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, info, warn};

/// Path prefix of every management endpoint.
const API_ROOT: [&str; 2] = ["api", "v1"];

/// Client for the manager's REST API.
#[derive(Clone)]
pub struct ApiTransport {
    client: Client,
    base: Url,
    username: Option<String>,
    password: Option<String>,
}

impl fmt::Debug for ApiTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiTransport")
            .field("base", &self.base.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl ApiTransport {
    /// Build an API transport. No request is sent.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the base URL is invalid, embeds
    /// credentials, or the HTTP client cannot be built.
    pub fn new(params: &ApiParams) -> Result<Self> {
        let base = Url::parse(&params.base_url).map_err(|e| {
            TransportError::configuration(format!("invalid base_url '{}': {e}", params.base_url))
        })?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(TransportError::configuration(format!(
                "base_url '{}' must be an http(s) URL",
                params.base_url
            )));
        }
        if !base.username().is_empty() || base.password().is_some() {
            return Err(TransportError::configuration(
                "base_url must not embed credentials; use username and password",
            ));
        }

        let mut builder = Client::builder();
        if !params.verify_tls {
            warn!(
                base_url = base.as_str(),
                "TLS certificate verification is DISABLED for the management API; \
                 the manager's identity is not checked"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build().map_err(|e| {
            TransportError::configuration(format!(
                "failed to build HTTP client: {}",
                e.without_url()
            ))
        })?;

        Ok(Self {
            client,
            base,
            username: params.username.clone().filter(|u| !u.is_empty()),
            password: params.password.clone(),
        })
    }

    /// The base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::configuration("base_url cannot carry a path"))?
            .pop_if_empty()
            .extend(API_ROOT)
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self.endpoint(segments)?;
        debug!(method = %method, path = url.path(), "management API request");

        let mut request = self.client.request(method, url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(user) = &self.username {
            request = request.basic_auth(user, self.password.as_ref());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        let text = response.text().await.map_err(network_error)?;
        if !status.is_success() {
            return Err(TransportError::http(status.as_u16(), text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| TransportError::parse("API response", e.to_string()))
    }

    async fn get(&self, segments: &[&str]) -> Result<Value> {
        self.send(Method::GET, segments, &[], None).await
    }

    async fn put(&self, segments: &[&str], body: &Value) -> Result<Value> {
        self.send(Method::PUT, segments, &[], Some(body)).await
    }

    async fn delete(&self, segments: &[&str]) -> Result<Value> {
        self.send(Method::DELETE, segments, &[], None).await
    }

    async fn latest(&self) -> Result<ConfigSnapshot> {
        ConfigSnapshot::from_value(self.get(&["config", "latest"]).await?)
    }

    async fn write_config(&self, snapshot: ConfigSnapshot) -> Result<()> {
        let version = snapshot.version();
        self.put(&["config"], &snapshot.into_value()).await?;
        info!(base_version = ?version, "configuration written");
        Ok(())
    }

    async fn session_record(&self, id: &str, filter: &SessionFilter) -> Result<Map<String, Value>> {
        match self.session_get(id, filter).await? {
            Value::Object(map) => Ok(map),
            _ => Err(TransportError::parse("session", "expected an object")),
        }
    }

    async fn delete_each(
        &self,
        collection: &str,
        user: &str,
        ids: &[String],
    ) -> Result<Vec<String>> {
        require_ids("user", [user])?;
        require_ids("entry id", ids.iter().map(String::as_str))?;
        if ids.is_empty() {
            self.delete(&[collection, user]).await?;
            info!(collection, user, "all entries deleted");
            return Ok(Vec::new());
        }
        let mut deleted = Vec::with_capacity(ids.len());
        for id in ids {
            self.delete(&[collection, user, id.as_str()]).await?;
            deleted.push(id.clone());
        }
        info!(collection, user, count = deleted.len(), "entries deleted");
        Ok(deleted)
    }
}

fn network_error(err: reqwest::Error) -> TransportError {
    let err = err.without_url();
    let mut message = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    TransportError::network(message)
}

fn note_hash(filter: &SessionFilter) {
    if filter.hash {
        debug!("hash option has no REST equivalent; ignored");
    }
}

fn require_object(value: &Value, what: &str) -> Result<()> {
    if value.is_object() {
        Ok(())
    } else {
        Err(TransportError::invalid_argument(format!("{what} must be a JSON object")))
    }
}

impl Transport for ApiTransport {
    fn mode(&self) -> Mode {
        Mode::Api
    }

    async fn config_info(&self) -> Result<ConfigInfo> {
        Ok(ConfigInfo::from_snapshot(&self.latest().await?))
    }

    async fn config_get(&self, keys: &[String]) -> Result<Map<String, Value>> {
        if keys.is_empty() {
            return Err(TransportError::invalid_argument("no configuration keys given"));
        }
        let snapshot = self.latest().await?;
        Ok(keys
            .iter()
            .map(|k| (k.clone(), snapshot.get(k).cloned().unwrap_or(Value::Null)))
            .collect())
    }

    async fn config_set(&self, values: &Map<String, Value>, log: Option<&str>) -> Result<()> {
        if values.is_empty() {
            return Err(TransportError::invalid_argument("no configuration values given"));
        }
        let mut snapshot = self.latest().await?;
        for (key, value) in values {
            snapshot.set(key.clone(), value.clone());
        }
        if let Some(log) = log.filter(|l| !l.is_empty()) {
            snapshot.set(CFG_LOG, Value::String(log.to_string()));
        }
        self.write_config(snapshot).await
    }

    async fn config_add_key(&self, key: &str, sub_key: &str, value: &Value) -> Result<()> {
        let mut snapshot = self.latest().await?;
        let slot = snapshot
            .as_map_mut()
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(entries) = slot else {
            return Err(TransportError::invalid_argument(format!(
                "configuration key '{key}' is not a hash"
            )));
        };
        entries.insert(sub_key.to_string(), value.clone());
        self.write_config(snapshot).await
    }

    async fn config_del_key(&self, key: &str, sub_key: &str) -> Result<()> {
        let mut snapshot = self.latest().await?;
        match snapshot.as_map_mut().get_mut(key) {
            Some(Value::Object(entries)) => {
                entries.remove(sub_key);
            }
            None | Some(Value::Null) => return Ok(()),
            Some(_) => {
                return Err(TransportError::invalid_argument(format!(
                    "configuration key '{key}' is not a hash"
                )));
            }
        }
        self.write_config(snapshot).await
    }

    async fn config_save(&self) -> Result<Value> {
        Ok(self.latest().await?.into_value())
    }

    async fn config_restore(&self, config: &Value) -> Result<()> {
        require_object(config, "configuration")?;
        self.put(&["config"], config).await?;
        info!("configuration restored");
        Ok(())
    }

    async fn config_merge(&self, patch: &Value) -> Result<()> {
        require_object(patch, "merge patch")?;
        let mut current = self.latest().await?.into_value();
        deep_merge(&mut current, patch);
        self.write_config(ConfigSnapshot::from_value(current)?).await
    }

    async fn config_rollback(&self) -> Result<()> {
        let version = self.latest().await?.require_version()?;
        if version <= 1 {
            return Err(TransportError::rollback_boundary(version));
        }
        let previous = (version - 1).to_string();
        let snapshot = ConfigSnapshot::from_value(self.get(&["config", previous.as_str()]).await?)?;
        self.put(&["config"], &snapshot.into_value()).await?;
        info!(from = version, to = version - 1, "configuration rolled back");
        Ok(())
    }

    async fn config_update_cache(&self) -> Result<()> {
        unsupported("config_update_cache", Mode::Api, USE_SSH_MODE)
    }

    async fn config_test_email(&self, _destination: &str) -> Result<()> {
        unsupported("config_test_email", Mode::Api, USE_SSH_MODE)
    }

    async fn session_get(&self, id: &str, filter: &SessionFilter) -> Result<Value> {
        note_hash(filter);
        require_ids("session id", [id])?;
        self.get(&["sessions", filter.backend_name(), id]).await
    }

    async fn session_search(&self, filter: &SessionFilter) -> Result<SessionSearch> {
        note_hash(filter);
        let value = self
            .send(
                Method::GET,
                &["sessions", filter.backend_name()],
                &filter.query_pairs(),
                None,
            )
            .await?;
        SessionSearch::from_value(value, filter.id_only)
    }

    async fn session_delete(
        &self,
        ids: &[String],
        filter: &SessionFilter,
    ) -> Result<SessionDeleteReport> {
        note_hash(filter);
        let backend = filter.backend_name();
        let (targets, by_filter) = if ids.is_empty() {
            if !filter.has_selection() {
                return Err(TransportError::invalid_argument(
                    "session deletion requires ids or a where filter",
                ));
            }
            let search = SessionFilter {
                select: Vec::new(),
                count: false,
                id_only: true,
                ..filter.clone()
            };
            (self.session_search(&search).await?.ids(), true)
        } else {
            (ids.to_vec(), false)
        };
        require_ids("session id", targets.iter().map(String::as_str))?;

        let mut deleted = Vec::with_capacity(targets.len());
        for id in targets {
            self.delete(&["sessions", backend, id.as_str()]).await?;
            deleted.push(id);
        }
        info!(backend, count = deleted.len(), by_filter, "sessions deleted");
        Ok(SessionDeleteReport { deleted, by_filter })
    }

    async fn session_set_key(
        &self,
        id: &str,
        values: &Map<String, Value>,
        filter: &SessionFilter,
    ) -> Result<()> {
        if values.is_empty() {
            return Err(TransportError::invalid_argument("no session attributes given"));
        }
        let mut record = self.session_record(id, filter).await?;
        for (key, value) in values {
            record.insert(key.clone(), value.clone());
        }
        self.put(&["sessions", filter.backend_name(), id], &Value::Object(record))
            .await?;
        Ok(())
    }

    async fn session_del_key(
        &self,
        id: &str,
        keys: &[String],
        filter: &SessionFilter,
    ) -> Result<()> {
        if keys.is_empty() {
            return Err(TransportError::invalid_argument("no session attributes given"));
        }
        let mut record = self.session_record(id, filter).await?;
        for key in keys {
            record.remove(key);
        }
        self.put(&["sessions", filter.backend_name(), id], &Value::Object(record))
            .await?;
        Ok(())
    }

    async fn session_backup(&self, filter: &SessionFilter) -> Result<Value> {
        note_hash(filter);
        self.get(&["sessions", filter.backend_name()]).await
    }

    async fn second_factors_get(&self, user: &str) -> Result<Value> {
        require_ids("user", [user])?;
        self.get(&["secondfactors", user]).await
    }

    async fn second_factors_delete(&self, user: &str, ids: &[String]) -> Result<Vec<String>> {
        self.delete_each("secondfactors", user, ids).await
    }

    async fn consents_get(&self, user: &str) -> Result<Value> {
        require_ids("user", [user])?;
        self.get(&["consents", user]).await
    }

    async fn consents_delete(&self, user: &str, ids: &[String]) -> Result<Vec<String>> {
        self.delete_each("consents", user, ids).await
    }

    async fn exec_script(&self, _name: &str, _args: &[String]) -> Result<String> {
        unsupported("exec_script", Mode::Api, USE_SSH_MODE)
    }
}
