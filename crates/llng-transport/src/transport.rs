//! The operation contract shared by every transport.
//!
//! Each substrate implements [`Transport`] on its own, so supported-operation
//! coverage differs explicitly per implementation: the shell-family
//! transports reject 2FA and consent operations, and the API transport
//! rejects cache, email and script operations. An unsupported call fails
//! before any process or request is started.
//!
//! [`AnyTransport`] is the closed set of transports handed out by the
//! [`TransportRegistry`](crate::TransportRegistry).

use crate::api::ApiTransport;
use crate::config::{InstanceConfig, Mode};
use crate::error::{Result, TransportError};
use crate::kubernetes::KubernetesTransport;
use crate::paths::ResolvedPaths;
use crate::session::{SessionDeleteReport, SessionFilter, SessionSearch};
use crate::shell::ShellTransport;
use crate::snapshot::ConfigInfo;
use llng_command::CommandRunner;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

/// Hint attached to operations only the REST API offers.
pub const USE_API_MODE: &str = "use API mode";

/// Hint attached to operations only the command-line tools offer.
pub const USE_SSH_MODE: &str = "use SSH mode";

/// Operations available against one LemonLDAP::NG instance.
///
/// Multi-step operations (read-modify-write of the configuration, rollback,
/// filtered deletion through the API) are not transactional: a concurrent
/// remote change between the read and the write is overwritten.
pub trait Transport: Send + Sync {
    /// The mode this transport implements.
    fn mode(&self) -> Mode;

    /// Summary of the current configuration.
    fn config_info(&self) -> impl Future<Output = Result<ConfigInfo>> + Send;

    /// Read configuration keys.
    fn config_get(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<Map<String, Value>>> + Send;

    /// Overwrite configuration keys, with an optional change log message.
    fn config_set(
        &self,
        values: &Map<String, Value>,
        log: Option<&str>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Set `key/sub_key` inside a hash-valued configuration key.
    fn config_add_key(
        &self,
        key: &str,
        sub_key: &str,
        value: &Value,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove `key/sub_key` from a hash-valued configuration key.
    fn config_del_key(&self, key: &str, sub_key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Export the full current configuration.
    fn config_save(&self) -> impl Future<Output = Result<Value>> + Send;

    /// Replace the configuration with `config`.
    fn config_restore(&self, config: &Value) -> impl Future<Output = Result<()>> + Send;

    /// Deep-merge `patch` into the current configuration.
    fn config_merge(&self, patch: &Value) -> impl Future<Output = Result<()>> + Send;

    /// Restore the numerically previous configuration version.
    fn config_rollback(&self) -> impl Future<Output = Result<()>> + Send;

    /// Ask the portal to reload its configuration cache.
    fn config_update_cache(&self) -> impl Future<Output = Result<()>> + Send;

    /// Send a test email to `destination`.
    fn config_test_email(&self, destination: &str) -> impl Future<Output = Result<()>> + Send;

    /// Fetch one session.
    fn session_get(
        &self,
        id: &str,
        filter: &SessionFilter,
    ) -> impl Future<Output = Result<Value>> + Send;

    /// Search sessions.
    fn session_search(
        &self,
        filter: &SessionFilter,
    ) -> impl Future<Output = Result<SessionSearch>> + Send;

    /// Delete sessions by id, or by the filter's where clauses when `ids` is
    /// empty.
    fn session_delete(
        &self,
        ids: &[String],
        filter: &SessionFilter,
    ) -> impl Future<Output = Result<SessionDeleteReport>> + Send;

    /// Set attributes on a session.
    fn session_set_key(
        &self,
        id: &str,
        values: &Map<String, Value>,
        filter: &SessionFilter,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove attributes from a session.
    fn session_del_key(
        &self,
        id: &str,
        keys: &[String],
        filter: &SessionFilter,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Dump every session of the filter's backend.
    fn session_backup(&self, filter: &SessionFilter) -> impl Future<Output = Result<Value>> + Send;

    /// List a user's second factors.
    fn second_factors_get(&self, user: &str) -> impl Future<Output = Result<Value>> + Send;

    /// Delete a user's second factors by id; an empty list deletes them all.
    fn second_factors_delete(
        &self,
        user: &str,
        ids: &[String],
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// List a user's consents.
    fn consents_get(&self, user: &str) -> impl Future<Output = Result<Value>> + Send;

    /// Delete a user's consents by id; an empty list deletes them all.
    fn consents_delete(
        &self,
        user: &str,
        ids: &[String],
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Run a named script from the binary directory and return its stdout.
    fn exec_script(
        &self,
        name: &str,
        args: &[String],
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Build the `Unsupported` error for `operation` on `mode`.
pub(crate) fn unsupported<T>(operation: &str, mode: Mode, hint: &str) -> Result<T> {
    Err(TransportError::unsupported(operation, mode.as_str(), hint))
}

/// A transport of any mode.
#[derive(Debug)]
pub enum AnyTransport {
    /// Local or SSH execution.
    Shell(ShellTransport),
    /// Execution inside a pod.
    Kubernetes(KubernetesTransport),
    /// REST management API.
    Api(ApiTransport),
}

impl AnyTransport {
    /// Build the transport for `config`. No process is started and no
    /// connection is opened.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the block for the mode is missing or
    /// invalid.
    pub fn from_config(config: &InstanceConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        config.validate()?;
        let missing = || TransportError::configuration(format!("missing '{}' block", config.mode));
        match config.mode {
            Mode::Shell => {
                let params = config.shell.as_ref().ok_or_else(missing)?;
                Ok(Self::Shell(ShellTransport::new(params, runner)?))
            }
            Mode::Kubernetes => {
                let params = config.kubernetes.as_ref().ok_or_else(missing)?;
                Ok(Self::Kubernetes(KubernetesTransport::new(params, runner)))
            }
            Mode::Api => {
                let params = config.api.as_ref().ok_or_else(missing)?;
                Ok(Self::Api(ApiTransport::new(params)?))
            }
        }
    }

    /// Resolved binary paths, for shell-family transports.
    #[must_use]
    pub fn paths(&self) -> Option<&ResolvedPaths> {
        match self {
            Self::Shell(t) => Some(t.paths()),
            Self::Kubernetes(t) => Some(t.paths()),
            Self::Api(_) => None,
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $method:ident($($arg:expr),*)) => {
        match $self {
            Self::Shell(t) => t.$method($($arg),*).await,
            Self::Kubernetes(t) => t.$method($($arg),*).await,
            Self::Api(t) => t.$method($($arg),*).await,
        }
    };
}

impl Transport for AnyTransport {
    fn mode(&self) -> Mode {
        match self {
            Self::Shell(t) => t.mode(),
            Self::Kubernetes(t) => t.mode(),
            Self::Api(t) => t.mode(),
        }
    }

    async fn config_info(&self) -> Result<ConfigInfo> {
        dispatch!(self, config_info())
    }

    async fn config_get(&self, keys: &[String]) -> Result<Map<String, Value>> {
        dispatch!(self, config_get(keys))
    }

    async fn config_set(&self, values: &Map<String, Value>, log: Option<&str>) -> Result<()> {
        dispatch!(self, config_set(values, log))
    }

    async fn config_add_key(&self, key: &str, sub_key: &str, value: &Value) -> Result<()> {
        dispatch!(self, config_add_key(key, sub_key, value))
    }

    async fn config_del_key(&self, key: &str, sub_key: &str) -> Result<()> {
        dispatch!(self, config_del_key(key, sub_key))
    }

    async fn config_save(&self) -> Result<Value> {
        dispatch!(self, config_save())
    }

    async fn config_restore(&self, config: &Value) -> Result<()> {
        dispatch!(self, config_restore(config))
    }

    async fn config_merge(&self, patch: &Value) -> Result<()> {
        dispatch!(self, config_merge(patch))
    }

    async fn config_rollback(&self) -> Result<()> {
        dispatch!(self, config_rollback())
    }

    async fn config_update_cache(&self) -> Result<()> {
        dispatch!(self, config_update_cache())
    }

    async fn config_test_email(&self, destination: &str) -> Result<()> {
        dispatch!(self, config_test_email(destination))
    }

    async fn session_get(&self, id: &str, filter: &SessionFilter) -> Result<Value> {
        dispatch!(self, session_get(id, filter))
    }

    async fn session_search(&self, filter: &SessionFilter) -> Result<SessionSearch> {
        dispatch!(self, session_search(filter))
    }

    async fn session_delete(
        &self,
        ids: &[String],
        filter: &SessionFilter,
    ) -> Result<SessionDeleteReport> {
        dispatch!(self, session_delete(ids, filter))
    }

    async fn session_set_key(
        &self,
        id: &str,
        values: &Map<String, Value>,
        filter: &SessionFilter,
    ) -> Result<()> {
        dispatch!(self, session_set_key(id, values, filter))
    }

    async fn session_del_key(
        &self,
        id: &str,
        keys: &[String],
        filter: &SessionFilter,
    ) -> Result<()> {
        dispatch!(self, session_del_key(id, keys, filter))
    }

    async fn session_backup(&self, filter: &SessionFilter) -> Result<Value> {
        dispatch!(self, session_backup(filter))
    }

    async fn second_factors_get(&self, user: &str) -> Result<Value> {
        dispatch!(self, second_factors_get(user))
    }

    async fn second_factors_delete(&self, user: &str, ids: &[String]) -> Result<Vec<String>> {
        dispatch!(self, second_factors_delete(user, ids))
    }

    async fn consents_get(&self, user: &str) -> Result<Value> {
        dispatch!(self, consents_get(user))
    }

    async fn consents_delete(&self, user: &str, ids: &[String]) -> Result<Vec<String>> {
        dispatch!(self, consents_delete(user, ids))
    }

    async fn exec_script(&self, name: &str, args: &[String]) -> Result<String> {
        dispatch!(self, exec_script(name, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiParams, KubernetesParams, ShellParams};
    use llng_command::FakeCommandRunner;

    fn runner() -> Arc<dyn CommandRunner> {
        Arc::new(FakeCommandRunner::new())
    }

    #[test]
    fn test_from_config_each_mode() {
        let shell =
            AnyTransport::from_config(&InstanceConfig::shell(ShellParams::default()), runner())
                .unwrap();
        assert_eq!(shell.mode(), Mode::Shell);
        assert!(shell.paths().is_some());

        let k8s = AnyTransport::from_config(
            &InstanceConfig::kubernetes(KubernetesParams::default()),
            runner(),
        )
        .unwrap();
        assert_eq!(k8s.mode(), Mode::Kubernetes);

        let api = AnyTransport::from_config(
            &InstanceConfig::api(ApiParams::new("https://manager.example.com")),
            runner(),
        )
        .unwrap();
        assert_eq!(api.mode(), Mode::Api);
        assert!(api.paths().is_none());
    }

    #[test]
    fn test_from_config_missing_block() {
        let config = InstanceConfig {
            mode: Mode::Kubernetes,
            shell: Some(ShellParams::default()),
            ..Default::default()
        };
        let err = AnyTransport::from_config(&config, runner()).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn test_dispatch_reaches_variant() {
        let fake = Arc::new(FakeCommandRunner::new().with_stdout("Num : 4\n"));
        let transport =
            AnyTransport::from_config(&InstanceConfig::shell(ShellParams::default()), fake.clone())
                .unwrap();
        let info = transport.config_info().await.unwrap();
        assert_eq!(info.version, Some(4));
        assert_eq!(fake.call_count(), 1);
    }
}
