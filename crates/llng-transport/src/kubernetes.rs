//! Execution inside a portal pod through `kubectl exec`.
//!
//! The target pod is looked up once, on first use, with a label selector and
//! a `Running` phase filter. The name is then reused for the life of the
//! transport; a pod that goes away surfaces as an execution error on the next
//! call rather than being looked up again.

use crate::cli::{self, CliExec};
use crate::config::{KubernetesParams, Mode};
use crate::error::{Result, TransportError};
use crate::paths::ResolvedPaths;
use crate::session::{SessionDeleteReport, SessionFilter, SessionSearch};
use crate::shell::split_argv;
use crate::snapshot::ConfigInfo;
use crate::transport::{Transport, USE_API_MODE, unsupported};
use llng_command::{CommandRunner, CommandSpec, Composer};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// JSONPath printing the names of every matched pod.
const POD_NAMES_JSONPATH: &str = "jsonpath={.items[*].metadata.name}";

/// Field selector restricting the lookup to running pods.
const RUNNING_PODS: &str = "--field-selector=status.phase=Running";

/// Runs the command-line tools inside a Kubernetes pod.
#[derive(Debug)]
pub struct KubernetesTransport {
    params: KubernetesParams,
    selector: String,
    paths: ResolvedPaths,
    runner: Arc<dyn CommandRunner>,
    pod: OnceCell<String>,
}

impl KubernetesTransport {
    /// Build a Kubernetes transport. The cluster is not contacted.
    #[must_use]
    pub fn new(params: &KubernetesParams, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            selector: params.selector(),
            paths: ResolvedPaths::resolve(
                params.bin_prefix.as_deref(),
                params.cli_path.as_deref(),
                params.sessions_path.as_deref(),
                params.config_editor_path.as_deref(),
            ),
            params: params.clone(),
            runner,
            pod: OnceCell::new(),
        }
    }

    /// Resolved binary paths inside the container.
    #[must_use]
    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    /// The label selector used for the pod lookup.
    #[must_use]
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Name of the target pod, looked up on first call.
    ///
    /// Concurrent first calls share one lookup. A failed lookup is not
    /// cached.
    ///
    /// # Errors
    ///
    /// Returns a pod resolution error if no running pod matches, or an
    /// execution error if kubectl fails.
    pub async fn pod_name(&self) -> Result<&str> {
        let pod = self.pod.get_or_try_init(|| self.lookup_pod()).await?;
        Ok(pod.as_str())
    }

    fn kubectl_base(&self) -> Vec<String> {
        let mut argv = vec![self.params.kubectl_path.clone()];
        if let Some(context) = self.params.context.as_ref().filter(|c| !c.is_empty()) {
            argv.push("--context".to_string());
            argv.push(context.clone());
        }
        argv.push("-n".to_string());
        argv.push(self.params.namespace.clone());
        argv
    }

    async fn lookup_pod(&self) -> Result<String> {
        let mut argv = self.kubectl_base();
        argv.extend(
            [
                "get",
                "pods",
                "-l",
                self.selector.as_str(),
                RUNNING_PODS,
                "-o",
                POD_NAMES_JSONPATH,
            ]
            .map(str::to_string),
        );
        let spec = CommandSpec::from_argv(argv)?;
        let output = self.runner.run(&spec).await?;
        let pod = output
            .stdout_lossy()
            .split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| {
                TransportError::pod_resolution(self.params.namespace.clone(), self.selector.clone())
            })?;
        info!(
            namespace = self.params.namespace.as_str(),
            pod = pod.as_str(),
            "resolved portal pod"
        );
        Ok(pod)
    }

    fn exec_prefix(&self, pod: &str, interactive: bool) -> Vec<String> {
        let mut argv = self.kubectl_base();
        argv.push("exec".to_string());
        if interactive {
            argv.push("-i".to_string());
        }
        argv.push(pod.to_string());
        if let Some(container) = self.params.container.as_ref().filter(|c| !c.is_empty()) {
            argv.push("-c".to_string());
            argv.push(container.clone());
        }
        argv.push("--".to_string());
        argv
    }

    /// Run `argv` inside the pod and return stdout.
    ///
    /// # Errors
    ///
    /// Returns a pod resolution error if no pod is available, or an execution
    /// error on a non-zero exit.
    pub async fn exec(&self, argv: &[String], stdin: Option<&str>) -> Result<String> {
        let (binary, args) = split_argv(argv)?;
        let pod = self.pod_name().await?;
        let composer = Composer::new().with_wrapper(self.exec_prefix(pod, stdin.is_some()));
        let spec = match stdin {
            Some(payload) => composer.compose_with_stdin(binary, args, payload)?,
            None => composer.compose(binary, args)?,
        };
        debug!(pod, binary, "kubectl exec");
        let output = self.runner.run(&spec).await?;
        Ok(output.stdout_lossy())
    }
}

impl CliExec for KubernetesTransport {
    fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    async fn run(&self, argv: Vec<String>, stdin: Option<String>) -> Result<String> {
        self.exec(&argv, stdin.as_deref()).await
    }
}

impl Transport for KubernetesTransport {
    fn mode(&self) -> Mode {
        Mode::Kubernetes
    }

    async fn config_info(&self) -> Result<ConfigInfo> {
        cli::config_info(self).await
    }

    async fn config_get(&self, keys: &[String]) -> Result<Map<String, Value>> {
        cli::config_get(self, keys).await
    }

    async fn config_set(&self, values: &Map<String, Value>, log: Option<&str>) -> Result<()> {
        cli::config_set(self, values, log).await
    }

    async fn config_add_key(&self, key: &str, sub_key: &str, value: &Value) -> Result<()> {
        cli::config_add_key(self, key, sub_key, value).await
    }

    async fn config_del_key(&self, key: &str, sub_key: &str) -> Result<()> {
        cli::config_del_key(self, key, sub_key).await
    }

    async fn config_save(&self) -> Result<Value> {
        cli::config_save(self).await
    }

    async fn config_restore(&self, config: &Value) -> Result<()> {
        cli::config_restore(self, config).await
    }

    async fn config_merge(&self, patch: &Value) -> Result<()> {
        cli::config_merge(self, patch).await
    }

    async fn config_rollback(&self) -> Result<()> {
        cli::config_rollback(self).await
    }

    async fn config_update_cache(&self) -> Result<()> {
        cli::config_update_cache(self).await
    }

    async fn config_test_email(&self, destination: &str) -> Result<()> {
        cli::config_test_email(self, destination).await
    }

    async fn session_get(&self, id: &str, filter: &SessionFilter) -> Result<Value> {
        cli::session_get(self, id, filter).await
    }

    async fn session_search(&self, filter: &SessionFilter) -> Result<SessionSearch> {
        cli::session_search(self, filter).await
    }

    async fn session_delete(
        &self,
        ids: &[String],
        filter: &SessionFilter,
    ) -> Result<SessionDeleteReport> {
        cli::session_delete(self, ids, filter).await
    }

    async fn session_set_key(
        &self,
        id: &str,
        values: &Map<String, Value>,
        filter: &SessionFilter,
    ) -> Result<()> {
        cli::session_set_key(self, id, values, filter).await
    }

    async fn session_del_key(
        &self,
        id: &str,
        keys: &[String],
        filter: &SessionFilter,
    ) -> Result<()> {
        cli::session_del_key(self, id, keys, filter).await
    }

    async fn session_backup(&self, filter: &SessionFilter) -> Result<Value> {
        cli::session_backup(self, filter).await
    }

    async fn second_factors_get(&self, _user: &str) -> Result<Value> {
        unsupported("second_factors_get", Mode::Kubernetes, USE_API_MODE)
    }

    async fn second_factors_delete(&self, _user: &str, _ids: &[String]) -> Result<Vec<String>> {
        unsupported("second_factors_delete", Mode::Kubernetes, USE_API_MODE)
    }

    async fn consents_get(&self, _user: &str) -> Result<Value> {
        unsupported("consents_get", Mode::Kubernetes, USE_API_MODE)
    }

    async fn consents_delete(&self, _user: &str, _ids: &[String]) -> Result<Vec<String>> {
        unsupported("consents_delete", Mode::Kubernetes, USE_API_MODE)
    }

    async fn exec_script(&self, name: &str, args: &[String]) -> Result<String> {
        cli::exec_script(self, name, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llng_command::FakeCommandRunner;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn params() -> KubernetesParams {
        KubernetesParams {
            namespace: "auth".to_string(),
            context: Some("prod".to_string()),
            container: Some("portal".to_string()),
            ..KubernetesParams::default()
        }
    }

    #[tokio::test]
    async fn test_pod_lookup_argv() {
        let fake = Arc::new(FakeCommandRunner::new().with_stdout("llng-7f9c llng-a1b2\n"));
        let k8s = KubernetesTransport::new(&params(), fake.clone());
        assert_eq!(k8s.pod_name().await.unwrap(), "llng-7f9c");
        assert_eq!(
            fake.last_call().unwrap().argv(),
            strings(&[
                "kubectl",
                "--context",
                "prod",
                "-n",
                "auth",
                "get",
                "pods",
                "-l",
                "app.kubernetes.io/name=lemonldap-ng",
                "--field-selector=status.phase=Running",
                "-o",
                "jsonpath={.items[*].metadata.name}",
            ])
        );
    }

    #[tokio::test]
    async fn test_pod_cached_across_calls() {
        let fake = Arc::new(
            FakeCommandRunner::new()
                .with_stdout("llng-0")
                .with_stdout("Num : 3\n")
                .with_stdout("Num : 3\n"),
        );
        let k8s = KubernetesTransport::new(&params(), fake.clone());
        k8s.config_info().await.unwrap();
        k8s.config_info().await.unwrap();

        let calls = fake.calls();
        assert_eq!(calls.len(), 3);
        let lookups = calls
            .iter()
            .filter(|c| c.arguments().iter().any(|a| a == "get"))
            .count();
        assert_eq!(lookups, 1);
        assert_eq!(
            calls[2].argv(),
            strings(&[
                "kubectl",
                "--context",
                "prod",
                "-n",
                "auth",
                "exec",
                "llng-0",
                "-c",
                "portal",
                "--",
                "/usr/share/lemonldap-ng/bin/lemonldap-ng-cli",
                "info",
            ])
        );
    }

    #[tokio::test]
    async fn test_stdin_adds_interactive_flag() {
        let fake = Arc::new(FakeCommandRunner::new().with_stdout("llng-0"));
        let k8s = KubernetesTransport::new(&KubernetesParams::default(), fake.clone());
        k8s.config_merge(&serde_json::json!({"domain": "example.com"}))
            .await
            .unwrap();
        let call = fake.last_call().unwrap();
        assert_eq!(
            call.argv(),
            strings(&[
                "kubectl",
                "-n",
                "default",
                "exec",
                "-i",
                "llng-0",
                "--",
                "/usr/share/lemonldap-ng/bin/lemonldap-ng-cli",
                "-yes",
                "1",
                "merge",
                "-",
            ])
        );
        assert_eq!(call.stdin_payload(), Some("{\"domain\":\"example.com\"}"));
    }

    #[tokio::test]
    async fn test_no_running_pod() {
        let fake = Arc::new(FakeCommandRunner::new().with_stdout("\n"));
        let k8s = KubernetesTransport::new(&params(), fake.clone());
        let err = k8s.config_info().await.unwrap_err();
        assert!(matches!(err, TransportError::PodResolution { .. }));
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_retried() {
        let fake = Arc::new(
            FakeCommandRunner::new()
                .with_exit_code(1)
                .with_stdout("llng-1"),
        );
        let k8s = KubernetesTransport::new(&params(), fake.clone());
        assert!(k8s.pod_name().await.is_err());
        assert_eq!(k8s.pod_name().await.unwrap(), "llng-1");
    }

    #[tokio::test]
    async fn test_api_only_operations_rejected() {
        let fake = Arc::new(FakeCommandRunner::new());
        let k8s = KubernetesTransport::new(&params(), fake.clone());
        let err = k8s.consents_get("dwho").await.unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(fake.call_count(), 0);
    }
}
