//! Local and SSH execution of the command-line tools.

use crate::cli::{self, CliExec};
use crate::config::{Mode, ShellParams};
use crate::error::{Result, TransportError};
use crate::paths::ResolvedPaths;
use crate::session::{SessionDeleteReport, SessionFilter, SessionSearch};
use crate::snapshot::ConfigInfo;
use crate::transport::{Transport, USE_API_MODE, unsupported};
use llng_command::{CommandRunner, Composer};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Runs the command-line tools on the local host or over SSH, optionally
/// through sudo and a wrapper command.
#[derive(Debug)]
pub struct ShellTransport {
    paths: ResolvedPaths,
    composer: Composer,
    runner: Arc<dyn CommandRunner>,
}

impl ShellTransport {
    /// Build a shell transport. Nothing is executed.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the wrapper line cannot be parsed.
    pub fn new(params: &ShellParams, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let mut composer = Composer::new();
        if let Some(line) = params.wrapper.as_deref().filter(|l| !l.trim().is_empty()) {
            composer = composer
                .with_wrapper_line(line)
                .map_err(|e| TransportError::configuration(format!("invalid wrapper: {e}")))?;
        }
        if let Some(user) = &params.sudo_user {
            composer = composer.with_sudo(user.clone());
        }
        if let Some(remote) = &params.remote {
            composer = composer.with_ssh(remote.clone());
        }
        Ok(Self {
            paths: ResolvedPaths::resolve(
                params.bin_prefix.as_deref(),
                params.cli_path.as_deref(),
                params.sessions_path.as_deref(),
                params.config_editor_path.as_deref(),
            ),
            composer,
            runner,
        })
    }

    /// Resolved binary paths.
    #[must_use]
    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    /// The composition pipeline in use.
    #[must_use]
    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Run `argv` (`argv[0]` is the binary) through the pipeline and return
    /// stdout. `env` is set on the spawned process; over SSH that is the
    /// local `ssh` client.
    ///
    /// # Errors
    ///
    /// Returns an execution error on spawn failure or a non-zero exit.
    pub async fn exec(&self, argv: &[String], env: &[(String, String)]) -> Result<String> {
        let (binary, args) = split_argv(argv)?;
        let spec = env
            .iter()
            .fold(self.composer.compose(binary, args)?, |spec, (k, v)| {
                spec.env(k.clone(), v.clone())
            });
        debug!(binary, remote = self.composer.is_remote(), "shell exec");
        let output = self.runner.run(&spec).await?;
        Ok(output.stdout_lossy())
    }

    /// Like [`exec`](Self::exec), delivering `payload` on stdin.
    ///
    /// # Errors
    ///
    /// Returns an execution error on spawn failure or a non-zero exit.
    pub async fn exec_with_stdin(&self, argv: &[String], payload: &str) -> Result<String> {
        let (binary, args) = split_argv(argv)?;
        let spec = self.composer.compose_with_stdin(binary, args, payload)?;
        debug!(binary, remote = self.composer.is_remote(), "shell exec with stdin");
        let output = self.runner.run(&spec).await?;
        Ok(output.stdout_lossy())
    }
}

pub(crate) fn split_argv(argv: &[String]) -> Result<(&str, &[String])> {
    match argv.split_first() {
        Some((binary, args)) => Ok((binary.as_str(), args)),
        None => Err(TransportError::invalid_argument("empty command")),
    }
}

impl CliExec for ShellTransport {
    fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    async fn run(&self, argv: Vec<String>, stdin: Option<String>) -> Result<String> {
        match stdin {
            Some(payload) => self.exec_with_stdin(&argv, &payload).await,
            None => self.exec(&argv, &[]).await,
        }
    }
}

impl Transport for ShellTransport {
    fn mode(&self) -> Mode {
        Mode::Shell
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
        unsupported("second_factors_get", Mode::Shell, USE_API_MODE)
    }

    async fn second_factors_delete(&self, _user: &str, _ids: &[String]) -> Result<Vec<String>> {
        unsupported("second_factors_delete", Mode::Shell, USE_API_MODE)
    }

    async fn consents_get(&self, _user: &str) -> Result<Value> {
        unsupported("consents_get", Mode::Shell, USE_API_MODE)
    }

    async fn consents_delete(&self, _user: &str, _ids: &[String]) -> Result<Vec<String>> {
        unsupported("consents_delete", Mode::Shell, USE_API_MODE)
    }

    async fn exec_script(&self, name: &str, args: &[String]) -> Result<String> {
        cli::exec_script(self, name, args).await
    }
}
