//! Operations built on the LemonLDAP::NG command-line tools.
//!
//! The shell and Kubernetes transports only differ in how an argv reaches the
//! binaries. Both implement [`CliExec`]; everything else (argument layout,
//! output parsing) lives here once.

use crate::error::{Result, TransportError};
use crate::parse::{parse_get, parse_info, parse_json};
use crate::paths::ResolvedPaths;
use crate::session::{SessionDeleteReport, SessionFilter, SessionSearch};
use crate::snapshot::ConfigInfo;
use serde_json::{Map, Value};
use std::future::Future;
use tracing::{debug, info};

/// Confirmation flag accepted by every mutating `lemonldap-ng-cli` command.
const YES: [&str; 2] = ["-yes", "1"];

/// Runs a full argv (`argv[0]` is the binary) through a transport.
pub(crate) trait CliExec: Send + Sync {
    /// Paths of the binaries on the target.
    fn paths(&self) -> &ResolvedPaths;

    /// Run `argv`, optionally feeding `stdin`, and return stdout.
    fn run(
        &self,
        argv: Vec<String>,
        stdin: Option<String>,
    ) -> impl Future<Output = Result<String>> + Send;
}

fn argv<I, S>(binary: &str, args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    std::iter::once(binary.to_string())
        .chain(args.into_iter().map(Into::into))
        .collect()
}

fn confirmed(binary: &str) -> Vec<String> {
    argv(binary, YES)
}

/// CLI rendering of a value: strings verbatim, everything else as JSON.
pub(crate) fn value_to_cli(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Session ids are positional; an empty id or one starting with `-` would be
/// read as a missing argument or a flag.
fn require_positional<'a>(ids: impl IntoIterator<Item = &'a str>) -> Result<()> {
    for id in ids {
        if id.is_empty() {
            return Err(TransportError::invalid_argument("session id must not be empty"));
        }
        if id.starts_with('-') {
            return Err(TransportError::invalid_argument(format!(
                "session id '{id}' must not start with '-'"
            )));
        }
    }
    Ok(())
}

fn to_json_text(what: &str, value: &Value) -> Result<String> {
    serde_json::to_string(value).map_err(|e| TransportError::parse(what, e.to_string()))
}

pub(crate) async fn config_info<E: CliExec>(exec: &E) -> Result<ConfigInfo> {
    let out = exec.run(argv(exec.paths().cli(), ["info"]), None).await?;
    Ok(ConfigInfo::from_fields(parse_info(&out)))
}

pub(crate) async fn config_get<E: CliExec>(
    exec: &E,
    keys: &[String],
) -> Result<Map<String, Value>> {
    if keys.is_empty() {
        return Err(TransportError::invalid_argument("no configuration keys given"));
    }
    let mut cmd = argv(exec.paths().cli(), ["get"]);
    cmd.extend(keys.iter().cloned());
    let out = exec.run(cmd, None).await?;
    Ok(parse_get(&out)
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect())
}

pub(crate) async fn config_set<E: CliExec>(
    exec: &E,
    values: &Map<String, Value>,
    log: Option<&str>,
) -> Result<()> {
    if values.is_empty() {
        return Err(TransportError::invalid_argument("no configuration values given"));
    }
    let mut cmd = confirmed(exec.paths().cli());
    if let Some(log) = log.filter(|l| !l.is_empty()) {
        cmd.push("-log".to_string());
        cmd.push(log.to_string());
    }
    cmd.push("set".to_string());
    for (key, value) in values {
        cmd.push(key.clone());
        cmd.push(value_to_cli(value));
    }
    exec.run(cmd, None).await?;
    info!(keys = values.len(), "configuration updated");
    Ok(())
}

pub(crate) async fn config_add_key<E: CliExec>(
    exec: &E,
    key: &str,
    sub_key: &str,
    value: &Value,
) -> Result<()> {
    let mut cmd = confirmed(exec.paths().cli());
    cmd.extend(["addKey".to_string(), key.to_string(), sub_key.to_string(), value_to_cli(value)]);
    exec.run(cmd, None).await?;
    info!(key, sub_key, "configuration sub-key added");
    Ok(())
}

pub(crate) async fn config_del_key<E: CliExec>(exec: &E, key: &str, sub_key: &str) -> Result<()> {
    let mut cmd = confirmed(exec.paths().cli());
    cmd.extend(["delKey".to_string(), key.to_string(), sub_key.to_string()]);
    exec.run(cmd, None).await?;
    info!(key, sub_key, "configuration sub-key removed");
    Ok(())
}

pub(crate) async fn config_save<E: CliExec>(exec: &E) -> Result<Value> {
    let out = exec.run(argv(exec.paths().cli(), ["save"]), None).await?;
    parse_json("configuration", &out)
}

pub(crate) async fn config_restore<E: CliExec>(exec: &E, config: &Value) -> Result<()> {
    if !config.is_object() {
        return Err(TransportError::invalid_argument("configuration must be a JSON object"));
    }
    let payload = to_json_text("configuration", config)?;
    let mut cmd = confirmed(exec.paths().cli());
    cmd.extend(["restore".to_string(), "-".to_string()]);
    exec.run(cmd, Some(payload)).await?;
    info!("configuration restored");
    Ok(())
}

pub(crate) async fn config_merge<E: CliExec>(exec: &E, patch: &Value) -> Result<()> {
    if !patch.is_object() {
        return Err(TransportError::invalid_argument("merge patch must be a JSON object"));
    }
    let payload = to_json_text("merge patch", patch)?;
    let mut cmd = confirmed(exec.paths().cli());
    cmd.extend(["merge".to_string(), "-".to_string()]);
    exec.run(cmd, Some(payload)).await?;
    info!("configuration merged");
    Ok(())
}

pub(crate) async fn config_rollback<E: CliExec>(exec: &E) -> Result<()> {
    let mut cmd = confirmed(exec.paths().cli());
    cmd.push("rollback".to_string());
    exec.run(cmd, None).await?;
    info!("configuration rolled back");
    Ok(())
}

pub(crate) async fn config_update_cache<E: CliExec>(exec: &E) -> Result<()> {
    exec.run(argv(exec.paths().cli(), ["update-cache"]), None).await?;
    Ok(())
}

pub(crate) async fn config_test_email<E: CliExec>(exec: &E, destination: &str) -> Result<()> {
    if destination.is_empty() {
        return Err(TransportError::invalid_argument("email destination is empty"));
    }
    exec.run(argv(exec.paths().cli(), ["test-email", destination]), None)
        .await?;
    Ok(())
}

pub(crate) async fn session_get<E: CliExec>(
    exec: &E,
    id: &str,
    filter: &SessionFilter,
) -> Result<Value> {
    require_positional([id])?;
    let mut cmd = argv(exec.paths().sessions(), ["get", id]);
    cmd.extend(filter.backend_args());
    let out = exec.run(cmd, None).await?;
    parse_json("session", &out)
}

pub(crate) async fn session_search<E: CliExec>(
    exec: &E,
    filter: &SessionFilter,
) -> Result<SessionSearch> {
    let mut cmd = argv(exec.paths().sessions(), ["search"]);
    cmd.extend(filter.cli_args());
    let out = exec.run(cmd, None).await?;
    let value = if out.trim().is_empty() {
        Value::Null
    } else {
        parse_json("session search", &out)?
    };
    SessionSearch::from_value(value, filter.id_only)
}

pub(crate) async fn session_delete<E: CliExec>(
    exec: &E,
    ids: &[String],
    filter: &SessionFilter,
) -> Result<SessionDeleteReport> {
    if ids.is_empty() {
        if !filter.has_selection() {
            return Err(TransportError::invalid_argument(
                "session deletion requires ids or a where filter",
            ));
        }
        let mut cmd = argv(exec.paths().sessions(), ["delete"]);
        cmd.extend(filter.where_args());
        cmd.extend(filter.backend_args());
        exec.run(cmd, None).await?;
        info!(backend = filter.backend_name(), "sessions deleted by filter");
        return Ok(SessionDeleteReport {
            deleted: Vec::new(),
            by_filter: true,
        });
    }

    require_positional(ids.iter().map(String::as_str))?;
    let mut deleted = Vec::with_capacity(ids.len());
    for id in ids {
        let mut cmd = argv(exec.paths().sessions(), ["delete", id.as_str()]);
        cmd.extend(filter.backend_args());
        exec.run(cmd, None).await?;
        debug!(id = id.as_str(), "session deleted");
        deleted.push(id.clone());
    }
    info!(count = deleted.len(), "sessions deleted");
    Ok(SessionDeleteReport {
        deleted,
        by_filter: false,
    })
}

pub(crate) async fn session_set_key<E: CliExec>(
    exec: &E,
    id: &str,
    values: &Map<String, Value>,
    filter: &SessionFilter,
) -> Result<()> {
    if values.is_empty() {
        return Err(TransportError::invalid_argument("no session attributes given"));
    }
    require_positional([id])?;
    let mut cmd = argv(exec.paths().sessions(), ["setKey", id]);
    for (key, value) in values {
        cmd.push(key.clone());
        cmd.push(value_to_cli(value));
    }
    cmd.extend(filter.backend_args());
    exec.run(cmd, None).await?;
    Ok(())
}

pub(crate) async fn session_del_key<E: CliExec>(
    exec: &E,
    id: &str,
    keys: &[String],
    filter: &SessionFilter,
) -> Result<()> {
    if keys.is_empty() {
        return Err(TransportError::invalid_argument("no session attributes given"));
    }
    require_positional([id])?;
    let mut cmd = argv(exec.paths().sessions(), ["delKey", id]);
    cmd.extend(keys.iter().cloned());
    cmd.extend(filter.backend_args());
    exec.run(cmd, None).await?;
    Ok(())
}

pub(crate) async fn session_backup<E: CliExec>(exec: &E, filter: &SessionFilter) -> Result<Value> {
    let mut cmd = argv(exec.paths().sessions(), ["backup"]);
    cmd.extend(filter.backend_args());
    let out = exec.run(cmd, None).await?;
    parse_json("session backup", &out)
}

pub(crate) async fn exec_script<E: CliExec>(
    exec: &E,
    name: &str,
    args: &[String],
) -> Result<String> {
    let script = exec.paths().script(name)?;
    debug!(script = script.as_str(), "running script");
    exec.run(argv(&script, args.iter().cloned()), None).await
}
