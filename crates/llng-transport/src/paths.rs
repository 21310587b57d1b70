//! Binary path resolution.

use crate::config::DEFAULT_BIN_PREFIX;
use crate::error::{Result, TransportError};

/// File name of the configuration CLI.
pub const CLI_BINARY: &str = "lemonldap-ng-cli";

/// File name of the sessions CLI.
pub const SESSIONS_BINARY: &str = "lemonldap-ng-sessions";

/// File name of the configuration editor.
pub const CONFIG_EDITOR_BINARY: &str = "lmConfigEditor";

/// Paths of the three vendor binaries, fixed at transport construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    bin_prefix: String,
    cli: String,
    sessions: String,
    config_editor: String,
}

impl ResolvedPaths {
    /// Resolve paths under `bin_prefix` (or the default prefix). An explicit
    /// path always wins over the derived one.
    #[must_use]
    pub fn resolve(
        bin_prefix: Option<&str>,
        cli: Option<&str>,
        sessions: Option<&str>,
        config_editor: Option<&str>,
    ) -> Self {
        let prefix = bin_prefix
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_BIN_PREFIX)
            .trim_end_matches('/');
        let prefix = if prefix.is_empty() { "/" } else { prefix };
        let derive = |explicit: Option<&str>, name: &str| match explicit {
            Some(path) if !path.is_empty() => path.to_string(),
            _ => join(prefix, name),
        };
        Self {
            bin_prefix: prefix.to_string(),
            cli: derive(cli, CLI_BINARY),
            sessions: derive(sessions, SESSIONS_BINARY),
            config_editor: derive(config_editor, CONFIG_EDITOR_BINARY),
        }
    }

    /// The binary directory.
    #[must_use]
    pub fn bin_prefix(&self) -> &str {
        &self.bin_prefix
    }

    /// Path to `lemonldap-ng-cli`.
    #[must_use]
    pub fn cli(&self) -> &str {
        &self.cli
    }

    /// Path to `lemonldap-ng-sessions`.
    #[must_use]
    pub fn sessions(&self) -> &str {
        &self.sessions
    }

    /// Path to `lmConfigEditor`.
    #[must_use]
    pub fn config_editor(&self) -> &str {
        &self.config_editor
    }

    /// Path of a named script.
    ///
    /// `cli`, `sessions` and `config-editor` are aliases for the resolved
    /// binaries. Anything else must be a bare file name under the prefix.
    ///
    /// # Errors
    ///
    /// Returns an error for empty names or names containing `/` or `..`.
    pub fn script(&self, name: &str) -> Result<String> {
        match name {
            "cli" | CLI_BINARY => Ok(self.cli.clone()),
            "sessions" | SESSIONS_BINARY => Ok(self.sessions.clone()),
            "config-editor" | CONFIG_EDITOR_BINARY => Ok(self.config_editor.clone()),
            _ if name.is_empty() || name.contains('/') || name.contains("..") => Err(
                TransportError::invalid_argument(format!("invalid script name '{name}'")),
            ),
            _ => Ok(join(&self.bin_prefix, name)),
        }
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.ends_with('/') {
        format!("{prefix}{name}")
    } else {
        format!("{prefix}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_defaults() {
        let paths = ResolvedPaths::resolve(None, None, None, None);
        assert_eq!(paths.cli(), "/usr/share/lemonldap-ng/bin/lemonldap-ng-cli");
        assert_eq!(
            paths.sessions(),
            "/usr/share/lemonldap-ng/bin/lemonldap-ng-sessions"
        );
        assert_eq!(
            paths.config_editor(),
            "/usr/share/lemonldap-ng/bin/lmConfigEditor"
        );
    }

    #[test]
    fn test_custom_prefix_trailing_slash() {
        let paths = ResolvedPaths::resolve(Some("/opt/llng/bin/"), None, None, None);
        assert_eq!(paths.cli(), "/opt/llng/bin/lemonldap-ng-cli");
        assert_eq!(paths.bin_prefix(), "/opt/llng/bin");
    }

    #[test]
    fn test_explicit_path_wins() {
        let paths = ResolvedPaths::resolve(
            Some("/opt/llng/bin"),
            Some("/usr/local/bin/llng-cli"),
            None,
            Some(""),
        );
        assert_eq!(paths.cli(), "/usr/local/bin/llng-cli");
        assert_eq!(paths.sessions(), "/opt/llng/bin/lemonldap-ng-sessions");
        assert_eq!(paths.config_editor(), "/opt/llng/bin/lmConfigEditor");
    }

    #[test]
    fn test_root_prefix() {
        let paths = ResolvedPaths::resolve(Some("/"), None, None, None);
        assert_eq!(paths.cli(), "/lemonldap-ng-cli");
    }

    #[test_case("cli", "/b/lemonldap-ng-cli" ; "cli alias")]
    #[test_case("sessions", "/b/lemonldap-ng-sessions" ; "sessions alias")]
    #[test_case("config-editor", "/b/lmConfigEditor" ; "editor alias")]
    #[test_case("purgeCentralCache", "/b/purgeCentralCache" ; "other script")]
    fn test_script_resolution(name: &str, expected: &str) {
        let paths = ResolvedPaths::resolve(Some("/b"), None, None, None);
        assert_eq!(paths.script(name).unwrap(), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("../sh" ; "traversal")]
    #[test_case("/bin/sh" ; "absolute")]
    fn test_script_rejects(name: &str) {
        let paths = ResolvedPaths::resolve(None, None, None, None);
        assert!(paths.script(name).is_err());
    }
}
