//! Layered command composition.
//!
//! A target invocation `[binary, args...]` goes through three ordered stages:
//!
//! 1. **wrapper**: tokens such as `docker exec -i portal` or a `kubectl exec`
//!    prefix are spliced in front of the binary.
//! 2. **sudo**: the sequence is prefixed with `sudo -u <user>`.
//! 3. **ssh**: the whole sequence is shell-quoted into one string and passed
//!    as the remote command of `ssh [-p port] [user@]host`.
//!
//! Each stage is a pure `Vec<String> -> Vec<String>` function and can be
//! used on its own. Only the ssh stage quotes; the earlier stages produce
//! argv that is passed to `execve` untouched.

use crate::command::CommandSpec;
use crate::error::Result;
use crate::quote::{shell_join, shell_split};
use serde::{Deserialize, Serialize};

/// Default ssh client binary.
pub const DEFAULT_SSH_PROGRAM: &str = "ssh";

/// Default sudo binary.
pub const DEFAULT_SUDO_PROGRAM: &str = "sudo";

/// Remote host reached over SSH.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshTarget {
    /// Host name or address.
    pub host: String,

    /// Remote login user.
    #[serde(default)]
    pub user: Option<String>,

    /// Remote port when not 22.
    #[serde(default)]
    pub port: Option<u16>,

    /// Extra options passed to ssh before the destination (e.g. `-i key`).
    #[serde(default)]
    pub options: Vec<String>,
}

impl SshTarget {
    /// Create a target for `host` with default user and port.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
            options: Vec::new(),
        }
    }

    /// `user@host`, or just `host` without a user.
    #[must_use]
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) if !user.is_empty() => format!("{user}@{}", self.host),
            _ => self.host.clone(),
        }
    }
}

/// Stage 1: splice wrapper tokens in front of the binary.
#[must_use]
pub fn apply_wrapper(argv: Vec<String>, wrapper: &[String]) -> Vec<String> {
    if wrapper.is_empty() {
        return argv;
    }
    wrapper.iter().cloned().chain(argv).collect()
}

/// Stage 2: run the sequence as another user.
#[must_use]
pub fn apply_sudo(argv: Vec<String>, user: &str) -> Vec<String> {
    [DEFAULT_SUDO_PROGRAM, "-u", user]
        .into_iter()
        .map(str::to_string)
        .chain(argv)
        .collect()
}

/// Stage 3: run the sequence on a remote host.
///
/// The remote side hands the command string to the login shell, so the whole
/// argv is quoted into a single trailing argument.
#[must_use]
pub fn apply_ssh(argv: &[String], target: &SshTarget) -> Vec<String> {
    let mut out = vec![DEFAULT_SSH_PROGRAM.to_string()];
    out.extend(target.options.iter().cloned());
    if let Some(port) = target.port {
        out.push("-p".to_string());
        out.push(port.to_string());
    }
    out.push(target.destination());
    out.push(shell_join(argv));
    out
}

/// Ordered composition pipeline for shell-family transports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composer {
    wrapper: Vec<String>,
    sudo_user: Option<String>,
    ssh: Option<SshTarget>,
}

impl Composer {
    /// A composer that runs binaries directly on the local host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Splice `tokens` in front of every binary.
    #[must_use]
    pub fn with_wrapper(mut self, tokens: Vec<String>) -> Self {
        self.wrapper = tokens;
        self
    }

    /// Parse a wrapper given as a single command line (`docker exec -i portal`).
    ///
    /// # Errors
    ///
    /// Returns an error if the line has unbalanced quotes.
    pub fn with_wrapper_line(self, line: &str) -> Result<Self> {
        Ok(self.with_wrapper(shell_split(line)?))
    }

    /// Run every binary as `user` through sudo.
    #[must_use]
    pub fn with_sudo(mut self, user: impl Into<String>) -> Self {
        let user = user.into();
        self.sudo_user = (!user.is_empty()).then_some(user);
        self
    }

    /// Run every binary on a remote host.
    #[must_use]
    pub fn with_ssh(mut self, target: SshTarget) -> Self {
        self.ssh = Some(target);
        self
    }

    /// Whether commands leave the local host.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.ssh.is_some()
    }

    /// Run all stages over `[binary, args...]`.
    #[must_use]
    pub fn compose_argv(&self, binary: &str, args: &[String]) -> Vec<String> {
        let mut argv: Vec<String> = std::iter::once(binary.to_string())
            .chain(args.iter().cloned())
            .collect();
        argv = apply_wrapper(argv, &self.wrapper);
        if let Some(user) = &self.sudo_user {
            argv = apply_sudo(argv, user);
        }
        if let Some(target) = &self.ssh {
            argv = apply_ssh(&argv, target);
        }
        argv
    }

    /// Compose a validated command.
    ///
    /// # Errors
    ///
    /// Returns an error if the composed command fails validation.
    pub fn compose(&self, binary: &str, args: &[String]) -> Result<CommandSpec> {
        let spec = CommandSpec::from_argv(self.compose_argv(binary, args))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Compose a command that receives `payload` on stdin.
    ///
    /// The payload travels on the process's standard input, so it is neither
    /// quoted nor subject to argument validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the composed command fails validation.
    pub fn compose_with_stdin(
        &self,
        binary: &str,
        args: &[String],
        payload: impl Into<String>,
    ) -> Result<CommandSpec> {
        Ok(self.compose(binary, args)?.stdin(payload))
    }
}
