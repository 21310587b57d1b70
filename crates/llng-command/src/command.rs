//! Command values and argument validation.
//!
//! A [`CommandSpec`] is the fully composed invocation handed to a
//! [`CommandRunner`](crate::CommandRunner): program, argv, extra environment
//! and an optional stdin payload. Nothing here spawns a process.
//!
//! Arguments are never interpreted by a local shell, so shell metacharacters
//! are allowed. Characters that break argv or SSH command transport (NUL, CR,
//! LF) are rejected.

use crate::error::{CommandError, Result};
use std::fmt;

/// Characters that are never allowed in command arguments.
const FORBIDDEN_CHARS: &[char] = &['\0', '\n', '\r'];

/// Validate a command argument.
///
/// # Errors
///
/// Returns an error if the argument contains forbidden characters.
pub fn validate_argument(arg: &str, field: &str) -> Result<()> {
    if let Some(c) = arg.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(CommandError::validation(
            field,
            format!("forbidden character {c:?}"),
        ));
    }
    Ok(())
}

/// Validate a program path.
///
/// # Errors
///
/// Returns an error if the path is empty or contains forbidden characters.
pub fn validate_program_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(CommandError::validation("program", "cannot be empty"));
    }
    validate_argument(path, "program")
}

/// A fully composed command, ready to run.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    stdin: Option<String>,
}

impl CommandSpec {
    /// Create a command for the given program with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
        }
    }

    /// Build a command from a full argv, where `argv[0]` is the program.
    ///
    /// # Errors
    ///
    /// Returns an error if `argv` is empty.
    pub fn from_argv(argv: Vec<String>) -> Result<Self> {
        let mut iter = argv.into_iter();
        let program = iter
            .next()
            .ok_or_else(|| CommandError::validation("argv", "cannot be empty"))?;
        Ok(Self::new(program).args(iter))
    }

    /// Append a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append multiple arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child process.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Deliver `payload` on the child's standard input.
    #[must_use]
    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// The program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments, not including the program.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Extra environment entries.
    #[must_use]
    pub fn environment(&self) -> &[(String, String)] {
        &self.env
    }

    /// The stdin payload, if any.
    #[must_use]
    pub fn stdin_payload(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    /// The full argv: program followed by arguments.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Check the program, every argument and every environment entry.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found.
    pub fn validate(&self) -> Result<()> {
        validate_program_path(&self.program)?;
        for arg in &self.args {
            validate_argument(arg, "argument")?;
        }
        for (key, value) in &self.env {
            if key.is_empty() || key.contains('=') {
                return Err(CommandError::validation(
                    "env_key",
                    format!("'{key}' is not a valid variable name"),
                ));
            }
            validate_argument(key, "env_key")?;
            validate_argument(value, "env_value")?;
        }
        Ok(())
    }
}

// Stdin payloads and env values may carry configuration secrets, so they are
// summarized rather than printed.
impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field(
                "env",
                &self.env.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            )
            .field("stdin_bytes", &self.stdin.as_ref().map(String::len))
            .finish()
    }
}

/// Output from a successful command execution.
///
/// Standard error is deliberately not part of the output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: Vec<u8>,
}

impl CommandOutput {
    /// Wrap captured standard output.
    #[must_use]
    pub fn new(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
        }
    }

    /// Get stdout as a UTF-8 string, replacing invalid characters.
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("--flag" ; "flag")]
    #[test_case("--key=value" ; "key value")]
    #[test_case("" ; "empty")]
    #[test_case("uid=it's me; rm -rf /" ; "shell metacharacters")]
    fn test_validate_argument_accepts(arg: &str) {
        assert!(validate_argument(arg, "arg").is_ok());
    }

    #[test_case("arg\0value" ; "null byte")]
    #[test_case("line1\nline2" ; "newline")]
    #[test_case("text\r" ; "carriage return")]
    fn test_validate_argument_rejects(arg: &str) {
        let err = validate_argument(arg, "arg").unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_validate_program_path_empty() {
        assert!(validate_program_path("").is_err());
        assert!(validate_program_path("   ").is_err());
        assert!(validate_program_path("/usr/bin/ssh").is_ok());
    }

    #[test]
    fn test_from_argv() {
        let spec = CommandSpec::from_argv(vec![
            "lemonldap-ng-cli".to_string(),
            "info".to_string(),
        ])
        .unwrap();
        assert_eq!(spec.program(), "lemonldap-ng-cli");
        assert_eq!(spec.arguments(), ["info"]);
        assert_eq!(spec.argv(), vec!["lemonldap-ng-cli", "info"]);
    }

    #[test]
    fn test_from_argv_empty() {
        assert!(CommandSpec::from_argv(Vec::new()).is_err());
    }

    #[test]
    fn test_validate_env() {
        assert!(CommandSpec::new("cli").env("LANG", "C").validate().is_ok());
        assert!(CommandSpec::new("cli").env("A=B", "C").validate().is_err());
        assert!(CommandSpec::new("cli").env("", "C").validate().is_err());
        assert!(CommandSpec::new("cli").env("X", "a\nb").validate().is_err());
    }

    #[test]
    fn test_stdin_is_not_validated() {
        let spec = CommandSpec::new("cli").stdin("{\n  \"a\": 1\n}");
        assert!(spec.validate().is_ok());
        assert_eq!(spec.stdin_payload(), Some("{\n  \"a\": 1\n}"));
    }

    #[test]
    fn test_debug_hides_payloads() {
        let spec = CommandSpec::new("cli")
            .env("TOKEN", "s3cret")
            .stdin("{\"password\":\"hunter2\"}");
        let debug = format!("{spec:?}");
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("TOKEN"));
    }

    #[test]
    fn test_command_output_lossy() {
        let output = CommandOutput::new(b"hello".to_vec());
        assert_eq!(output.stdout_lossy(), "hello");
    }
}
