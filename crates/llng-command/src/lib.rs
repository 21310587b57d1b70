//! Safe composition and execution of LemonLDAP::NG command-line tools.
//!
//! The shell-family transports never hand a command line to a local shell.
//! They build an argv, layer it through the [`Composer`] stages (wrapper,
//! sudo, ssh) and give the result to a [`CommandRunner`].
//!
//! # Security
//!
//! - **No local shell**: commands are spawned with `execve`-style argv
//! - **Remote quoting**: only the ssh stage produces a shell string, and every
//!   token in it is single-quoted with [`shell_quote`]
//! - **Argument validation**: NUL, CR and LF are rejected in argv and env
//! - **Quiet failures**: stderr is captured and discarded, never returned
//!
//! # Example
//!
//! ```rust,no_run
//! use llng_command::{CommandRunner, Composer, ProcessRunner, SshTarget};
//!
//! # async fn example() -> llng_command::Result<()> {
//! let composer = Composer::new()
//!     .with_sudo("www-data")
//!     .with_ssh(SshTarget::new("sso.example.com"));
//!
//! let spec = composer.compose(
//!     "/usr/share/lemonldap-ng/bin/lemonldap-ng-cli",
//!     &["info".to_string()],
//! )?;
//! let output = ProcessRunner::new().run(&spec).await?;
//! println!("{}", output.stdout_lossy());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod compose;
pub mod error;
pub mod quote;
pub mod runner;

pub use command::{CommandOutput, CommandSpec, validate_argument, validate_program_path};
pub use compose::{Composer, SshTarget, apply_ssh, apply_sudo, apply_wrapper};
pub use error::{CommandError, Result};
pub use quote::{shell_join, shell_quote, shell_split};
pub use runner::{CommandRunner, FakeCommandRunner, FakeResponse, ProcessRunner, RunFuture};
