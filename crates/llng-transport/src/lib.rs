//! Multi-transport management of LemonLDAP::NG instances.
//!
//! One [`Transport`] contract covers configuration, session, second-factor,
//! consent and script operations. Three substrates implement it:
//!
//! - [`ShellTransport`]: the command-line tools on the local host or over SSH,
//!   optionally through sudo and a wrapper command
//! - [`KubernetesTransport`]: the same tools inside a portal pod via
//!   `kubectl exec`
//! - [`ApiTransport`]: the manager's REST API
//!
//! A [`TransportRegistry`] maps instance names (and the portal or manager
//! role) to lazily built, cached transports.
//!
//! # Example
//!
//! ```rust,no_run
//! use llng_transport::{
//!     InstanceConfig, RegistryConfig, Role, ShellParams, Transport, TransportRegistry,
//! };
//!
//! # async fn example() -> llng_transport::Result<()> {
//! let config = RegistryConfig::single("prod", InstanceConfig::shell(ShellParams::default()));
//! let registry = TransportRegistry::new(config);
//!
//! let transport = registry.get_transport(None, Role::Manager)?;
//! let info = transport.config_info().await?;
//! println!("current configuration: {:?}", info.version);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
mod cli;
pub mod config;
pub mod error;
pub mod kubernetes;
pub mod merge;
pub mod parse;
pub mod paths;
pub mod registry;
pub mod session;
pub mod shell;
pub mod snapshot;
pub mod transport;

pub use api::ApiTransport;
pub use config::{
    ApiParams, InstanceConfig, KubernetesParams, ManagerOverride, Mode, OidcParams,
    RegistryConfig, ShellParams,
};
pub use error::{Result, TransportError};
pub use kubernetes::KubernetesTransport;
pub use llng_command::{CommandRunner, FakeCommandRunner, ProcessRunner, SshTarget};
pub use merge::{deep_merge, merged};
pub use paths::ResolvedPaths;
pub use registry::{InstanceSummary, Role, TransportRegistry};
pub use session::{
    SessionDeleteReport, SessionFilter, SessionRecord, SessionSearch, resolve_backend,
};
pub use shell::ShellTransport;
pub use snapshot::{ConfigInfo, ConfigSnapshot};
pub use transport::{AnyTransport, Transport, USE_API_MODE, USE_SSH_MODE};
