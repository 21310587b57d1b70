//! Named instances resolved to cached transports.

use crate::config::{DEFAULT_INSTANCE, InstanceConfig, Mode, OidcParams, RegistryConfig};
use crate::error::{Result, TransportError};
use crate::transport::AnyTransport;
use llng_command::{CommandRunner, ProcessRunner};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Which endpoint of an instance an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end-user runtime.
    #[default]
    Portal,
    /// The administrative configuration endpoint.
    Manager,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Portal => write!(f, "portal"),
            Self::Manager => write!(f, "manager"),
        }
    }
}

/// Discovery view of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSummary {
    /// Instance name.
    pub name: String,
    /// Transport mode.
    pub mode: Mode,
    /// Whether this is the default instance.
    pub is_default: bool,
    /// Whether a manager override is declared.
    pub has_manager: bool,
}

#[derive(Debug, Default)]
struct TransportEntry {
    portal: Option<Arc<AnyTransport>>,
    manager: Option<Arc<AnyTransport>>,
    manager_resolved: bool,
}

/// Resolves instance names to transports, building each one on first use and
/// caching it for the life of the registry.
///
/// Building a transport performs no I/O, so a configuration error for one
/// instance only surfaces when that instance is requested.
pub struct TransportRegistry {
    config: RegistryConfig,
    runner: Arc<dyn CommandRunner>,
    entries: RwLock<HashMap<String, TransportEntry>>,
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("default_instance", &self.default_instance())
            .field("instances", &self.config.instances.keys().collect::<Vec<_>>())
            .field("cached", &self.entries.read().len())
            .finish()
    }
}

impl TransportRegistry {
    /// A registry whose shell-family transports spawn real processes.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_runner(config, Arc::new(ProcessRunner::new()))
    }

    /// A registry whose shell-family transports run commands through `runner`.
    #[must_use]
    pub fn with_runner(config: RegistryConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            runner,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Name of the instance used when none is given.
    #[must_use]
    pub fn default_instance(&self) -> &str {
        if self.config.default_instance.is_empty() {
            DEFAULT_INSTANCE
        } else {
            &self.config.default_instance
        }
    }

    fn instance(&self, name: Option<&str>) -> Result<(&str, &InstanceConfig)> {
        let name = name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.default_instance());
        match self.config.instances.get_key_value(name) {
            Some((name, config)) => Ok((name.as_str(), config)),
            None => Err(TransportError::unknown_instance(
                name,
                self.config.instances.keys().cloned().collect(),
            )),
        }
    }

    /// The transport for `(instance, role)`.
    ///
    /// `None` selects the default instance. A manager request on an instance
    /// without a manager override returns the portal transport.
    ///
    /// # Errors
    ///
    /// Returns an unknown-instance error listing every configured name, or a
    /// configuration error if the instance's parameters do not match its mode.
    pub fn get_transport(&self, instance: Option<&str>, role: Role) -> Result<Arc<AnyTransport>> {
        let (name, config) = self.instance(instance)?;
        if let Some(cached) = self.cached(name, role) {
            return Ok(cached);
        }

        // Transports are built outside the lock; a concurrent builder for the
        // same slot loses and its transport is dropped.
        if role == Role::Manager {
            let manager = match config.manager_config() {
                Some(manager_config) => {
                    debug!(
                        instance = name,
                        mode = %manager_config.mode,
                        "building manager transport"
                    );
                    Some(Arc::new(AnyTransport::from_config(
                        &manager_config,
                        Arc::clone(&self.runner),
                    )?))
                }
                None => None,
            };
            let mut entries = self.entries.write();
            let entry = entries.entry(name.to_string()).or_default();
            if !entry.manager_resolved {
                entry.manager = manager;
                entry.manager_resolved = true;
            }
            if let Some(manager) = &entry.manager {
                return Ok(Arc::clone(manager));
            }
        }

        if let Some(portal) = self.cached(name, Role::Portal) {
            return Ok(portal);
        }
        debug!(instance = name, mode = %config.mode, "building portal transport");
        let portal = Arc::new(AnyTransport::from_config(config, Arc::clone(&self.runner))?);
        let mut entries = self.entries.write();
        let entry = entries.entry(name.to_string()).or_default();
        Ok(Arc::clone(entry.portal.get_or_insert(portal)))
    }

    fn cached(&self, name: &str, role: Role) -> Option<Arc<AnyTransport>> {
        let entries = self.entries.read();
        let entry = entries.get(name)?;
        match role {
            Role::Portal => entry.portal.clone(),
            Role::Manager if entry.manager_resolved => {
                entry.manager.clone().or_else(|| entry.portal.clone())
            }
            Role::Manager => None,
        }
    }

    /// OIDC settings of an instance, independent of its transport mode.
    ///
    /// # Errors
    ///
    /// Returns an unknown-instance error, or a configuration error if the
    /// instance declares no OIDC block.
    pub fn get_oidc_config(&self, instance: Option<&str>) -> Result<&OidcParams> {
        let (name, config) = self.instance(instance)?;
        config.oidc.as_ref().ok_or_else(|| {
            TransportError::configuration(format!("instance '{name}' has no 'oidc' block"))
        })
    }

    /// Every configured instance, ordered by name.
    #[must_use]
    pub fn list_instances(&self) -> Vec<InstanceSummary> {
        let default = self.default_instance();
        self.config
            .instances
            .iter()
            .map(|(name, config)| InstanceSummary {
                name: name.clone(),
                mode: config.mode,
                is_default: name == default,
                has_manager: config.manager.is_some(),
            })
            .collect()
    }
}
