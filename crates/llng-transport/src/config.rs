//! Instance configuration.
//!
//! These types are filled in by an external loader (any serde format); this
//! crate never reads files or environment variables. A transport is only
//! built when the parameter block matching its [`Mode`] is present.

use crate::error::{Result, TransportError};
use llng_command::SshTarget;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Default directory holding the LemonLDAP::NG command-line tools.
pub const DEFAULT_BIN_PREFIX: &str = "/usr/share/lemonldap-ng/bin";

/// Default deployment name used to derive the pod selector.
pub const DEFAULT_DEPLOYMENT: &str = "lemonldap-ng";

/// Default instance name when the registry config names none.
pub const DEFAULT_INSTANCE: &str = "default";

/// How operations reach an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Run the CLI binaries locally or over SSH.
    #[default]
    Shell,
    /// Run the CLI binaries inside a pod through `kubectl exec`.
    Kubernetes,
    /// Call the REST management API.
    Api,
}

impl Mode {
    /// Lowercase mode name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Kubernetes => "kubernetes",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for [`Mode::Shell`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellParams {
    /// Directory containing the binaries.
    pub bin_prefix: Option<String>,
    /// Explicit path to `lemonldap-ng-cli`.
    pub cli_path: Option<String>,
    /// Explicit path to `lemonldap-ng-sessions`.
    pub sessions_path: Option<String>,
    /// Explicit path to `lmConfigEditor`.
    pub config_editor_path: Option<String>,
    /// Remote host; commands run locally when absent.
    pub remote: Option<SshTarget>,
    /// Run the binaries as this user through sudo.
    pub sudo_user: Option<String>,
    /// Command line spliced in front of every binary (e.g. `docker exec -i sso`).
    pub wrapper: Option<String>,
}

/// Parameters for [`Mode::Kubernetes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesParams {
    /// Namespace holding the portal pods.
    pub namespace: String,
    /// kubectl context; the current context is used when absent.
    pub context: Option<String>,
    /// Deployment name used to derive the pod selector.
    pub deployment: String,
    /// Explicit label selector; overrides the derived one.
    pub pod_selector: Option<String>,
    /// Container to exec into, for multi-container pods.
    pub container: Option<String>,
    /// Path to the kubectl binary.
    pub kubectl_path: String,
    /// Directory containing the binaries inside the container.
    pub bin_prefix: Option<String>,
    /// Explicit path to `lemonldap-ng-cli` inside the container.
    pub cli_path: Option<String>,
    /// Explicit path to `lemonldap-ng-sessions` inside the container.
    pub sessions_path: Option<String>,
    /// Explicit path to `lmConfigEditor` inside the container.
    pub config_editor_path: Option<String>,
}

impl Default for KubernetesParams {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            context: None,
            deployment: DEFAULT_DEPLOYMENT.to_string(),
            pod_selector: None,
            container: None,
            kubectl_path: "kubectl".to_string(),
            bin_prefix: None,
            cli_path: None,
            sessions_path: None,
            config_editor_path: None,
        }
    }
}

impl KubernetesParams {
    /// The label selector used to find the portal pod.
    #[must_use]
    pub fn selector(&self) -> String {
        match &self.pod_selector {
            Some(selector) if !selector.is_empty() => selector.clone(),
            _ => format!("app.kubernetes.io/name={}", self.deployment),
        }
    }
}

/// Parameters for [`Mode::Api`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiParams {
    /// Base URL of the manager, e.g. `https://manager.example.com`.
    pub base_url: String,
    /// Basic-Auth user.
    #[serde(default)]
    pub username: Option<String>,
    /// Basic-Auth password.
    #[serde(default)]
    pub password: Option<String>,
    /// Verify the server certificate.
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

fn default_true() -> bool {
    true
}

impl ApiParams {
    /// Parameters for `base_url` with no auth and TLS verification on.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            username: None,
            password: None,
            verify_tls: true,
        }
    }
}

impl fmt::Debug for ApiParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiParams")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

/// OIDC relying-party settings for an instance.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcParams {
    /// Issuer URL.
    pub issuer: String,
    /// Client identifier.
    pub client_id: String,
    /// Client secret, for confidential clients.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Redirect URI registered for the client.
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Requested scopes.
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_scope() -> String {
    "openid profile email".to_string()
}

impl fmt::Debug for OidcParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcParams")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Where the manager role differs from the portal.
///
/// Blocks present here replace the instance's blocks; an absent mode inherits
/// the instance mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerOverride {
    /// Mode for the manager role.
    pub mode: Option<Mode>,
    /// Shell parameters for the manager role.
    pub shell: Option<ShellParams>,
    /// Kubernetes parameters for the manager role.
    pub kubernetes: Option<KubernetesParams>,
    /// API parameters for the manager role.
    pub api: Option<ApiParams>,
}

/// Configuration of one named instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Transport mode.
    pub mode: Mode,
    /// Shell parameters.
    pub shell: Option<ShellParams>,
    /// Kubernetes parameters.
    pub kubernetes: Option<KubernetesParams>,
    /// API parameters.
    pub api: Option<ApiParams>,
    /// OIDC settings.
    pub oidc: Option<OidcParams>,
    /// Manager-role override.
    pub manager: Option<ManagerOverride>,
}

impl InstanceConfig {
    /// A shell-mode instance.
    #[must_use]
    pub fn shell(params: ShellParams) -> Self {
        Self {
            mode: Mode::Shell,
            shell: Some(params),
            ..Self::default()
        }
    }

    /// A Kubernetes-mode instance.
    #[must_use]
    pub fn kubernetes(params: KubernetesParams) -> Self {
        Self {
            mode: Mode::Kubernetes,
            kubernetes: Some(params),
            ..Self::default()
        }
    }

    /// An API-mode instance.
    #[must_use]
    pub fn api(params: ApiParams) -> Self {
        Self {
            mode: Mode::Api,
            api: Some(params),
            ..Self::default()
        }
    }

    /// Attach OIDC settings.
    #[must_use]
    pub fn with_oidc(mut self, oidc: OidcParams) -> Self {
        self.oidc = Some(oidc);
        self
    }

    /// Attach a manager-role override.
    #[must_use]
    pub fn with_manager(mut self, manager: ManagerOverride) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Check that the block for the active mode is present.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the missing block.
    pub fn validate(&self) -> Result<()> {
        let present = match self.mode {
            Mode::Shell => self.shell.is_some(),
            Mode::Kubernetes => self.kubernetes.is_some(),
            Mode::Api => self.api.is_some(),
        };
        if present {
            Ok(())
        } else {
            Err(TransportError::configuration(format!(
                "mode '{mode}' requires a '{mode}' parameter block",
                mode = self.mode
            )))
        }
    }

    /// The effective configuration for the manager role, if one is declared.
    #[must_use]
    pub fn manager_config(&self) -> Option<Self> {
        let manager = self.manager.as_ref()?;
        Some(Self {
            mode: manager.mode.unwrap_or(self.mode),
            shell: manager.shell.clone().or_else(|| self.shell.clone()),
            kubernetes: manager
                .kubernetes
                .clone()
                .or_else(|| self.kubernetes.clone()),
            api: manager.api.clone().or_else(|| self.api.clone()),
            oidc: self.oidc.clone(),
            manager: None,
        })
    }
}

/// Configuration of every known instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Instance used when the caller names none.
    pub default_instance: String,
    /// Instances by name.
    pub instances: BTreeMap<String, InstanceConfig>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_instance: DEFAULT_INSTANCE.to_string(),
            instances: BTreeMap::new(),
        }
    }
}

impl RegistryConfig {
    /// A registry config with a single instance that is also the default.
    #[must_use]
    pub fn single(name: impl Into<String>, instance: InstanceConfig) -> Self {
        let name = name.into();
        let mut instances = BTreeMap::new();
        instances.insert(name.clone(), instance);
        Self {
            default_instance: name,
            instances,
        }
    }

    /// Add or replace an instance.
    #[must_use]
    pub fn with_instance(mut self, name: impl Into<String>, instance: InstanceConfig) -> Self {
        self.instances.insert(name.into(), instance);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_serde_lowercase() {
        let json = serde_json::to_string(&Mode::Kubernetes).unwrap();
        assert_eq!(json, "\"kubernetes\"");
        let mode: Mode = serde_json::from_str("\"api\"").unwrap();
        assert_eq!(mode, Mode::Api);
    }

    #[test]
    fn test_selector_derived_from_deployment() {
        let params = KubernetesParams {
            deployment: "sso".to_string(),
            ..Default::default()
        };
        assert_eq!(params.selector(), "app.kubernetes.io/name=sso");
    }

    #[test]
    fn test_explicit_selector_wins() {
        let params = KubernetesParams {
            pod_selector: Some("app=portal,tier=web".to_string()),
            ..Default::default()
        };
        assert_eq!(params.selector(), "app=portal,tier=web");
    }

    #[test]
    fn test_validate_missing_block() {
        let config = InstanceConfig {
            mode: Mode::Api,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("'api'"));
    }

    #[test]
    fn test_validate_present_block() {
        assert!(InstanceConfig::shell(ShellParams::default()).validate().is_ok());
        assert!(InstanceConfig::api(ApiParams::new("https://m")).validate().is_ok());
    }

    #[test]
    fn test_manager_config_absent() {
        assert!(InstanceConfig::shell(ShellParams::default())
            .manager_config()
            .is_none());
    }

    #[test]
    fn test_manager_config_switches_mode() {
        let config = InstanceConfig::shell(ShellParams::default()).with_manager(ManagerOverride {
            mode: Some(Mode::Api),
            api: Some(ApiParams::new("https://manager.example.com")),
            ..Default::default()
        });
        let manager = config.manager_config().unwrap();
        assert_eq!(manager.mode, Mode::Api);
        assert!(manager.validate().is_ok());
        assert!(manager.shell.is_some());
        assert!(manager.manager.is_none());
    }

    #[test]
    fn test_manager_config_inherits_mode() {
        let config = InstanceConfig::shell(ShellParams::default()).with_manager(ManagerOverride {
            shell: Some(ShellParams {
                remote: Some(SshTarget::new("manager-host")),
                ..Default::default()
            }),
            ..Default::default()
        });
        let manager = config.manager_config().unwrap();
        assert_eq!(manager.mode, Mode::Shell);
        assert_eq!(
            manager.shell.unwrap().remote.unwrap().host,
            "manager-host"
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let api = ApiParams {
            password: Some("hunter2".to_string()),
            ..ApiParams::new("https://m")
        };
        assert!(!format!("{api:?}").contains("hunter2"));

        let oidc = OidcParams {
            issuer: "https://auth.example.com".to_string(),
            client_id: "rp".to_string(),
            client_secret: Some("s3cret".to_string()),
            redirect_uri: None,
            scope: default_scope(),
        };
        assert!(!format!("{oidc:?}").contains("s3cret"));
    }

    #[test]
    fn test_deserialize_instance_defaults() {
        let json = r#"{
            "mode": "kubernetes",
            "kubernetes": { "namespace": "auth" },
            "oidc": { "issuer": "https://auth.example.com", "client_id": "rp" }
        }"#;
        let config: InstanceConfig = serde_json::from_str(json).unwrap();
        let k8s = config.kubernetes.unwrap();
        assert_eq!(k8s.namespace, "auth");
        assert_eq!(k8s.deployment, DEFAULT_DEPLOYMENT);
        assert_eq!(k8s.kubectl_path, "kubectl");
        assert_eq!(config.oidc.unwrap().scope, "openid profile email");
    }

    #[test]
    fn test_deserialize_api_verify_tls_default() {
        let params: ApiParams = serde_json::from_str(r#"{"base_url":"https://m"}"#).unwrap();
        assert!(params.verify_tls);
    }

    #[test]
    fn test_registry_config_default_name() {
        assert_eq!(RegistryConfig::default().default_instance, DEFAULT_INSTANCE);
    }
}
