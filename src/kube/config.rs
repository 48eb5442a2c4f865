//! Cluster connection settings.
//!
//! Resolved once at startup from a kubeconfig file, the in-cluster service
//! account, or `~/.kube/config`, in that order. An explicit master URL
//! overrides whatever server the chosen source names.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use secrecy::SecretString;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// How requests authenticate against the API server.
#[derive(Debug, Clone, Default)]
pub enum Auth {
    #[default]
    None,
    Bearer(SecretString),
    Basic {
        username: String,
        password: SecretString,
    },
}

#[derive(Debug, Clone)]
pub struct KubeConfig {
    pub server: String,
    pub auth: Auth,
    /// Extra PEM-encoded CA bundles to trust.
    pub root_certs: Vec<Vec<u8>>,
    /// PEM client certificate followed by its private key.
    pub identity: Option<Vec<u8>>,
    pub insecure_skip_tls_verify: bool,
}

impl KubeConfig {
    /// A config that talks to `server` with no credentials.
    pub fn for_server(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            auth: Auth::None,
            root_certs: Vec::new(),
            identity: None,
            insecure_skip_tls_verify: false,
        }
    }

    /// Pick a config the way kubectl-style tools do.
    pub fn resolve(kubeconfig: Option<&Path>, master: Option<&str>) -> Result<Self> {
        let mut config = match kubeconfig {
            Some(path) => Some(Self::from_kubeconfig_path(path)?),
            None => match Self::in_cluster() {
                Ok(config) => Some(config),
                Err(e) => {
                    debug!(error = %e, "not running in-cluster");
                    match default_kubeconfig_path().filter(|p| p.exists()) {
                        Some(path) => Some(Self::from_kubeconfig_path(&path)?),
                        None => None,
                    }
                }
            },
        };

        match (config.as_mut(), master) {
            (Some(config), Some(master)) => config.server = master.to_string(),
            (None, Some(master)) => {
                warn!("neither kubeconfig nor in-cluster config found, using master URL only");
                config = Some(Self::for_server(master));
            }
            _ => {}
        }

        config.ok_or_else(|| {
            Error::Config(
                "no cluster configuration: pass --kubeconfig or --master, or run in-cluster"
                    .to_string(),
            )
        })
    }

    /// Service account mounted into every pod.
    pub fn in_cluster() -> Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| Error::Config("KUBERNETES_SERVICE_HOST is not set".to_string()))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let token = std::fs::read_to_string(dir.join("token"))?;
        let ca = std::fs::read(dir.join("ca.crt"))?;

        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host
        };
        Ok(Self {
            server: format!("https://{host}:{port}"),
            auth: Auth::Bearer(SecretString::from(token.trim().to_string())),
            root_certs: vec![ca],
            identity: None,
            insecure_skip_tls_verify: false,
        })
    }

    pub fn from_kubeconfig_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read kubeconfig {}: {e}", path.display()))
        })?;
        Self::from_kubeconfig_str(&content, path.parent())
    }

    /// Parse kubeconfig YAML using its current context. Relative file paths
    /// resolve against `base_dir`.
    pub fn from_kubeconfig_str(yaml: &str, base_dir: Option<&Path>) -> Result<Self> {
        let file: Kubeconfig = serde_yaml::from_str(yaml)?;

        let context_name = file.current_context.as_str();
        let context = file
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .map(|c| &c.context)
            .ok_or_else(|| Error::Config(format!("context {context_name:?} not found")))?;
        let cluster = file
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.cluster)
            .ok_or_else(|| Error::Config(format!("cluster {:?} not found", context.cluster)))?;
        let user = file
            .users
            .iter()
            .find(|u| u.name == context.user)
            .map(|u| u.user.clone())
            .unwrap_or_default();

        let resolve = |p: &Path| match base_dir {
            Some(dir) if p.is_relative() => dir.join(p),
            _ => p.to_path_buf(),
        };

        let mut root_certs = Vec::new();
        if let Some(ca) = load_material(
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref().map(resolve),
        )? {
            root_certs.push(ca);
        }

        let cert = load_material(
            user.client_certificate_data.as_deref(),
            user.client_certificate.as_deref().map(resolve),
        )?;
        let key = load_material(
            user.client_key_data.as_deref(),
            user.client_key.as_deref().map(resolve),
        )?;
        let identity = match (cert, key) {
            (Some(mut cert), Some(key)) => {
                cert.push(b'\n');
                cert.extend_from_slice(&key);
                Some(cert)
            }
            (None, None) => None,
            _ => {
                return Err(Error::Config(
                    "client certificate and key must be given together".to_string(),
                ));
            }
        };

        let token = match (user.token, user.token_file) {
            (Some(token), _) => Some(token),
            (None, Some(path)) => {
                let token = std::fs::read_to_string(resolve(path.as_path()))?;
                Some(token.trim().to_string())
            }
            (None, None) => None,
        };
        let auth = match (token, user.username, user.password) {
            (Some(token), _, _) => Auth::Bearer(SecretString::from(token)),
            (None, Some(username), Some(password)) => Auth::Basic {
                username,
                password: SecretString::from(password),
            },
            _ => Auth::None,
        };

        Ok(Self {
            server: cluster.server.clone(),
            auth,
            root_certs,
            identity,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
        })
    }
}

fn default_kubeconfig_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".kube").join("config"))
}

/// Inline base64 data wins over a file path.
fn load_material(data: Option<&str>, path: Option<PathBuf>) -> Result<Option<Vec<u8>>> {
    if let Some(data) = data {
        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|e| Error::Config(format!("bad base64 in kubeconfig: {e}")))?;
        return Ok(Some(bytes));
    }
    match path {
        Some(path) => Ok(Some(std::fs::read(&path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?)),
        None => Ok(None),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig {
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    current_context: String,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: Cluster,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Cluster {
    server: String,
    certificate_authority: Option<PathBuf>,
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: User,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct User {
    token: Option<String>,
    token_file: Option<PathBuf>,
    username: Option<String>,
    password: Option<String>,
    client_certificate: Option<PathBuf>,
    client_certificate_data: Option<String>,
    client_key: Option<PathBuf>,
    client_key_data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: Context,
}

#[derive(Debug, Deserialize)]
struct Context {
    cluster: String,
    #[serde(default)]
    user: String,
}
