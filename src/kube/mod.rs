//! Minimal Kubernetes API client: discovery, pod list/watch and log tails.

pub mod config;
pub mod watch;

pub use config::{Auth, KubeConfig};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::{Method, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use crate::cache::{ObjectList, WatchEvent, WatchSource};
use crate::controller::LogSource;
use crate::error::{Error, Result};
use crate::model::Pod;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reply of `GET /version`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerVersion {
    #[serde(default)]
    pub major: String,
    #[serde(default)]
    pub minor: String,
    #[serde(default)]
    pub git_version: String,
    #[serde(default)]
    pub platform: String,
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.git_version, self.platform)
    }
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    metadata: ListMeta,
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMeta {
    #[serde(default)]
    resource_version: String,
}

/// Read-only client scoped to one namespace (or all, when empty).
pub struct KubeClient {
    http: reqwest::Client,
    server: String,
    auth: Auth,
    namespace: String,
    watch_timeout: Duration,
}

impl KubeClient {
    pub fn new(config: &KubeConfig, namespace: impl Into<String>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("podwatch/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(config.insecure_skip_tls_verify);
        for pem in &config.root_certs {
            for cert in reqwest::Certificate::from_pem_bundle(pem)? {
                builder = builder.add_root_certificate(cert);
            }
        }
        if let Some(ref pem) = config.identity {
            builder = builder.identity(reqwest::Identity::from_pem(pem)?);
        }

        Ok(Self {
            http: builder.build()?,
            server: config.server.trim_end_matches('/').to_string(),
            auth: config.auth.clone(),
            namespace: namespace.into(),
            watch_timeout: Duration::from_secs(300),
        })
    }

    /// How long the server keeps one watch open before closing it.
    pub fn watch_timeout(mut self, timeout: Duration) -> Self {
        self.watch_timeout = timeout;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.http.request(method, format!("{}{path}", self.server));
        match &self.auth {
            Auth::None => req,
            Auth::Bearer(token) => req.bearer_auth(token.expose_secret()),
            Auth::Basic { username, password } => {
                req.basic_auth(username, Some(password.expose_secret()))
            }
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(Error::Kube {
            status: status.as_u16(),
            message,
        })
    }

    fn pods_path(&self) -> String {
        if self.namespace.is_empty() {
            "/api/v1/pods".to_string()
        } else {
            format!("/api/v1/namespaces/{}/pods", self.namespace)
        }
    }

    /// Startup discovery: proves the server is reachable and credentials work.
    pub async fn server_version(&self) -> Result<ServerVersion> {
        let req = self.request(Method::GET, "/version").timeout(REQUEST_TIMEOUT);
        Ok(self.send(req).await?.json().await?)
    }
}

#[async_trait]
impl WatchSource<Pod> for KubeClient {
    async fn list(&self) -> Result<ObjectList<Pod>> {
        let req = self
            .request(Method::GET, &self.pods_path())
            .timeout(REQUEST_TIMEOUT);
        let list: PodList = self.send(req).await?.json().await?;
        debug!(count = list.items.len(), "listed pods");
        Ok(ObjectList {
            items: list.items,
            resource_version: list.metadata.resource_version,
        })
    }

    async fn watch(
        &self,
        resource_version: &str,
    ) -> Result<BoxStream<'static, Result<WatchEvent<Pod>>>> {
        let timeout_secs = self.watch_timeout.as_secs().max(1).to_string();
        let req = self
            .request(Method::GET, &self.pods_path())
            .query(&[
                ("watch", "true"),
                ("resourceVersion", resource_version),
                ("timeoutSeconds", timeout_secs.as_str()),
            ])
            .timeout(self.watch_timeout + REQUEST_TIMEOUT);
        let resp = self.send(req).await?;
        Ok(watch::event_stream(resp))
    }
}

#[async_trait]
impl LogSource for KubeClient {
    async fn tail_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        lines: u32,
    ) -> Result<String> {
        let path = format!("/api/v1/namespaces/{namespace}/pods/{pod}/log");
        let tail_lines = lines.to_string();
        let req = self
            .request(Method::GET, &path)
            .query(&[("container", container), ("tailLines", tail_lines.as_str())])
            .timeout(REQUEST_TIMEOUT);
        Ok(self.send(req).await?.text().await?)
    }
}
