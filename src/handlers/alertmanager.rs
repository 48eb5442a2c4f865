//! Push alerts to a Prometheus Alertmanager.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use super::{Event, Handler};
use crate::config::AlertmanagerConfig;
use crate::error::{Error, Result};

/// Value of the `alertname` label. Alertmanager routes match on it.
pub const ALERT_NAME: &str = "podwatcher";

/// One entry of the `POST /api/v2/alerts` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub starts_at: DateTime<Utc>,
}

impl From<&Event> for Alert {
    fn from(event: &Event) -> Self {
        let labels = BTreeMap::from([
            ("alertname".to_string(), ALERT_NAME.to_string()),
            ("severity".to_string(), "critical".to_string()),
            ("namespace".to_string(), event.namespace.clone()),
            ("name".to_string(), event.name.clone()),
            ("container".to_string(), event.container.clone()),
            ("log".to_string(), event.logs.join("\n")),
        ]);
        let annotations = BTreeMap::from([
            ("summary".to_string(), event.summary()),
            ("info".to_string(), event.message.clone()),
        ]);
        Self {
            labels,
            annotations,
            starts_at: event.detected_at,
        }
    }
}

pub struct AlertmanagerHandler {
    http: reqwest::Client,
    endpoint: String,
    credentials: Option<(String, SecretString)>,
}

impl AlertmanagerHandler {
    pub fn new(config: &AlertmanagerConfig) -> Result<Self> {
        if config.address.is_empty() {
            return Err(Error::Config(
                "ALERTMANAGER_ADDRESS is required for the alertmanager handler".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        // Basic auth only when both halves are present.
        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.expose_secret().is_empty() => {
                Some((user.clone(), pass.clone()))
            }
            _ => None,
        };

        Ok(Self {
            http,
            endpoint: format!("{}/api/v2/alerts", config.address.trim_end_matches('/')),
            credentials,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Handler for AlertmanagerHandler {
    fn name(&self) -> &'static str {
        "alertmanager"
    }

    async fn handle(&self, event: Event) -> Result<()> {
        let alerts = [Alert::from(&event)];
        let mut req = self.http.post(&self.endpoint).json(&alerts);
        if let Some((ref user, ref pass)) = self.credentials {
            req = req.basic_auth(user, Some(pass.expose_secret()));
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Handler(format!(
                "alertmanager returned {status}: {body}"
            )));
        }
        debug!(endpoint = %self.endpoint, "alert pushed");
        Ok(())
    }
}
