//! Notification sinks.
//!
//! Every backend implements [`Handler`]; which one runs is chosen once at
//! startup from [`HandlerConfig`]. A handler must return its failures so the
//! controller can retry and, eventually, report them.

pub mod alertmanager;
pub mod console;
pub mod email;

pub use alertmanager::AlertmanagerHandler;
pub use console::ConsoleHandler;
pub use email::EmailHandler;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HandlerConfig;
use crate::error::Result;

/// Snapshot of one detected crash, built once per trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub namespace: String,
    pub name: String,
    pub container: String,
    pub reason: String,
    pub message: String,
    /// Tail of the container's log output, oldest line first.
    pub logs: Vec<String>,
    pub detected_at: DateTime<Utc>,
}

impl Event {
    /// One-line description used as alert summary and mail subject.
    pub fn summary(&self) -> String {
        format!(
            "Container {} in pod {}/{} crashed",
            self.container, self.namespace, self.name
        )
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    /// Short backend name for logs and metrics.
    fn name(&self) -> &'static str;

    async fn handle(&self, event: Event) -> Result<()>;
}

/// Construct the configured backend.
pub fn build(config: &HandlerConfig) -> Result<Arc<dyn Handler>> {
    let handler: Arc<dyn Handler> = match config {
        HandlerConfig::Alertmanager(cfg) => Arc::new(AlertmanagerHandler::new(cfg)?),
        HandlerConfig::Email(cfg) => Arc::new(EmailHandler::new(cfg)?),
        HandlerConfig::Console => Arc::new(ConsoleHandler),
    };
    Ok(handler)
}
