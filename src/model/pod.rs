//! The subset of the Kubernetes `Pod` schema podwatch reads.
//!
//! Unknown fields are ignored, missing optional fields default, so the types
//! deserialize straight from API server list, watch and get responses.

use serde::{Deserialize, Serialize};

use super::{Key, Resource};
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    pub name: String,
    #[serde(default)]
    pub state: ContainerState,
    #[serde(default)]
    pub restart_count: i32,
}

/// At most one of the three is set by the API server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting: Option<ContainerStateWaiting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminated: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStateWaiting {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

impl Pod {
    /// First container whose waiting reason is one of `reasons`.
    ///
    /// Only the first match is reported; later failing containers are picked
    /// up on a subsequent reconciliation once the pod changes again.
    pub fn waiting_container<S: AsRef<str>>(&self, reasons: &[S]) -> Option<&ContainerStatus> {
        self.status.container_statuses.iter().find(|cs| {
            cs.state
                .waiting
                .as_ref()
                .is_some_and(|w| reasons.iter().any(|r| r.as_ref() == w.reason))
        })
    }
}

impl Resource for Pod {
    fn key(&self) -> Result<Key> {
        Key::from_meta(&self.metadata.namespace, &self.metadata.name)
    }

    fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }
}
