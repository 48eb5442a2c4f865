//! Tests for object keys and the pod model.

use podwatch::model::{
    ContainerState, ContainerStateWaiting, ContainerStatus, Key, ObjectMeta, Pod, PodStatus,
    Resource,
};

fn container(name: &str, waiting: Option<&str>) -> ContainerStatus {
    ContainerStatus {
        name: name.to_string(),
        state: ContainerState {
            waiting: waiting.map(|reason| ContainerStateWaiting {
                reason: reason.to_string(),
                message: format!("{name} is {reason}"),
            }),
            ..Default::default()
        },
        restart_count: 0,
    }
}

fn pod(containers: Vec<ContainerStatus>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: "web".to_string(),
            namespace: "prod".to_string(),
            ..Default::default()
        },
        status: PodStatus {
            phase: Some("Running".to_string()),
            container_statuses: containers,
        },
    }
}

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

#[test]
fn key_displays_namespace_and_name() {
    let key = Key::from_meta("prod", "web").unwrap();
    assert_eq!(key.to_string(), "prod/web");
}

#[test]
fn cluster_scoped_key_displays_name_only() {
    let key = Key::from_meta("", "node-1").unwrap();
    assert_eq!(key.to_string(), "node-1");
}

#[test]
fn key_parses_from_string() {
    let key: Key = "prod/web".parse().unwrap();
    assert_eq!(key, Key::from_meta("prod", "web").unwrap());

    let bare: Key = "web".parse().unwrap();
    assert_eq!(bare.namespace, "");
    assert_eq!(bare.name, "web");
}

#[test]
fn malformed_keys_are_rejected() {
    assert!("a/b/c".parse::<Key>().is_err());
    assert!("prod/".parse::<Key>().is_err());
    assert!(Key::from_meta("prod", "").is_err());
    assert!(Key::from_meta("prod", "we/b").is_err());
}

#[test]
fn equal_metadata_gives_equal_keys() {
    let a = pod(vec![]);
    let mut b = pod(vec![container("app", Some("CrashLoopBackOff"))]);
    b.metadata.resource_version = Some("42".to_string());
    assert_eq!(a.key().unwrap(), b.key().unwrap());
}

// ---------------------------------------------------------------------------
// Pod
// ---------------------------------------------------------------------------

#[test]
fn waiting_container_finds_trigger_reason() {
    let pod = pod(vec![
        container("sidecar", None),
        container("app", Some("CrashLoopBackOff")),
    ]);
    let found = pod.waiting_container(&["CrashLoopBackOff"]).unwrap();
    assert_eq!(found.name, "app");
}

#[test]
fn waiting_container_returns_first_match_only() {
    let pod = pod(vec![
        container("first", Some("CrashLoopBackOff")),
        container("second", Some("CrashLoopBackOff")),
    ]);
    let found = pod.waiting_container(&["CrashLoopBackOff"]).unwrap();
    assert_eq!(found.name, "first");
}

#[test]
fn waiting_container_ignores_other_reasons() {
    let pod = pod(vec![
        container("app", Some("ContainerCreating")),
        container("db", None),
    ]);
    assert!(pod.waiting_container(&["CrashLoopBackOff"]).is_none());
    assert!(pod.waiting_container(&["ContainerCreating"]).is_some());
}

#[test]
fn pod_without_statuses_has_no_waiting_container() {
    let pod = pod(vec![]);
    assert!(pod.waiting_container(&["CrashLoopBackOff"]).is_none());
}

#[test]
fn pod_deserializes_from_api_json() {
    let json = r#"{
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": "web-7d9c",
            "namespace": "prod",
            "resourceVersion": "1234",
            "uid": "8f1e",
            "labels": {"app": "web"}
        },
        "spec": {"containers": [{"name": "app", "image": "web:1"}]},
        "status": {
            "phase": "Running",
            "containerStatuses": [{
                "name": "app",
                "restartCount": 5,
                "ready": false,
                "state": {
                    "waiting": {
                        "reason": "CrashLoopBackOff",
                        "message": "back-off 5m0s restarting failed container"
                    }
                }
            }]
        }
    }"#;

    let pod: Pod = serde_json::from_str(json).unwrap();
    assert_eq!(pod.metadata.name, "web-7d9c");
    assert_eq!(pod.resource_version(), Some("1234"));
    assert_eq!(pod.key().unwrap().to_string(), "prod/web-7d9c");

    let status = pod.waiting_container(&["CrashLoopBackOff"]).unwrap();
    assert_eq!(status.restart_count, 5);
    let waiting = status.state.waiting.as_ref().unwrap();
    assert_eq!(waiting.message, "back-off 5m0s restarting failed container");
}

#[test]
fn pod_with_missing_status_deserializes() {
    let pod: Pod = serde_json::from_str(r#"{"metadata": {"name": "pending"}}"#).unwrap();
    assert!(pod.status.container_statuses.is_empty());
    assert_eq!(pod.key().unwrap().to_string(), "pending");
}
