//! Tests for the notification backends.

use chrono::{TimeZone, Utc};
use podwatch::config::{AlertmanagerConfig, EmailConfig, HandlerConfig};
use podwatch::handlers::alertmanager::{ALERT_NAME, Alert};
use podwatch::handlers::email::render_body;
use podwatch::handlers::{self, AlertmanagerHandler, ConsoleHandler, EmailHandler, Event, Handler};
use podwatch::Error;
use secrecy::SecretString;

fn event() -> Event {
    Event {
        namespace: "prod".to_string(),
        name: "web-7d9c".to_string(),
        container: "app".to_string(),
        reason: "CrashLoopBackOff".to_string(),
        message: "back-off 5m0s restarting failed container".to_string(),
        logs: vec!["starting".to_string(), "panic: boom".to_string()],
        detected_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    }
}

fn email_config() -> EmailConfig {
    EmailConfig {
        host: "smtp.example.com".to_string(),
        port: 465,
        username: "podwatch@example.com".to_string(),
        password: Some(SecretString::from("hunter2")),
        receivers: vec!["oncall@example.com".to_string()],
    }
}

#[test]
fn summary_names_container_and_pod() {
    assert_eq!(event().summary(), "Container app in pod prod/web-7d9c crashed");
}

// ---------------------------------------------------------------------------
// Alertmanager
// ---------------------------------------------------------------------------

#[test]
fn alert_carries_event_identity_and_logs() {
    let alert = Alert::from(&event());
    assert_eq!(alert.labels["alertname"], ALERT_NAME);
    assert_eq!(ALERT_NAME, "podwatcher");
    assert_eq!(alert.labels["severity"], "critical");
    assert_eq!(alert.labels["namespace"], "prod");
    assert_eq!(alert.labels["name"], "web-7d9c");
    assert_eq!(alert.labels["container"], "app");
    assert_eq!(alert.labels["log"], "starting\npanic: boom");
    assert_eq!(
        alert.annotations["summary"],
        "Container app in pod prod/web-7d9c crashed"
    );
    assert_eq!(
        alert.annotations["info"],
        "back-off 5m0s restarting failed container"
    );
}

#[test]
fn alert_serializes_in_v2_shape() {
    let json = serde_json::to_value([Alert::from(&event())]).unwrap();
    let alert = &json[0];
    assert_eq!(alert["labels"]["container"], "app");
    assert_eq!(alert["startsAt"], "2024-05-01T12:00:00Z");
    assert!(alert.get("starts_at").is_none());
}

#[test]
fn alertmanager_requires_an_address() {
    let result = AlertmanagerHandler::new(&AlertmanagerConfig {
        address: String::new(),
        username: None,
        password: None,
    });
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn alertmanager_endpoint_targets_v2_api() {
    let handler = AlertmanagerHandler::new(&AlertmanagerConfig {
        address: "http://alertmanager:9093/".to_string(),
        username: Some("admin".to_string()),
        password: Some(SecretString::from("secret")),
    })
    .unwrap();
    assert_eq!(handler.endpoint(), "http://alertmanager:9093/api/v2/alerts");
    assert_eq!(handler.name(), "alertmanager");
}

#[tokio::test]
async fn alertmanager_reports_unreachable_server() {
    let handler = AlertmanagerHandler::new(&AlertmanagerConfig {
        address: "http://127.0.0.1:1".to_string(),
        username: None,
        password: None,
    })
    .unwrap();
    let result = handler.handle(event()).await;
    assert!(matches!(result, Err(Error::Http(_))));
}

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

#[test]
fn email_body_lists_log_lines() {
    let body = render_body(&event()).unwrap();
    assert!(body.contains("Container app in pod prod/web-7d9c is crashed"));
    assert!(body.contains("<h1>Reason:</h1>CrashLoopBackOff"));
    assert!(body.contains("<div>starting</div>"));
    assert!(body.contains("<div>panic: boom</div>"));
    assert!(!body.contains("no logs"));
}

#[test]
fn email_body_without_logs_says_so() {
    let mut event = event();
    event.logs.clear();
    let body = render_body(&event).unwrap();
    assert!(body.contains("<strong>no logs</strong>"));
}

#[test]
fn email_body_escapes_event_text() {
    let mut event = event();
    event.logs = vec!["<script>alert(1)</script>".to_string()];
    let body = render_body(&event).unwrap();
    assert!(!body.contains("<script>"));
    assert!(body.contains("&lt;script&gt;"));
}

#[test]
fn email_handler_builds_from_config() {
    let handler = EmailHandler::new(&email_config()).unwrap();
    assert_eq!(handler.name(), "email");

    let starttls = EmailHandler::new(&EmailConfig {
        port: 587,
        password: None,
        ..email_config()
    });
    assert!(starttls.is_ok());
}

#[test]
fn email_handler_rejects_bad_addresses() {
    let no_receivers = EmailHandler::new(&EmailConfig {
        receivers: vec![],
        ..email_config()
    });
    assert!(matches!(no_receivers, Err(Error::Config(_))));

    let bad_sender = EmailHandler::new(&EmailConfig {
        username: "not an address".to_string(),
        ..email_config()
    });
    assert!(matches!(bad_sender, Err(Error::Config(_))));

    let bad_receiver = EmailHandler::new(&EmailConfig {
        receivers: vec!["oncall@example.com".to_string(), "@@".to_string()],
        ..email_config()
    });
    assert!(matches!(bad_receiver, Err(Error::Config(_))));
}

// ---------------------------------------------------------------------------
// Console and factory
// ---------------------------------------------------------------------------

#[tokio::test]
async fn console_handler_always_succeeds() {
    ConsoleHandler.handle(event()).await.unwrap();
    assert_eq!(ConsoleHandler.name(), "console");
}

#[test]
fn build_picks_the_configured_backend() {
    let console = handlers::build(&HandlerConfig::Console).unwrap();
    assert_eq!(console.name(), "console");

    let email = handlers::build(&HandlerConfig::Email(email_config())).unwrap();
    assert_eq!(email.name(), "email");

    let alertmanager = handlers::build(&HandlerConfig::Alertmanager(AlertmanagerConfig {
        address: "http://alertmanager:9093".to_string(),
        username: None,
        password: None,
    }))
    .unwrap();
    assert_eq!(alertmanager.name(), "alertmanager");
}

#[test]
fn build_surfaces_config_errors() {
    let result = handlers::build(&HandlerConfig::Alertmanager(AlertmanagerConfig {
        address: String::new(),
        username: None,
        password: None,
    }));
    assert!(result.is_err());
}
