//! podwatch CLI: run the pod crash watcher.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use podwatch::cache::{Informer, Store, WatchSource};
use podwatch::config::{Config, HandlerKind};
use podwatch::controller::Controller;
use podwatch::handlers::{self, Event};
use podwatch::kube::{KubeClient, KubeConfig};
use podwatch::model::{Key, Pod};
use podwatch::queue::RateLimitingQueue;
use podwatch::telemetry::{TelemetryConfig, init_telemetry};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "podwatch", about = "Notify once per crash-looping container")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch pods and dispatch crash events until interrupted
    Serve {
        /// Path to a kubeconfig file
        #[arg(long)]
        kubeconfig: Option<PathBuf>,
        /// API server URL, overrides the kubeconfig
        #[arg(long)]
        master: Option<String>,
        /// Namespace to watch (all namespaces when omitted)
        #[arg(long)]
        namespace: Option<String>,
        /// Notification backend
        #[arg(long)]
        handler: Option<HandlerKind>,
        /// Concurrent worker loops
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Send a synthetic event through the configured handler
    TestHandler {
        /// Notification backend
        #[arg(long)]
        handler: Option<HandlerKind>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            kubeconfig,
            master,
            namespace,
            handler,
            workers,
        } => {
            let mut overrides = HashMap::new();
            if let Some(path) = kubeconfig {
                overrides.insert("KUBECONFIG", path.display().to_string());
            }
            if let Some(master) = master {
                overrides.insert("KUBE_MASTER", master);
            }
            if let Some(namespace) = namespace {
                overrides.insert("WATCH_NAMESPACE", namespace);
            }
            if let Some(handler) = handler {
                overrides.insert("PODWATCH_HANDLER", handler.to_string());
            }
            if let Some(workers) = workers {
                overrides.insert("PODWATCH_WORKERS", workers.to_string());
            }
            cmd_serve(load_config(&overrides)?).await
        }
        Command::TestHandler { handler } => {
            let mut overrides = HashMap::new();
            if let Some(handler) = handler {
                overrides.insert("PODWATCH_HANDLER", handler.to_string());
            }
            cmd_test_handler(load_config(&overrides)?).await
        }
    }
}

/// Command-line values win over the environment.
fn load_config(overrides: &HashMap<&str, String>) -> podwatch::Result<Config> {
    Config::from_lookup(|name| {
        overrides
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
    })
}

async fn cmd_serve(config: Config) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "podwatch".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let kube_config = KubeConfig::resolve(config.kubeconfig.as_deref(), config.master.as_deref())?;
    let client = Arc::new(KubeClient::new(&kube_config, config.namespace.clone())?);
    let version = client.server_version().await?;
    info!(server = %kube_config.server, %version, "connected to cluster");

    let handler = handlers::build(&config.handler)?;
    let queue: RateLimitingQueue<Key> = RateLimitingQueue::with_default_limiter("pods");
    let store: Arc<Store<Pod>> = Arc::new(Store::new());
    let source: Arc<dyn WatchSource<Pod>> = client.clone();
    let informer = Informer::new(source, Arc::clone(&store), queue.clone());
    let controller = Controller::new(
        queue,
        store,
        client,
        handler,
        config.controller_config(),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let informer_stop = shutdown.clone();
    let informer_task = tokio::spawn(async move { informer.run(informer_stop).await });

    let result = controller.run(shutdown.clone()).await;
    shutdown.cancel();
    informer_task.await?;
    result?;

    info!("podwatch exited cleanly");
    Ok(())
}

async fn cmd_test_handler(config: Config) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: None,
        service_name: "podwatch".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let handler = handlers::build(&config.handler)?;
    let event = Event {
        namespace: "default".to_string(),
        name: "podwatch-test".to_string(),
        container: "app".to_string(),
        reason: "CrashLoopBackOff".to_string(),
        message: "synthetic event from podwatch test-handler".to_string(),
        logs: vec!["podwatch: this is a test".to_string()],
        detected_at: Utc::now(),
    };
    handler.handle(event).await?;
    println!("Delivered test event via {}", handler.name());
    Ok(())
}

#[cfg(unix)]
async fn shutdown_on_signal(token: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGTERM, using Ctrl-C only");
            tokio::signal::ctrl_c().await.ok();
            token.cancel();
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("got signal: SIGINT"),
        _ = terminate.recv() => info!("got signal: SIGTERM"),
    }
    token.cancel();
}

#[cfg(not(unix))]
async fn shutdown_on_signal(token: CancellationToken) {
    tokio::signal::ctrl_c().await.ok();
    info!("got signal: Ctrl-C");
    token.cancel();
}
