//! Backend liveness polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use yologen_core::models::HealthStatus;

use crate::ports::Backend;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum BackendHealth {
    /// No check has completed yet.
    #[default]
    Unknown,
    Online(HealthStatus),
    Offline(String),
}

impl BackendHealth {
    pub fn is_online(&self) -> bool {
        matches!(self, BackendHealth::Online(_))
    }

    fn label(&self) -> &'static str {
        match self {
            BackendHealth::Unknown => "unknown",
            BackendHealth::Online(_) => "online",
            BackendHealth::Offline(_) => "offline",
        }
    }
}

/// Check `/health` once.
pub async fn check(backend: &dyn Backend) -> BackendHealth {
    match backend.health().await {
        Ok(status) if status.is_healthy() => BackendHealth::Online(status),
        Ok(status) => BackendHealth::Offline(format!("Backend reports status '{}'", status.status)),
        Err(e) => BackendHealth::Offline(e.to_string()),
    }
}

pub struct HealthMonitor;

impl HealthMonitor {
    /// Poll every `interval`, starting immediately. The task stops when the
    /// returned handle is stopped or dropped.
    pub fn spawn(backend: Arc<dyn Backend>, interval: Duration) -> HealthHandle {
        let (tx, rx) = watch::channel(BackendHealth::Unknown);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticks = IntervalStream::new(tokio::time::interval(interval));
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    tick = ticks.next() => {
                        if tick.is_none() {
                            break;
                        }
                    }
                }
                let health = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    health = check(backend.as_ref()) => health,
                };

                let previous = tx.send_replace(health.clone());
                if previous.label() != health.label() {
                    match &health {
                        BackendHealth::Offline(reason) => warn!(%reason, "Backend offline"),
                        _ => info!(status = health.label(), "Backend status changed"),
                    }
                }
            }
            debug!("Health monitor stopped");
        });

        HealthHandle {
            state: rx,
            cancel,
            task: Some(task),
        }
    }
}

pub struct HealthHandle {
    state: watch::Receiver<BackendHealth>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl HealthHandle {
    pub fn current(&self) -> BackendHealth {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BackendHealth> {
        self.state.clone()
    }

    /// Cancel and wait for the polling task to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for HealthHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
