//! Ports between the views and the outside world.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{error, info, warn};

use yologen_core::error::Result;
use yologen_core::models::{
    CreateDatasetRequest, Dataset, DatasetAnalysis, DatasetStats, ExportRequest, HealthStatus,
    PermissionGrant, TrainingJobSummary, TrainingRequest, UploadReport, User,
};
use yologen_core::{Gateway, Role};

use crate::upload::ImageFile;

/// The backend's dataset, training and health API.
#[async_trait]
pub trait Backend: Send + Sync {
    fn gateway(&self) -> &Gateway;

    async fn list_datasets(&self) -> Result<Vec<Dataset>>;
    async fn dataset(&self, id: &str) -> Result<Dataset>;
    async fn dataset_stats(&self, id: &str) -> Result<DatasetStats>;
    async fn create_dataset(&self, request: &CreateDatasetRequest) -> Result<Dataset>;
    async fn delete_dataset(&self, id: &str) -> Result<()>;
    async fn upload_images(&self, id: &str, files: Vec<ImageFile>) -> Result<UploadReport>;
    async fn export_dataset(&self, id: &str, request: &ExportRequest) -> Result<()>;
    /// Triggers the computation and returns the report.
    async fn analyze_dataset(&self, id: &str) -> Result<DatasetAnalysis>;
    /// Returns the job id.
    async fn start_training(&self, request: &TrainingRequest) -> Result<String>;
    async fn training_jobs(&self) -> Result<Vec<TrainingJobSummary>>;
    async fn training_status(&self, job_id: &str) -> Result<TrainingJobSummary>;
    /// Removes the job from the backend's job table.
    async fn delete_training_job(&self, job_id: &str) -> Result<()>;

    /// What the backend grants the current token.
    async fn permissions(&self) -> Result<PermissionGrant>;
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn update_user_role(&self, user_id: &str, role: Role) -> Result<()>;
    async fn delete_user(&self, user_id: &str) -> Result<()>;
    async fn health(&self) -> Result<HealthStatus>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Transient user-visible notifications (toasts).
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);

    fn success(&self, message: &str) {
        self.notify(NoticeLevel::Success, message);
    }

    fn warning(&self, message: &str) {
        self.notify(NoticeLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.notify(NoticeLevel::Error, message);
    }
}

/// Interactive yes/no confirmation before destructive actions.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Forwards notifications to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Success | NoticeLevel::Info => info!("{message}"),
            NoticeLevel::Warning => warn!("{message}"),
            NoticeLevel::Error => error!("{message}"),
        }
    }
}

/// In-memory toast queue: collects notices until a renderer drains them.
#[derive(Debug, Default)]
pub struct NoticeQueue(Mutex<Vec<(NoticeLevel, String)>>);

impl NoticeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<(NoticeLevel, String)> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn snapshot(&self) -> Vec<(NoticeLevel, String)> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self, level: NoticeLevel) -> usize {
        self.snapshot().iter().filter(|(l, _)| *l == level).count()
    }
}

impl Notifier for NoticeQueue {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message.to_string()));
    }
}
