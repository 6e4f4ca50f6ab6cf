//! In-memory backend for view tests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::oneshot;

use yologen_core::error::{Result, YologenError};
use yologen_core::models::{
    CreateDatasetRequest, Dataset, DatasetAnalysis, DatasetStats, ExportRequest, HealthStatus,
    PermissionGrant, TrainingJobSummary, TrainingRequest, UploadReport, User,
};
use yologen_core::{Gateway, Role};

use crate::ports::Backend;
use crate::upload::ImageFile;

pub fn dataset(id: &str, name: &str, classes: &[&str]) -> Dataset {
    Dataset {
        id: id.to_string(),
        name: name.to_string(),
        classes: classes.iter().map(|c| c.to_string()).collect(),
        ..Default::default()
    }
}

pub fn stats(total: u64, annotated: u64) -> DatasetStats {
    DatasetStats {
        total_images: total,
        annotated_images: annotated,
        unannotated_images: total.saturating_sub(annotated),
        ..Default::default()
    }
}

/// Records every call as `op` or `op:id`. Operations listed in `failures`
/// answer with a 500 carrying the configured detail.
#[derive(Default)]
pub struct FakeBackend {
    gateway: Gateway,
    datasets: Mutex<Vec<Dataset>>,
    stats: Mutex<HashMap<String, DatasetStats>>,
    analysis: Mutex<DatasetAnalysis>,
    failures: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
    last_training: Mutex<Option<TrainingRequest>>,
    last_export: Mutex<Option<ExportRequest>>,
    gates: tokio::sync::Mutex<HashMap<String, oneshot::Receiver<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(self, dataset: Dataset, stats: DatasetStats) -> Self {
        lock(&self.stats).insert(dataset.id.clone(), stats);
        lock(&self.datasets).push(dataset);
        self
    }

    pub fn with_analysis(self, analysis: DatasetAnalysis) -> Self {
        *lock(&self.analysis) = analysis;
        self
    }

    pub fn fail(&self, op: &str, detail: &str) {
        lock(&self.failures).insert(op.to_string(), detail.to_string());
    }

    pub fn recover(&self, op: &str) {
        lock(&self.failures).remove(op);
    }

    pub fn set_stats(&self, id: &str, stats: DatasetStats) {
        lock(&self.stats).insert(id.to_string(), stats);
    }

    /// Make the next `op` call (`list` or `analyze`) wait until the
    /// returned sender fires.
    pub fn hold_next(&self, op: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates
            .try_lock()
            .expect("gates are not contended during setup")
            .insert(op.to_string(), rx);
        tx
    }

    async fn pass_gate(&self, op: &str) {
        let gate = self.gates.lock().await.remove(op);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.as_str() == op || c.starts_with(&format!("{op}:")))
            .count()
    }

    pub fn last_training(&self) -> Option<TrainingRequest> {
        lock(&self.last_training).clone()
    }

    pub fn last_export(&self) -> Option<ExportRequest> {
        lock(&self.last_export).clone()
    }

    fn record(&self, op: &str, id: Option<&str>) -> Result<()> {
        let key = match id {
            Some(id) => format!("{op}:{id}"),
            None => op.to_string(),
        };
        lock(&self.calls).push(key.clone());
        let failures = lock(&self.failures);
        match failures.get(&key).or_else(|| failures.get(op)) {
            Some(detail) => Err(YologenError::Backend {
                status: 500,
                detail: Some(detail.clone()),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    async fn list_datasets(&self) -> Result<Vec<Dataset>> {
        self.record("list", None)?;
        self.pass_gate("list").await;
        Ok(lock(&self.datasets).clone())
    }

    async fn dataset(&self, id: &str) -> Result<Dataset> {
        self.record("dataset", Some(id))?;
        lock(&self.datasets)
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or(YologenError::Backend {
                status: 404,
                detail: Some("Dataset not found".into()),
            })
    }

    async fn dataset_stats(&self, id: &str) -> Result<DatasetStats> {
        self.record("stats", Some(id))?;
        Ok(lock(&self.stats).get(id).cloned().unwrap_or_default())
    }

    async fn create_dataset(&self, request: &CreateDatasetRequest) -> Result<Dataset> {
        self.record("create", None)?;
        let mut datasets = lock(&self.datasets);
        let created = Dataset {
            id: format!("ds-{}", datasets.len() + 1),
            name: request.name.clone(),
            description: request.description.clone(),
            classes: request.classes.clone(),
            ..Default::default()
        };
        datasets.push(created.clone());
        Ok(created)
    }

    async fn delete_dataset(&self, id: &str) -> Result<()> {
        self.record("delete", Some(id))?;
        lock(&self.datasets).retain(|d| d.id != id);
        Ok(())
    }

    async fn upload_images(&self, id: &str, files: Vec<ImageFile>) -> Result<UploadReport> {
        self.record("upload", Some(id))?;
        let mut stats = lock(&self.stats);
        let entry = stats.entry(id.to_string()).or_default();
        entry.total_images += files.len() as u64;
        entry.unannotated_images += files.len() as u64;
        Ok(UploadReport {
            success: true,
            uploaded: files.len(),
            ..Default::default()
        })
    }

    async fn export_dataset(&self, id: &str, request: &ExportRequest) -> Result<()> {
        *lock(&self.last_export) = Some(request.clone());
        self.record("export", Some(id))
    }

    async fn analyze_dataset(&self, id: &str) -> Result<DatasetAnalysis> {
        self.record("analyze", Some(id))?;
        self.pass_gate("analyze").await;
        Ok(lock(&self.analysis).clone())
    }

    async fn start_training(&self, request: &TrainingRequest) -> Result<String> {
        *lock(&self.last_training) = Some(request.clone());
        self.record("train", Some(&request.dataset_id))?;
        Ok(format!("job-{}", request.dataset_id))
    }

    async fn training_jobs(&self) -> Result<Vec<TrainingJobSummary>> {
        self.record("jobs", None)?;
        Ok(Vec::new())
    }

    async fn training_status(&self, job_id: &str) -> Result<TrainingJobSummary> {
        self.record("job", Some(job_id))?;
        Ok(TrainingJobSummary {
            job_id: job_id.to_string(),
            status: "running".into(),
            progress: 0.0,
            dataset_id: None,
            extra: Default::default(),
        })
    }

    async fn delete_training_job(&self, job_id: &str) -> Result<()> {
        self.record("cancel", Some(job_id))
    }

    async fn permissions(&self) -> Result<PermissionGrant> {
        self.record("permissions", None)?;
        Ok(PermissionGrant {
            role: Role::User,
            permissions: Vec::new(),
        })
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.record("users", None)?;
        Ok(Vec::new())
    }

    async fn update_user_role(&self, user_id: &str, _role: Role) -> Result<()> {
        self.record("set_role", Some(user_id))
    }

    async fn delete_user(&self, user_id: &str) -> Result<()> {
        self.record("delete_user", Some(user_id))
    }

    async fn health(&self) -> Result<HealthStatus> {
        self.record("health", None)?;
        Ok(HealthStatus {
            status: "healthy".into(),
            ..Default::default()
        })
    }
}
