//! Per-dataset pipeline actions: upload, generate a version, train.

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{error, info, warn};

use yologen_core::error::{Result, YologenError};
use yologen_core::models::{AugmentationConfig, DatasetStats, ExportRequest, TrainingJob, UploadReport};
use yologen_core::{PipelineController, PipelineStatus};

use crate::ports::{Backend, Notifier};
use crate::training::TrainingConfigurator;
use crate::upload;

pub struct DatasetWorkflow {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    dataset_id: String,
    controller: Mutex<PipelineController>,
}

impl DatasetWorkflow {
    pub fn new(
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn Notifier>,
        dataset_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            notifier,
            dataset_id: dataset_id.into(),
            controller: Mutex::new(PipelineController::new()),
        }
    }

    fn controller_mut(&self) -> MutexGuard<'_, PipelineController> {
        self.controller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    pub fn controller(&self) -> PipelineController {
        self.controller_mut().clone()
    }

    pub fn status(&self, stats: &DatasetStats) -> PipelineStatus {
        self.controller_mut().status(stats)
    }

    /// Send the allow-listed files; `refresh` runs if anything was stored.
    pub async fn upload<F, Fut>(&self, paths: &[PathBuf], refresh: F) -> Result<UploadReport>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let selection = upload::screen(paths);
        for reason in &selection.rejected {
            warn!(dataset = %self.dataset_id, "Skipping {reason}");
        }
        let (files, rejected) = upload::load(selection).await;
        if files.is_empty() {
            let err = YologenError::validation(format!(
                "No supported images selected (allowed: {})",
                upload::ALLOWED_IMAGE_TYPES.join(", ")
            ));
            self.notifier.error(&err.to_string());
            return Err(err);
        }

        info!(dataset = %self.dataset_id, files = files.len(), "Uploading images");
        let mut report = match self.backend.upload_images(&self.dataset_id, files).await {
            Ok(report) => report,
            Err(e) => {
                error!(dataset = %self.dataset_id, error = %e, "Upload failed");
                self.notifier.error(&format!("Upload failed: {e}"));
                return Err(e);
            }
        };
        report.rejected = rejected;

        if report.uploaded > 0 {
            self.notifier
                .success(&format!("Uploaded {} image(s)", report.uploaded));
        }
        let failed = report.error_count.max(report.errors.len()) + report.rejected.len();
        if failed > 0 {
            self.notifier
                .warning(&format!("{failed} file(s) could not be uploaded"));
        }
        if report.uploaded > 0 {
            refresh().await;
        }
        Ok(report)
    }

    /// Export a version with the given augmentations and the fixed split.
    ///
    /// No retry on failure and nothing is recorded locally.
    pub async fn generate_version<F, Fut>(&self, config: AugmentationConfig, refresh: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let request = ExportRequest::new(config);
        info!(dataset = %self.dataset_id, ?config, "Generating dataset version");
        match self.backend.export_dataset(&self.dataset_id, &request).await {
            Ok(()) => {
                self.notifier.success("Dataset version generated");
                self.controller_mut().mark_exported();
                refresh().await;
                Ok(())
            }
            Err(e) => {
                error!(dataset = %self.dataset_id, error = %e, "Version generation failed");
                self.notifier
                    .error(&format!("Failed to generate version: {e}"));
                Err(e)
            }
        }
    }

    pub async fn train(&self, configurator: &TrainingConfigurator) -> Result<TrainingJob> {
        if configurator.dataset_id() != self.dataset_id {
            return Err(YologenError::validation(format!(
                "Training configuration belongs to dataset {}",
                configurator.dataset_id()
            )));
        }
        let job = configurator.submit().await?;
        self.controller_mut().mark_trained();
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::ports::{NoticeLevel, NoticeQueue};
    use crate::testing::{dataset, stats, FakeBackend};
    use yologen_core::models::DEFAULT_SPLIT_RATIO;
    use yologen_core::{PipelineAction, PipelineStage};

    fn workflow() -> (DatasetWorkflow, Arc<FakeBackend>, Arc<NoticeQueue>) {
        let backend = Arc::new(
            FakeBackend::new().with_dataset(dataset("d1", "cars", &["car"]), stats(3, 3)),
        );
        let notices = Arc::new(NoticeQueue::new());
        (
            DatasetWorkflow::new(backend.clone(), notices.clone(), "d1"),
            backend,
            notices,
        )
    }

    #[tokio::test]
    async fn generate_marks_exported_and_refreshes() {
        let (wf, backend, notices) = workflow();
        let refreshed = AtomicUsize::new(0);
        wf.generate_version(
            AugmentationConfig {
                flip_vertical: true,
                ..Default::default()
            },
            || async {
                refreshed.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await
        .unwrap();

        assert_eq!(refreshed.load(Ordering::SeqCst), 1);
        let sent = backend.last_export().unwrap();
        assert_eq!(sent.split_ratio, DEFAULT_SPLIT_RATIO);
        assert!(sent.config.flip_vertical);

        let status = wf.status(&stats(3, 3));
        assert_eq!(status.stage, PipelineStage::Exported);
        assert_eq!(status.recommended, Some(PipelineAction::Train));
        assert_eq!(notices.count(NoticeLevel::Success), 1);
    }

    #[tokio::test]
    async fn failed_generate_leaves_stage_alone() {
        let (wf, backend, notices) = workflow();
        backend.fail("export", "Export failed");
        let refreshed = AtomicUsize::new(0);
        let result = wf
            .generate_version(AugmentationConfig::default(), || async {
                refreshed.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert!(result.is_err());
        assert_eq!(refreshed.load(Ordering::SeqCst), 0);
        assert_eq!(backend.count("export"), 1);
        assert!(!wf.controller().is_exported());
        assert_eq!(notices.count(NoticeLevel::Error), 1);
    }

    #[tokio::test]
    async fn upload_skips_unsupported_files() {
        let (wf, backend, notices) = workflow();
        let tmp = tempfile::TempDir::new().unwrap();
        let image = tmp.path().join("a.jpg");
        let text = tmp.path().join("notes.txt");
        std::fs::write(&image, b"jpeg").unwrap();
        std::fs::write(&text, b"text").unwrap();

        let refreshed = AtomicUsize::new(0);
        let report = wf
            .upload(&[image, text], || async {
                refreshed.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(report.uploaded, 1);
        assert_eq!(report.rejected, vec!["notes.txt: Not a supported image type"]);
        assert_eq!(backend.count("upload"), 1);
        assert_eq!(refreshed.load(Ordering::SeqCst), 1);
        assert_eq!(notices.count(NoticeLevel::Warning), 1);
    }

    #[tokio::test]
    async fn upload_with_nothing_allowed_is_local() {
        let (wf, backend, _) = workflow();
        let err = wf
            .upload(&[PathBuf::from("video.mp4")], || async {})
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(backend.count("upload"), 0);
    }

    #[tokio::test]
    async fn train_marks_trained() {
        let (wf, backend, notices) = workflow();
        let configurator =
            TrainingConfigurator::new(backend.clone(), notices, &dataset("d1", "cars", &["car"]));
        let job = wf.train(&configurator).await.unwrap();
        assert_eq!(job.classes, vec!["car"]);
        assert!(wf.controller().is_trained());
        assert_eq!(wf.status(&stats(3, 3)).recommended, None);
    }

    #[tokio::test]
    async fn train_rejects_foreign_configurator() {
        let (wf, backend, notices) = workflow();
        let configurator =
            TrainingConfigurator::new(backend.clone(), notices, &dataset("d2", "other", &["x"]));
        assert!(wf.train(&configurator).await.unwrap_err().is_validation());
        assert_eq!(backend.count("train"), 0);
    }
}
