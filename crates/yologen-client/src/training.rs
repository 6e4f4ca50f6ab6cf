//! Training configurator: hyperparameters plus the class subset to train on.

use std::sync::Arc;

use tracing::info;

use yologen_core::error::{Result, YologenError};
use yologen_core::models::{Dataset, TrainingConfig, TrainingJob, TrainingRequest};

use crate::ports::{Backend, Notifier};

pub struct TrainingConfigurator {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    dataset_id: String,
    /// The dataset's classes, first occurrence of each name, in order.
    classes: Vec<String>,
    selected: Vec<String>,
    config: TrainingConfig,
}

impl TrainingConfigurator {
    /// Start with the default config and every class selected.
    pub fn new(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>, dataset: &Dataset) -> Self {
        let mut classes: Vec<String> = Vec::with_capacity(dataset.classes.len());
        for class in &dataset.classes {
            if !classes.contains(class) {
                classes.push(class.clone());
            }
        }
        Self {
            backend,
            notifier,
            dataset_id: dataset.id.clone(),
            selected: classes.clone(),
            classes,
            config: TrainingConfig::default(),
        }
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn selected_classes(&self) -> &[String] {
        &self.selected
    }

    pub fn is_selected(&self, class: &str) -> bool {
        self.selected.iter().any(|c| c == class)
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut TrainingConfig {
        &mut self.config
    }

    /// Flip one class. Returns whether it is selected afterwards.
    ///
    /// Deselecting the last selected class is refused and leaves the
    /// selection as it was.
    pub fn toggle(&mut self, class: &str) -> Result<bool> {
        self.ensure_known(class)?;
        if self.is_selected(class) {
            if self.selected.len() == 1 {
                return Err(self.reject("At least one class must be selected"));
            }
            self.selected.retain(|c| c != class);
            Ok(false)
        } else {
            let selected = &self.selected;
            self.selected = self
                .classes
                .iter()
                .filter(|c| selected.contains(*c) || c.as_str() == class)
                .cloned()
                .collect();
            Ok(true)
        }
    }

    pub fn select_all(&mut self) {
        self.selected = self.classes.clone();
    }

    /// Replace the selection. Every name must belong to the dataset.
    pub fn select_only(&mut self, classes: &[String]) -> Result<()> {
        if classes.is_empty() {
            return Err(self.reject("At least one class must be selected"));
        }
        for class in classes {
            self.ensure_known(class)?;
        }
        self.selected = self
            .classes
            .iter()
            .filter(|c| classes.contains(*c))
            .cloned()
            .collect();
        Ok(())
    }

    /// Validate locally, then start the job.
    pub async fn submit(&self) -> Result<TrainingJob> {
        if let Err(e) = self.config.validate() {
            self.notifier.error(&e.to_string());
            return Err(e);
        }
        if self.selected.is_empty() {
            return Err(self.reject("At least one class must be selected"));
        }

        let request = TrainingRequest {
            dataset_id: self.dataset_id.clone(),
            config: self.config.clone(),
            classes: self.selected.clone(),
        };
        info!(
            dataset = %self.dataset_id,
            model = %self.config.model_name,
            epochs = self.config.epochs,
            classes = self.selected.len(),
            "Starting training"
        );

        match self.backend.start_training(&request).await {
            Ok(job_id) => {
                info!(dataset = %self.dataset_id, job = %job_id, "Training job queued");
                self.notifier
                    .success(&format!("Training started, job {job_id}"));
                Ok(TrainingJob {
                    dataset_id: request.dataset_id,
                    config: request.config,
                    classes: request.classes,
                    job_id,
                })
            }
            Err(e) => {
                self.notifier.error(&e.to_string());
                Err(e)
            }
        }
    }

    fn ensure_known(&self, class: &str) -> Result<()> {
        if self.classes.iter().any(|c| c == class) {
            Ok(())
        } else {
            Err(self.reject(&format!("Unknown class '{class}'")))
        }
    }

    fn reject(&self, message: &str) -> YologenError {
        self.notifier.warning(message);
        YologenError::validation(message)
    }
}
