//! Dataset registry: the list of datasets with their stats, plus create,
//! delete and export-by-navigation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use yologen_core::error::Result;
use yologen_core::forms::DatasetForm;
use yologen_core::models::{Dataset, DatasetStats};
use yologen_core::{Navigator, PipelineController, PipelineStatus, RequestSequencer};

use crate::ports::{Backend, Confirm, Notifier};

/// One row of the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetEntry {
    pub dataset: Dataset,
    pub stats: DatasetStats,
    /// Set when the stats fetch failed and `stats` is the zeroed placeholder.
    pub stats_error: Option<String>,
}

impl DatasetEntry {
    pub fn status(&self, controller: &PipelineController) -> PipelineStatus {
        controller.status(&self.stats)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistryState {
    pub entries: Vec<DatasetEntry>,
    pub loading: bool,
    pub error: Option<String>,
    pub form: DatasetForm,
}

pub struct DatasetRegistry {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    sequencer: RequestSequencer,
    state: Mutex<RegistryState>,
}

impl DatasetRegistry {
    pub fn new(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            notifier,
            sequencer: RequestSequencer::new(),
            state: Mutex::new(RegistryState::default()),
        }
    }

    fn state_mut(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> RegistryState {
        self.state_mut().clone()
    }

    pub fn entries(&self) -> Vec<DatasetEntry> {
        self.state_mut().entries.clone()
    }

    /// Fetch the datasets, then every dataset's stats concurrently.
    ///
    /// A failed stats fetch degrades that entry to zeroed stats. Only a
    /// failure of the list itself is an error. If a newer `list` started in
    /// the meantime the result is returned but not kept.
    pub async fn list(&self) -> Result<Vec<DatasetEntry>> {
        let ticket = self.sequencer.begin();
        {
            let mut state = self.state_mut();
            state.loading = true;
            state.error = None;
        }

        let datasets = match self.backend.list_datasets().await {
            Ok(datasets) => datasets,
            Err(e) => {
                if self.sequencer.is_current(ticket) {
                    let mut state = self.state_mut();
                    state.loading = false;
                    state.error = Some(e.to_string());
                }
                self.notifier
                    .error(&format!("Failed to load datasets: {e}"));
                return Err(e);
            }
        };

        let stats = join_all(datasets.iter().map(|d| self.backend.dataset_stats(&d.id))).await;
        let entries: Vec<DatasetEntry> = datasets
            .into_iter()
            .zip(stats)
            .map(|(dataset, stats)| match stats {
                Ok(stats) => DatasetEntry {
                    dataset,
                    stats,
                    stats_error: None,
                },
                Err(e) => {
                    warn!(dataset = %dataset.id, error = %e, "Failed to load dataset stats");
                    DatasetEntry {
                        dataset,
                        stats: DatasetStats::default(),
                        stats_error: Some(e.to_string()),
                    }
                }
            })
            .collect();

        if self.sequencer.is_current(ticket) {
            let mut state = self.state_mut();
            state.entries = entries.clone();
            state.loading = false;
            debug!(count = entries.len(), "Dataset list loaded");
        } else {
            debug!("Discarding superseded dataset list");
        }
        Ok(entries)
    }

    /// Validate locally, create, then reload the list.
    pub async fn create(&self, name: &str, description: &str, classes_csv: &str) -> Result<Dataset> {
        let request = {
            let mut state = self.state_mut();
            state.form.open();
            state.form.fill(name, description, classes_csv);
            state.form.submit()
        };
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                self.notifier.error(&e.to_string());
                return Err(e);
            }
        };

        match self.backend.create_dataset(&request).await {
            Ok(dataset) => {
                info!(dataset = %dataset.id, name = %dataset.name, classes = dataset.classes.len(), "Dataset created");
                self.notifier
                    .success(&format!("Dataset '{}' created", dataset.name));
                self.state_mut().form.reset();
                if let Err(e) = self.list().await {
                    warn!(error = %e, "Reload after create failed");
                }
                Ok(dataset)
            }
            Err(e) => {
                self.state_mut().form.error = Some(e.to_string());
                self.notifier
                    .error(&format!("Failed to create dataset: {e}"));
                Err(e)
            }
        }
    }

    /// Delete after confirmation. Returns `false` if the user declined.
    pub async fn delete(&self, id: &str, confirm: &dyn Confirm) -> Result<bool> {
        let label = self
            .state_mut()
            .entries
            .iter()
            .find(|e| e.dataset.id == id)
            .map(|e| e.dataset.name.clone())
            .unwrap_or_else(|| id.to_string());

        if !confirm.confirm(&format!(
            "Delete dataset '{label}'? This removes all of its images and annotations."
        )) {
            debug!(dataset = %id, "Delete cancelled");
            return Ok(false);
        }

        match self.backend.delete_dataset(id).await {
            Ok(()) => {
                info!(dataset = %id, "Dataset deleted");
                self.notifier.success(&format!("Dataset '{label}' deleted"));
                if let Err(e) = self.list().await {
                    warn!(error = %e, "Reload after delete failed");
                }
                Ok(true)
            }
            Err(e) => {
                self.notifier
                    .error(&format!("Failed to delete dataset: {e}"));
                Err(e)
            }
        }
    }

    /// Hand the export download URL to the navigator and return it.
    pub fn export(&self, id: &str, navigator: &dyn Navigator) -> String {
        let url = self.backend.gateway().download_export(id);
        info!(dataset = %id, %url, "Opening dataset export");
        navigator.navigate(&url);
        url
    }
}
