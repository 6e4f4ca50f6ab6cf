//! Dataset health view: runs the backend analysis and keeps the last report.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use yologen_core::analysis::{frequency_bars, FrequencyBar};
use yologen_core::error::Result;
use yologen_core::models::DatasetAnalysis;
use yologen_core::RequestSequencer;

use crate::ports::Backend;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisViewState {
    pub loading: bool,
    pub analysis: Option<DatasetAnalysis>,
    pub error: Option<String>,
}

impl AnalysisViewState {
    /// Offer a retry after a failed request.
    pub fn can_retry(&self) -> bool {
        self.error.is_some() && !self.loading
    }
}

pub struct AnalysisView {
    backend: Arc<dyn Backend>,
    dataset_id: String,
    sequencer: RequestSequencer,
    state: Mutex<AnalysisViewState>,
}

impl AnalysisView {
    pub fn new(backend: Arc<dyn Backend>, dataset_id: impl Into<String>) -> Self {
        Self {
            backend,
            dataset_id: dataset_id.into(),
            sequencer: RequestSequencer::new(),
            state: Mutex::new(AnalysisViewState::default()),
        }
    }

    fn state_mut(&self) -> MutexGuard<'_, AnalysisViewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> AnalysisViewState {
        self.state_mut().clone()
    }

    pub fn analysis(&self) -> Option<DatasetAnalysis> {
        self.state_mut().analysis.clone()
    }

    /// First load: nothing is shown until the report arrives.
    pub async fn load(&self) -> Result<DatasetAnalysis> {
        *self.state_mut() = AnalysisViewState {
            loading: true,
            ..Default::default()
        };
        self.fetch().await
    }

    /// Re-run the analysis, keeping the previous report on screen.
    pub async fn refresh(&self) -> Result<DatasetAnalysis> {
        {
            let mut state = self.state_mut();
            state.loading = true;
            state.error = None;
        }
        self.fetch().await
    }

    pub async fn retry(&self) -> Result<DatasetAnalysis> {
        if self.state_mut().analysis.is_some() {
            self.refresh().await
        } else {
            self.load().await
        }
    }

    /// Drop whatever is in flight; late responses are ignored.
    pub fn unmount(&self) {
        self.sequencer.invalidate();
        self.state_mut().loading = false;
    }

    /// Class-frequency chart for the current report.
    pub fn bars(&self) -> Vec<FrequencyBar> {
        self.state_mut()
            .analysis
            .as_ref()
            .map(|a| frequency_bars(&a.class_frequency))
            .unwrap_or_default()
    }

    async fn fetch(&self) -> Result<DatasetAnalysis> {
        let ticket = self.sequencer.begin();
        let result = self.backend.analyze_dataset(&self.dataset_id).await;
        if !self.sequencer.is_current(ticket) {
            debug!(dataset = %self.dataset_id, "Discarding superseded analysis");
            return result;
        }

        let mut state = self.state_mut();
        state.loading = false;
        match &result {
            Ok(analysis) => {
                debug!(
                    dataset = %self.dataset_id,
                    quality = analysis.overall_quality_score,
                    issues = analysis.issue_count(),
                    "Analysis loaded"
                );
                state.analysis = Some(analysis.clone());
                state.error = None;
            }
            Err(e) => {
                warn!(dataset = %self.dataset_id, error = %e, "Analysis failed");
                state.error = Some(e.to_string());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::testing::FakeBackend;

    fn report(score: f64) -> DatasetAnalysis {
        DatasetAnalysis {
            overall_quality_score: score,
            class_frequency: BTreeMap::from([
                ("a".to_string(), 10),
                ("b".to_string(), 5),
                ("c".to_string(), 0),
            ]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn load_populates_state_and_bars() {
        let backend = Arc::new(FakeBackend::new().with_analysis(report(87.0)));
        let view = AnalysisView::new(backend, "d1");
        view.load().await.unwrap();

        let state = view.state();
        assert!(!state.loading);
        assert_eq!(state.analysis.unwrap().overall_quality_score, 87.0);
        let heights: Vec<f64> = view.bars().iter().map(|b| b.height_pct).collect();
        assert_eq!(heights, vec![100.0, 50.0, 0.0]);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_report() {
        let backend = Arc::new(FakeBackend::new().with_analysis(report(60.0)));
        let view = AnalysisView::new(backend.clone(), "d1");
        view.load().await.unwrap();

        backend.fail("analyze", "Analysis worker unavailable");
        assert!(view.refresh().await.is_err());
        let state = view.state();
        assert!(state.can_retry());
        assert_eq!(state.error.as_deref(), Some("Analysis worker unavailable"));
        assert_eq!(state.analysis.unwrap().overall_quality_score, 60.0);

        backend.recover("analyze");
        view.retry().await.unwrap();
        assert!(view.state().error.is_none());
        assert_eq!(backend.count("analyze"), 3);
    }

    #[tokio::test]
    async fn failed_first_load_shows_error_only() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail("analyze", "boom");
        let view = AnalysisView::new(backend, "d1");
        assert!(view.load().await.is_err());
        let state = view.state();
        assert!(state.analysis.is_none());
        assert!(state.can_retry());
        assert!(view.bars().is_empty());
    }

    #[tokio::test]
    async fn unmount_discards_late_response() {
        let backend = Arc::new(FakeBackend::new().with_analysis(report(10.0)));
        let release = backend.hold_next("analyze");
        let view = Arc::new(AnalysisView::new(backend.clone(), "d1"));

        let pending = tokio::spawn({
            let view = view.clone();
            async move { view.load().await }
        });
        while backend.count("analyze") == 0 {
            tokio::task::yield_now().await;
        }
        view.unmount();
        release.send(()).unwrap();

        assert!(pending.await.unwrap().is_ok());
        let state = view.state();
        assert!(!state.loading);
        assert!(state.analysis.is_none());
    }

    #[tokio::test]
    async fn newer_refresh_wins() {
        let backend = Arc::new(FakeBackend::new().with_analysis(report(10.0)));
        let view = Arc::new(AnalysisView::new(backend.clone(), "d1"));
        view.load().await.unwrap();

        let release = backend.hold_next("analyze");
        let slow = tokio::spawn({
            let view = view.clone();
            async move { view.refresh().await }
        });
        while backend.count("analyze") < 2 {
            tokio::task::yield_now().await;
        }
        backend.fail("analyze", "late failure");
        // Not gated: completes immediately with the failure.
        assert!(view.refresh().await.is_err());
        backend.recover("analyze");
        release.send(()).unwrap();
        slow.await.unwrap().unwrap();

        // The slow success came from a superseded request.
        let state = view.state();
        assert_eq!(state.error.as_deref(), Some("late failure"));
    }
}
