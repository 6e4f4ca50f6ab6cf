//! Pipeline stage controller.
//!
//! A dataset moves through `created → uploaded → annotated → exported →
//! trained`. The first three stages are derived from [`DatasetStats`]; the last
//! two come from explicit user actions the stats cannot reveal. Actions are
//! enabled independently by monotone preconditions, so going back (uploading
//! more images after annotation) is never blocked. Only the recommended next
//! step is ordered.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::DatasetStats;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Created,
    Uploaded,
    Annotated,
    Exported,
    Trained,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 5] = [
        PipelineStage::Created,
        PipelineStage::Uploaded,
        PipelineStage::Annotated,
        PipelineStage::Exported,
        PipelineStage::Trained,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Created => "created",
            PipelineStage::Uploaded => "uploaded",
            PipelineStage::Annotated => "annotated",
            PipelineStage::Exported => "exported",
            PipelineStage::Trained => "trained",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PipelineAction {
    Upload,
    Annotate,
    /// Generate a version: export with augmentation.
    Generate,
    Train,
}

impl PipelineAction {
    pub const ALL: [PipelineAction; 4] = [
        PipelineAction::Upload,
        PipelineAction::Annotate,
        PipelineAction::Generate,
        PipelineAction::Train,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineAction::Upload => "upload",
            PipelineAction::Annotate => "annotate",
            PipelineAction::Generate => "generate",
            PipelineAction::Train => "train",
        }
    }
}

impl fmt::Display for PipelineAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the controller concluded for one stats snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStatus {
    pub stage: PipelineStage,
    pub enabled: Vec<PipelineAction>,
    pub recommended: Option<PipelineAction>,
}

impl PipelineStatus {
    pub fn is_enabled(&self, action: PipelineAction) -> bool {
        self.enabled.contains(&action)
    }

    /// Stages up to and including the current one are complete.
    pub fn is_reached(&self, stage: PipelineStage) -> bool {
        stage <= self.stage
    }
}

/// Tracks one dataset's progress through the pipeline.
///
/// Holds only the two facts the backend's stats cannot tell us. Everything
/// else is recomputed from the stats on every call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineController {
    exported: bool,
    trained: bool,
}

impl PipelineController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_exported(&mut self) {
        self.exported = true;
    }

    pub fn mark_trained(&mut self) {
        self.exported = true;
        self.trained = true;
    }

    pub fn is_exported(&self) -> bool {
        self.exported
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn stage(&self, stats: &DatasetStats) -> PipelineStage {
        if self.trained {
            PipelineStage::Trained
        } else if self.exported {
            PipelineStage::Exported
        } else if stats.total_images == 0 {
            PipelineStage::Created
        } else if stats.is_fully_annotated() {
            PipelineStage::Annotated
        } else {
            PipelineStage::Uploaded
        }
    }

    pub fn is_enabled(&self, action: PipelineAction, stats: &DatasetStats) -> bool {
        match action {
            PipelineAction::Upload => true,
            PipelineAction::Annotate => stats.total_images > 0,
            PipelineAction::Generate => stats.is_fully_annotated(),
            PipelineAction::Train => self.exported,
        }
    }

    pub fn enabled_actions(&self, stats: &DatasetStats) -> Vec<PipelineAction> {
        PipelineAction::ALL
            .into_iter()
            .filter(|a| self.is_enabled(*a, stats))
            .collect()
    }

    /// The single next step to highlight, if any.
    ///
    /// Stats take precedence over the action flags: new unannotated images
    /// after an export recommend annotating again.
    pub fn recommended(&self, stats: &DatasetStats) -> Option<PipelineAction> {
        if stats.total_images == 0 {
            return Some(PipelineAction::Upload);
        }
        if !stats.is_fully_annotated() {
            return Some(PipelineAction::Annotate);
        }
        if !self.exported {
            return Some(PipelineAction::Generate);
        }
        if !self.trained {
            return Some(PipelineAction::Train);
        }
        None
    }

    pub fn status(&self, stats: &DatasetStats) -> PipelineStatus {
        PipelineStatus {
            stage: self.stage(stats),
            enabled: self.enabled_actions(stats),
            recommended: self.recommended(stats),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(total: u64, annotated: u64) -> DatasetStats {
        DatasetStats {
            total_images: total,
            annotated_images: annotated,
            ..Default::default()
        }
    }

    #[test]
    fn empty_dataset_only_allows_upload() {
        let ctl = PipelineController::new();
        let status = ctl.status(&stats(0, 0));
        assert_eq!(status.stage, PipelineStage::Created);
        assert_eq!(status.enabled, vec![PipelineAction::Upload]);
        assert_eq!(status.recommended, Some(PipelineAction::Upload));
    }

    #[test]
    fn partially_annotated_recommends_annotate_not_export() {
        let ctl = PipelineController::new();
        for annotated in 1..10 {
            let status = ctl.status(&stats(10, annotated));
            assert_eq!(status.stage, PipelineStage::Uploaded);
            assert_eq!(status.recommended, Some(PipelineAction::Annotate));
            assert!(!status.is_enabled(PipelineAction::Generate));
            assert!(status.is_enabled(PipelineAction::Upload));
        }
        assert_eq!(ctl.recommended(&stats(3, 0)), Some(PipelineAction::Annotate));
    }

    #[test]
    fn fully_annotated_enables_generate() {
        let ctl = PipelineController::new();
        let status = ctl.status(&stats(5, 5));
        assert_eq!(status.stage, PipelineStage::Annotated);
        assert!(status.is_enabled(PipelineAction::Generate));
        assert!(!status.is_enabled(PipelineAction::Train));
        assert_eq!(status.recommended, Some(PipelineAction::Generate));
        assert!(status.is_reached(PipelineStage::Uploaded));
    }

    #[test]
    fn export_then_train() {
        let mut ctl = PipelineController::new();
        ctl.mark_exported();
        let status = ctl.status(&stats(5, 5));
        assert_eq!(status.stage, PipelineStage::Exported);
        assert_eq!(status.recommended, Some(PipelineAction::Train));
        assert!(status.is_enabled(PipelineAction::Train));

        ctl.mark_trained();
        let status = ctl.status(&stats(5, 5));
        assert_eq!(status.stage, PipelineStage::Trained);
        assert_eq!(status.recommended, None);
    }

    #[test]
    fn going_back_is_never_blocked() {
        let mut ctl = PipelineController::new();
        ctl.mark_trained();
        // More images arrived after training.
        let status = ctl.status(&stats(8, 5));
        assert!(status.is_enabled(PipelineAction::Upload));
        assert!(status.is_enabled(PipelineAction::Annotate));
        assert!(status.is_enabled(PipelineAction::Train));
        assert_eq!(status.recommended, Some(PipelineAction::Annotate));
        assert_eq!(status.stage, PipelineStage::Trained);
    }
}
