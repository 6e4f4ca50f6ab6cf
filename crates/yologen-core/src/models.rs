//! Data models shared between the session, the views and the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, YologenError};
use crate::rbac::{self, Permission, Role};

/// An authenticated user as reported by the auth provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
}

impl User {
    /// Permission set derived from the role.
    pub fn permissions(&self) -> &'static [Permission] {
        rbac::role_permissions(self.role)
    }
}

/// A dataset as owned by the backend. Classes never change after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Dataset {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Point-in-time statistics for one dataset, recomputed by the backend on every fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DatasetStats {
    pub total_images: u64,
    pub annotated_images: u64,
    pub unannotated_images: u64,
    pub total_classes: u64,
    pub class_counts: BTreeMap<String, u64>,
    pub train_images: u64,
    pub val_images: u64,
    pub test_images: u64,
    pub reviewed_images: u64,
    pub completion_percentage: f64,
}

impl DatasetStats {
    /// Every uploaded image carries an annotation.
    pub fn is_fully_annotated(&self) -> bool {
        self.total_images > 0 && self.annotated_images >= self.total_images
    }

    /// Completion in percent, derived from the counts rather than trusted from the wire.
    pub fn completion(&self) -> f64 {
        if self.total_images == 0 {
            return 0.0;
        }
        let annotated = self.annotated_images.min(self.total_images);
        annotated as f64 / self.total_images as f64 * 100.0
    }
}

/// Training-readiness report computed by the backend on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DatasetAnalysis {
    pub dataset_id: String,
    pub dataset_name: String,

    pub total_images: u64,
    pub annotated_images: u64,
    pub total_annotations: u64,
    pub classes: Vec<String>,

    pub class_frequency: BTreeMap<String, u64>,
    /// 0-1, higher is better.
    pub class_balance_score: f64,

    pub object_size_distribution: BTreeMap<String, u64>,
    pub aspect_ratio_distribution: BTreeMap<String, u64>,
    pub avg_objects_per_image: f64,

    pub structure_valid: bool,
    pub structure_issues: Vec<String>,

    /// 0-1.
    pub label_accuracy_score: f64,
    /// 0-1.
    pub iou_consistency_score: f64,
    pub duplicate_images: Vec<String>,
    pub corrupt_images: Vec<String>,
    pub label_mismatches: Vec<String>,
    pub invalid_boxes: Vec<String>,
    pub empty_annotations: Vec<String>,
    pub invalid_class_ids: Vec<String>,
    pub boxes_out_of_bounds: Vec<String>,

    pub split_distribution: BTreeMap<String, u64>,
    pub split_ratios: BTreeMap<String, f64>,
    pub data_leakage_detected: bool,

    pub recommended_image_size: u32,
    pub recommended_batch_size: u32,
    pub recommended_epochs: u32,
    pub augmentation_recommendations: BTreeMap<String, serde_json::Value>,

    /// 0-100.
    pub overall_quality_score: f64,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

impl DatasetAnalysis {
    /// Detected issues grouped by kind, in display order.
    pub fn issues(&self) -> Vec<(&'static str, &[String])> {
        vec![
            ("corrupt images", self.corrupt_images.as_slice()),
            ("duplicate images", self.duplicate_images.as_slice()),
            ("label mismatches", self.label_mismatches.as_slice()),
            ("invalid boxes", self.invalid_boxes.as_slice()),
            ("boxes out of bounds", self.boxes_out_of_bounds.as_slice()),
            ("invalid class ids", self.invalid_class_ids.as_slice()),
            ("empty annotations", self.empty_annotations.as_slice()),
        ]
    }

    pub fn issue_count(&self) -> usize {
        self.issues().iter().map(|(_, items)| items.len()).sum()
    }

    /// Every score as a 0-100 percentage. The overall score already is one;
    /// the component scores are fractions.
    pub fn score_percentages(&self) -> [(&'static str, f64); 4] {
        [
            ("Overall", self.overall_quality_score),
            ("Class balance", self.class_balance_score * 100.0),
            ("Label accuracy", self.label_accuracy_score * 100.0),
            ("IoU consistency", self.iou_consistency_score * 100.0),
        ]
    }
}

/// Hyperparameters for a training job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingConfig {
    pub model_name: String,
    pub epochs: u32,
    pub batch_size: u32,
    pub img_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patience: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Base model variants the backend knows how to fine-tune.
pub const MODEL_VARIANTS: &[&str] = &[
    "yolov8n.pt",
    "yolov8s.pt",
    "yolov8m.pt",
    "yolov8l.pt",
    "yolov8x.pt",
    "yolov9c.pt",
    "yolov10n.pt",
    "yolo11n.pt",
];

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model_name: "yolov8n.pt".to_string(),
            epochs: 100,
            batch_size: 16,
            img_size: 640,
            learning_rate: None,
            patience: Some(50),
            device: None,
        }
    }
}

impl TrainingConfig {
    /// Range checks mirroring the backend's validators.
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(YologenError::validation("Model name is required"));
        }
        if !(1..=1000).contains(&self.epochs) {
            return Err(YologenError::validation("Epochs must be between 1 and 1000"));
        }
        if !(1..=128).contains(&self.batch_size) {
            return Err(YologenError::validation("Batch size must be between 1 and 128"));
        }
        if !(320..=1280).contains(&self.img_size) {
            return Err(YologenError::validation("Image size must be between 320 and 1280"));
        }
        if let Some(lr) = self.learning_rate {
            if !(0.0001..=1.0).contains(&lr) {
                return Err(YologenError::validation(
                    "Learning rate must be between 0.0001 and 1.0",
                ));
            }
        }
        if let Some(p) = self.patience {
            if !(1..=200).contains(&p) {
                return Err(YologenError::validation("Patience must be between 1 and 200"));
            }
        }
        Ok(())
    }
}

/// Body of `POST /api/training/start-from-dataset`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrainingRequest {
    pub dataset_id: String,
    pub config: TrainingConfig,
    pub classes: Vec<String>,
}

/// A submitted training job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingJob {
    pub dataset_id: String,
    pub config: TrainingConfig,
    pub classes: Vec<String>,
    pub job_id: String,
}

/// Reply of the training start endpoint.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TrainingStarted {
    pub success: bool,
    pub job_id: Option<String>,
    pub message: Option<String>,
}

/// One row of `GET /api/training/jobs`, or the body of `GET /api/training/status/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingJobSummary {
    /// Absent from the status body, which is keyed by the path instead.
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub status: String,
    /// 0-100.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub dataset_id: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TrainingJobSummary {
    pub fn progress_label(&self) -> String {
        format!("{:.0}%", self.progress.clamp(0.0, 100.0))
    }
}

/// Body of `POST /api/annotations/datasets/create`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateDatasetRequest {
    pub name: String,
    pub description: String,
    pub classes: Vec<String>,
}

/// Augmentation toggles sent with an export ("generate version").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AugmentationConfig {
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    /// Applied in place of a "noise" augmentation.
    pub grayscale: bool,
}

/// Train/validation split used by every generated version.
pub const DEFAULT_SPLIT_RATIO: f64 = 0.8;

/// Body of `POST /api/annotations/datasets/{id}/export`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExportRequest {
    pub split_ratio: f64,
    pub config: AugmentationConfig,
}

impl ExportRequest {
    pub fn new(config: AugmentationConfig) -> Self {
        Self {
            split_ratio: DEFAULT_SPLIT_RATIO,
            config,
        }
    }
}

/// Backend reply to a multipart image upload.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct UploadReport {
    pub success: bool,
    pub uploaded: usize,
    pub files: Vec<serde_json::Value>,
    pub errors: Vec<String>,
    pub error_count: usize,
    /// Files refused locally by the MIME allow-list; never sent.
    #[serde(skip)]
    pub rejected: Vec<String>,
}

/// Liveness payload of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy") || self.status.eq_ignore_ascii_case("ok")
    }
}

/// Reply of the login and register endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub user: User,
}

/// Reply of `GET /api/auth/permissions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionGrant {
    pub role: Role,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl PermissionGrant {
    /// Where the backend's grant and the local role table disagree:
    /// names only the backend grants, then permissions only the table grants.
    pub fn drift(&self) -> (Vec<String>, Vec<Permission>) {
        let local = rbac::role_permissions(self.role);
        let remote_only = self
            .permissions
            .iter()
            .filter(|name| !local.iter().any(|p| p.as_str() == name.as_str()))
            .cloned()
            .collect();
        let local_only = local
            .iter()
            .copied()
            .filter(|p| !self.permissions.iter().any(|name| name == p.as_str()))
            .collect();
        (remote_only, local_only)
    }
}

// ─── Serde helpers ───────────────────────────────────────────────────────────

/// Backend ids are integers for users and UUID strings for datasets.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Int(i64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Int(n) => n.to_string(),
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
