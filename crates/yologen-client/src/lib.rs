//! yologen-client: the `reqwest` backend adapter and the dashboard views.
//!
//! Views talk to the backend only through the [`Backend`] port and report
//! to the user through a [`Notifier`], so they run the same against the
//! HTTP adapter and an in-memory fake.

pub mod analysis;
pub mod health;
pub mod http;
pub mod ports;
pub mod registry;
pub mod training;
pub mod upload;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use analysis::{AnalysisView, AnalysisViewState};
pub use health::{BackendHealth, HealthHandle, HealthMonitor};
pub use http::HttpBackend;
pub use ports::{Backend, Confirm, NoticeLevel, NoticeQueue, Notifier, TracingNotifier};
pub use registry::{DatasetEntry, DatasetRegistry, RegistryState};
pub use training::TrainingConfigurator;
pub use upload::{ImageFile, ALLOWED_IMAGE_TYPES};
pub use workflow::DatasetWorkflow;
