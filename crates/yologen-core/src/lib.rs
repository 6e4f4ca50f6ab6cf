//! yologen-core: domain model and client-side state for the yologen platform.
//!
//! Everything here is synchronous or I/O-free apart from the session store,
//! which talks to an injected [`session::AuthProvider`]. The HTTP adapter and
//! the views live in `yologen-client`.

pub mod analysis;
pub mod config;
pub mod error;
pub mod forms;
pub mod gateway;
pub mod guard;
pub mod models;
pub mod pipeline;
pub mod rbac;
pub mod sequence;
pub mod session;

pub use config::ClientConfig;
pub use error::{Result, YologenError};
pub use gateway::{Endpoint, Gateway};
pub use guard::{GuardDecision, Navigator, Redirect, RouteGuard};
pub use models::{
    AugmentationConfig, Dataset, DatasetAnalysis, DatasetStats, TrainingConfig, TrainingJob, User,
};
pub use pipeline::{PipelineAction, PipelineController, PipelineStage, PipelineStatus};
pub use rbac::{Capability, Permission, Role};
pub use sequence::{RequestSequencer, Ticket};
pub use session::{AuthProvider, Credentials, LoadState, SessionState, SessionStore, StoredSession};
