//! API gateway facade: the fixed table of backend endpoints.
//!
//! Pure URL construction rooted at one base URL. No requests are made here;
//! callers own the fetch, the status check and the decoding.

use std::fmt;

use url::Url;

use crate::error::{Result, YologenError};
use crate::rbac::Role;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        })
    }
}

/// Logical backend operations. Identifiers are escaped as single path segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<'a> {
    ListDatasets,
    CreateDataset,
    Dataset(&'a str),
    DatasetStats(&'a str),
    UploadImages(&'a str),
    ExportDataset(&'a str),
    AnalyzeDataset(&'a str),
    DeleteDataset(&'a str),
    StartTraining,
    TrainingJobs,
    TrainingStatus(&'a str),
    DeleteTrainingJob(&'a str),
    Login,
    Register,
    Me,
    Permissions,
    Users,
    UserRole(&'a str),
    DeleteUser(&'a str),
    Health,
}

impl<'a> Endpoint<'a> {
    pub fn method(&self) -> Method {
        match self {
            Endpoint::CreateDataset
            | Endpoint::UploadImages(_)
            | Endpoint::ExportDataset(_)
            | Endpoint::AnalyzeDataset(_)
            | Endpoint::StartTraining
            | Endpoint::Login
            | Endpoint::Register => Method::Post,
            Endpoint::UserRole(_) => Method::Put,
            Endpoint::DeleteDataset(_)
            | Endpoint::DeleteTrainingJob(_)
            | Endpoint::DeleteUser(_) => Method::Delete,
            _ => Method::Get,
        }
    }

    fn segments(&self) -> Vec<&'a str> {
        match *self {
            Endpoint::ListDatasets => dataset_path(None, &["list"]),
            Endpoint::CreateDataset => dataset_path(None, &["create"]),
            Endpoint::Dataset(id) | Endpoint::DeleteDataset(id) => dataset_path(Some(id), &[]),
            Endpoint::DatasetStats(id) => dataset_path(Some(id), &["stats"]),
            Endpoint::UploadImages(id) => dataset_path(Some(id), &["upload"]),
            Endpoint::ExportDataset(id) => dataset_path(Some(id), &["export"]),
            Endpoint::AnalyzeDataset(id) => dataset_path(Some(id), &["analyze"]),
            Endpoint::StartTraining => vec!["api", "training", "start-from-dataset"],
            Endpoint::TrainingJobs => vec!["api", "training", "jobs"],
            Endpoint::TrainingStatus(id) => vec!["api", "training", "status", id],
            Endpoint::DeleteTrainingJob(id) => vec!["api", "training", "job", id],
            Endpoint::Login => vec!["api", "auth", "login"],
            Endpoint::Register => vec!["api", "auth", "register"],
            Endpoint::Me => vec!["api", "auth", "me"],
            Endpoint::Permissions => vec!["api", "auth", "permissions"],
            Endpoint::Users => vec!["api", "auth", "users"],
            Endpoint::UserRole(id) => vec!["api", "auth", "users", id, "role"],
            Endpoint::DeleteUser(id) => vec!["api", "auth", "users", id],
            Endpoint::Health => vec!["health"],
        }
    }
}

fn dataset_path<'a>(id: Option<&'a str>, tail: &[&'a str]) -> Vec<&'a str> {
    let mut segments = vec!["api", "annotations", "datasets"];
    segments.extend(id);
    segments.extend_from_slice(tail);
    segments
}

/// URL builders for every backend operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gateway {
    base: Url,
}

impl Default for Gateway {
    fn default() -> Self {
        Gateway::new(DEFAULT_BASE_URL).expect("default base URL is well-formed")
    }
}

impl Gateway {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base = Url::parse(base_url.trim())?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(YologenError::validation(format!(
                "Backend URL must be an http(s) URL: {base_url}"
            )));
        }
        base.set_query(None);
        base.set_fragment(None);
        Ok(Self { base })
    }

    /// The base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    pub fn url(&self, endpoint: Endpoint<'_>) -> String {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(endpoint.segments());
        }
        url.into()
    }

    pub fn list_datasets(&self) -> String {
        self.url(Endpoint::ListDatasets)
    }

    pub fn create_dataset(&self) -> String {
        self.url(Endpoint::CreateDataset)
    }

    pub fn dataset(&self, id: &str) -> String {
        self.url(Endpoint::Dataset(id))
    }

    pub fn dataset_stats(&self, id: &str) -> String {
        self.url(Endpoint::DatasetStats(id))
    }

    pub fn upload_images(&self, id: &str) -> String {
        self.url(Endpoint::UploadImages(id))
    }

    pub fn export_dataset(&self, id: &str) -> String {
        self.url(Endpoint::ExportDataset(id))
    }

    /// Navigation target for downloading an export; the browser fetches it directly.
    pub fn download_export(&self, id: &str) -> String {
        self.export_dataset(id)
    }

    pub fn analyze_dataset(&self, id: &str) -> String {
        self.url(Endpoint::AnalyzeDataset(id))
    }

    pub fn delete_dataset(&self, id: &str) -> String {
        self.url(Endpoint::DeleteDataset(id))
    }

    pub fn start_training(&self) -> String {
        self.url(Endpoint::StartTraining)
    }

    pub fn training_jobs(&self) -> String {
        self.url(Endpoint::TrainingJobs)
    }

    pub fn training_status(&self, job_id: &str) -> String {
        self.url(Endpoint::TrainingStatus(job_id))
    }

    pub fn delete_training_job(&self, job_id: &str) -> String {
        self.url(Endpoint::DeleteTrainingJob(job_id))
    }

    pub fn auth_login(&self) -> String {
        self.url(Endpoint::Login)
    }

    pub fn auth_register(&self) -> String {
        self.url(Endpoint::Register)
    }

    pub fn auth_me(&self) -> String {
        self.url(Endpoint::Me)
    }

    pub fn auth_permissions(&self) -> String {
        self.url(Endpoint::Permissions)
    }

    pub fn users(&self) -> String {
        self.url(Endpoint::Users)
    }

    /// The new role travels as the `new_role` query parameter.
    pub fn update_user_role(&self, user_id: &str, role: Role) -> String {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(Endpoint::UserRole(user_id).segments());
        }
        url.query_pairs_mut().append_pair("new_role", role.as_str());
        url.into()
    }

    pub fn delete_user(&self, user_id: &str) -> String {
        self.url(Endpoint::DeleteUser(user_id))
    }

    pub fn health(&self) -> String {
        self.url(Endpoint::Health)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_is_localhost() {
        let gw = Gateway::default();
        assert_eq!(gw.base_url(), "http://localhost:8000");
        assert_eq!(
            gw.list_datasets(),
            "http://localhost:8000/api/annotations/datasets/list"
        );
        assert_eq!(gw.health(), "http://localhost:8000/health");
    }

    #[test]
    fn parameterized_builders() {
        let gw = Gateway::new("https://api.example.com").unwrap();
        assert_eq!(
            gw.dataset_stats("abc-123"),
            "https://api.example.com/api/annotations/datasets/abc-123/stats"
        );
        assert_eq!(
            gw.delete_dataset("abc-123"),
            "https://api.example.com/api/annotations/datasets/abc-123"
        );
        assert_eq!(
            gw.start_training(),
            "https://api.example.com/api/training/start-from-dataset"
        );
        assert_eq!(gw.download_export("x"), gw.export_dataset("x"));
    }

    #[test]
    fn ids_are_escaped_as_one_segment() {
        let gw = Gateway::default();
        let url = gw.dataset_stats("a/b c?d#e");
        assert_eq!(
            url,
            "http://localhost:8000/api/annotations/datasets/a%2Fb%20c%3Fd%23e/stats"
        );
    }

    #[test]
    fn base_path_prefix_and_trailing_slash_are_kept_stable() {
        let a = Gateway::new("http://proxy.local/backend/").unwrap();
        let b = Gateway::new("http://proxy.local/backend").unwrap();
        assert_eq!(a.health(), "http://proxy.local/backend/health");
        assert_eq!(a.health(), b.health());
        assert_eq!(a.auth_me(), a.auth_me());
    }

    #[test]
    fn rejects_non_http_base() {
        assert!(Gateway::new("mailto:ops@example.com").is_err());
        assert!(Gateway::new("not a url").is_err());
    }

    #[test]
    fn methods_follow_the_backend_contract() {
        assert_eq!(Endpoint::AnalyzeDataset("x").method(), Method::Post);
        assert_eq!(Endpoint::DeleteDataset("x").method(), Method::Delete);
        assert_eq!(Endpoint::DatasetStats("x").method(), Method::Get);
        assert_eq!(Endpoint::DeleteTrainingJob("x").method(), Method::Delete);
        assert_eq!(Endpoint::UserRole("7").method(), Method::Put);
        assert_eq!(Endpoint::Users.method(), Method::Get);
    }

    #[test]
    fn job_and_user_admin_builders() {
        let gw = Gateway::default();
        assert_eq!(
            gw.delete_training_job("job 1"),
            "http://localhost:8000/api/training/job/job%201"
        );
        assert_eq!(gw.users(), "http://localhost:8000/api/auth/users");
        assert_eq!(
            gw.update_user_role("7", Role::Viewer),
            "http://localhost:8000/api/auth/users/7/role?new_role=viewer"
        );
        assert_eq!(gw.delete_user("7"), "http://localhost:8000/api/auth/users/7");
        assert_eq!(gw.auth_permissions(), "http://localhost:8000/api/auth/permissions");
    }
}
