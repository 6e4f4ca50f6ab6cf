//! `reqwest` adapter for the backend and auth ports.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use yologen_core::analysis::AnalysisEnvelope;
use yologen_core::error::{Result, YologenError};
use yologen_core::models::{
    AuthResponse, CreateDatasetRequest, Dataset, DatasetAnalysis, DatasetStats, ExportRequest,
    HealthStatus, PermissionGrant, TrainingJobSummary, TrainingRequest, TrainingStarted,
    UploadReport, User,
};
use yologen_core::session::{AuthProvider, Credentials, RegisterRequest};
use yologen_core::{ClientConfig, Gateway, Role};

use crate::ports::Backend;
use crate::upload::ImageFile;

pub struct HttpBackend {
    client: reqwest::Client,
    gateway: Gateway,
    credentials: Credentials,
}

impl HttpBackend {
    pub fn new(gateway: Gateway, credentials: Credentials, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| YologenError::Other(e.to_string()))?;
        Ok(Self {
            client,
            gateway,
            credentials,
        })
    }

    pub fn from_config(config: &ClientConfig, credentials: Credentials) -> Result<Self> {
        Self::new(config.gateway()?, credentials, config.request_timeout())
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match self.credentials.bearer() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send, check the status and decode the body as JSON (`null` when empty).
    async fn send_raw(&self, builder: RequestBuilder) -> Result<Value> {
        let resp = builder.send().await.map_err(transport)?;
        let status = resp.status();
        let url = resp.url().to_string();
        let text = resp.text().await.map_err(transport)?;
        debug!(%url, status = status.as_u16(), "Backend response");

        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(_) if !status.is_success() => Value::String(text),
                Err(e) => return Err(e.into()),
            }
        };

        if !status.is_success() {
            return Err(YologenError::Backend {
                status: status.as_u16(),
                detail: detail_of(&body),
            });
        }
        Ok(body)
    }

    /// Like `send_raw`, but `{"success": false}` is a failure too.
    async fn send_checked(&self, builder: RequestBuilder) -> Result<Value> {
        let body = self.send_raw(builder).await?;
        if body.get("success") == Some(&Value::Bool(false)) {
            return Err(YologenError::Backend {
                status: 200,
                detail: detail_of(&body),
            });
        }
        Ok(body)
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let body = self.send_checked(builder).await?;
        Ok(serde_json::from_value(body)?)
    }
}

fn transport(e: reqwest::Error) -> YologenError {
    YologenError::Transport(e.to_string())
}

/// FastAPI puts the message in `detail` (a string, or a list of validation
/// errors); other routes use `message` or `error`.
fn detail_of(body: &Value) -> Option<String> {
    match body {
        Value::String(s) if !s.trim().is_empty() => return Some(s.clone()),
        Value::Object(_) => {}
        _ => return None,
    }
    match body.get("detail") {
        Some(Value::String(s)) => return Some(s.clone()),
        Some(Value::Array(items)) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|i| i.get("msg").and_then(Value::as_str))
                .collect();
            if !msgs.is_empty() {
                return Some(msgs.join("; "));
            }
        }
        _ => {}
    }
    ["message", "error"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DatasetList {
    Wrapped { datasets: Vec<Dataset> },
    Bare(Vec<Dataset>),
}

#[derive(Deserialize)]
struct Created {
    #[serde(default)]
    dataset_id: Option<String>,
    #[serde(default)]
    dataset: Option<Dataset>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JobList {
    Wrapped { jobs: Vec<TrainingJobSummary> },
    Bare(Vec<TrainingJobSummary>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UserList {
    Wrapped { users: Vec<User> },
    Bare(Vec<User>),
}

#[async_trait]
impl Backend for HttpBackend {
    fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    async fn list_datasets(&self) -> Result<Vec<Dataset>> {
        let list: DatasetList = self
            .fetch(self.request(Method::GET, &self.gateway.list_datasets()))
            .await?;
        Ok(match list {
            DatasetList::Wrapped { datasets } => datasets,
            DatasetList::Bare(datasets) => datasets,
        })
    }

    async fn dataset(&self, id: &str) -> Result<Dataset> {
        self.fetch(self.request(Method::GET, &self.gateway.dataset(id)))
            .await
    }

    async fn dataset_stats(&self, id: &str) -> Result<DatasetStats> {
        self.fetch(self.request(Method::GET, &self.gateway.dataset_stats(id)))
            .await
    }

    async fn create_dataset(&self, request: &CreateDatasetRequest) -> Result<Dataset> {
        let created: Created = self
            .fetch(
                self.request(Method::POST, &self.gateway.create_dataset())
                    .json(request),
            )
            .await?;
        match (created.dataset, created.dataset_id) {
            (Some(dataset), _) => Ok(dataset),
            (None, Some(id)) => Ok(Dataset {
                id,
                name: request.name.clone(),
                description: request.description.clone(),
                classes: request.classes.clone(),
                ..Default::default()
            }),
            (None, None) => Err(YologenError::Other(
                "Backend did not return the created dataset".into(),
            )),
        }
    }

    async fn delete_dataset(&self, id: &str) -> Result<()> {
        self.send_checked(self.request(Method::DELETE, &self.gateway.delete_dataset(id)))
            .await?;
        Ok(())
    }

    async fn upload_images(&self, id: &str, files: Vec<ImageFile>) -> Result<UploadReport> {
        let mut form = Form::new();
        for file in files {
            let part = Part::bytes(file.bytes)
                .file_name(file.file_name)
                .mime_str(&file.mime)
                .map_err(transport)?;
            form = form.part("files", part);
        }
        let body = self
            .send_raw(
                self.request(Method::POST, &self.gateway.upload_images(id))
                    .multipart(form),
            )
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn export_dataset(&self, id: &str, request: &ExportRequest) -> Result<()> {
        self.send_checked(
            self.request(Method::POST, &self.gateway.export_dataset(id))
                .json(request),
        )
        .await?;
        Ok(())
    }

    async fn analyze_dataset(&self, id: &str) -> Result<DatasetAnalysis> {
        let envelope: AnalysisEnvelope = self
            .fetch(self.request(Method::POST, &self.gateway.analyze_dataset(id)))
            .await?;
        Ok(envelope.into_analysis())
    }

    async fn start_training(&self, request: &TrainingRequest) -> Result<String> {
        let started: TrainingStarted = self
            .fetch(
                self.request(Method::POST, &self.gateway.start_training())
                    .json(request),
            )
            .await?;
        started.job_id.ok_or_else(|| YologenError::Backend {
            status: 200,
            detail: started
                .message
                .or_else(|| Some("Backend did not return a job id".into())),
        })
    }

    async fn training_jobs(&self) -> Result<Vec<TrainingJobSummary>> {
        let jobs: JobList = self
            .fetch(self.request(Method::GET, &self.gateway.training_jobs()))
            .await?;
        Ok(match jobs {
            JobList::Wrapped { jobs } => jobs,
            JobList::Bare(jobs) => jobs,
        })
    }

    async fn training_status(&self, job_id: &str) -> Result<TrainingJobSummary> {
        let mut job: TrainingJobSummary = self
            .fetch(self.request(Method::GET, &self.gateway.training_status(job_id)))
            .await?;
        if job.job_id.is_empty() {
            job.job_id = job_id.to_string();
        }
        Ok(job)
    }

    async fn delete_training_job(&self, job_id: &str) -> Result<()> {
        self.send_checked(
            self.request(Method::DELETE, &self.gateway.delete_training_job(job_id)),
        )
        .await?;
        Ok(())
    }

    async fn permissions(&self) -> Result<PermissionGrant> {
        self.fetch(self.request(Method::GET, &self.gateway.auth_permissions()))
            .await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let users: UserList = self
            .fetch(self.request(Method::GET, &self.gateway.users()))
            .await?;
        Ok(match users {
            UserList::Wrapped { users } => users,
            UserList::Bare(users) => users,
        })
    }

    async fn update_user_role(&self, user_id: &str, role: Role) -> Result<()> {
        self.send_checked(
            self.request(Method::PUT, &self.gateway.update_user_role(user_id, role)),
        )
        .await?;
        Ok(())
    }

    async fn delete_user(&self, user_id: &str) -> Result<()> {
        self.send_checked(self.request(Method::DELETE, &self.gateway.delete_user(user_id)))
            .await?;
        Ok(())
    }

    async fn health(&self) -> Result<HealthStatus> {
        self.fetch(self.request(Method::GET, &self.gateway.health()))
            .await
    }
}

#[async_trait]
impl AuthProvider for HttpBackend {
    async fn login(&self, username: &str, password: &str) -> Result<AuthResponse> {
        let body = serde_json::json!({ "username": username, "password": password });
        // No bearer: a stale token must not leak into a fresh login.
        self.fetch(self.client.post(self.gateway.auth_login()).json(&body))
            .await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse> {
        self.fetch(self.client.post(self.gateway.auth_register()).json(request))
            .await
    }

    async fn current_user(&self, token: &str) -> Result<User> {
        self.fetch(self.client.get(self.gateway.auth_me()).bearer_auth(token))
            .await
    }
}
