//! Error types for yologen-core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum YologenError {
    /// Rejected locally before any request was made.
    #[error("{0}")]
    Validation(String),

    /// The request could not be performed at all (connection refused, timeout, ...).
    #[error("Network error: {0}")]
    Transport(String),

    /// Non-2xx status or a `{"success": false}` body.
    #[error("{}", backend_message(*.status, .detail.as_deref()))]
    Backend { status: u16, detail: Option<String> },

    #[error("JSON error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("{0}")]
    Other(String),
}

fn backend_message(status: u16, detail: Option<&str>) -> String {
    match detail {
        Some(d) if !d.trim().is_empty() => d.to_string(),
        _ => format!("Request failed with status {status}"),
    }
}

impl YologenError {
    pub fn validation(msg: impl Into<String>) -> Self {
        YologenError::Validation(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, YologenError::Validation(_))
    }

    /// HTTP status for backend-reported failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            YologenError::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

pub type Result<T> = std::result::Result<T, YologenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_detail_is_shown_verbatim() {
        let err = YologenError::Backend {
            status: 400,
            detail: Some("No annotated images in dataset".into()),
        };
        assert_eq!(err.to_string(), "No annotated images in dataset");
    }

    #[test]
    fn backend_without_detail_falls_back_to_status() {
        let err = YologenError::Backend { status: 502, detail: None };
        assert_eq!(err.to_string(), "Request failed with status 502");
        let blank = YologenError::Backend { status: 500, detail: Some("  ".into()) };
        assert_eq!(blank.to_string(), "Request failed with status 500");
    }
}
