//! Image selection for uploads: MIME allow-listing and loading.

use std::path::{Path, PathBuf};

use tracing::warn;

/// Content types the backend accepts as dataset images.
pub const ALLOWED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/webp",
];

/// One file ready to be sent as a multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Guess the content type from the extension; `None` unless allow-listed.
pub fn image_mime(path: &Path) -> Option<&'static str> {
    mime_guess::from_path(path)
        .iter()
        .find_map(|m| ALLOWED_IMAGE_TYPES.iter().copied().find(|a| *a == m.essence_str()))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

/// Files that passed the allow-list, plus a reason for each one that did not.
#[derive(Debug, Default)]
pub struct Selection {
    pub accepted: Vec<(PathBuf, &'static str)>,
    pub rejected: Vec<String>,
}

pub fn screen(paths: &[PathBuf]) -> Selection {
    let mut selection = Selection::default();
    for path in paths {
        match image_mime(path) {
            Some(mime) => selection.accepted.push((path.clone(), mime)),
            None => selection
                .rejected
                .push(format!("{}: Not a supported image type", display_name(path))),
        }
    }
    selection
}

/// Read the accepted files. Unreadable files move to `rejected`.
pub async fn load(selection: Selection) -> (Vec<ImageFile>, Vec<String>) {
    let Selection {
        accepted,
        mut rejected,
    } = selection;
    let mut files = Vec::with_capacity(accepted.len());
    for (path, mime) in accepted {
        match tokio::fs::read(&path).await {
            Ok(bytes) => files.push(ImageFile {
                file_name: display_name(&path),
                mime: mime.to_string(),
                bytes,
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read image");
                rejected.push(format!("{}: {}", display_name(&path), e));
            }
        }
    }
    (files, rejected)
}
