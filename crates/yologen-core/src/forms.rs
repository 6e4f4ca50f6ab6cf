//! Local form state and validation. Nothing here touches the network.

use crate::error::{Result, YologenError};
use crate::models::CreateDatasetRequest;

/// Split a comma-separated class list, trimming and dropping empties.
///
/// Duplicates are kept in their original order.
pub fn parse_classes(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Validate the inputs of the "create dataset" dialog.
pub fn validate_new_dataset(
    name: &str,
    description: &str,
    classes_csv: &str,
) -> Result<CreateDatasetRequest> {
    let name = name.trim();
    if name.is_empty() {
        return Err(YologenError::validation("Dataset name is required"));
    }
    let classes = parse_classes(classes_csv);
    if classes.is_empty() {
        return Err(YologenError::validation("At least one class is required"));
    }
    Ok(CreateDatasetRequest {
        name: name.to_string(),
        description: description.trim().to_string(),
        classes,
    })
}

/// The "create dataset" dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetForm {
    pub name: String,
    pub description: String,
    pub classes_csv: String,
    pub open: bool,
    pub error: Option<String>,
}

impl DatasetForm {
    pub fn open(&mut self) {
        self.open = true;
        self.error = None;
    }

    pub fn fill(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        classes_csv: impl Into<String>,
    ) {
        self.name = name.into();
        self.description = description.into();
        self.classes_csv = classes_csv.into();
    }

    /// Validate, recording the message inline on failure.
    pub fn submit(&mut self) -> Result<CreateDatasetRequest> {
        match validate_new_dataset(&self.name, &self.description, &self.classes_csv) {
            Ok(request) => {
                self.error = None;
                Ok(request)
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Clear the inputs and close the dialog after a successful create.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
