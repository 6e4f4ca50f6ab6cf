//! Roles, permissions and the capabilities a route guard can require.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::YologenError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    User,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::User, Role::Viewer];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = YologenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| YologenError::validation(format!("Unknown role: {s}")))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    CreateDataset,
    ViewDataset,
    EditDataset,
    DeleteDataset,
    StartTraining,
    ViewTraining,
    StopTraining,
    UploadModel,
    ViewModel,
    DeleteModel,
    RunInference,
    ViewInference,
    ManageUsers,
    ViewLogs,
    SystemConfig,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::CreateDataset => "create_dataset",
            Permission::ViewDataset => "view_dataset",
            Permission::EditDataset => "edit_dataset",
            Permission::DeleteDataset => "delete_dataset",
            Permission::StartTraining => "start_training",
            Permission::ViewTraining => "view_training",
            Permission::StopTraining => "stop_training",
            Permission::UploadModel => "upload_model",
            Permission::ViewModel => "view_model",
            Permission::DeleteModel => "delete_model",
            Permission::RunInference => "run_inference",
            Permission::ViewInference => "view_inference",
            Permission::ManageUsers => "manage_users",
            Permission::ViewLogs => "view_logs",
            Permission::SystemConfig => "system_config",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = YologenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ADMIN_PERMISSIONS
            .iter()
            .copied()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| YologenError::validation(format!("Unknown permission: {s}")))
    }
}

const ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::CreateDataset,
    Permission::ViewDataset,
    Permission::EditDataset,
    Permission::DeleteDataset,
    Permission::StartTraining,
    Permission::ViewTraining,
    Permission::StopTraining,
    Permission::UploadModel,
    Permission::ViewModel,
    Permission::DeleteModel,
    Permission::RunInference,
    Permission::ViewInference,
    Permission::ManageUsers,
    Permission::ViewLogs,
    Permission::SystemConfig,
];

const USER_PERMISSIONS: &[Permission] = &[
    Permission::CreateDataset,
    Permission::ViewDataset,
    Permission::EditDataset,
    Permission::DeleteDataset,
    Permission::StartTraining,
    Permission::ViewTraining,
    Permission::StopTraining,
    Permission::UploadModel,
    Permission::ViewModel,
    Permission::DeleteModel,
    Permission::RunInference,
    Permission::ViewInference,
];

const VIEWER_PERMISSIONS: &[Permission] = &[
    Permission::ViewDataset,
    Permission::ViewTraining,
    Permission::ViewModel,
    Permission::ViewInference,
];

pub fn role_permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::Admin => ADMIN_PERMISSIONS,
        Role::User => USER_PERMISSIONS,
        Role::Viewer => VIEWER_PERMISSIONS,
    }
}

pub fn has_permission(role: Role, permission: Permission) -> bool {
    role_permissions(role).contains(&permission)
}

/// What a guarded view requires of the current user.
///
/// Parses from either a role name (`"admin"`) or a permission name
/// (`"create_dataset"`). A role requirement is met by that role or any
/// role above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Role(Role),
    Permission(Permission),
}

impl Capability {
    pub fn allows(self, role: Role) -> bool {
        match self {
            Capability::Role(required) => role >= required,
            Capability::Permission(p) => has_permission(role, p),
        }
    }
}

impl From<Role> for Capability {
    fn from(role: Role) -> Self {
        Capability::Role(role)
    }
}

impl From<Permission> for Capability {
    fn from(p: Permission) -> Self {
        Capability::Permission(p)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Role(r) => write!(f, "role:{r}"),
            Capability::Permission(p) => write!(f, "{p}"),
        }
    }
}

impl FromStr for Capability {
    type Err = YologenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(role) = s.parse::<Role>() {
            return Ok(Capability::Role(role));
        }
        s.parse::<Permission>()
            .map(Capability::Permission)
            .map_err(|_| YologenError::validation(format!("Unknown capability: {s}")))
    }
}
