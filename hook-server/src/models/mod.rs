use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

pub mod hook;

/// Where a group is defined
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    /// Managed through the admin surface and stored locally
    #[default]
    Local,
    /// Reported by an external feed
    External,
}

impl GroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupType::Local => "local",
            GroupType::External => "external",
        }
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(GroupType::Local),
            "external" => Ok(GroupType::External),
            other => Err(format!("unknown group type: {}", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct Group {
    /// Unique identifier for the group
    pub id: String,
    /// Group name, unique within its tenant
    pub name: String,
    /// Tenant owning the group
    pub tenant_id: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Whether the group is local or reported by an external feed
    #[serde(rename = "type")]
    pub group_type: GroupType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a group
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct CreateGroup {
    pub name: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub group_type: GroupType,
}

/// Partial update of a group. The name cannot change once created.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Default)]
pub struct UpdateGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct GroupMembership {
    pub group_id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An edge allowing members of a group to use an application
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppAllowlistEntry {
    pub group_id: String,
    pub app_client_id: String,
}

impl AppAllowlistEntry {
    pub fn new(group_id: impl Into<String>, app_client_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            app_client_id: app_client_id.into(),
        }
    }
}

/// The user or service account a token is being issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    InteractiveUser {
        subject_id: String,
        email: Option<String>,
    },
    ServiceAccount {
        client_id: String,
    },
}

impl Principal {
    /// Key memberships are stored under in the local directory.
    ///
    /// Users are keyed by email, service accounts by client id. A user
    /// without an email has no key and therefore no local groups.
    pub fn directory_key(&self) -> Option<&str> {
        match self {
            Principal::InteractiveUser { email, .. } => email.as_deref(),
            Principal::ServiceAccount { client_id } if !client_id.is_empty() => {
                Some(client_id.as_str())
            }
            Principal::ServiceAccount { .. } => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Principal::InteractiveUser { email, .. } => email.as_deref(),
            Principal::ServiceAccount { .. } => None,
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::InteractiveUser { subject_id, .. } => write!(f, "user:{}", subject_id),
            Principal::ServiceAccount { client_id } => write!(f, "client:{}", client_id),
        }
    }
}

/// Everything the decision pipeline knows about one token request
#[derive(Debug, Clone, PartialEq)]
pub struct TokenHookContext {
    pub principal: Principal,
    pub requested_client_id: String,
    pub grant_types: Vec<String>,
    pub granted_audiences: Vec<String>,
}
