use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// District staff roles. The chain roles (Teacher through SDS) climb the
/// validation hierarchy; the administrative-office roles act district-wide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "Teacher")]
    Teacher,
    #[serde(rename = "Principal")]
    Principal,
    #[serde(rename = "PSDS")]
    Psds,
    #[serde(rename = "ASDS")]
    Asds,
    #[serde(rename = "SDS")]
    Sds,
    #[serde(rename = "AO Admin Officer")]
    AoAdminOfficer,
    #[serde(rename = "AO Admin")]
    AoAdmin,
    #[serde(rename = "Admin")]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Teacher => "Teacher",
            Self::Principal => "Principal",
            Self::Psds => "PSDS",
            Self::Asds => "ASDS",
            Self::Sds => "SDS",
            Self::AoAdminOfficer => "AO Admin Officer",
            Self::AoAdmin => "AO Admin",
            Self::Admin => "Admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown role `{0}`")]
pub struct ParseRoleError(pub String);

impl std::str::FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Teacher" => Ok(Self::Teacher),
            "Principal" => Ok(Self::Principal),
            "PSDS" => Ok(Self::Psds),
            "ASDS" => Ok(Self::Asds),
            "SDS" => Ok(Self::Sds),
            "AO Admin Officer" => Ok(Self::AoAdminOfficer),
            "AO Admin" => Ok(Self::AoAdmin),
            "Admin" => Ok(Self::Admin),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

/// Directory snapshot of a district staff member. Account management
/// (passwords, JWTs) is owned by an external collaborator; travo stores only
/// the fields the workflow needs. `original_position` records the position a
/// user held before being promoted to AO Admin Officer so a demotion can
/// restore it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub school_id: String,
    pub school_name: String,
    pub district: String,
    pub position: String,
    pub original_position: Option<String>,
    pub contact_no: String,
    pub employee_number: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
