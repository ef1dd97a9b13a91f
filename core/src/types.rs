//! Shared primitive types used across the standing engine.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stable identifier for an account (the identity root).
pub type AccountId = String;

/// Identifier of a deputy profile. Distinct from the owning account's id.
pub type DeputyId = String;

pub type ComplaintId = String;

/// Wall-clock instant. Persisted as integer milliseconds since the epoch.
pub type Timestamp = DateTime<Utc>;

pub(crate) fn to_millis(ts: Timestamp) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Timestamp {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// Error returned when a persisted enum column holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind:  &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Citizen,
    Deputy,
    Manager,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Citizen => "citizen",
            Role::Deputy  => "deputy",
            Role::Manager => "manager",
            Role::Admin   => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "citizen" => Ok(Role::Citizen),
            "deputy"  => Ok(Role::Deputy),
            "manager" => Ok(Role::Manager),
            "admin"   => Ok(Role::Admin),
            other => Err(UnknownVariant { kind: "role", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeputyStatus {
    Current,
    Candidate,
}

impl DeputyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeputyStatus::Current   => "current",
            DeputyStatus::Candidate => "candidate",
        }
    }
}

impl fmt::Display for DeputyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeputyStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "current"   => Ok(DeputyStatus::Current),
            "candidate" => Ok(DeputyStatus::Candidate),
            other => Err(UnknownVariant { kind: "deputy status", value: other.to_string() }),
        }
    }
}
