use crate::types::{AccountId, ComplaintId, DeputyId, Role};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StandingError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Account '{0}' not found")]
    AccountNotFound(AccountId),

    #[error("Deputy '{0}' not found")]
    DeputyNotFound(DeputyId),

    #[error("Complaint '{0}' not found")]
    ComplaintNotFound(ComplaintId),

    #[error("Account '{account_id}' already holds the {role} role")]
    AlreadyElevated { account_id: AccountId, role: Role },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid transition: cannot {attempted} a complaint in status '{from}'")]
    InvalidTransition { from: String, attempted: String },

    #[error("Complaint '{complaint_id}' reached the reassignment limit of {limit}")]
    ReassignmentLimitExceeded { complaint_id: ComplaintId, limit: u32 },

    #[error("Complaint '{complaint_id}' reached the hold limit of {limit}")]
    HoldLimitExceeded { complaint_id: ComplaintId, limit: u32 },

    #[error("Complaint '{complaint_id}' was modified concurrently (expected version {expected_version})")]
    ConcurrentModification { complaint_id: ComplaintId, expected_version: i64 },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StandingResult<T> = Result<T, StandingError>;
