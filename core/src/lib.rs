//! standing-core: account roles, deputy reputation, complaint lifecycle
//! and deputy ranking over a single SQLite database.

pub mod access;
pub mod account_roles;
pub mod clock;
pub mod complaint_lifecycle;
pub mod config;
pub mod error;
pub mod event;
pub mod ranking;
pub mod reconciliation;
pub mod reputation;
pub mod role_elevation;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod types;
