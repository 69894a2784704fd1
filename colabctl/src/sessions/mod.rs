//! Notebook sessions.
//!
//! A session is one notebook container bound to a single physical GPU. Sessions
//! move through `creating -> running -> terminated`: the first transition fires
//! on a timer once the container has had time to boot, the second only when a
//! user stops the session. Terminated sessions stay in the store so that users
//! can still see them in their history.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::runtime::{ContainerError, ContainerStats};
use crate::types::{GpuId, SessionId, UserId};

pub mod manager;

pub use manager::SessionManager;

/// Name given to sessions created without one
pub const DEFAULT_NOTEBOOK_NAME: &str = "Untitled Notebook";

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),

    #[error("Session with ID {0} not found")]
    NotFound(SessionId),

    #[error("No notebook has been saved for session {0}")]
    NotebookNotFound(SessionId),

    /// A scarce resource (GPUs, host ports) has run out
    #[error("No {0} available")]
    ResourceExhausted(&'static str),

    #[error(transparent)]
    Runtime(#[from] ContainerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Creating,
    Running,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    /// Booking the session was started from. Stored as given, never looked up.
    pub booking_id: Option<String>,
    pub name: String,
    pub container_id: String,
    /// Host port the notebook server is reachable on
    pub port: u16,
    pub gpu_ids: Vec<GpuId>,
    pub status: SessionStatus,
    pub workspace_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
}

/// Parameters for starting a session
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub user_id: UserId,
    pub booking_id: Option<String>,
    pub name: Option<String>,
}

/// A session together with live container statistics. `stats` is `None` for
/// terminated sessions and when the runtime could not report them.
#[derive(Debug, Clone)]
pub struct SessionDetails {
    pub session: Session,
    pub stats: Option<ContainerStats>,
}

/// The most recently saved notebook contents of a session
#[derive(Debug, Clone, PartialEq)]
pub struct NotebookSnapshot {
    pub session_id: SessionId,
    pub cells: Value,
    pub metadata: Value,
    pub saved_at: DateTime<Utc>,
}
