//! API request/response models for notebook sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::runtime::ContainerStats;
use crate::sessions::{NotebookSnapshot, Session, SessionDetails, SessionStatus};
use crate::types::{GpuId, SessionId};

/// Request body for starting a notebook session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreate {
    #[schema(example = "user-42")]
    pub user_id: String,
    /// Booking this session belongs to. Recorded as given.
    pub booking_id: Option<String>,
    /// Display name, defaults to "Untitled Notebook"
    #[schema(example = "Training run")]
    pub notebook_name: Option<String>,
}

/// Request body for saving notebook contents.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotebookSave {
    /// Notebook cells, stored verbatim
    #[serde(default)]
    #[schema(value_type = Object)]
    pub cells: Value,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatusResponse {
    Creating,
    Running,
    Terminated,
}

impl From<SessionStatus> for SessionStatusResponse {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Creating => Self::Creating,
            SessionStatus::Running => Self::Running,
            SessionStatus::Terminated => Self::Terminated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatsResponse {
    #[schema(example = "2.4GB / 40GB")]
    pub gpu_memory: String,
    #[schema(example = "15%")]
    pub gpu_utilization: String,
    #[schema(example = "12%")]
    pub cpu_usage: String,
    #[schema(example = "1.2GB / 8GB")]
    pub memory_usage: String,
    /// Time since container start, `HH:MM:SS`
    #[schema(example = "00:12:34")]
    pub uptime: String,
}

impl From<ContainerStats> for ContainerStatsResponse {
    fn from(stats: ContainerStats) -> Self {
        Self {
            gpu_memory: stats.gpu_memory,
            gpu_utilization: stats.gpu_utilization,
            cpu_usage: stats.cpu_usage,
            memory_usage: stats.memory_usage,
            uptime: stats.uptime,
        }
    }
}

/// A notebook session as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: SessionId,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    pub name: String,
    pub container_id: String,
    pub port: u16,
    pub gpu_ids: Vec<GpuId>,
    pub status: SessionStatusResponse,
    pub workspace_path: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminated_at: Option<DateTime<Utc>>,
    /// Live container statistics, only on single-session lookups
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ContainerStatsResponse>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            user_id: session.user_id,
            booking_id: session.booking_id,
            name: session.name,
            container_id: session.container_id,
            port: session.port,
            gpu_ids: session.gpu_ids,
            status: session.status.into(),
            workspace_path: session.workspace_path.display().to_string(),
            created_at: session.created_at,
            terminated_at: session.terminated_at,
            stats: None,
        }
    }
}

impl From<SessionDetails> for SessionResponse {
    fn from(details: SessionDetails) -> Self {
        Self {
            stats: details.stats.map(Into::into),
            ..details.session.into()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionEnvelope {
    pub session: SessionResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionList {
    pub sessions: Vec<SessionResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionTerminated {
    #[schema(example = "Session terminated")]
    pub message: String,
    pub session: SessionResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotebookSaved {
    #[schema(example = "Notebook saved")]
    pub message: String,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotebookResponse {
    #[schema(value_type = String, format = "uuid")]
    pub session_id: SessionId,
    #[schema(value_type = Object)]
    pub cells: Value,
    #[schema(value_type = Object)]
    pub metadata: Value,
    pub saved_at: DateTime<Utc>,
}

impl From<NotebookSnapshot> for NotebookResponse {
    fn from(snapshot: NotebookSnapshot) -> Self {
        Self {
            session_id: snapshot.session_id,
            cells: snapshot.cells,
            metadata: snapshot.metadata,
            saved_at: snapshot.saved_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotebookEnvelope {
    pub notebook: NotebookResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionLogs {
    /// Container output, newline separated
    pub logs: String,
}
