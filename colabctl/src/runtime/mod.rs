//! Container runtime abstraction layer
//!
//! The `ContainerRuntime` trait hides how notebook containers are actually run.
//! The session manager only ever talks to a `dyn ContainerRuntime`, so the
//! simulated runtime used in development and tests and the Docker CLI runtime
//! used on real GPU hosts are interchangeable.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::ContainerRuntimeConfig;
use crate::types::{GpuId, SessionId};

pub mod docker;
pub mod simulated;

/// Port the notebook server listens on inside the container
pub const NOTEBOOK_PORT: u16 = 8888;

/// Mount point of the session workspace inside the container
pub const WORKSPACE_MOUNT: &str = "/home/jovyan/work";

/// Create a container runtime from configuration
///
/// Adding a new runtime requires adding a match arm here.
pub fn create_runtime(config: &ContainerRuntimeConfig) -> Arc<dyn ContainerRuntime> {
    match config {
        ContainerRuntimeConfig::Simulated => Arc::new(simulated::SimulatedRuntime::new()),
        ContainerRuntimeConfig::Docker(docker_config) => Arc::new(docker::DockerRuntime::from(docker_config.clone())),
    }
}

/// Result type for container runtime operations
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Errors that can occur while driving containers
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("Container {0} not found")]
    NotFound(String),

    /// The runtime binary could not be spawned at all
    #[error("Failed to invoke container runtime: {0}")]
    Spawn(#[from] std::io::Error),

    /// The runtime ran but reported failure
    #[error("Container runtime exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("Unexpected container runtime output: {0}")]
    InvalidOutput(String),
}

/// Everything needed to start one notebook container
#[derive(Debug, Clone)]
pub struct ContainerLaunch {
    pub session_id: SessionId,
    /// Name given to the container, unique per session
    pub name: String,
    pub image: String,
    /// Host port bound to the notebook port inside the container
    pub host_port: u16,
    pub gpu_ids: Vec<GpuId>,
    /// Host directory bind-mounted at [`WORKSPACE_MOUNT`]
    pub workspace_path: PathBuf,
    pub env: Vec<(String, String)>,
    pub memory_limit_bytes: u64,
    pub cpus: u32,
}

/// A running container as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    pub port: u16,
    pub gpu_ids: Vec<GpuId>,
    pub created_at: DateTime<Utc>,
}

/// Point-in-time resource usage of a container, formatted for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStats {
    pub gpu_memory: String,
    pub gpu_utilization: String,
    pub cpu_usage: String,
    pub memory_usage: String,
    /// Time since the container was created, as `HH:MM:SS`
    pub uptime: String,
}

/// Abstract container runtime interface
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a container and return once it has been created. The notebook
    /// server inside may still be booting.
    async fn launch(&self, request: ContainerLaunch) -> Result<Container>;

    /// Stop and remove a container.
    async fn stop(&self, container_id: &str) -> Result<()>;

    async fn stats(&self, container_id: &str) -> Result<ContainerStats>;

    async fn logs(&self, container_id: &str) -> Result<String>;
}

/// Format a duration in whole seconds as `HH:MM:SS`. Hours are not wrapped.
pub fn format_uptime(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{:02}:{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60, seconds % 60)
}
