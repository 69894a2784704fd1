//! Simulated container runtime
//!
//! Pretends to run containers without touching the host. Launches succeed
//! immediately, stats are fixed apart from a live uptime, and logs are a
//! canned boot transcript. Useful for development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{Container, ContainerError, ContainerLaunch, ContainerRuntime, ContainerStats, Result, format_uptime};

const BOOT_LOG: &[&str] = &[
    "[colab] Container started successfully",
    "[Jupyter] Notebook server running on port 8888",
    "[GPU] CUDA device initialized",
    "[Ready] Environment ready for computation",
];

/// In-memory stand-in for a container engine
#[derive(Default)]
pub struct SimulatedRuntime {
    /// Creation time of each live container, keyed by container id
    containers: DashMap<String, DateTime<Utc>>,
}

impl SimulatedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, container_id: &str) -> bool {
        self.containers.contains_key(container_id)
    }
}

#[async_trait]
impl ContainerRuntime for SimulatedRuntime {
    async fn launch(&self, request: ContainerLaunch) -> Result<Container> {
        let container = Container {
            id: format!("container-{}", request.session_id),
            port: request.host_port,
            gpu_ids: request.gpu_ids,
            created_at: Utc::now(),
        };
        self.containers.insert(container.id.clone(), container.created_at);

        tracing::info!(
            container_id = %container.id,
            port = container.port,
            gpu_ids = ?container.gpu_ids,
            "Simulated container created"
        );
        Ok(container)
    }

    async fn stop(&self, container_id: &str) -> Result<()> {
        if self.containers.remove(container_id).is_none() {
            return Err(ContainerError::NotFound(container_id.to_string()));
        }
        tracing::info!(container_id, "Simulated container stopped");
        Ok(())
    }

    async fn stats(&self, container_id: &str) -> Result<ContainerStats> {
        // Unknown containers report zero uptime rather than failing
        let uptime = self
            .containers
            .get(container_id)
            .map(|created_at| (Utc::now() - *created_at).num_seconds())
            .unwrap_or(0);

        Ok(ContainerStats {
            gpu_memory: "2.4GB / 40GB".to_string(),
            gpu_utilization: "15%".to_string(),
            cpu_usage: "12%".to_string(),
            memory_usage: "1.2GB / 8GB".to_string(),
            uptime: format_uptime(uptime),
        })
    }

    async fn logs(&self, _container_id: &str) -> Result<String> {
        Ok(BOOT_LOG.join("\n"))
    }
}
