//! Docker CLI container runtime
//!
//! Drives the `docker` binary directly rather than talking to the engine API,
//! so the host only needs a working CLI (and the NVIDIA container toolkit for
//! `--gpus`). Every operation is a single short-lived child process.

use std::process::Output;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tracing::{debug, info, instrument};

use super::{
    Container, ContainerError, ContainerLaunch, ContainerRuntime, ContainerStats, NOTEBOOK_PORT, Result, WORKSPACE_MOUNT,
    format_uptime,
};
use crate::config::DockerRuntimeConfig;

/// Lines of container output returned by [`ContainerRuntime::logs`]
const LOG_TAIL_LINES: u32 = 200;

/// GPU usage is not visible through `docker stats`
const UNAVAILABLE: &str = "n/a";

pub struct DockerRuntime {
    binary: String,
    docker_host: Option<String>,
}

impl From<DockerRuntimeConfig> for DockerRuntime {
    fn from(config: DockerRuntimeConfig) -> Self {
        Self {
            binary: config.binary,
            docker_host: config.docker_host,
        }
    }
}

impl DockerRuntime {
    /// Run one docker subcommand and return its stdout.
    async fn docker<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let output = self.command(args).output().await?;
        check_output(&output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut command = Command::new(&self.binary);
        command.args(args).kill_on_drop(true);
        if let Some(host) = &self.docker_host {
            command.env("DOCKER_HOST", host);
        }
        command
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    #[instrument(skip_all, fields(session_id = %request.session_id, name = %request.name))]
    async fn launch(&self, request: ContainerLaunch) -> Result<Container> {
        let args = run_args(&request);
        debug!(?args, "Starting container");

        let stdout = self.docker(&args).await?;
        let id = stdout.trim().to_string();
        if id.is_empty() {
            return Err(ContainerError::InvalidOutput("docker run printed no container id".to_string()));
        }

        info!(container_id = %id, port = request.host_port, gpu_ids = ?request.gpu_ids, "Container started");
        Ok(Container {
            id,
            port: request.host_port,
            gpu_ids: request.gpu_ids,
            created_at: Utc::now(),
        })
    }

    #[instrument(skip(self))]
    async fn stop(&self, container_id: &str) -> Result<()> {
        self.docker(["stop", container_id]).await.map_err(|e| not_found_or(e, container_id))?;
        self.docker(["rm", container_id]).await.map_err(|e| not_found_or(e, container_id))?;
        info!("Container stopped and removed");
        Ok(())
    }

    async fn stats(&self, container_id: &str) -> Result<ContainerStats> {
        let usage = self
            .docker(["stats", "--no-stream", "--format", "{{.CPUPerc}}|{{.MemUsage}}", container_id])
            .await
            .map_err(|e| not_found_or(e, container_id))?;
        let (cpu_usage, memory_usage) = parse_stats_line(&usage)?;

        let started_at = self
            .docker(["inspect", "--format", "{{.State.StartedAt}}", container_id])
            .await
            .map_err(|e| not_found_or(e, container_id))?;
        let started_at = DateTime::parse_from_rfc3339(started_at.trim())
            .map_err(|e| ContainerError::InvalidOutput(format!("bad StartedAt {:?}: {e}", started_at.trim())))?;

        Ok(ContainerStats {
            gpu_memory: UNAVAILABLE.to_string(),
            gpu_utilization: UNAVAILABLE.to_string(),
            cpu_usage,
            memory_usage,
            uptime: format_uptime((Utc::now() - started_at.with_timezone(&Utc)).num_seconds()),
        })
    }

    async fn logs(&self, container_id: &str) -> Result<String> {
        let tail = LOG_TAIL_LINES.to_string();
        let output = self.command(["logs", "--tail", &tail, container_id]).output().await?;
        check_output(&output).map_err(|e| not_found_or(e, container_id))?;

        // The container's stderr comes back on docker's stderr
        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }
}

/// Arguments for `docker run` that start the notebook container detached.
fn run_args(request: &ContainerLaunch) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        request.name.clone(),
        "-p".to_string(),
        format!("{}:{NOTEBOOK_PORT}", request.host_port),
        "-v".to_string(),
        format!("{}:{WORKSPACE_MOUNT}", request.workspace_path.display()),
        "--memory".to_string(),
        request.memory_limit_bytes.to_string(),
        "--cpus".to_string(),
        request.cpus.to_string(),
    ];

    if !request.gpu_ids.is_empty() {
        let devices = request.gpu_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
        args.push("--gpus".to_string());
        args.push(format!("\"device={devices}\""));
    }

    for (key, value) in &request.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }

    args.push(request.image.clone());
    args
}

/// Split `docker stats` output formatted as `{{.CPUPerc}}|{{.MemUsage}}`.
fn parse_stats_line(output: &str) -> Result<(String, String)> {
    let line = output.lines().next().unwrap_or_default().trim();
    match line.split_once('|') {
        Some((cpu, memory)) if !cpu.trim().is_empty() => Ok((cpu.trim().to_string(), memory.trim().to_string())),
        _ => Err(ContainerError::InvalidOutput(format!("unexpected docker stats line: {line:?}"))),
    }
}

fn check_output(output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    Err(ContainerError::CommandFailed {
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Map docker's "No such container" failures onto [`ContainerError::NotFound`].
fn not_found_or(error: ContainerError, container_id: &str) -> ContainerError {
    match error {
        ContainerError::CommandFailed { ref stderr, .. } if stderr.contains("No such container") => {
            ContainerError::NotFound(container_id.to_string())
        }
        other => other,
    }
}
