//! Session store and lifecycle driver.
//!
//! The manager owns the only references to the GPU pool and the container
//! runtime used by sessions. Each session entry carries the handle of its boot
//! timer so that terminating a session can abort a transition that has not yet
//! fired.

use std::collections::HashSet;
use std::path::Component;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    DEFAULT_NOTEBOOK_NAME, NewSession, NotebookSnapshot, Result, Session, SessionDetails, SessionError, SessionStatus,
};
use crate::config::SessionsConfig;
use crate::gpu::GpuPool;
use crate::runtime::{ContainerError, ContainerLaunch, ContainerRuntime};
use crate::types::{SessionId, abbrev_uuid};

struct SessionEntry {
    session: Session,
    /// Insertion counter, used to list sessions in creation order
    seq: u64,
    /// Pending `creating -> running` transition
    boot_timer: Option<JoinHandle<()>>,
}

pub struct SessionManager {
    sessions: Arc<DashMap<SessionId, SessionEntry>>,
    notebooks: DashMap<SessionId, NotebookSnapshot>,
    gpus: Arc<GpuPool>,
    runtime: Arc<dyn ContainerRuntime>,
    /// Host ports held by sessions that are launching or live
    ports: Mutex<HashSet<u16>>,
    next_seq: AtomicU64,
    config: SessionsConfig,
}

impl SessionManager {
    pub fn new(config: SessionsConfig, gpus: Arc<GpuPool>, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            notebooks: DashMap::new(),
            gpus,
            runtime,
            ports: Mutex::new(HashSet::new()),
            next_seq: AtomicU64::new(0),
            config,
        }
    }

    pub fn gpus(&self) -> &GpuPool {
        &self.gpus
    }

    /// Start a notebook session on a free GPU.
    ///
    /// The session is returned in the `creating` state and becomes `running`
    /// once the configured boot delay has passed.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Validation`] if the user id is blank or not a plain path component
    /// - [`SessionError::ResourceExhausted`] when no GPU or host port is free
    /// - [`SessionError::Runtime`] when the container fails to start; the GPU is released
    #[instrument(skip_all, fields(user_id = %request.user_id))]
    pub async fn create(&self, request: NewSession) -> Result<Session> {
        validate_user_id(&request.user_id)?;

        let gpu = self.gpus.allocate().ok_or(SessionError::ResourceExhausted("GPUs"))?;
        let Some(port) = self.reserve_port() else {
            self.gpus.release(gpu);
            return Err(SessionError::ResourceExhausted("host ports"));
        };

        let id = Uuid::new_v4();
        let workspace_path = self.config.workspace_root.join(&request.user_id).join(id.to_string());
        let launch = ContainerLaunch {
            session_id: id,
            name: format!("{}{id}", self.config.container_name_prefix),
            image: self.config.image.clone(),
            host_port: port,
            gpu_ids: vec![gpu],
            workspace_path: workspace_path.clone(),
            env: vec![
                ("JUPYTER_TOKEN".to_string(), id.to_string()),
                ("NVIDIA_VISIBLE_DEVICES".to_string(), gpu.to_string()),
            ],
            memory_limit_bytes: self.config.memory_limit_bytes,
            cpus: self.config.cpus,
        };

        let container = match self.runtime.launch(launch).await {
            Ok(container) => container,
            Err(e) => {
                warn!(gpu_id = gpu, port, "Container launch failed, releasing resources: {e}");
                self.gpus.release(gpu);
                self.release_port(port);
                return Err(e.into());
            }
        };

        let session = Session {
            id,
            user_id: request.user_id,
            booking_id: request.booking_id,
            name: request
                .name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_NOTEBOOK_NAME.to_string()),
            container_id: container.id,
            port,
            gpu_ids: vec![gpu],
            status: SessionStatus::Creating,
            workspace_path,
            created_at: Utc::now(),
            terminated_at: None,
        };

        self.sessions.insert(
            id,
            SessionEntry {
                session: session.clone(),
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                boot_timer: None,
            },
        );

        let timer = self.spawn_boot_timer(id);
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            // The timer may already have fired for very short delays
            if entry.session.status == SessionStatus::Creating {
                entry.boot_timer = Some(timer);
            }
        }

        info!(session_id = %abbrev_uuid(&id), gpu_id = gpu, port, "Session created");
        Ok(session)
    }

    fn spawn_boot_timer(&self, id: SessionId) -> JoinHandle<()> {
        let sessions = Arc::clone(&self.sessions);
        let delay = self.config.boot_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Only a session that still exists and is still booting moves on
            if let Some(mut entry) = sessions.get_mut(&id)
                && entry.session.status == SessionStatus::Creating
            {
                entry.session.status = SessionStatus::Running;
                entry.boot_timer = None;
                debug!(session_id = %abbrev_uuid(&id), "Session running");
            }
        })
    }

    /// Fetch a session along with live container stats.
    pub async fn get(&self, id: SessionId) -> Result<SessionDetails> {
        let session = self.session(id)?;

        let stats = if session.status == SessionStatus::Terminated {
            None
        } else {
            match self.runtime.stats(&session.container_id).await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!(session_id = %abbrev_uuid(&id), "Failed to fetch container stats: {e}");
                    None
                }
            }
        };

        Ok(SessionDetails { session, stats })
    }

    /// Stop a session's container and release its GPU.
    ///
    /// Terminating an already terminated session returns it unchanged.
    #[instrument(skip(self), fields(session_id = %abbrev_uuid(&id)))]
    pub async fn terminate(&self, id: SessionId) -> Result<Session> {
        let session = self.session(id)?;
        if session.status == SessionStatus::Terminated {
            return Ok(session);
        }

        match self.runtime.stop(&session.container_id).await {
            Ok(()) => {}
            Err(ContainerError::NotFound(container_id)) => {
                warn!(%container_id, "Container already gone, marking session terminated");
            }
            Err(e) => return Err(e.into()),
        }

        let session = {
            let mut entry = self.sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
            if entry.session.status == SessionStatus::Terminated {
                // Lost a race with a concurrent terminate, which already released everything
                return Ok(entry.session.clone());
            }
            if let Some(timer) = entry.boot_timer.take() {
                timer.abort();
            }
            entry.session.status = SessionStatus::Terminated;
            entry.session.terminated_at = Some(Utc::now());
            entry.session.clone()
        };

        for gpu in &session.gpu_ids {
            self.gpus.release(*gpu);
        }
        self.release_port(session.port);

        info!("Session terminated");
        Ok(session)
    }

    /// Container output for a session.
    pub async fn logs(&self, id: SessionId) -> Result<String> {
        let session = self.session(id)?;
        Ok(self.runtime.logs(&session.container_id).await?)
    }

    /// Replace the stored notebook snapshot for a session.
    pub fn save_notebook(&self, id: SessionId, cells: Value, metadata: Value) -> Result<NotebookSnapshot> {
        if !self.sessions.contains_key(&id) {
            return Err(SessionError::NotFound(id));
        }

        let snapshot = NotebookSnapshot {
            session_id: id,
            cells,
            metadata,
            saved_at: Utc::now(),
        };
        self.notebooks.insert(id, snapshot.clone());

        debug!(session_id = %abbrev_uuid(&id), "Notebook saved");
        Ok(snapshot)
    }

    /// The last saved notebook snapshot for a session.
    pub fn notebook(&self, id: SessionId) -> Result<NotebookSnapshot> {
        if !self.sessions.contains_key(&id) {
            return Err(SessionError::NotFound(id));
        }
        self.notebooks
            .get(&id)
            .map(|snapshot| snapshot.clone())
            .ok_or(SessionError::NotebookNotFound(id))
    }

    /// All sessions of a user in any state, oldest first.
    pub fn list_by_user(&self, user_id: &str) -> Vec<Session> {
        let mut entries: Vec<(u64, Session)> = self
            .sessions
            .iter()
            .filter(|entry| entry.session.user_id == user_id)
            .map(|entry| (entry.seq, entry.session.clone()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, session)| session).collect()
    }

    /// Abort every pending boot timer. Sessions keep their current state.
    pub fn shutdown(&self) {
        let mut aborted = 0;
        for mut entry in self.sessions.iter_mut() {
            if let Some(timer) = entry.boot_timer.take() {
                timer.abort();
                aborted += 1;
            }
        }
        info!(aborted, "Session manager shut down");
    }

    fn session(&self, id: SessionId) -> Result<Session> {
        self.sessions
            .get(&id)
            .map(|entry| entry.session.clone())
            .ok_or(SessionError::NotFound(id))
    }

    /// Pick a random free host port in the configured range and mark it taken.
    fn reserve_port(&self) -> Option<u16> {
        let base = u32::from(self.config.port_base);
        let span = u32::from(self.config.port_span);
        if span == 0 {
            return None;
        }

        let mut ports = self.lock_ports();
        let start = rand::rng().random_range(0..span);
        let port = (0..span)
            .filter_map(|offset| u16::try_from(base + (start + offset) % span).ok())
            .find(|port| !ports.contains(port))?;
        ports.insert(port);
        Some(port)
    }

    fn release_port(&self, port: u16) {
        self.lock_ports().remove(&port);
    }

    fn lock_ports(&self) -> MutexGuard<'_, HashSet<u16>> {
        self.ports.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// User ids become a directory name under the workspace root.
fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(SessionError::Validation("userId is required".to_string()));
    }
    let mut components = std::path::Path::new(user_id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(SessionError::Validation(format!("userId {user_id:?} is not a valid workspace name"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::simulated::SimulatedRuntime;
    use crate::runtime::{Container, ContainerStats};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config() -> SessionsConfig {
        SessionsConfig {
            boot_delay: Duration::from_secs(5),
            ..SessionsConfig::default()
        }
    }

    fn manager_with(gpus: u32, runtime: Arc<dyn ContainerRuntime>, config: SessionsConfig) -> SessionManager {
        SessionManager::new(config, Arc::new(GpuPool::new(0..gpus)), runtime)
    }

    fn manager(gpus: u32) -> SessionManager {
        manager_with(gpus, Arc::new(SimulatedRuntime::new()), config())
    }

    fn new_session(user_id: &str) -> NewSession {
        NewSession {
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }

    /// Runtime whose launches always fail
    struct BrokenRuntime;

    #[async_trait]
    impl ContainerRuntime for BrokenRuntime {
        async fn launch(&self, _request: ContainerLaunch) -> crate::runtime::Result<Container> {
            Err(ContainerError::CommandFailed {
                status: "exit status: 125".to_string(),
                stderr: "could not select device driver".to_string(),
            })
        }

        async fn stop(&self, container_id: &str) -> crate::runtime::Result<()> {
            Err(ContainerError::NotFound(container_id.to_string()))
        }

        async fn stats(&self, container_id: &str) -> crate::runtime::Result<ContainerStats> {
            Err(ContainerError::NotFound(container_id.to_string()))
        }

        async fn logs(&self, container_id: &str) -> crate::runtime::Result<String> {
            Err(ContainerError::NotFound(container_id.to_string()))
        }
    }

    #[tokio::test]
    async fn test_create_session_fields() {
        let manager = manager(4);
        let session = manager
            .create(NewSession {
                user_id: "alice".to_string(),
                booking_id: Some("not-checked".to_string()),
                name: None,
            })
            .await
            .unwrap();

        assert_eq!(session.status, SessionStatus::Creating);
        assert_eq!(session.name, DEFAULT_NOTEBOOK_NAME);
        assert_eq!(session.booking_id.as_deref(), Some("not-checked"));
        assert_eq!(session.gpu_ids, vec![0]);
        assert_eq!(session.container_id, format!("container-{}", session.id));
        assert!((8000..9000).contains(&session.port));
        assert_eq!(
            session.workspace_path,
            PathBuf::from(format!("/data/workspaces/alice/{}", session.id))
        );
        assert!(session.terminated_at.is_none());
        assert_eq!(manager.gpus().available(), 3);
    }

    #[tokio::test]
    async fn test_named_session() {
        let manager = manager(1);
        let session = manager
            .create(NewSession {
                user_id: "alice".to_string(),
                booking_id: None,
                name: Some("Training run".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(session.name, "Training run");
    }

    #[tokio::test]
    async fn test_invalid_user_ids_rejected() {
        let manager = manager(1);
        for bad in ["", "  ", "..", "a/b", "/etc"] {
            let result = manager.create(new_session(bad)).await;
            assert!(matches!(result, Err(SessionError::Validation(_))), "user id {bad:?} should be rejected");
        }
        assert_eq!(manager.gpus().available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_runs_after_boot_delay() {
        let manager = manager(1);
        let session = manager.create(new_session("alice")).await.unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(manager.get(session.id).await.unwrap().session.status, SessionStatus::Creating);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let details = manager.get(session.id).await.unwrap();
        assert_eq!(details.session.status, SessionStatus::Running);
        assert!(details.stats.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_before_boot_stays_terminated() {
        let manager = manager(1);
        let session = manager.create(new_session("alice")).await.unwrap();

        let terminated = manager.terminate(session.id).await.unwrap();
        assert_eq!(terminated.status, SessionStatus::Terminated);
        assert!(terminated.terminated_at.is_some());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let details = manager.get(session.id).await.unwrap();
        assert_eq!(details.session.status, SessionStatus::Terminated);
        assert!(details.stats.is_none());
    }

    #[tokio::test]
    async fn test_terminate_releases_gpu_and_stops_container() {
        let runtime = Arc::new(SimulatedRuntime::new());
        let manager = manager_with(1, runtime.clone(), config());
        let session = manager.create(new_session("alice")).await.unwrap();
        assert!(runtime.is_running(&session.container_id));
        assert_eq!(manager.gpus().available(), 0);

        manager.terminate(session.id).await.unwrap();
        assert!(!runtime.is_running(&session.container_id));
        assert_eq!(manager.gpus().available(), 1);

        // Record is retained
        let details = manager.get(session.id).await.unwrap();
        assert_eq!(details.session.status, SessionStatus::Terminated);
    }

    #[tokio::test]
    async fn test_terminate_twice_is_idempotent() {
        let manager = manager(2);
        let first = manager.create(new_session("alice")).await.unwrap();
        let once = manager.terminate(first.id).await.unwrap();

        // GPU 0 goes to someone else; a second terminate must not free it
        let second = manager.create(new_session("bob")).await.unwrap();
        assert_eq!(second.gpu_ids, vec![0]);

        let twice = manager.terminate(first.id).await.unwrap();
        assert_eq!(once, twice);
        assert!(!manager.gpus().is_free(0));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let manager = manager(1);
        let id = Uuid::new_v4();
        assert!(matches!(manager.get(id).await, Err(SessionError::NotFound(_))));
        assert!(matches!(manager.terminate(id).await, Err(SessionError::NotFound(_))));
        assert!(matches!(manager.logs(id).await, Err(SessionError::NotFound(_))));
        assert!(matches!(manager.notebook(id), Err(SessionError::NotFound(_))));
        assert!(matches!(
            manager.save_notebook(id, Value::Null, Value::Null),
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_gpu_exhaustion_and_reuse() {
        let manager = manager(2);
        let a = manager.create(new_session("alice")).await.unwrap();
        let b = manager.create(new_session("bob")).await.unwrap();
        assert_ne!(a.gpu_ids, b.gpu_ids);

        assert!(matches!(
            manager.create(new_session("carol")).await,
            Err(SessionError::ResourceExhausted("GPUs"))
        ));

        manager.terminate(a.id).await.unwrap();
        let c = manager.create(new_session("carol")).await.unwrap();
        assert_eq!(c.gpu_ids, a.gpu_ids);
    }

    #[tokio::test]
    async fn test_live_sessions_hold_distinct_gpus_and_ports() {
        let manager = manager(4);
        let mut sessions = Vec::new();
        for user in ["a", "b", "c", "d"] {
            sessions.push(manager.create(new_session(user)).await.unwrap());
        }

        let gpus: HashSet<_> = sessions.iter().flat_map(|s| s.gpu_ids.clone()).collect();
        let ports: HashSet<_> = sessions.iter().map(|s| s.port).collect();
        assert_eq!(gpus.len(), 4);
        assert_eq!(ports.len(), 4);
    }

    #[tokio::test]
    async fn test_port_exhaustion_releases_gpu() {
        let config = SessionsConfig {
            port_span: 1,
            ..config()
        };
        let manager = manager_with(2, Arc::new(SimulatedRuntime::new()), config);
        let first = manager.create(new_session("alice")).await.unwrap();
        assert_eq!(first.port, 8000);

        assert!(matches!(
            manager.create(new_session("bob")).await,
            Err(SessionError::ResourceExhausted("host ports"))
        ));
        assert_eq!(manager.gpus().available(), 1);

        // Terminating frees the port again
        manager.terminate(first.id).await.unwrap();
        assert_eq!(manager.create(new_session("bob")).await.unwrap().port, 8000);
    }

    #[tokio::test]
    async fn test_launch_failure_releases_gpu() {
        let manager = manager_with(1, Arc::new(BrokenRuntime), config());

        for _ in 0..3 {
            let result = manager.create(new_session("alice")).await;
            assert!(matches!(result, Err(SessionError::Runtime(ContainerError::CommandFailed { .. }))));
            assert_eq!(manager.gpus().available(), 1);
        }
        assert!(manager.list_by_user("alice").is_empty());
    }

    #[tokio::test]
    async fn test_logs() {
        let manager = manager(1);
        let session = manager.create(new_session("alice")).await.unwrap();
        let logs = manager.logs(session.id).await.unwrap();
        assert!(logs.contains("CUDA device initialized"));
    }

    #[tokio::test]
    async fn test_notebook_snapshots() {
        let manager = manager(1);
        let session = manager.create(new_session("alice")).await.unwrap();

        assert!(matches!(manager.notebook(session.id), Err(SessionError::NotebookNotFound(_))));

        let cells = serde_json::json!([{"cell_type": "code", "source": "print(1)"}]);
        let saved = manager
            .save_notebook(session.id, cells.clone(), serde_json::json!({"kernel": "python3"}))
            .unwrap();
        assert_eq!(saved.cells, cells);

        let replaced = manager
            .save_notebook(session.id, serde_json::json!([]), Value::Null)
            .unwrap();
        let stored = manager.notebook(session.id).unwrap();
        assert_eq!(stored, replaced);
        assert!(stored.saved_at >= saved.saved_at);
    }

    #[tokio::test]
    async fn test_list_by_user_in_creation_order() {
        let manager = manager(4);
        let first = manager.create(new_session("alice")).await.unwrap();
        manager.create(new_session("bob")).await.unwrap();
        let second = manager.create(new_session("alice")).await.unwrap();
        manager.terminate(first.id).await.unwrap();

        let listed: Vec<_> = manager.list_by_user("alice").into_iter().map(|s| (s.id, s.status)).collect();
        assert_eq!(
            listed,
            vec![(first.id, SessionStatus::Terminated), (second.id, SessionStatus::Creating)]
        );
        assert!(manager.list_by_user("nobody").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_boot_timers() {
        let manager = manager(1);
        let session = manager.create(new_session("alice")).await.unwrap();

        manager.shutdown();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(manager.get(session.id).await.unwrap().session.status, SessionStatus::Creating);
    }
}
