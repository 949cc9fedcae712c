use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
    sync::{Arc, OnceLock},
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock as StateLock;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::encoder::{Progress, ProcessControl};

/// Lifecycle of one encoder process:
/// `starting → running → {stopping → stopped} | error`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Starting => "starting",
            Status::Running => "running",
            Status::Stopping => "stopping",
            Status::Stopped => "stopped",
            Status::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Stopped | Status::Error)
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct ProcessState {
    status: Status,
    last_progress: Option<Progress>,
}

/// In-memory handle for one executing encode.
///
/// Status and progress sit behind their own lock so status readers never
/// contend with the registry map.
pub struct Process {
    stream_id: Uuid,
    started_at: DateTime<Utc>,
    state: StateLock<ProcessState>,
    control: OnceLock<Arc<dyn ProcessControl>>,
    exited: CancellationToken,
}

impl Process {
    fn new(stream_id: Uuid) -> Self {
        Self {
            stream_id,
            started_at: Utc::now(),
            state: StateLock::new(ProcessState {
                status: Status::Starting,
                last_progress: None,
            }),
            control: OnceLock::new(),
            exited: CancellationToken::new(),
        }
    }

    pub fn stream_id(&self) -> Uuid {
        self.stream_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn status(&self) -> Status {
        self.state.read().status
    }

    pub fn set_status(&self, status: Status) {
        self.state.write().status = status;
    }

    /// Moves to `to` only if the current status is one of `from`.
    pub fn transition(&self, from: &[Status], to: Status) -> bool {
        self.transition_with(from, to, |_| {})
    }

    /// Like [`transition`](Self::transition), running `notify` under the
    /// state lock when the move happens so observers see changes in order.
    pub fn transition_with(
        &self,
        from: &[Status],
        to: Status,
        notify: impl FnOnce(Status),
    ) -> bool {
        let mut state = self.state.write();
        if !from.contains(&state.status) {
            return false;
        }
        state.status = to;
        notify(to);
        true
    }

    /// Records the exit outcome. `outcome` learns whether a stop had been
    /// requested and picks the terminal status.
    pub fn settle(
        &self,
        outcome: impl FnOnce(bool) -> Status,
        notify: impl FnOnce(Status),
    ) -> Status {
        let mut state = self.state.write();
        let status = outcome(state.status == Status::Stopping);
        state.status = status;
        notify(status);
        status
    }

    pub fn last_progress(&self) -> Option<Progress> {
        self.state.read().last_progress.clone()
    }

    /// Replaces the previous snapshot wholesale.
    pub fn update_progress(&self, progress: Progress) {
        self.state.write().last_progress = Some(progress);
    }

    /// Consistent copy of the mutable fields.
    pub fn snapshot(&self) -> ProcessSnapshot {
        let state = self.state.read();
        ProcessSnapshot {
            stream_id: self.stream_id,
            status: state.status,
            started_at: self.started_at,
            progress: state.last_progress.clone(),
        }
    }

    /// Attaches the control handle once the process has been launched.
    /// Returns false if one was already attached.
    pub fn attach(&self, control: Arc<dyn ProcessControl>) -> bool {
        self.control.set(control).is_ok()
    }

    pub fn control(&self) -> Option<Arc<dyn ProcessControl>> {
        self.control.get().cloned()
    }

    /// Fires once the monitor has finished tearing the process down.
    pub fn exited(&self) -> &CancellationToken {
        &self.exited
    }

    pub(crate) fn mark_exited(&self) {
        self.exited.cancel();
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessSnapshot {
    pub stream_id: Uuid,
    pub status: Status,
    pub started_at: DateTime<Utc>,
    pub progress: Option<Progress>,
}

/// Which streams are currently executing.
#[derive(Default)]
pub struct ProcessRegistry {
    processes: RwLock<HashMap<Uuid, Arc<Process>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a fresh process in `starting`, replacing any existing entry.
    pub async fn register(&self, stream_id: Uuid) -> Arc<Process> {
        let process = Arc::new(Process::new(stream_id));
        self.processes
            .write()
            .await
            .insert(stream_id, Arc::clone(&process));
        process
    }

    /// Like [`register`](Self::register) but leaves an existing entry in
    /// place and returns `None`.
    pub async fn try_register(&self, stream_id: Uuid) -> Option<Arc<Process>> {
        let mut processes = self.processes.write().await;
        if processes.contains_key(&stream_id) {
            return None;
        }
        let process = Arc::new(Process::new(stream_id));
        processes.insert(stream_id, Arc::clone(&process));
        Some(process)
    }

    pub async fn unregister(&self, stream_id: Uuid) {
        self.processes.write().await.remove(&stream_id);
    }

    pub async fn get(&self, stream_id: Uuid) -> Option<Arc<Process>> {
        self.processes.read().await.get(&stream_id).cloned()
    }

    pub async fn contains(&self, stream_id: Uuid) -> bool {
        self.processes.read().await.contains_key(&stream_id)
    }

    pub async fn stream_ids(&self) -> Vec<Uuid> {
        self.processes.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.processes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.processes.read().await.is_empty()
    }
}
