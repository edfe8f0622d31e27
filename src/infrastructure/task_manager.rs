use std::collections::HashMap;
use tokio::task::JoinHandle;

/// Background tasks a socket session can own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Handshake in flight, owned here rather than by whoever called `connect()`
    Connect,
    /// Reads inbound frames and routes them
    Reader,
    /// Periodic liveness signal
    Heartbeat,
    /// Pending reconnect timer
    Reconnect,
}

/// Tracks at most one running task per [`TaskKind`]
pub struct TaskManager {
    handles: HashMap<TaskKind, JoinHandle<()>>,
}

impl TaskManager {
    /// Create a new empty task manager
    pub fn new() -> Self {
        Self {
            handles: HashMap::new(),
        }
    }

    /// Spawn a task of `kind`, aborting any previous task of the same kind
    pub fn spawn<F>(&mut self, kind: TaskKind, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        if let Some(previous) = self.handles.insert(kind, handle) {
            previous.abort();
        }
    }

    /// Abort the task of `kind`, if any
    pub fn abort(&mut self, kind: TaskKind) {
        if let Some(handle) = self.handles.remove(&kind) {
            handle.abort();
        }
    }

    /// Forget the handle of `kind` without aborting it (used by a task finishing itself)
    pub fn release(&mut self, kind: TaskKind) {
        self.handles.remove(&kind);
    }

    pub fn is_running(&self, kind: TaskKind) -> bool {
        self.handles
            .get(&kind)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Abort all tasks without waiting
    pub fn abort_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.abort_all();
    }
}
