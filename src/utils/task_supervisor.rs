use tokio::task::JoinHandle;
use std::collections::HashMap;
use crate::error::{Error, Result};
use tracing::{info, error};

/// Task Supervisor - Tracks the relay's background loops
///
/// ## Purpose
/// Every long-running loop (cache polls, broadcast tick, heartbeat) is spawned
/// through the supervisor under a name. The loops are meant to run forever, so
/// any task found finished is reported as a failure.
///
/// ## Usage
/// ```rust,no_run
/// # use market_relay::utils::task_supervisor::TaskSupervisor;
/// # async fn run() {
/// let mut supervisor = TaskSupervisor::new();
///
/// supervisor.spawn("heartbeat", async move {
///     // loop body
/// });
///
/// if let Err(e) = supervisor.check_health() {
///     tracing::error!("Task failure detected: {}", e);
/// }
///
/// supervisor.shutdown_all();
/// # }
/// ```
pub struct TaskSupervisor {
    tasks: HashMap<String, JoinHandle<()>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        TaskSupervisor {
            tasks: HashMap::new(),
        }
    }

    /// Spawn a new background task and register it for monitoring
    pub fn spawn<F>(&mut self, name: impl Into<String>, future: F) -> &mut Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(future);

        info!("Spawned background task: {}", name);
        if let Some(previous) = self.tasks.insert(name, handle) {
            previous.abort();
        }
        self
    }

    /// Returns an error naming every task that has terminated; those tasks are
    /// dropped from tracking.
    pub fn check_health(&mut self) -> Result<()> {
        let mut failed_tasks: Vec<String> = self.tasks.iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();

        if failed_tasks.is_empty() {
            return Ok(());
        }

        failed_tasks.sort();
        for name in &failed_tasks {
            self.tasks.remove(name);
        }

        let error_msg = format!("Tasks terminated unexpectedly: {:?}", failed_tasks);
        error!("{}", error_msg);
        Err(Error::TaskFailed(error_msg))
    }

    pub fn active_task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn shutdown_all(&mut self) {
        info!("Shutting down {} background tasks", self.tasks.len());

        for (name, handle) in self.tasks.drain() {
            handle.abort();
            info!("Aborted task: {}", name);
        }
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
