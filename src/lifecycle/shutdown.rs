//! Shutdown coordination for the daemon.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Broadcasts the shutdown signal and tracks the tasks that must observe it.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx, tasks: Vec::new() }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Track a background task so [`Shutdown::drain`] waits for it.
    pub fn track(&mut self, name: &'static str, task: JoinHandle<()>) {
        self.tasks.push((name, task));
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Trigger and wait for every tracked task, giving up after `deadline`.
    /// Returns the number of tasks that finished in time.
    pub async fn drain(mut self, deadline: Duration) -> usize {
        self.trigger();
        let tasks = std::mem::take(&mut self.tasks);
        let total = tasks.len();

        let wait_all = async {
            let mut finished = 0;
            for (name, task) in tasks {
                match task.await {
                    Ok(()) => tracing::debug!(task = name, "Task stopped"),
                    Err(e) => tracing::warn!(task = name, error = %e, "Task ended abnormally"),
                }
                finished += 1;
            }
            finished
        };

        match tokio::time::timeout(deadline, wait_all).await {
            Ok(finished) => finished,
            Err(_) => {
                tracing::warn!(tasks = total, deadline_secs = deadline.as_secs(), "Shutdown deadline reached, abandoning tasks");
                0
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
