//! Named periodic tasks sharing one shutdown signal.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::{NodeError, ShutdownController};

/// How long [`TaskSupervisor::stop`] waits for tasks to drain.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TaskSupervisor {
    shutdown: Arc<ShutdownController>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskSupervisor {
    pub fn new(shutdown: Arc<ShutdownController>) -> Self {
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Run `tick` every `period` until shutdown.
    ///
    /// The first tick fires immediately. Shutdown is only observed between
    /// ticks; a tick that has started runs to completion.
    pub fn spawn_periodic<F, Fut>(&mut self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::info!(task = name, "task shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        tick().await;
                    }
                }
            }
        });
        tracing::debug!(task = name, ?period, "periodic task started");
        self.tasks.push((name, handle));
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signal shutdown and wait up to `timeout` for every task. Tasks still
    /// running at the deadline are aborted and named in the error.
    pub async fn stop(&mut self, timeout: Duration) -> Result<(), NodeError> {
        self.shutdown.shutdown();

        let deadline = tokio::time::Instant::now() + timeout;
        let mut stragglers = Vec::new();
        for (name, mut handle) in self.tasks.drain(..) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(task = name, error = %e, "task ended abnormally"),
                Err(_) => {
                    handle.abort();
                    stragglers.push(name);
                }
            }
        }

        if stragglers.is_empty() {
            Ok(())
        } else {
            tracing::warn!(?timeout, tasks = ?stragglers, "shutdown timeout, tasks aborted");
            Err(NodeError::ShutdownTimeout(stragglers))
        }
    }
}
