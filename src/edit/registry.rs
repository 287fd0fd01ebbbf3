//! Registry of detached background jobs.
//!
//! Edit jobs outlive the handler that started them. The registry keeps their
//! `JoinHandle`s so shutdown can abort and await them. Finished jobs remove
//! themselves.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

type TaskMap = Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>;

/// Removes a job's entry when its wrapper future ends, by completion or panic
struct Deregister {
    tasks: TaskMap,
    id: Uuid,
    label: &'static str,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        self.tasks.lock().remove(&self.id);
        tracing::debug!(task_id = %self.id, label = self.label, "Background task finished");
    }
}

#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: TaskMap,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `job` as a tracked task and return its handle id
    pub fn spawn<F>(&self, label: &'static str, job: F) -> Uuid
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let tasks = Arc::clone(&self.tasks);

        // Hold the lock across spawn + insert so a fast job cannot try to
        // deregister before it is registered
        let mut guard = self.tasks.lock();
        let handle = tokio::spawn(async move {
            let _deregister = Deregister { tasks, id, label };
            job.await;
        });
        guard.insert(id, handle);
        drop(guard);

        tracing::debug!(task_id = %id, label = label, "Background task started");
        id
    }

    /// Number of jobs still running
    pub fn active(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_active(&self, id: &Uuid) -> bool {
        self.tasks.lock().contains_key(id)
    }

    /// Abort every running job and wait up to `grace` for them to unwind
    ///
    /// Returns the number of jobs that were aborted.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain().map(|(_, h)| h).collect();
        let count = handles.len();
        if count == 0 {
            return 0;
        }

        for handle in &handles {
            handle.abort();
        }
        if tokio::time::timeout(grace, futures::future::join_all(handles))
            .await
            .is_err()
        {
            tracing::warn!(
                tasks = count,
                grace_secs = grace.as_secs(),
                "Background tasks did not stop within grace period"
            );
        } else {
            tracing::debug!(tasks = count, "Background tasks cancelled");
        }
        count
    }
}
