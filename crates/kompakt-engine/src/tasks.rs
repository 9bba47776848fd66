// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory registry of background tasks.
//
// Each submitted job runs on its own named thread. Callers poll for status,
// block until a task finishes, and fetch the result exactly once; fetching
// removes the entry.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kompakt_core::error::{KompaktError, Result};
use kompakt_core::types::{TaskId, TaskStatus};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// Status and timestamps of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub label: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct TaskEntry<T> {
    info: TaskInfo,
    result: Option<Result<T>>,
}

struct Shared<T> {
    tasks: Mutex<HashMap<TaskId, TaskEntry<T>>>,
    finished: Condvar,
}

/// Thread-per-task registry. Cloning shares the same tasks.
pub struct TaskRegistry<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for TaskRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> Default for TaskRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> TaskRegistry<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tasks: Mutex::new(HashMap::new()),
                finished: Condvar::new(),
            }),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<TaskId, TaskEntry<T>>> {
        self.shared.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start `job` on a new thread and return its id immediately.
    #[instrument(skip(self, job))]
    pub fn submit<F>(&self, label: &str, job: F) -> Result<TaskId>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let id = TaskId::new();
        let now = Utc::now();
        self.tasks().insert(
            id,
            TaskEntry {
                info: TaskInfo {
                    id,
                    label: label.to_string(),
                    status: TaskStatus::Pending,
                    created_at: now,
                    updated_at: now,
                },
                result: None,
            },
        );

        let registry = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("kompakt-task-{}", &id.to_string()[..8]))
            .spawn(move || {
                registry.set_status(id, TaskStatus::Running);
                let result = panic::catch_unwind(AssertUnwindSafe(job))
                    .unwrap_or_else(|_| Err(KompaktError::TaskFailed(format!("task {} panicked", id))));
                registry.complete(id, result);
            });

        if let Err(err) = spawned {
            self.tasks().remove(&id);
            return Err(KompaktError::Io(err));
        }

        info!(task_id = %id, "Task submitted");
        Ok(id)
    }

    fn set_status(&self, id: TaskId, status: TaskStatus) {
        if let Some(entry) = self.tasks().get_mut(&id) {
            entry.info.status = status;
            entry.info.updated_at = Utc::now();
            debug!(task_id = %id, status = ?status, "Task status updated");
        }
    }

    fn complete(&self, id: TaskId, result: Result<T>) {
        {
            let mut tasks = self.tasks();
            if let Some(entry) = tasks.get_mut(&id) {
                entry.info.status = match &result {
                    Ok(_) => TaskStatus::Completed,
                    Err(err) => {
                        warn!(task_id = %id, error = %err, "Task failed");
                        TaskStatus::Failed
                    }
                };
                entry.info.updated_at = Utc::now();
                entry.result = Some(result);
            }
        }
        self.shared.finished.notify_all();
    }

    pub fn poll(&self, id: TaskId) -> Result<TaskStatus> {
        self.info(id).map(|info| info.status)
    }

    pub fn info(&self, id: TaskId) -> Result<TaskInfo> {
        self.tasks()
            .get(&id)
            .map(|entry| entry.info.clone())
            .ok_or_else(|| KompaktError::TaskNotFound(id.to_string()))
    }

    /// Every task not yet fetched, oldest first.
    pub fn list(&self) -> Vec<TaskInfo> {
        let mut infos: Vec<TaskInfo> = self.tasks().values().map(|entry| entry.info.clone()).collect();
        infos.sort_by_key(|info| info.created_at);
        infos
    }

    /// Block until the task has finished or `timeout` elapses, returning the
    /// status at that point.
    pub fn wait(&self, id: TaskId, timeout: Option<Duration>) -> Result<TaskStatus> {
        let running = |tasks: &mut HashMap<TaskId, TaskEntry<T>>| {
            tasks.get(&id).is_some_and(|entry| entry.result.is_none())
        };

        let guard = self.tasks();
        let guard = match timeout {
            Some(timeout) => {
                self.shared
                    .finished
                    .wait_timeout_while(guard, timeout, running)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self
                .shared
                .finished
                .wait_while(guard, running)
                .unwrap_or_else(PoisonError::into_inner),
        };

        guard
            .get(&id)
            .map(|entry| entry.info.status)
            .ok_or_else(|| KompaktError::TaskNotFound(id.to_string()))
    }

    /// Take the result of a finished task. The entry is removed, so a second
    /// fetch reports `TaskNotFound`.
    pub fn fetch(&self, id: TaskId) -> Result<T> {
        let mut tasks = self.tasks();
        let finished = match tasks.get(&id) {
            None => return Err(KompaktError::TaskNotFound(id.to_string())),
            Some(entry) => entry.result.is_some(),
        };
        if !finished {
            return Err(KompaktError::TaskNotReady(id.to_string()));
        }

        match tasks.remove(&id).and_then(|entry| entry.result) {
            Some(Ok(value)) => Ok(value),
            Some(Err(KompaktError::TaskFailed(detail))) => Err(KompaktError::TaskFailed(detail)),
            Some(Err(err)) => Err(KompaktError::TaskFailed(format!("{}: {}", id, err))),
            None => Err(KompaktError::TaskNotFound(id.to_string())),
        }
    }
}
