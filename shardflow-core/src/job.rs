//! Job-level identities and the task outcome sink.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Globally unique identity of one task within a job.
///
/// Stamped at dispatch, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskReference {
    pub job_id: String,
    pub stage: String,
    pub partition_id: String,
}

impl TaskReference {
    pub fn new(
        job_id: impl Into<String>,
        stage: impl Into<String>,
        partition_id: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            stage: stage.into(),
            partition_id: partition_id.into(),
        }
    }
}

impl fmt::Display for TaskReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.job_id, self.stage, self.partition_id)
    }
}

/// The execution of one stage on one partition on one worker.
///
/// Exactly one executor drives a task; the task is destroyed after its
/// terminal report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    reference: TaskReference,
}

impl Task {
    pub fn new(reference: TaskReference) -> Self {
        Self { reference }
    }

    pub fn reference(&self) -> &TaskReference {
        &self.reference
    }
}

/// Process-wide sink for per-task terminal outcomes.
///
/// Implementations must be safe for concurrent calls. Idempotence is not
/// required: the executor calls each method at most once per task, and a
/// failure report follows a success report only when the success report
/// itself failed.
pub trait JobReporter: Send + Sync {
    fn report_success(&self, task: &TaskReference) -> Result<()>;
    fn report_failure(&self, task: &TaskReference, cause: &Error) -> Result<()>;
}

/// A recorded terminal outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success(TaskReference),
    Failure(TaskReference, Error),
}

/// Reporter backing local pipelines and tests: records outcomes in arrival
/// order behind a mutex.
#[derive(Default)]
pub struct InMemoryReporter {
    outcomes: Mutex<Vec<TaskOutcome>>,
}

impl InMemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<TaskOutcome> {
        self.outcomes.lock().expect("reporter poisoned").clone()
    }

    pub fn successes(&self) -> Vec<TaskReference> {
        self.outcomes()
            .into_iter()
            .filter_map(|outcome| match outcome {
                TaskOutcome::Success(task) => Some(task),
                TaskOutcome::Failure(..) => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<(TaskReference, Error)> {
        self.outcomes()
            .into_iter()
            .filter_map(|outcome| match outcome {
                TaskOutcome::Failure(task, cause) => Some((task, cause)),
                TaskOutcome::Success(_) => None,
            })
            .collect()
    }
}

impl JobReporter for InMemoryReporter {
    fn report_success(&self, task: &TaskReference) -> Result<()> {
        self.outcomes
            .lock()
            .expect("reporter poisoned")
            .push(TaskOutcome::Success(task.clone()));
        Ok(())
    }

    fn report_failure(&self, task: &TaskReference, cause: &Error) -> Result<()> {
        self.outcomes
            .lock()
            .expect("reporter poisoned")
            .push(TaskOutcome::Failure(task.clone(), cause.clone()));
        Ok(())
    }
}
