//! The task executor: drives one `(stage, partition)` on one worker from
//! setup through terminal report.
//!
//! Each executor runs as one logical thread of control; many run
//! concurrently per worker process. Within one executor the drain loop is
//! sequential, so the runner may hold per-task mutable state without
//! locking. The executor exclusively owns its runner, input reader, and
//! output writer; the partitioner and reporter are shared.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::context::TaskContext;
use crate::error::Error;
use crate::input::InputReader;
use crate::job::{JobReporter, Task};
use crate::output::OutputWriter;
use crate::stage::{RunnerRegistry, Stage, StageRunner};

/// Waiter on a task's completion signal.
///
/// The signal fires on the success branch only: a failing task never
/// signals, and its outcome must be observed through the job reporter. It is
/// also one-shot: a single waiter observes it. See
/// [`TaskExecutor::wait_for_finish`].
#[derive(Clone)]
pub struct FinishSignal {
    receiver: Receiver<()>,
}

impl FinishSignal {
    /// Block until the task reports success (or its executor is dropped).
    pub fn wait(&self) {
        let _ = self.receiver.recv();
    }

    /// Like [`wait`](Self::wait), bounded; returns whether the task
    /// signalled success within the timeout.
    pub fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        self.receiver.recv_timeout(timeout).is_ok()
    }
}

/// Orchestrates one task: drains input, drives the stage runner, closes
/// output, and reports the terminal outcome.
pub struct TaskExecutor {
    ctx: Arc<TaskContext>,
    task: Task,
    stage: Stage,
    registry: Arc<RunnerRegistry>,
    runner: Option<Box<dyn StageRunner>>,
    input: InputReader,
    output: OutputWriter,
    reporter: Arc<dyn JobReporter>,
    finish_sender: Sender<()>,
    finish_receiver: Receiver<()>,
}

impl TaskExecutor {
    pub fn new(
        ctx: Arc<TaskContext>,
        task: Task,
        stage: Stage,
        registry: Arc<RunnerRegistry>,
        input: InputReader,
        output: OutputWriter,
        reporter: Arc<dyn JobReporter>,
    ) -> Self {
        // Capacity one: the success signal never blocks the executor when
        // nobody is waiting yet.
        let (finish_sender, finish_receiver) = bounded(1);
        Self {
            ctx,
            task,
            stage,
            registry,
            runner: None,
            input,
            output,
            reporter,
            finish_sender,
            finish_receiver,
        }
    }

    /// Run the task to its terminal state.
    ///
    /// Every failure path, including panics in user transformation code,
    /// funnels into [`abort`](Self::abort); the worker process is never
    /// brought down by a stage runner.
    pub fn execute(&mut self) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.run())) {
            self.abort(Error::Panic(panic_message(payload)));
        }
    }

    fn run(&mut self) {
        // Locate the stage closure, materialise the runner, set it up.
        // Nothing has been consumed yet, so failures report without output.
        let runner = match self.setup_runner() {
            Ok(runner) => runner,
            Err(err) => {
                self.abort(err);
                return;
            }
        };
        self.runner = Some(runner);

        // Drain the input until the stream closes. The row count is for
        // logging only.
        let mut row_count = 0usize;
        while let Some(batch) = self.input.recv() {
            row_count += batch.len();
            let runner = self.runner.as_mut().expect("runner installed above");
            if let Err(err) = runner.apply(&self.ctx, batch, &mut self.output) {
                self.abort(Error::Transform(err.to_string()));
                return;
            }
        }
        if let Some(err) = self.input.take_error() {
            self.abort(err);
            return;
        }
        tracing::info!(
            task = %self.task.reference(),
            rows = row_count,
            "task input drained, closing"
        );

        let runner = self.runner.as_mut().expect("runner installed above");
        if let Err(err) = runner.teardown(&self.ctx, &mut self.output) {
            self.abort(Error::Transform(format!("teardown: {err}")));
            return;
        }

        if let Err(err) = self.output.close() {
            self.abort(Error::Flush(err.to_string()));
            return;
        }

        // The task is only successful once durably reported.
        if let Err(err) = self.reporter.report_success(self.task.reference()) {
            tracing::error!(
                task = %self.task.reference(),
                error = %err,
                "task finished but reporting success failed"
            );
            self.abort(Error::Report(err.to_string()));
            return;
        }

        let _ = self.finish_sender.send(());
    }

    fn setup_runner(&mut self) -> crate::Result<Box<dyn StageRunner>> {
        let payload = self
            .ctx
            .stage_payload(self.stage.name())
            .map_err(|err| Error::Setup(err.to_string()))?;
        let mut runner = self
            .stage
            .materialize(&self.registry, payload)
            .map_err(|err| Error::Setup(err.to_string()))?;
        runner
            .setup(&self.ctx)
            .map_err(|err| Error::Setup(err.to_string()))?;
        Ok(runner)
    }

    /// Unified failure path: log, report the failure, best-effort close the
    /// output. The primary cause takes precedence over reporter and close
    /// errors, which are logged and dropped.
    pub fn abort(&mut self, err: Error) {
        tracing::error!(task = %self.task.reference(), error = %err, "task failed");
        if let Err(report_err) = self.reporter.report_failure(self.task.reference(), &err) {
            tracing::error!(
                task = %self.task.reference(),
                error = %report_err,
                "another error occurred while reporting the failure"
            );
        }
        let _ = self.output.close();
    }

    /// Block until the completion signal fires.
    ///
    /// The signal fires **only on the success branch**: a task that failed
    /// (and whose executor is still alive) leaves this blocked forever.
    /// Callers that may observe both outcomes must watch the job reporter
    /// instead. Dropping the executor disconnects the channel and releases
    /// waiters.
    pub fn wait_for_finish(&self) {
        let _ = self.finish_receiver.recv();
    }

    /// A cloneable waiter usable from other threads.
    pub fn finish_signal(&self) -> FinishSignal {
        FinishSignal {
            receiver: self.finish_receiver.clone(),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "tests/executor_tests.rs"]
mod tests;
