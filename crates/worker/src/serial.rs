//! Single-owner FIFO job runner.
//!
//! Jobs submitted to one [`SerialExecutor`] run one at a time, in submission
//! order, on a dedicated worker task. State touched only from jobs therefore
//! has exactly one writer at a time.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::TaskClass;

/// How a submitted job is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
	/// The job runs on the executor task.
	Run,
	/// The executor shut down before the job could run. The job is still
	/// invoked exactly once so it can report the failure to its caller.
	Rejected,
}

type Job = Box<dyn FnOnce(JobStatus) + Send + 'static>;

/// Error returned by operations on a shut down executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialClosed;

impl std::fmt::Display for SerialClosed {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "serial executor is shut down")
	}
}

impl std::error::Error for SerialClosed {}

/// Single-owner FIFO job runner backed by one worker task.
pub struct SerialExecutor {
	name: Arc<str>,
	tx: mpsc::UnboundedSender<Job>,
	cancel: CancellationToken,
	join: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SerialExecutor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SerialExecutor")
			.field("name", &self.name)
			.field("closed", &self.is_closed())
			.finish()
	}
}

impl Drop for SerialExecutor {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

impl SerialExecutor {
	/// Starts an executor whose worker task is tagged with `class`.
	pub fn new(name: impl Into<Arc<str>>, class: TaskClass) -> Self {
		let name = name.into();
		let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
		let cancel = CancellationToken::new();
		let task_cancel = cancel.clone();
		let task_name = Arc::clone(&name);

		let task = crate::spawn(class, async move {
			loop {
				let job = tokio::select! {
					biased;
					_ = task_cancel.cancelled() => break,
					job = rx.recv() => {
						let Some(job) = job else {
							break;
						};
						job
					}
				};
				run_job(&task_name, job, JobStatus::Run);
			}

			// Anything still queued after close gets exactly one rejected call.
			rx.close();
			let mut rejected = 0usize;
			while let Ok(job) = rx.try_recv() {
				run_job(&task_name, job, JobStatus::Rejected);
				rejected = rejected.wrapping_add(1);
			}
			tracing::debug!(executor = %task_name, rejected, "worker.serial.exit");
		});

		Self {
			name,
			tx,
			cancel,
			join: Mutex::new(Some(task)),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns true once shutdown was requested or the worker task is gone.
	pub fn is_closed(&self) -> bool {
		self.cancel.is_cancelled() || self.tx.is_closed()
	}

	/// Queues `job` behind every previously submitted job.
	///
	/// Never blocks. If the executor is closed, `job` is invoked immediately on
	/// the calling thread with [`JobStatus::Rejected`].
	pub fn submit<F>(&self, job: F)
	where
		F: FnOnce(JobStatus) + Send + 'static,
	{
		if self.cancel.is_cancelled() {
			run_job(&self.name, Box::new(job), JobStatus::Rejected);
			return;
		}
		if let Err(mpsc::error::SendError(job)) = self.tx.send(Box::new(job)) {
			tracing::warn!(executor = %self.name, "worker.serial.rejected");
			run_job(&self.name, job, JobStatus::Rejected);
		}
	}

	/// Stops the worker task after the job currently running, rejects the rest
	/// of the queue, and waits for the task to exit. Safe to call repeatedly.
	pub async fn shutdown(&self) {
		self.cancel.cancel();
		let mut join = self.join.lock().await;
		if let Some(handle) = join.take() {
			let _ = handle.await;
		}
	}
}

fn run_job(name: &str, job: Job, status: JobStatus) {
	if catch_unwind(AssertUnwindSafe(|| job(status))).is_err() {
		tracing::error!(executor = %name, ?status, "worker.serial.job_panicked");
	}
}
