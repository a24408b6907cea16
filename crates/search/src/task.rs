//! Cancellable task handles with at-most-once callback delivery.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use waymark_worker::Executor;

use crate::{Result, SearchError};

/// Single-shot completion sink.
pub type Callback<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

type Hook = Box<dyn FnOnce() + Send + 'static>;

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const CANCELLED: u8 = 2;

/// Lifecycle of an [`AsyncTask`]. Both non-pending states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
	Pending,
	Completed,
	Cancelled,
}

impl TaskState {
	fn from_raw(raw: u8) -> Self {
		match raw {
			PENDING => Self::Pending,
			COMPLETED => Self::Completed,
			_ => Self::Cancelled,
		}
	}
}

struct Inner {
	state: AtomicU8,
	token: CancellationToken,
	on_cancel: Mutex<Vec<Hook>>,
}

/// Handle for one outstanding unit of asynchronous work.
///
/// The handle is cheap to clone; clones observe and drive the same task. The
/// terminal state is claimed with a single compare-and-swap, so exactly one of
/// [`AsyncTask::cancel`] and the delivering side wins. Delivery claims the
/// state on the delivering context immediately before invoking the callback,
/// which keeps a delivery that was scheduled before cancellation droppable.
#[derive(Clone)]
pub struct AsyncTask {
	inner: Arc<Inner>,
}

impl std::fmt::Debug for AsyncTask {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AsyncTask").field("state", &self.state()).finish()
	}
}

impl Default for AsyncTask {
	fn default() -> Self {
		Self::new()
	}
}

impl AsyncTask {
	/// Creates a pending task.
	pub fn new() -> Self {
		Self::with_state(PENDING)
	}

	/// Creates a task that is already completed. Cancelling it does nothing.
	pub fn completed() -> Self {
		Self::with_state(COMPLETED)
	}

	fn with_state(state: u8) -> Self {
		Self {
			inner: Arc::new(Inner {
				state: AtomicU8::new(state),
				token: CancellationToken::new(),
				on_cancel: Mutex::new(Vec::new()),
			}),
		}
	}

	/// Runs `callback` with `value` on `executor` and returns a pre-completed task.
	///
	/// Used by operations that know their answer without suspending.
	pub fn completed_with<T, F>(executor: &Executor, callback: F, value: Result<T>) -> Self
	where
		T: Send + 'static,
		F: FnOnce(Result<T>) + Send + 'static,
	{
		executor.execute(move || callback(value));
		Self::completed()
	}

	pub fn state(&self) -> TaskState {
		TaskState::from_raw(self.inner.state.load(Ordering::Acquire))
	}

	/// True once the task is completed or cancelled.
	pub fn is_done(&self) -> bool {
		self.state() != TaskState::Pending
	}

	pub fn is_cancelled(&self) -> bool {
		self.state() == TaskState::Cancelled
	}

	/// Cancels a pending task. No-op once the task is terminal.
	///
	/// After this returns, the callback will not be invoked. Work that has
	/// already started is not interrupted; only its delivery is suppressed.
	pub fn cancel(&self) {
		if self.try_cancel() {
			tracing::trace!("search.task.cancel");
		}
	}

	/// Claims the cancelled state and runs cancel hooks. Returns false if the
	/// task is already terminal.
	fn try_cancel(&self) -> bool {
		if self
			.inner
			.state
			.compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			return false;
		}
		self.inner.token.cancel();
		let hooks = std::mem::take(&mut *self.inner.on_cancel.lock());
		for hook in hooks {
			hook();
		}
		true
	}

	/// Claims the completed state. Returns false if the task is already terminal.
	pub(crate) fn try_complete(&self) -> bool {
		let won = self
			.inner
			.state
			.compare_exchange(PENDING, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
			.is_ok();
		if won {
			self.inner.on_cancel.lock().clear();
		}
		won
	}

	/// Delivers `value` through `callback` on `executor`, unless the task was
	/// cancelled before the executor gets to run it.
	pub(crate) fn deliver<T, F>(&self, executor: &Executor, callback: F, value: Result<T>)
	where
		T: Send + 'static,
		F: FnOnce(Result<T>) + Send + 'static,
	{
		let task = self.clone();
		executor.execute(move || {
			if task.try_complete() {
				callback(value);
			} else {
				tracing::trace!(state = ?task.state(), "search.task.delivery_dropped");
			}
		});
	}

	/// Moves the task to cancelled on `executor` and still reports `err`
	/// through `callback`. Used when the work itself was cancelled by the
	/// other side rather than by the caller; a caller-side cancel that lands
	/// first suppresses the callback as usual.
	pub(crate) fn deliver_cancelled<T, F>(&self, executor: &Executor, callback: F, err: SearchError)
	where
		T: Send + 'static,
		F: FnOnce(Result<T>) + Send + 'static,
	{
		let task = self.clone();
		executor.execute(move || {
			if task.try_cancel() {
				callback(Err(err));
			} else {
				tracing::trace!(state = ?task.state(), "search.task.delivery_dropped");
			}
		});
	}

	/// Registers `hook` to run when the task is cancelled.
	///
	/// Runs `hook` immediately if the task is already cancelled, and drops it
	/// if the task completes.
	pub fn on_cancel<F>(&self, hook: F)
	where
		F: FnOnce() + Send + 'static,
	{
		let mut hooks = self.inner.on_cancel.lock();
		match self.state() {
			TaskState::Pending => hooks.push(Box::new(hook)),
			TaskState::Cancelled => {
				drop(hooks);
				hook();
			}
			TaskState::Completed => {}
		}
	}

	/// Resolves once the task is cancelled.
	pub async fn cancelled(&self) {
		self.inner.token.cancelled().await;
	}
}
