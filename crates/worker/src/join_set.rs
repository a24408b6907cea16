use std::future::Future;

use tokio::task::{JoinError, JoinSet};

use crate::TaskClass;

/// Classified wrapper over a Tokio [`JoinSet`].
///
/// Tasks are spawned on [`crate::current_handle`], so the set works from inside
/// or outside a runtime context. Dropping the set aborts everything still in it.
#[derive(Debug)]
pub struct WorkerJoinSet<T> {
	class: TaskClass,
	inner: JoinSet<T>,
}

impl<T> WorkerJoinSet<T>
where
	T: Send + 'static,
{
	pub fn new(class: TaskClass) -> Self {
		Self { class, inner: JoinSet::new() }
	}

	pub fn len(&self) -> usize {
		self.inner.len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	/// Spawns a future into the set.
	pub fn spawn<F>(&mut self, fut: F)
	where
		F: Future<Output = T> + Send + 'static,
	{
		tracing::trace!(worker_class = self.class.as_str(), pending = self.inner.len(), "worker.join_set.spawn");
		self.inner.spawn_on(fut, &crate::current_handle());
	}

	/// Waits for the next completed task.
	pub async fn join_next(&mut self) -> Option<Result<T, JoinError>> {
		self.inner.join_next().await
	}

	/// Aborts every remaining task and waits until all of them have stopped.
	pub async fn shutdown(&mut self) {
		let pending = self.inner.len();
		if pending > 0 {
			tracing::trace!(worker_class = self.class.as_str(), pending, "worker.join_set.shutdown");
		}
		self.inner.shutdown().await;
	}
}
