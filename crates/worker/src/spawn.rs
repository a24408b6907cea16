use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::TaskClass;

/// Returns the ambient runtime handle, or the shared fallback runtime when the
/// caller is not inside a Tokio context.
pub fn current_handle() -> Handle {
	if let Ok(handle) = Handle::try_current() {
		return handle;
	}

	static FALLBACK_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = FALLBACK_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("waymark-worker")
			.build()
			.expect("failed to build waymark-worker fallback runtime")
	});
	runtime.handle().clone()
}

/// Spawns an async task tagged with `class`.
pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn");
	current_handle().spawn(fut)
}
