use tokio::runtime::Handle;

use crate::TaskClass;

/// Context on which result callbacks are delivered.
///
/// The default is [`Executor::Inline`]: the callback runs on whichever worker
/// task produced the result, right after the result is known.
#[derive(Debug, Clone, Default)]
pub enum Executor {
	/// Runs the callback on the producing task.
	#[default]
	Inline,
	/// Spawns one detached task per delivery on the worker runtime.
	Spawn(TaskClass),
	/// Spawns one detached task per delivery on an explicit runtime.
	Runtime(Handle),
}

impl Executor {
	/// Runs `f` on this context.
	pub fn execute<F>(&self, f: F)
	where
		F: FnOnce() + Send + 'static,
	{
		match self {
			Self::Inline => f(),
			Self::Spawn(class) => {
				crate::spawn(*class, async move { f() });
			}
			Self::Runtime(handle) => {
				tracing::trace!("worker.executor.runtime");
				handle.spawn(async move { f() });
			}
		}
	}
}
