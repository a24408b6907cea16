use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id source for tagging requests and subscriptions.
///
/// Clones share the same counter. The first id handed out is 1.
#[derive(Debug, Default, Clone)]
pub struct IdClock {
	next: Arc<AtomicU64>,
}

impl IdClock {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next id.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}
