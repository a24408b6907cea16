/// Execution classes used to label spawned work in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Search, selection and reverse-geocoding requests issued by callers.
	Request,
	/// Serialized data provider mutations and layer propagation.
	Propagation,
	/// Callback delivery on a detached task.
	Delivery,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Request => "request",
			Self::Propagation => "propagation",
			Self::Delivery => "delivery",
		}
	}
}
