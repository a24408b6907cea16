//! Worker runtime primitives shared by the search core.
//!
//! * [`TaskClass`]: labels spawned work for tracing.
//! * [`spawn`]: classified spawning onto the ambient runtime,
//!   falling back to a small shared runtime when called outside one.
//! * [`SerialExecutor`]: single-owner FIFO job runner used to serialize state.
//! * [`WorkerJoinSet`]: join set for fan-out work that must be aborted together.
//! * [`Executor`]: context on which result callbacks are delivered.

mod class;
mod executor;
mod join_set;
mod serial;
mod spawn;
mod token;

pub use class::TaskClass;
pub use executor::Executor;
pub use join_set::WorkerJoinSet;
pub use serial::{JobStatus, SerialClosed, SerialExecutor};
pub use spawn::{current_handle, spawn};
pub use token::IdClock;
