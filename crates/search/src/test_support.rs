//! Callback plumbing for unit tests.

use std::time::Duration;

use tokio::sync::oneshot;

use crate::Result;

/// Callback that forwards its result into a oneshot receiver.
pub(crate) fn capture<T: Send + 'static>() -> (impl FnOnce(Result<T>) + Send + 'static, oneshot::Receiver<Result<T>>) {
	let (tx, rx) = oneshot::channel();
	(
		move |res| {
			let _ = tx.send(res);
		},
		rx,
	)
}

/// Waits for a captured result, panicking if the callback never fires.
pub(crate) async fn recv<T>(rx: oneshot::Receiver<Result<T>>) -> Result<T> {
	match tokio::time::timeout(Duration::from_secs(5), rx).await {
		Ok(Ok(res)) => res,
		Ok(Err(_)) => panic!("callback dropped without firing"),
		Err(_) => panic!("callback did not fire within 5s"),
	}
}

/// Asserts that a captured callback was dropped without firing.
pub(crate) async fn assert_suppressed<T: std::fmt::Debug>(rx: oneshot::Receiver<Result<T>>) {
	match tokio::time::timeout(Duration::from_secs(5), rx).await {
		Ok(Err(_)) => {}
		Ok(Ok(res)) => panic!("callback fired after cancellation: {res:?}"),
		Err(_) => panic!("callback neither fired nor dropped within 5s"),
	}
}
