//! Stop signal of the monitor worker.

use futures_util::{
    future::{FusedFuture, Shared},
    FutureExt,
};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::oneshot;

/// Resolves once the worker is asked to stop, or once the [`StopHandle`] is dropped.
#[derive(Debug, Clone)]
pub struct StopRequested(Shared<oneshot::Receiver<()>>);

impl StopRequested {
    /// Whether a stop was requested, without waiting.
    pub fn is_requested(&self) -> bool {
        self.0.is_terminated() || self.0.peek().is_some()
    }
}

impl Future for StopRequested {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.0.is_terminated() || this.0.poll_unpin(cx).is_ready() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// Owned by the [`ChainMonitor`](crate::ChainMonitor) to stop its worker.
#[derive(Debug)]
pub struct StopHandle(oneshot::Sender<()>);

impl StopHandle {
    /// Asks the worker to stop after its current update.
    pub fn stop(self) {
        let _ = self.0.send(());
    }
}

/// Creates a connected stop handle and listener.
pub fn stop_channel() -> (StopHandle, StopRequested) {
    let (sender, receiver) = oneshot::channel();
    (StopHandle(sender), StopRequested(receiver.shared()))
}
