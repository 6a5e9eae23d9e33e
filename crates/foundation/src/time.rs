//! Time primitives.
//!
//! Anything that waits on the wall clock goes through [`Delay`] so loops can be
//! driven by a fake clock in tests.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Injectable sleep.
pub trait Delay: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Real-time delay backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

impl Delay for TokioDelay {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Delay that records every requested duration and only yields to the
/// scheduler once instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Durations requested so far, in call order.
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

impl Delay for RecordingDelay {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.slept.lock().push(duration);
        Box::pin(YieldOnce(false))
    }
}

/// Pending on its first poll, ready on the second.
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            return Poll::Ready(());
        }
        self.0 = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
