//! Downstream work that outlives the activation that started it.
//!
//! Data pushed out of a running node can start activations that do not finish
//! synchronously. Those belong to the receiving nodes, not to the emitter, so
//! they are handed here instead of being chained onto the emitter's stages.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::continuation::Delivery;

type PanicPayload = Box<dyn Any + Send + 'static>;

/// Drives detached deliveries for one runtime.
///
/// Inside a tokio runtime each delivery is spawned as its own task. Outside of
/// one it is parked until [`Background::settle`] polls it.
#[derive(Default)]
pub(crate) struct Background {
    in_flight: AtomicUsize,
    idle: Notify,
    parked: Mutex<Vec<BoxFuture<'static, ()>>>,
    panicked: Mutex<Option<PanicPayload>>,
}

impl Background {
    pub(crate) fn detach(self: &Arc<Self>, delivery: Delivery) {
        let Delivery::Pending(fut) = delivery else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                let tracker = self.clone();
                handle.spawn(async move {
                    let outcome = AssertUnwindSafe(fut).catch_unwind().await;
                    tracker.finish(outcome);
                });
            }
            Err(_) => self.parked.lock().push(fut),
        }
    }

    fn finish(&self, outcome: std::thread::Result<()>) {
        if let Err(payload) = outcome {
            self.record_panic(payload);
        }
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn record_panic(&self, payload: PanicPayload) {
        let mut slot = self.panicked.lock();
        if slot.is_none() {
            *slot = Some(payload);
        }
    }

    /// Deliveries spawned and not yet finished, plus parked ones.
    pub(crate) fn pending(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst) + self.parked.lock().len()
    }

    /// Wait until no detached work is left, including work started by the
    /// work being waited on. A panic inside a detached delivery (such as a
    /// fatal uncaught node error) is resumed here.
    pub(crate) async fn settle(&self) {
        loop {
            let parked = std::mem::take(&mut *self.parked.lock());
            if !parked.is_empty() {
                if let Err(payload) = AssertUnwindSafe(join_all(parked)).catch_unwind().await {
                    self.record_panic(payload);
                }
                continue;
            }
            let idle = self.idle.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            idle.await;
        }
        let panicked = self.panicked.lock().take();
        if let Some(payload) = panicked {
            std::panic::resume_unwind(payload);
        }
    }
}
