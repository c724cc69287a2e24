// plantpulse-ingest-core/src/tasks.rs
// Bounded pool for detached background work with drain-on-shutdown

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, Semaphore};

/// Named pool for fan-out work launched after the HTTP response.
///
/// Concurrency is capped by a semaphore; tasks beyond the cap wait for a
/// permit inside their spawned future. `drain` blocks until every
/// launched task has finished, which is how shutdown guarantees no
/// reading is dropped mid-fanout.
pub struct BackgroundTasks {
    name: &'static str,
    permits: Arc<Semaphore>,
    inflight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl BackgroundTasks {
    pub fn new(name: &'static str, max_inflight: usize) -> Self {
        Self {
            name,
            permits: Arc::new(Semaphore::new(max_inflight)),
            inflight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Launch one background task, tagged with the originating request id
    /// for log correlation
    pub fn spawn<F>(&self, request_id: String, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        let inflight = self.inflight.clone();
        let idle = self.idle.clone();
        let name = self.name;

        inflight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            match permits.acquire().await {
                Ok(_permit) => {
                    log::debug!("{}: task started request_id={}", name, request_id);
                    work.await;
                }
                Err(_) => {
                    log::warn!(
                        "{}: task pool closed, dropping work request_id={}",
                        name,
                        request_id
                    );
                }
            }
            if inflight.fetch_sub(1, Ordering::SeqCst) == 1 {
                idle.notify_waiters();
            }
        });
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    /// Wait until every launched task has completed
    pub async fn drain(&self) {
        loop {
            if self.inflight.load(Ordering::SeqCst) == 0 {
                return;
            }
            let notified = self.idle.notified();
            if self.inflight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}
