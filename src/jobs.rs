//! [`JobQueue`]: multi-producer, single-consumer FIFO of zero-argument
//! thunks drained on the host thread each frame under a budget.
//!
//! This is the one sanctioned way for a background thread to reach the
//! script engine, the entity world, or the event bus: it never calls those
//! APIs directly, it submits a closure here and the closure runs on the
//! host thread during the next `drain`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub const DEFAULT_DRAIN_BUDGET: usize = 256;

/// Cheap, cloneable handle producers use to submit work. Mirrors the
/// teacher's `JsEngineClient`: a `Sender` behind a mutex so the handle stays
/// `Sync` without requiring the job type to be `Sync`.
#[derive(Clone)]
pub struct JobSender {
    sender: Arc<Mutex<Sender<Job>>>,
    depth: Arc<AtomicUsize>,
}

impl JobSender {
    /// Thread-safe, non-blocking enqueue.
    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) {
        let sender = self.sender.lock().expect("job sender poisoned");
        if sender.send(Box::new(job)).is_err() {
            log::warn!("job enqueued after queue was dropped");
        } else {
            self.depth.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Owns the receiving end; only ever drained on the host thread.
pub struct JobQueue {
    sender: JobSender,
    receiver: Receiver<Job>,
    depth: Arc<AtomicUsize>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let depth = Arc::new(AtomicUsize::new(0));
        Self {
            sender: JobSender {
                sender: Arc::new(Mutex::new(tx)),
                depth: depth.clone(),
            },
            receiver: rx,
            depth,
        }
    }

    /// A cloneable handle for producers, typically handed to background
    /// threads via [`crate::runtime::ScriptRuntime::jobs`].
    pub fn sender(&self) -> JobSender {
        self.sender.clone()
    }

    /// Run up to `budget` jobs in FIFO order, returning the count executed.
    /// Remaining jobs persist to the next call. A job that panics is caught
    /// and logged; it does not stop the drain.
    pub fn drain(&self, budget: usize) -> usize {
        let mut executed = 0;
        while executed < budget {
            match self.receiver.try_recv() {
                Ok(job) => {
                    if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
                        log::error!("job panicked during drain: {:?}", panic_message(&payload));
                    }
                    executed += 1;
                    self.depth.fetch_sub(1, Ordering::Relaxed);
                }
                Err(_) => break,
            }
        }
        executed
    }

    /// Approximate, racy-by-design queue depth for host diagnostics.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn drain_fifo_with_budget() {
        let queue = JobQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let order = order.clone();
            queue.sender().enqueue(move || order.lock().unwrap().push(i));
        }

        assert_eq!(queue.drain(3), 3);
        assert_eq!(queue.drain(3), 3);
        assert_eq!(queue.drain(3), 3);
        assert_eq!(queue.drain(3), 1);
        assert_eq!(queue.drain(3), 0);

        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn panicking_job_does_not_stop_drain() {
        let queue = JobQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));
        queue.sender().enqueue(|| panic!("boom"));
        let ran2 = ran.clone();
        queue.sender().enqueue(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        });

        let executed = queue.drain(10);
        assert_eq!(executed, 2);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn enqueue_is_thread_safe() {
        let queue = JobQueue::new();
        let total = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let sender = queue.sender();
            let total = total.clone();
            handles.push(std::thread::spawn(move || {
                sender.enqueue(move || {
                    total.fetch_add(1, Ordering::SeqCst);
                });
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        queue.drain(8);
        assert_eq!(total.load(Ordering::SeqCst), 8);
    }
}
