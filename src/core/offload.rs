//! Work offloading for whole-database operations
//!
//! Opening, executing and closing a database can re-enter the VFS, which in
//! turn blocks on the control loop. Running those calls on the control
//! thread would deadlock it against itself, so they run on a fixed-size
//! [`WorkPool`] instead. The result comes back as a [`Pending`] that is
//! settled on the control loop, exactly once, when the loop handles the
//! completion the worker posted.

use crate::core::control::{Control, Posted};
use crate::error::{BridgeError, Result};
use crossbeam::channel::{self, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send>;

enum Work {
    Run(Job),
    Shutdown,
}

/// Fixed-size pool of worker threads
pub(crate) struct WorkPool {
    sender: Sender<Work>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkPool {
    pub fn new(threads: usize) -> Result<Self> {
        let (sender, receiver) = channel::unbounded::<Work>();

        let mut handles = Vec::with_capacity(threads);
        for index in 0..threads {
            let rx = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("vfs-bridge-worker-{index}"))
                .spawn(move || worker_loop(rx))?;
            handles.push(handle);
        }

        debug!(threads, "work pool started");
        Ok(WorkPool { sender, handles })
    }

    /// Queue `job`; its result is posted to `inbox` and surfaces through the
    /// returned [`Pending`] once the control loop has run `settle`
    pub fn submit<T, F, S>(&self, inbox: Sender<Posted>, job: F, settle: S) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
        S: FnOnce(&Control) + Send + 'static,
    {
        let (result_tx, result_rx) = channel::bounded(1);

        let work: Job = Box::new(move || {
            let result = match panic::catch_unwind(AssertUnwindSafe(job)) {
                Ok(result) => result,
                Err(_) => {
                    error!("offloaded task panicked");
                    Err(BridgeError::Engine("offloaded task panicked".into()))
                }
            };

            let deliver: Posted = Box::new(move |cx: &Control| {
                settle(cx);
                let _ = result_tx.send(result);
            });
            if inbox.send(deliver).is_err() {
                debug!("control context gone, dropping task result");
            }
        });

        if self.sender.send(Work::Run(work)).is_err() {
            return Pending::ready(Err(BridgeError::Disconnected));
        }

        Pending { rx: result_rx }
    }
}

impl Drop for WorkPool {
    fn drop(&mut self) {
        for _ in 0..self.handles.len() {
            let _ = self.sender.send(Work::Shutdown);
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        debug!("work pool stopped");
    }
}

fn worker_loop(rx: Receiver<Work>) {
    while let Ok(work) = rx.recv() {
        match work {
            Work::Run(job) => job(),
            Work::Shutdown => break,
        }
    }
}

/// Result of an offloaded operation, settled on the control loop
///
/// Drive the loop with [`Control::block_on`] or poll with
/// [`try_take`](Self::try_take) between turns.
#[must_use = "a pending result does nothing unless the control loop is driven"]
pub struct Pending<T> {
    rx: Receiver<Result<T>>,
}

impl<T> Pending<T> {
    /// Already-settled result
    pub fn ready(result: Result<T>) -> Self {
        let (tx, rx) = channel::bounded(1);
        let _ = tx.send(result);
        Pending { rx }
    }

    pub fn is_settled(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Take the result if the control loop has delivered it
    pub fn try_take(&self) -> Option<Result<T>> {
        self.rx.try_recv().ok()
    }
}
