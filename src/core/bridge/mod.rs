//! Synchronous cross-thread call bridge
//!
//! A [`Bridge`] lets any thread hand a payload to the single-threaded
//! [`Control`](crate::core::control::Control) loop and block until the
//! handler living there has answered. Each call travels as an [`Envelope`]
//! through a bounded queue owned by the control loop (senders block while
//! the queue is full) and carries its own one-shot [`Completion`]. The
//! caller stays blocked until that completion fires or is dropped, so any
//! buffer referenced by the payload outlives every use the handler can make
//! of it.

mod client;
mod envelope;
mod handler;
mod request;

pub use client::StorageClient;
pub use handler::{DeferredStorageHandler, Handlers, StorageHandler};
pub use request::{AccessRequest, DeleteRequest, ReadRequest, SizeRequest, WriteRequest};

pub(crate) use envelope::{RowCall, StorageCall};

use crate::error::{BridgeError, Result};
use crossbeam::channel::{self, Receiver, Sender};
use std::thread::{self, ThreadId};

/// Answer produced for one bridged call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reply {
    Done,
    Size(u64),
    Exists(bool),
}

/// One pending call: the payload plus its completion signal
pub(crate) struct Envelope<T> {
    pub payload: T,
    pub completion: Completion,
}

/// Single-use completion signal for one [`Envelope`]
///
/// Completing consumes the signal. Dropping it unanswered wakes the caller
/// with [`BridgeError::Disconnected`] instead of leaving it blocked.
pub(crate) struct Completion {
    tx: Option<Sender<Reply>>,
}

impl Completion {
    fn new(tx: Sender<Reply>) -> Self {
        Completion { tx: Some(tx) }
    }

    pub fn complete(mut self, reply: Reply) {
        if let Some(tx) = self.tx.take() {
            // Capacity 1 and a single send: never blocks
            let _ = tx.send(reply);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!("bridged call dropped without a reply, waking caller");
        }
    }
}

/// Sending half of a bridge; cheap to clone and shareable across threads
pub(crate) struct Bridge<T> {
    tx: Sender<Envelope<T>>,
    control_thread: ThreadId,
}

impl<T> Clone for Bridge<T> {
    fn clone(&self) -> Self {
        Bridge {
            tx: self.tx.clone(),
            control_thread: self.control_thread,
        }
    }
}

impl<T: Send> Bridge<T> {
    /// Create a bridge whose receiving end is drained on `control_thread`
    pub fn new(capacity: usize, control_thread: ThreadId) -> (Self, Receiver<Envelope<T>>) {
        let (tx, rx) = channel::bounded(capacity);
        (Bridge { tx, control_thread }, rx)
    }

    /// Enqueue `payload` and block until the control loop has answered it
    pub fn call(&self, payload: T) -> Result<Reply> {
        if thread::current().id() == self.control_thread {
            return Err(BridgeError::Reentrant);
        }

        let (done_tx, done_rx) = channel::bounded(1);
        let envelope = Envelope {
            payload,
            completion: Completion::new(done_tx),
        };

        // Blocks while the queue is full
        self.tx
            .send(envelope)
            .map_err(|_| BridgeError::Disconnected)?;

        done_rx.recv().map_err(|_| BridgeError::Disconnected)
    }
}
