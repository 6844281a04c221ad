//! Single-threaded control context
//!
//! [`Control`] is the event loop that owns every handler: the storage
//! handlers of VFS registrations and the row callbacks of databases. Each of
//! those is an *endpoint* with its own bounded queue; worker threads block
//! on that queue (see [`crate::core::bridge`]) until the loop has run the
//! handler for them. Completions of offloaded database operations arrive on
//! a separate inbox and are delivered here too, so every user callback runs
//! on the thread that created the `Control`.
//!
//! Nothing is global: registrations and databases keep a clone of the
//! `Control` they were created on, and handlers receive `&Control` on every
//! invocation.

use crate::config::BridgeConfig;
use crate::core::bridge::{Bridge, Envelope, Handlers, Reply, RowCall, StorageCall};
use crate::core::offload::{Pending, WorkPool};
use crate::error::Result;
use crossbeam::channel::{self, Receiver, Select, Sender};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Longest single wait inside [`Control::run_until`]
const RUN_UNTIL_TICK: Duration = Duration::from_millis(10);

/// Work posted to the loop from another thread
pub(crate) type Posted = Box<dyn FnOnce(&Control) + Send>;

type LocalTask = Box<dyn FnOnce(&Control)>;

/// Callback receiving one result row: values (NULL as `None`) and column names
pub type RowCallback = dyn FnMut(&Control, &[Option<String>], &[String]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct EndpointId(u64);

enum Port {
    Storage {
        rx: Receiver<Envelope<StorageCall>>,
        handlers: Rc<RefCell<Handlers>>,
    },
    Rows {
        rx: Receiver<Envelope<RowCall>>,
        callback: Rc<RefCell<Box<RowCallback>>>,
    },
}

struct Endpoint {
    id: EndpointId,
    port: Port,
}

enum Event {
    Posted(Posted),
    Storage(Rc<RefCell<Handlers>>, Envelope<StorageCall>),
    Row(Rc<RefCell<Box<RowCallback>>>, Envelope<RowCall>),
    Closed(EndpointId),
}

struct ControlInner {
    config: BridgeConfig,
    thread: ThreadId,
    inbox_tx: Sender<Posted>,
    inbox_rx: Receiver<Posted>,
    endpoints: RefCell<Vec<Endpoint>>,
    deferred: RefCell<VecDeque<LocalTask>>,
    next_endpoint: Cell<u64>,
    pool: WorkPool,
}

impl Drop for ControlInner {
    fn drop(&mut self) {
        // Release blocked callers before the pool joins its threads
        self.endpoints.borrow_mut().clear();
        self.deferred.borrow_mut().clear();
        debug!("control context shut down");
    }
}

/// Handle to a control context; clones refer to the same loop
#[derive(Clone)]
pub struct Control {
    inner: Rc<ControlInner>,
}

impl Control {
    /// Create a control context on the current thread
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;

        let pool = WorkPool::new(config.worker_threads)?;
        let (inbox_tx, inbox_rx) = channel::unbounded();

        debug!(
            queue_limit = config.queue_limit,
            worker_threads = config.worker_threads,
            "control context created"
        );

        Ok(Control {
            inner: Rc::new(ControlInner {
                config,
                thread: thread::current().id(),
                inbox_tx,
                inbox_rx,
                endpoints: RefCell::new(Vec::new()),
                deferred: RefCell::new(VecDeque::new()),
                next_endpoint: Cell::new(0),
                pool,
            }),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Schedule `task` to run on a later turn of this loop
    pub fn defer<F>(&self, task: F)
    where
        F: FnOnce(&Control) + 'static,
    {
        self.inner.deferred.borrow_mut().push_back(Box::new(task));
    }

    /// Run `job` on the work pool; its result is delivered back on this loop
    pub fn submit<T, F>(&self, job: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        self.inner
            .pool
            .submit(self.inner.inbox_tx.clone(), job, |_: &Control| {})
    }

    /// Like [`submit`](Self::submit), running `settle` on this loop right
    /// before the result becomes visible
    pub(crate) fn submit_then<T, F, S>(&self, job: F, settle: S) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
        S: FnOnce(&Control) + Send + 'static,
    {
        self.inner
            .pool
            .submit(self.inner.inbox_tx.clone(), job, settle)
    }

    /// Process events until `pending` has been delivered, then return it
    pub fn block_on<T>(&self, pending: Pending<T>) -> Result<T> {
        loop {
            if let Some(result) = pending.try_take() {
                return result;
            }
            self.turn();
        }
    }

    /// Run deferred tasks, then wait for and handle one event
    pub fn turn(&self) {
        if self.run_deferred() {
            // Deferred work ran; only pick up what is already waiting
            self.poll(Some(Duration::ZERO));
        } else {
            self.poll(None);
        }
    }

    /// Like [`turn`](Self::turn) but never blocks; returns whether anything ran
    pub fn try_turn(&self) -> bool {
        let ran = self.run_deferred();
        self.poll(Some(Duration::ZERO)) || ran
    }

    /// Like [`turn`](Self::turn) but waits at most `timeout` for an event
    pub fn turn_timeout(&self, timeout: Duration) -> bool {
        let ran = self.run_deferred();
        let wait = if ran { Duration::ZERO } else { timeout };
        self.poll(Some(wait)) || ran
    }

    /// Keep turning until `done` holds or `timeout` elapses
    ///
    /// `done` is re-checked at least every [`RUN_UNTIL_TICK`], so a predicate
    /// flipped by another thread is noticed without any event arriving.
    pub fn run_until<F>(&self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + timeout;
        while !done() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.turn_timeout((deadline - now).min(RUN_UNTIL_TICK));
        }
        true
    }

    /// Open a bounded queue served by `handlers`
    pub(crate) fn add_storage_endpoint(&self, handlers: Handlers) -> (EndpointId, Bridge<StorageCall>) {
        let (bridge, rx) = Bridge::new(self.inner.config.queue_limit, self.inner.thread);
        let id = self.add_endpoint(Port::Storage {
            rx,
            handlers: Rc::new(RefCell::new(handlers)),
        });
        (id, bridge)
    }

    /// Open a bounded queue delivering rows to `callback`
    pub(crate) fn add_row_endpoint(&self, callback: Box<RowCallback>) -> (EndpointId, Bridge<RowCall>) {
        let (bridge, rx) = Bridge::new(self.inner.config.queue_limit, self.inner.thread);
        let id = self.add_endpoint(Port::Rows {
            rx,
            callback: Rc::new(RefCell::new(callback)),
        });
        (id, bridge)
    }

    /// Drop an endpoint and its handler; queued calls wake with `Disconnected`
    pub(crate) fn remove_endpoint(&self, id: EndpointId) -> bool {
        let removed = {
            let mut endpoints = self.inner.endpoints.borrow_mut();
            endpoints
                .iter()
                .position(|endpoint| endpoint.id == id)
                .map(|index| endpoints.remove(index))
        };
        // Handlers drop outside the borrow; their destructors may touch the loop
        match removed {
            Some(endpoint) => {
                drop(endpoint);
                debug!(endpoint = id.0, "endpoint removed");
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn endpoint_count(&self) -> usize {
        self.inner.endpoints.borrow().len()
    }

    fn add_endpoint(&self, port: Port) -> EndpointId {
        let id = EndpointId(self.inner.next_endpoint.get());
        self.inner.next_endpoint.set(id.0 + 1);
        self.inner.endpoints.borrow_mut().push(Endpoint { id, port });
        debug!(endpoint = id.0, "endpoint added");
        id
    }

    fn run_deferred(&self) -> bool {
        // Only tasks queued before this turn; tasks they defer wait a turn
        let queued = self.inner.deferred.borrow().len();
        for _ in 0..queued {
            let task = self.inner.deferred.borrow_mut().pop_front();
            match task {
                Some(task) => task(self),
                None => break,
            }
        }
        queued > 0
    }

    /// Wait up to `timeout` (forever if `None`) and handle one event
    fn poll(&self, timeout: Option<Duration>) -> bool {
        let event = self.next_event(timeout);
        match event {
            Some(event) => {
                self.handle(event);
                true
            }
            None => false,
        }
    }

    fn next_event(&self, timeout: Option<Duration>) -> Option<Event> {
        let endpoints = self.inner.endpoints.borrow();

        let mut select = Select::new();
        select.recv(&self.inner.inbox_rx);
        for endpoint in endpoints.iter() {
            match &endpoint.port {
                Port::Storage { rx, .. } => select.recv(rx),
                Port::Rows { rx, .. } => select.recv(rx),
            };
        }

        let operation = match timeout {
            None => select.select(),
            Some(timeout) => select.select_timeout(timeout).ok()?,
        };

        let index = operation.index();
        if index == 0 {
            return operation.recv(&self.inner.inbox_rx).ok().map(Event::Posted);
        }

        let endpoint = &endpoints[index - 1];
        let event = match &endpoint.port {
            Port::Storage { rx, handlers } => operation
                .recv(rx)
                .map(|envelope| Event::Storage(Rc::clone(handlers), envelope)),
            Port::Rows { rx, callback } => operation
                .recv(rx)
                .map(|envelope| Event::Row(Rc::clone(callback), envelope)),
        };
        // All senders gone: the endpoint can never fire again
        Some(event.unwrap_or(Event::Closed(endpoint.id)))
    }

    fn handle(&self, event: Event) {
        match event {
            Event::Posted(task) => task(self),
            Event::Storage(handlers, envelope) => {
                trace!("dispatching storage call");
                handlers.borrow_mut().dispatch(self, envelope);
            }
            Event::Row(callback, envelope) => {
                let Envelope {
                    payload,
                    completion,
                } = envelope;
                {
                    let mut callback = callback.borrow_mut();
                    (*callback)(self, &payload.values, &payload.names);
                }
                completion.complete(Reply::Done);
            }
            Event::Closed(id) => {
                self.remove_endpoint(id);
            }
        }
    }

    /// Drain anything already queued without blocking
    pub fn drain(&self) -> usize {
        let mut handled = 0;
        while self.try_turn() {
            handled += 1;
        }
        handled
    }
}
