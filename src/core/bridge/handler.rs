//! Storage handler traits and dispatch
//!
//! A VFS registration is serviced by exactly one handler set, chosen once
//! through [`Handlers`]:
//!
//! - [`Handlers::immediate`] wraps a [`StorageHandler`] that answers every
//!   call before returning.
//! - [`Handlers::deferred`] wraps a [`DeferredStorageHandler`] that receives
//!   owned requests and may answer them on a later turn of the control loop.
//!   The SQLite thread that issued the call stays blocked until then.

use super::envelope::{StorageCall, StorageOp};
use super::request::{AccessRequest, DeleteRequest, ReadRequest, SizeRequest, WriteRequest};
use super::{Envelope, Reply};
use crate::core::classify::FileRole;
use crate::core::control::Control;

/// Storage handler that completes each call synchronously
pub trait StorageHandler {
    /// Whether a file exists for `role`
    fn access(&mut self, cx: &Control, role: FileRole) -> bool;

    /// Size in bytes of the file for `role`
    fn size(&mut self, cx: &Control, role: FileRole) -> u64;

    /// Fill all of `buf` with the bytes at `offset`
    ///
    /// Short reads are not modeled: bytes past the end of the stored data
    /// must be zero-filled.
    fn read(&mut self, cx: &Control, role: FileRole, buf: &mut [u8], offset: u64);

    fn write(&mut self, cx: &Control, role: FileRole, buf: &[u8], offset: u64);

    fn delete(&mut self, cx: &Control, role: FileRole);
}

/// Storage handler that completes calls through owned request objects
pub trait DeferredStorageHandler {
    fn access(&mut self, cx: &Control, request: AccessRequest);

    fn size(&mut self, cx: &Control, request: SizeRequest);

    fn read(&mut self, cx: &Control, request: ReadRequest);

    fn write(&mut self, cx: &Control, request: WriteRequest);

    fn delete(&mut self, cx: &Control, request: DeleteRequest);
}

/// Handler set bound to one VFS registration
pub enum Handlers {
    Immediate(Box<dyn StorageHandler>),
    Deferred(Box<dyn DeferredStorageHandler>),
}

impl Handlers {
    pub fn immediate<H: StorageHandler + 'static>(handler: H) -> Self {
        Handlers::Immediate(Box::new(handler))
    }

    pub fn deferred<H: DeferredStorageHandler + 'static>(handler: H) -> Self {
        Handlers::Deferred(Box::new(handler))
    }

    /// Run one storage call against the handler set
    pub(crate) fn dispatch(&mut self, cx: &Control, envelope: Envelope<StorageCall>) {
        let Envelope {
            payload: StorageCall { role, op },
            completion,
        } = envelope;

        match self {
            Handlers::Immediate(handler) => match op {
                StorageOp::Access => {
                    let exists = handler.access(cx, role);
                    completion.complete(Reply::Exists(exists));
                }
                StorageOp::Size => {
                    let size = handler.size(cx, role);
                    completion.complete(Reply::Size(size));
                }
                StorageOp::Read { buf, offset } => {
                    let mut request = ReadRequest::new(role, buf, offset, completion);
                    handler.read(cx, role, request.buffer_mut(), offset);
                    request.done();
                }
                StorageOp::Write { buf, offset } => {
                    let request = WriteRequest::new(role, buf, offset, completion);
                    handler.write(cx, role, request.buffer(), offset);
                    request.done();
                }
                StorageOp::Delete => {
                    handler.delete(cx, role);
                    completion.complete(Reply::Done);
                }
            },
            Handlers::Deferred(handler) => match op {
                StorageOp::Access => handler.access(cx, AccessRequest::new(role, completion)),
                StorageOp::Size => handler.size(cx, SizeRequest::new(role, completion)),
                StorageOp::Read { buf, offset } => {
                    handler.read(cx, ReadRequest::new(role, buf, offset, completion))
                }
                StorageOp::Write { buf, offset } => {
                    handler.write(cx, WriteRequest::new(role, buf, offset, completion))
                }
                StorageOp::Delete => handler.delete(cx, DeleteRequest::new(role, completion)),
            },
        }
    }
}
