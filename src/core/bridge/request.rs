//! Owned requests handed to deferred storage handlers
//!
//! Each request wraps one bridged call. Answering it (`respond` / `done`)
//! consumes the request and unblocks the SQLite thread waiting on it.
//! Requests are pinned to the control thread: they may be parked and
//! answered on a later turn of the loop, but never moved elsewhere.

use super::envelope::BufferView;
use super::{Completion, Reply};
use crate::core::classify::FileRole;
use std::marker::PhantomData;

type ControlThreadOnly = PhantomData<*const ()>;

pub struct AccessRequest {
    role: FileRole,
    completion: Completion,
    _local: ControlThreadOnly,
}

impl AccessRequest {
    pub(crate) fn new(role: FileRole, completion: Completion) -> Self {
        AccessRequest {
            role,
            completion,
            _local: PhantomData,
        }
    }

    pub fn role(&self) -> FileRole {
        self.role
    }

    pub fn respond(self, exists: bool) {
        self.completion.complete(Reply::Exists(exists));
    }
}

pub struct SizeRequest {
    role: FileRole,
    completion: Completion,
    _local: ControlThreadOnly,
}

impl SizeRequest {
    pub(crate) fn new(role: FileRole, completion: Completion) -> Self {
        SizeRequest {
            role,
            completion,
            _local: PhantomData,
        }
    }

    pub fn role(&self) -> FileRole {
        self.role
    }

    pub fn respond(self, size: u64) {
        self.completion.complete(Reply::Size(size));
    }
}

/// Fill the caller's buffer with `len()` bytes starting at `offset()`
pub struct ReadRequest {
    role: FileRole,
    offset: u64,
    buf: BufferView,
    completion: Completion,
    _local: ControlThreadOnly,
}

impl ReadRequest {
    pub(crate) fn new(role: FileRole, buf: BufferView, offset: u64, completion: Completion) -> Self {
        ReadRequest {
            role,
            offset,
            buf,
            completion,
            _local: PhantomData,
        }
    }

    pub fn role(&self) -> FileRole {
        self.role
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.len() == 0
    }

    /// The caller's buffer, written in place
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        // SAFETY: built from a `&mut [u8]` whose owner is parked until this
        // request is answered or dropped; the slice borrows `self`.
        unsafe { self.buf.as_mut_slice() }
    }

    pub fn done(self) {
        self.completion.complete(Reply::Done);
    }
}

/// Consume `len()` bytes destined for `offset()`
pub struct WriteRequest {
    role: FileRole,
    offset: u64,
    buf: BufferView,
    completion: Completion,
    _local: ControlThreadOnly,
}

impl WriteRequest {
    pub(crate) fn new(role: FileRole, buf: BufferView, offset: u64, completion: Completion) -> Self {
        WriteRequest {
            role,
            offset,
            buf,
            completion,
            _local: PhantomData,
        }
    }

    pub fn role(&self) -> FileRole {
        self.role
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.len() == 0
    }

    /// The caller's bytes, read in place
    pub fn buffer(&self) -> &[u8] {
        // SAFETY: the owner of the bytes is parked until this request is
        // answered or dropped; the slice borrows `self`.
        unsafe { self.buf.as_slice() }
    }

    pub fn done(self) {
        self.completion.complete(Reply::Done);
    }
}

pub struct DeleteRequest {
    role: FileRole,
    completion: Completion,
    _local: ControlThreadOnly,
}

impl DeleteRequest {
    pub(crate) fn new(role: FileRole, completion: Completion) -> Self {
        DeleteRequest {
            role,
            completion,
            _local: PhantomData,
        }
    }

    pub fn role(&self) -> FileRole {
        self.role
    }

    pub fn done(self) {
        self.completion.complete(Reply::Done);
    }
}
