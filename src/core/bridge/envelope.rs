//! Payloads carried through the bridge

use crate::core::classify::FileRole;
use std::ptr::NonNull;

/// Borrowed view of a caller-owned byte buffer
///
/// The caller of [`Bridge::call`](super::Bridge::call) stays blocked until
/// the envelope holding this view is completed or dropped, so the memory
/// stays valid for as long as the view exists. Slices handed out from it are
/// tied to a borrow of the request that owns the view and cannot escape it.
pub(crate) struct BufferView {
    ptr: NonNull<u8>,
    len: usize,
}

// The owning thread is parked for the lifetime of the view.
unsafe impl Send for BufferView {}

impl BufferView {
    pub fn from_mut(buf: &mut [u8]) -> Self {
        BufferView {
            ptr: NonNull::from(&mut *buf).cast::<u8>(),
            len: buf.len(),
        }
    }

    /// View of a read-only buffer; only [`as_slice`](Self::as_slice) may be used on it
    pub fn from_ref(buf: &[u8]) -> Self {
        BufferView {
            ptr: NonNull::from(buf).cast::<u8>(),
            len: buf.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// # Safety
    /// The originating buffer must still be borrowed by a blocked caller.
    pub unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.ptr.as_ptr(), self.len)
    }

    /// # Safety
    /// As [`as_slice`](Self::as_slice), and the view must come from
    /// [`from_mut`](Self::from_mut).
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len)
    }
}

pub(crate) enum StorageOp {
    Access,
    Size,
    Read { buf: BufferView, offset: u64 },
    Write { buf: BufferView, offset: u64 },
    Delete,
}

/// One storage request for a VFS registration's handler
pub(crate) struct StorageCall {
    pub role: FileRole,
    pub op: StorageOp,
}

/// One result row on its way to a database's row callback
pub(crate) struct RowCall {
    pub values: Vec<Option<String>>,
    pub names: Vec<String>,
}
