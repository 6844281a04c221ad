//! Thread-side entry point for storage calls
//!
//! The VFS hooks go through [`StorageClient`]; it is also handed out by
//! [`VfsRegistration::client`](crate::core::vfs::VfsRegistration::client)
//! so storage can be driven from any thread without SQLite in the way.

use super::envelope::{BufferView, StorageCall, StorageOp};
use super::{Bridge, Reply};
use crate::core::classify::FileRole;
use crate::error::{BridgeError, Result};

/// Blocking storage calls into a VFS registration's handler
#[derive(Clone)]
pub struct StorageClient {
    bridge: Bridge<StorageCall>,
}

impl StorageClient {
    pub(crate) fn new(bridge: Bridge<StorageCall>) -> Self {
        StorageClient { bridge }
    }

    pub fn access(&self, role: FileRole) -> Result<bool> {
        match self.call(role, StorageOp::Access)? {
            Reply::Exists(exists) => Ok(exists),
            other => Err(unexpected(other)),
        }
    }

    pub fn size(&self, role: FileRole) -> Result<u64> {
        match self.call(role, StorageOp::Size)? {
            Reply::Size(size) => Ok(size),
            other => Err(unexpected(other)),
        }
    }

    /// Fill `buf` from `offset`; `buf` is written in place by the handler
    pub fn read(&self, role: FileRole, buf: &mut [u8], offset: u64) -> Result<()> {
        let op = StorageOp::Read {
            buf: BufferView::from_mut(buf),
            offset,
        };
        self.call(role, op).map(|_| ())
    }

    pub fn write(&self, role: FileRole, buf: &[u8], offset: u64) -> Result<()> {
        let op = StorageOp::Write {
            buf: BufferView::from_ref(buf),
            offset,
        };
        self.call(role, op).map(|_| ())
    }

    pub fn delete(&self, role: FileRole) -> Result<()> {
        self.call(role, StorageOp::Delete).map(|_| ())
    }

    fn call(&self, role: FileRole, op: StorageOp) -> Result<Reply> {
        self.bridge.call(StorageCall { role, op })
    }
}

fn unexpected(reply: Reply) -> BridgeError {
    tracing::error!(?reply, "storage call answered with the wrong reply kind");
    BridgeError::Disconnected
}
