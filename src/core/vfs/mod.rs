//! SQLite VFS (Virtual File System) backed by a control-context handler
//!
//! This module provides a custom SQLite VFS whose data-bearing operations
//! are carried out by a handler living on a [`Control`] loop:
//!
//! - `xRead`, `xWrite`, `xFileSize`, `xAccess` and `xDelete` are bridged to
//!   the handler and block the calling SQLite thread until it answers
//! - the file role (primary, journal, WAL) is resolved from the open flags,
//!   or from the name suffix where SQLite passes no flags
//! - locking, syncing and truncation are no-ops, randomness is all zeros and
//!   time comes from the real-time clock
//!
//! [`Control`]: crate::core::control::Control

mod file;
mod vfs;

#[cfg(test)]
mod tests;

pub use file::BridgeFile;
pub(crate) use vfs::VfsLease;
pub use vfs::{julian_day, julian_millis, register_vfs, resolve_full_path, VfsRegistration};
