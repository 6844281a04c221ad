//! SQLite file I/O methods
//!
//! Implements sqlite3_io_methods for files opened through a bridged VFS.
//! Read, write and size go through the registration's [`StorageClient`];
//! everything else answers with a fixed no-op.
//!
//! [`StorageClient`]: crate::core::bridge::StorageClient

use super::vfs::VfsShared;
use crate::core::classify::FileRole;
use crate::error::{BridgeError, Result};
use libsqlite3_sys as ffi;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::sync::atomic::Ordering;
use tracing::{error, trace, warn};

/// Bridged SQLite file
#[repr(C)]
pub struct BridgeFile {
    /// Base sqlite3_file structure (MUST be first field)
    pub base: ffi::sqlite3_file,
    /// Role fixed at open time
    pub role: FileRole,
    /// Owning registration; never owned by the file
    shared: *const VfsShared,
}

static IO_METHODS: ffi::sqlite3_io_methods = ffi::sqlite3_io_methods {
    iVersion: 1,
    xClose: Some(file_close),
    xRead: Some(file_read),
    xWrite: Some(file_write),
    xTruncate: Some(file_truncate),
    xSync: Some(file_sync),
    xFileSize: Some(file_file_size),
    xLock: Some(file_lock),
    xUnlock: Some(file_unlock),
    xCheckReservedLock: Some(file_check_reserved_lock),
    xFileControl: Some(file_file_control),
    xSectorSize: Some(file_sector_size),
    xDeviceCharacteristics: Some(file_device_characteristics),
    xShmMap: None,
    xShmLock: None,
    xShmBarrier: None,
    xShmUnmap: None,
    xFetch: None,
    xUnfetch: None,
};

/// Fold a bridged call's outcome into the storage-hook policy: failures are
/// absorbed with a default answer, except a call from the control thread,
/// which would have deadlocked and is reported as misuse.
pub(super) fn absorb<T: Default>(hook: &str, role: FileRole, result: Result<T>) -> std::result::Result<T, c_int> {
    match result {
        Ok(value) => Ok(value),
        Err(BridgeError::Reentrant) => {
            error!(hook, %role, "SQLite I/O issued on the control thread; run it through the work pool");
            Err(ffi::SQLITE_MISUSE)
        }
        Err(err) => {
            warn!(hook, %role, %err, "storage call not answered, using default");
            Ok(T::default())
        }
    }
}

unsafe fn bridged<'a>(file: *mut ffi::sqlite3_file) -> (&'a BridgeFile, &'a VfsShared) {
    let bridge_file = &*(file as *const BridgeFile);
    (bridge_file, &*bridge_file.shared)
}

// File I/O method implementations

unsafe extern "C" fn file_close(file: *mut ffi::sqlite3_file) -> c_int {
    let (bridge_file, shared) = bridged(file);
    shared.open_files.fetch_sub(1, Ordering::SeqCst);
    trace!(role = %bridge_file.role, "file closed");
    ffi::SQLITE_OK
}

unsafe extern "C" fn file_read(
    file: *mut ffi::sqlite3_file,
    buf: *mut c_void,
    amt: c_int,
    offset: ffi::sqlite3_int64,
) -> c_int {
    let (bridge_file, shared) = bridged(file);
    if buf.is_null() || amt <= 0 {
        return ffi::SQLITE_OK;
    }

    let data = std::slice::from_raw_parts_mut(buf as *mut u8, amt as usize);
    let result = shared
        .client
        .read(bridge_file.role, data, offset.max(0) as u64)
        .map(|_| true);

    match absorb("read", bridge_file.role, result) {
        Ok(true) => ffi::SQLITE_OK,
        Ok(false) => {
            // Unanswered read: hand SQLite zeros rather than stale bytes
            ptr::write_bytes(buf as *mut u8, 0, amt as usize);
            ffi::SQLITE_OK
        }
        Err(rc) => rc,
    }
}

unsafe extern "C" fn file_write(
    file: *mut ffi::sqlite3_file,
    buf: *const c_void,
    amt: c_int,
    offset: ffi::sqlite3_int64,
) -> c_int {
    let (bridge_file, shared) = bridged(file);
    if buf.is_null() || amt <= 0 {
        return ffi::SQLITE_OK;
    }

    let data = std::slice::from_raw_parts(buf as *const u8, amt as usize);
    let result = shared.client.write(bridge_file.role, data, offset.max(0) as u64);

    match absorb("write", bridge_file.role, result) {
        Ok(()) => ffi::SQLITE_OK,
        Err(rc) => rc,
    }
}

unsafe extern "C" fn file_truncate(_file: *mut ffi::sqlite3_file, _size: ffi::sqlite3_int64) -> c_int {
    ffi::SQLITE_OK
}

unsafe extern "C" fn file_sync(_file: *mut ffi::sqlite3_file, _flags: c_int) -> c_int {
    ffi::SQLITE_OK
}

unsafe extern "C" fn file_file_size(
    file: *mut ffi::sqlite3_file,
    p_size: *mut ffi::sqlite3_int64,
) -> c_int {
    let (bridge_file, shared) = bridged(file);
    let result = shared.client.size(bridge_file.role);

    match absorb("size", bridge_file.role, result) {
        Ok(size) => {
            *p_size = size.min(i64::MAX as u64) as ffi::sqlite3_int64;
            ffi::SQLITE_OK
        }
        Err(rc) => rc,
    }
}

// Single process: no real locking
unsafe extern "C" fn file_lock(_file: *mut ffi::sqlite3_file, _lock_type: c_int) -> c_int {
    ffi::SQLITE_OK
}

unsafe extern "C" fn file_unlock(_file: *mut ffi::sqlite3_file, _lock_type: c_int) -> c_int {
    ffi::SQLITE_OK
}

unsafe extern "C" fn file_check_reserved_lock(
    _file: *mut ffi::sqlite3_file,
    p_res_out: *mut c_int,
) -> c_int {
    *p_res_out = 0;
    ffi::SQLITE_OK
}

unsafe extern "C" fn file_file_control(
    _file: *mut ffi::sqlite3_file,
    _op: c_int,
    _p_arg: *mut c_void,
) -> c_int {
    // Nothing handled here; SQLite falls back to its built-in behavior
    ffi::SQLITE_NOTFOUND
}

unsafe extern "C" fn file_sector_size(_file: *mut ffi::sqlite3_file) -> c_int {
    // SQLite substitutes its default sector size
    0
}

unsafe extern "C" fn file_device_characteristics(_file: *mut ffi::sqlite3_file) -> c_int {
    0
}

// VFS open callback

pub unsafe extern "C" fn file_open(
    vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    file: *mut ffi::sqlite3_file,
    flags: c_int,
    p_out_flags: *mut c_int,
) -> c_int {
    // SQLite only calls xClose when pMethods is set
    (*file).pMethods = ptr::null();

    let app_data = (*vfs).pAppData as *const VfsShared;
    if app_data.is_null() {
        return ffi::SQLITE_ERROR;
    }
    if z_name.is_null() {
        warn!(flags, "refusing to open a file without a path");
        return ffi::SQLITE_CANTOPEN;
    }

    let role = FileRole::from_flags(flags);
    if role == FileRole::Unknown {
        warn!(flags, "unclassified open flags, treating file as unknown role");
    }

    ptr::write(
        file as *mut BridgeFile,
        BridgeFile {
            base: ffi::sqlite3_file {
                pMethods: &IO_METHODS,
            },
            role,
            shared: app_data,
        },
    );
    (*app_data).open_files.fetch_add(1, Ordering::SeqCst);

    if !p_out_flags.is_null() {
        *p_out_flags = flags;
    }

    trace!(%role, "file opened");
    ffi::SQLITE_OK
}
