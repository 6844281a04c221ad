//! SQLite VFS registration
//!
//! Registers a sqlite3_vfs whose storage is answered by a handler set living
//! on a [`Control`] loop. Every registration gets a fresh random name, so
//! any number of them can coexist in one process.

use super::file::{absorb, BridgeFile};
use crate::core::bridge::{Handlers, StorageClient};
use crate::core::classify::FileRole;
use crate::core::control::{Control, EndpointId};
use crate::error::{BridgeError, Result};
use libsqlite3_sys as ffi;
use std::cell::Cell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Julian day number of the Unix epoch
const UNIX_EPOCH_JULIAN_DAY: f64 = 2440587.5;

/// Unix epoch as Julian milliseconds
const UNIX_EPOCH_JULIAN_MS: i64 = 210_866_760_000_000;

/// Attempts at finding an unused random name
const NAME_ATTEMPTS: usize = 8;

/// State reachable from SQLite through `pAppData`
pub(crate) struct VfsShared {
    /// VFS name (C string)
    name: CString,
    pub(super) client: StorageClient,
    pub(super) open_files: AtomicUsize,
}

/// Holds a registration open on behalf of a database
///
/// Taken on the control thread before the database opens, so the VFS cannot
/// be unregistered between SQLite finding it and opening the first file.
/// Dropping the lease releases it.
pub(crate) struct VfsLease {
    users: Arc<AtomicUsize>,
}

impl Drop for VfsLease {
    fn drop(&mut self) {
        self.users.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Registered {
    vfs: NonNull<ffi::sqlite3_vfs>,
    shared: NonNull<VfsShared>,
}

/// A bridged VFS registered with SQLite
///
/// Databases open against it by [`name`](Self::name). It must be
/// unregistered, explicitly or by dropping it, after every database using
/// it has been closed.
pub struct VfsRegistration {
    control: Control,
    name: String,
    endpoint: EndpointId,
    client: StorageClient,
    users: Arc<AtomicUsize>,
    registered: Cell<Option<Registered>>,
}

impl VfsRegistration {
    /// Name SQLite knows this VFS by
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Client issuing storage calls into this registration's handler
    pub fn client(&self) -> StorageClient {
        self.client.clone()
    }

    pub fn control(&self) -> &Control {
        &self.control
    }

    pub fn is_registered(&self) -> bool {
        self.with_registered(|r| r.is_some())
    }

    /// Files SQLite currently holds open through this VFS
    pub fn open_files(&self) -> usize {
        self.with_registered(|r| {
            r.map(|r| unsafe { r.shared.as_ref() }.open_files.load(Ordering::SeqCst))
                .unwrap_or(0)
        })
    }

    /// Take a lease keeping the VFS registered until it is dropped
    pub(crate) fn lease(&self) -> Result<VfsLease> {
        if !self.is_registered() {
            return Err(BridgeError::AlreadyUnregistered);
        }
        self.users.fetch_add(1, Ordering::SeqCst);
        Ok(VfsLease {
            users: Arc::clone(&self.users),
        })
    }

    /// Remove the VFS from SQLite and release the handler set
    ///
    /// Fails with [`BridgeError::InUse`] while files are still open or a
    /// database holds the registration, and with
    /// [`BridgeError::AlreadyUnregistered`] on a second call.
    pub fn unregister(&self) -> Result<()> {
        let registered = self.registered.take().ok_or(BridgeError::AlreadyUnregistered)?;

        let open = unsafe { registered.shared.as_ref() }.open_files.load(Ordering::SeqCst)
            + self.users.load(Ordering::SeqCst);
        if open > 0 {
            self.registered.set(Some(registered));
            return Err(BridgeError::InUse(open));
        }

        unsafe {
            let rc = ffi::sqlite3_vfs_unregister(registered.vfs.as_ptr());
            if rc != ffi::SQLITE_OK {
                self.registered.set(Some(registered));
                return Err(BridgeError::VfsRegistrationFailed(rc));
            }

            // Clean up allocated memory
            drop(Box::from_raw(registered.vfs.as_ptr()));
            drop(Box::from_raw(registered.shared.as_ptr()));
        }

        self.control.remove_endpoint(self.endpoint);
        info!(name = %self.name, "VFS unregistered");
        Ok(())
    }

    fn with_registered<R>(&self, f: impl FnOnce(Option<&Registered>) -> R) -> R {
        let registered = self.registered.take();
        let result = f(registered.as_ref());
        self.registered.set(registered);
        result
    }
}

impl Drop for VfsRegistration {
    fn drop(&mut self) {
        match self.unregister() {
            Ok(()) | Err(BridgeError::AlreadyUnregistered) => {}
            Err(err) => {
                // SQLite may still reach the VFS; leaking beats dangling
                error!(name = %self.name, %err, "VFS dropped while in use, leaking it");
                self.registered.take();
            }
        }
    }
}

/// Register a VFS served by `handlers` on `control`
pub fn register_vfs(control: &Control, handlers: Handlers) -> Result<VfsRegistration> {
    let config = control.config();
    let name = unused_name(&config.name_prefix)?;
    let c_name = CString::new(name.clone()).map_err(|e| BridgeError::InvalidName(e.to_string()))?;
    let max_pathname = c_int::try_from(config.max_pathname)
        .map_err(|_| BridgeError::Config(format!("max_pathname {} too large", config.max_pathname)))?;

    let (endpoint, bridge) = control.add_storage_endpoint(handlers);
    let client = StorageClient::new(bridge);

    let shared = Box::into_raw(Box::new(VfsShared {
        name: c_name,
        client: client.clone(),
        open_files: AtomicUsize::new(0),
    }));

    // Create the sqlite3_vfs structure
    let sqlite_vfs = Box::into_raw(Box::new(ffi::sqlite3_vfs {
        iVersion: 2,
        szOsFile: std::mem::size_of::<BridgeFile>() as c_int,
        mxPathname: max_pathname,
        pNext: ptr::null_mut(),
        zName: unsafe { (*shared).name.as_ptr() },
        pAppData: shared as *mut c_void,
        xOpen: Some(vfs_open),
        xDelete: Some(vfs_delete),
        xAccess: Some(vfs_access),
        xFullPathname: Some(vfs_full_pathname),
        xDlOpen: None,
        xDlError: None,
        xDlSym: None,
        xDlClose: None,
        xRandomness: Some(vfs_randomness),
        xSleep: Some(vfs_sleep),
        xCurrentTime: Some(vfs_current_time),
        xGetLastError: Some(vfs_get_last_error),
        xCurrentTimeInt64: Some(vfs_current_time_int64),
        xSetSystemCall: None,
        xGetSystemCall: None,
        xNextSystemCall: None,
    }));

    unsafe {
        let rc = ffi::sqlite3_vfs_register(sqlite_vfs, 0);
        if rc != ffi::SQLITE_OK {
            // Clean up on failure
            drop(Box::from_raw(sqlite_vfs));
            drop(Box::from_raw(shared));
            control.remove_endpoint(endpoint);
            return Err(BridgeError::VfsRegistrationFailed(rc));
        }
    }

    info!(%name, "VFS registered");

    // Both pointers come from Box::into_raw and are never null
    let registered = unsafe {
        Registered {
            vfs: NonNull::new_unchecked(sqlite_vfs),
            shared: NonNull::new_unchecked(shared),
        }
    };

    Ok(VfsRegistration {
        control: control.clone(),
        name,
        endpoint,
        client,
        users: Arc::new(AtomicUsize::new(0)),
        registered: Cell::new(Some(registered)),
    })
}

/// Random `<prefix>-<hex>` name not yet known to SQLite
fn unused_name(prefix: &str) -> Result<String> {
    for _ in 0..NAME_ATTEMPTS {
        let name = format!("{}-{:016x}", prefix, rand::random::<u64>());
        let c_name = CString::new(name.as_str()).map_err(|e| BridgeError::InvalidName(e.to_string()))?;
        if unsafe { ffi::sqlite3_vfs_find(c_name.as_ptr()) }.is_null() {
            return Ok(name);
        }
        debug!(%name, "VFS name taken, retrying");
    }
    Err(BridgeError::InvalidName(format!(
        "no unused VFS name with prefix '{prefix}'"
    )))
}

/// Copy `name` verbatim if it fits in a buffer of `capacity` bytes
/// (terminating NUL included)
pub fn resolve_full_path(name: &str, capacity: usize) -> Result<String> {
    check_path_len(name.len(), capacity)?;
    Ok(name.to_string())
}

fn check_path_len(len: usize, capacity: usize) -> Result<()> {
    if len >= capacity {
        return Err(BridgeError::PathTooLong {
            len,
            max: capacity.saturating_sub(1),
        });
    }
    Ok(())
}

/// Real-time clock as a Julian day number
pub fn julian_day(now: SystemTime) -> f64 {
    let secs = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    secs / 86400.0 + UNIX_EPOCH_JULIAN_DAY
}

/// Real-time clock as Julian milliseconds
pub fn julian_millis(now: SystemTime) -> i64 {
    let millis = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    UNIX_EPOCH_JULIAN_MS + millis as i64
}

unsafe fn shared<'a>(vfs: *mut ffi::sqlite3_vfs) -> Option<&'a VfsShared> {
    ((*vfs).pAppData as *const VfsShared).as_ref()
}

// VFS callback functions

unsafe extern "C" fn vfs_open(
    vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    file: *mut ffi::sqlite3_file,
    flags: c_int,
    p_out_flags: *mut c_int,
) -> c_int {
    super::file::file_open(vfs, z_name, file, flags, p_out_flags)
}

unsafe extern "C" fn vfs_delete(
    vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    _sync_dir: c_int,
) -> c_int {
    let Some(shared) = shared(vfs) else {
        return ffi::SQLITE_ERROR;
    };
    if z_name.is_null() {
        return ffi::SQLITE_OK;
    }

    let role = FileRole::from_name(&CStr::from_ptr(z_name).to_string_lossy());
    match absorb("delete", role, shared.client.delete(role)) {
        Ok(()) => ffi::SQLITE_OK,
        Err(rc) => rc,
    }
}

unsafe extern "C" fn vfs_access(
    vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    _flags: c_int,
    p_res_out: *mut c_int,
) -> c_int {
    let Some(shared) = shared(vfs) else {
        return ffi::SQLITE_ERROR;
    };
    if z_name.is_null() {
        *p_res_out = 0;
        return ffi::SQLITE_OK;
    }

    let role = FileRole::from_name(&CStr::from_ptr(z_name).to_string_lossy());
    match absorb("access", role, shared.client.access(role)) {
        Ok(exists) => {
            *p_res_out = c_int::from(exists);
            ffi::SQLITE_OK
        }
        Err(rc) => rc,
    }
}

pub(super) unsafe extern "C" fn vfs_full_pathname(
    _vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    n_out: c_int,
    z_out: *mut c_char,
) -> c_int {
    if let Err(err) = check_path_len(libc::strlen(z_name), n_out.max(0) as usize) {
        warn!(%err, "cannot resolve full path");
        return ffi::SQLITE_CANTOPEN;
    }

    libc::strcpy(z_out, z_name);
    ffi::SQLITE_OK
}

unsafe extern "C" fn vfs_randomness(
    _vfs: *mut ffi::sqlite3_vfs,
    n_byte: c_int,
    z_out: *mut c_char,
) -> c_int {
    // Deterministic on purpose: the bytes only seed non-security identifiers
    if n_byte > 0 {
        ptr::write_bytes(z_out as *mut u8, 0, n_byte as usize);
    }
    n_byte.max(0)
}

unsafe extern "C" fn vfs_sleep(_vfs: *mut ffi::sqlite3_vfs, _microseconds: c_int) -> c_int {
    0
}

unsafe extern "C" fn vfs_current_time(_vfs: *mut ffi::sqlite3_vfs, p_time_out: *mut f64) -> c_int {
    *p_time_out = julian_day(SystemTime::now());
    ffi::SQLITE_OK
}

unsafe extern "C" fn vfs_current_time_int64(
    _vfs: *mut ffi::sqlite3_vfs,
    p_time_out: *mut ffi::sqlite3_int64,
) -> c_int {
    *p_time_out = julian_millis(SystemTime::now());
    ffi::SQLITE_OK
}

unsafe extern "C" fn vfs_get_last_error(
    _vfs: *mut ffi::sqlite3_vfs,
    _n_byte: c_int,
    _z_err_msg: *mut c_char,
) -> c_int {
    0
}
