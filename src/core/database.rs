//! Database handle running SQLite through a bridged VFS
//!
//! Every operation runs on the control context's work pool, since SQLite
//! re-enters the VFS and the VFS blocks on the control loop. Results come
//! back as [`Pending`] values settled on the loop, and result rows reach the
//! row callback there too, one bridged call per row.

use crate::core::bridge::{Bridge, RowCall};
use crate::core::control::{Control, EndpointId};
use crate::core::offload::Pending;
use crate::core::vfs::{VfsLease, VfsRegistration};
use crate::error::{BridgeError, Result};
use libsqlite3_sys as ffi;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::cell::Cell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct DbShared {
    conn: Mutex<Option<Connection>>,
    lease: Mutex<Option<VfsLease>>,
    rows: Bridge<RowCall>,
}

/// SQLite database whose storage and rows are served on a [`Control`] loop
pub struct Database {
    control: Control,
    endpoint: EndpointId,
    shared: Arc<DbShared>,
    closed: Cell<bool>,
}

impl Database {
    /// Create an unopened handle delivering result rows to `on_row`
    pub fn init<F>(control: &Control, on_row: F) -> Database
    where
        F: FnMut(&Control, &[Option<String>], &[String]) + 'static,
    {
        let (endpoint, rows) = control.add_row_endpoint(Box::new(on_row));
        Database {
            control: control.clone(),
            endpoint,
            shared: Arc::new(DbShared {
                conn: Mutex::new(None),
                lease: Mutex::new(None),
                rows,
            }),
            closed: Cell::new(false),
        }
    }

    /// Open (creating if needed) `name` through `vfs`
    pub fn open(&self, name: &str, vfs: &VfsRegistration) -> Pending<()> {
        if self.closed.get() {
            return Pending::ready(Err(BridgeError::Closed));
        }
        // Held from here until close, or dropped with a failed open
        let lease = match vfs.lease() {
            Ok(lease) => lease,
            Err(err) => return Pending::ready(Err(err)),
        };

        let shared = Arc::clone(&self.shared);
        let name = name.to_string();
        let vfs_name = vfs.name().to_string();

        self.control.submit(move || {
            let mut conn = shared.conn.lock();
            if conn.is_some() {
                return Err(BridgeError::Engine("database is already open".into()));
            }

            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
            let opened = Connection::open_with_flags_and_vfs(&name, flags, vfs_name.as_str())?;
            *conn = Some(opened);
            *shared.lease.lock() = Some(lease);

            info!(%name, vfs = %vfs_name, "database opened");
            Ok(())
        })
    }

    /// Run one or more SQL statements
    ///
    /// Rows produced by any statement are handed to the row callback, in
    /// order, before the returned [`Pending`] settles. A failure carries the
    /// engine's message; statements after the failing one are not run.
    pub fn exec(&self, sql: &str) -> Pending<()> {
        if self.closed.get() {
            return Pending::ready(Err(BridgeError::Closed));
        }

        let shared = Arc::clone(&self.shared);
        let sql = sql.to_string();

        self.control.submit(move || {
            let conn = shared.conn.lock();
            let conn = conn.as_ref().ok_or(BridgeError::Closed)?;
            exec_batch(conn, &sql, &shared.rows)
        })
    }

    /// Close the connection and release the row callback
    ///
    /// The handle cannot be reused afterwards.
    pub fn close(&self) -> Pending<()> {
        if self.closed.replace(true) {
            return Pending::ready(Err(BridgeError::Closed));
        }

        let shared = Arc::clone(&self.shared);
        let endpoint = self.endpoint;

        self.control.submit_then(
            move || {
                let closed = match shared.conn.lock().take() {
                    Some(conn) => conn.close().map_err(|(_, err)| BridgeError::from(err)),
                    None => Ok(()),
                };
                shared.lease.lock().take();
                debug!(ok = closed.is_ok(), "database closed");
                closed
            },
            move |cx| {
                cx.remove_endpoint(endpoint);
            },
        )
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if !self.closed.get() {
            warn!("database dropped without close, closing in the background");
            let _ = self.close();
        }
    }
}

/// Run `sql` with `sqlite3_exec`, forwarding each row over `rows`
fn exec_batch(conn: &Connection, sql: &str, rows: &Bridge<RowCall>) -> Result<()> {
    let c_sql = CString::new(sql).map_err(|_| BridgeError::Engine("SQL contains a NUL byte".into()))?;
    let mut errmsg: *mut c_char = ptr::null_mut();

    let rc = unsafe {
        ffi::sqlite3_exec(
            conn.handle(),
            c_sql.as_ptr(),
            Some(deliver_row),
            rows as *const Bridge<RowCall> as *mut c_void,
            &mut errmsg,
        )
    };
    if rc == ffi::SQLITE_OK {
        return Ok(());
    }

    let message = unsafe {
        if errmsg.is_null() {
            CStr::from_ptr(ffi::sqlite3_errstr(rc)).to_string_lossy().into_owned()
        } else {
            let message = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
            ffi::sqlite3_free(errmsg as *mut c_void);
            message
        }
    };
    debug!(rc, %message, "statement failed");
    Err(BridgeError::Engine(message))
}

unsafe fn column_text(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

unsafe extern "C" fn deliver_row(
    arg: *mut c_void,
    n_cols: c_int,
    values: *mut *mut c_char,
    names: *mut *mut c_char,
) -> c_int {
    let rows = &*(arg as *const Bridge<RowCall>);
    let n = n_cols.max(0) as usize;

    let mut row = RowCall {
        values: Vec::with_capacity(n),
        names: Vec::with_capacity(n),
    };
    for i in 0..n {
        let value = if values.is_null() { ptr::null() } else { *values.add(i) };
        row.values.push(column_text(value));
        row.names.push(column_text(*names.add(i)).unwrap_or_default());
    }

    match rows.call(row) {
        Ok(_) => 0,
        Err(err) => {
            // Non-zero aborts the statement
            warn!(%err, "row not delivered, aborting statement");
            1
        }
    }
}
