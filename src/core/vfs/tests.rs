//! Integration tests for the bridged SQLite VFS

use crate::config::BridgeConfigBuilder;
use crate::core::bridge::Handlers;
use crate::core::classify::FileRole;
use crate::core::control::Control;
use crate::core::memory::MemoryStorage;
use crate::core::vfs::vfs::vfs_full_pathname;
use crate::core::vfs::{julian_day, julian_millis, register_vfs, resolve_full_path, VfsRegistration};
use crate::error::BridgeError;
use rusqlite::{params, Connection, ErrorCode, OpenFlags};
use std::time::{Duration, UNIX_EPOCH};

fn control() -> Control {
    let config = BridgeConfigBuilder::new().worker_threads(2).build().unwrap();
    Control::new(config).unwrap()
}

fn memory_vfs(cx: &Control) -> (VfsRegistration, MemoryStorage) {
    let store = MemoryStorage::new();
    let vfs = register_vfs(cx, Handlers::immediate(store.clone())).unwrap();
    (vfs, store)
}

fn open(cx: &Control, vfs: &VfsRegistration, name: &str) -> Connection {
    let name = name.to_string();
    let vfs_name = vfs.name().to_string();
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    cx.block_on(cx.submit(move || Ok(Connection::open_with_flags_and_vfs(&name, flags, vfs_name.as_str())?)))
        .unwrap()
}

/// Run `job` against `conn` on the work pool while this thread serves storage
fn on_worker<T, F>(cx: &Control, conn: Connection, job: F) -> (Connection, T)
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
{
    cx.block_on(cx.submit(move || {
        let value = job(&conn)?;
        Ok((conn, value))
    }))
    .unwrap()
}

fn close(cx: &Control, conn: Connection) {
    cx.block_on(cx.submit(move || conn.close().map_err(|(_, e)| e.into())))
        .unwrap();
}

#[test]
fn test_vfs_registration() {
    let cx = control();
    let (vfs, _store) = memory_vfs(&cx);

    assert!(vfs.is_registered());
    assert!(vfs.name().starts_with("bridge-"));
    assert_eq!(vfs.open_files(), 0);

    vfs.unregister().unwrap();
    assert!(!vfs.is_registered());
}

#[test]
fn test_registration_names_are_unique() {
    let cx = control();
    let (first, _) = memory_vfs(&cx);
    let (second, _) = memory_vfs(&cx);
    assert_ne!(first.name(), second.name());
}

#[test]
fn test_unregister_twice() {
    let cx = control();
    let (vfs, _store) = memory_vfs(&cx);

    vfs.unregister().unwrap();
    assert!(matches!(vfs.unregister(), Err(BridgeError::AlreadyUnregistered)));
}

#[test]
fn test_vfs_full_sqlite_integration() {
    let cx = control();
    let (vfs, store) = memory_vfs(&cx);
    let conn = open(&cx, &vfs, "test.db");

    let (conn, count) = on_worker(&cx, conn, |conn| {
        conn.execute(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT)",
            [],
        )?;
        for i in 0..100 {
            conn.execute(
                "INSERT INTO users (name, email) VALUES (?1, ?2)",
                params![format!("user{i}"), format!("user{i}@example.com")],
            )?;
        }
        conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get::<_, i64>(0))
    });
    assert_eq!(count, 100);

    let (conn, email) = on_worker(&cx, conn, |conn| {
        conn.query_row("SELECT email FROM users WHERE name = ?1", ["user42"], |row| {
            row.get::<_, String>(0)
        })
    });
    assert_eq!(email, "user42@example.com");
    close(&cx, conn);

    let image = store.snapshot(FileRole::Primary).unwrap();
    assert!(image.starts_with(b"SQLite format 3\0"));
    assert!(store.file_size(FileRole::Primary) > 0);

    vfs.unregister().unwrap();
}

#[test]
fn test_vfs_persistence_across_connections() {
    let cx = control();
    let (vfs, _store) = memory_vfs(&cx);

    let conn = open(&cx, &vfs, "persist.db");
    let (conn, _) = on_worker(&cx, conn, |conn| {
        conn.execute_batch(
            "CREATE TABLE kv (key TEXT PRIMARY KEY, value TEXT);
             INSERT INTO kv VALUES ('alpha', 'one'), ('beta', 'two');",
        )
    });
    close(&cx, conn);

    let conn = open(&cx, &vfs, "persist.db");
    let (conn, value) = on_worker(&cx, conn, |conn| {
        conn.query_row("SELECT value FROM kv WHERE key = 'beta'", [], |row| row.get::<_, String>(0))
    });
    assert_eq!(value, "two");
    close(&cx, conn);
}

#[test]
fn test_vfs_transactions() {
    let cx = control();
    let (vfs, store) = memory_vfs(&cx);
    let conn = open(&cx, &vfs, "tx.db");

    let (conn, count) = on_worker(&cx, conn, |conn| {
        conn.execute_batch("CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT)")?;
        conn.execute_batch(
            "BEGIN;
             INSERT INTO items (label) VALUES ('kept');
             COMMIT;
             BEGIN;
             INSERT INTO items (label) VALUES ('discarded');
             ROLLBACK;",
        )?;
        conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get::<_, i64>(0))
    });
    assert_eq!(count, 1);

    // Rollback journals are deleted once each transaction ends
    assert!(!store.exists(FileRole::Journal));
    close(&cx, conn);
}

#[test]
fn test_unregister_while_open_is_refused() {
    let cx = control();
    let (vfs, _store) = memory_vfs(&cx);
    let conn = open(&cx, &vfs, "busy.db");

    assert!(vfs.open_files() >= 1);
    assert!(matches!(vfs.unregister(), Err(BridgeError::InUse(_))));
    assert!(vfs.is_registered());

    close(&cx, conn);
    assert_eq!(vfs.open_files(), 0);
    vfs.unregister().unwrap();
}

#[test]
fn test_io_on_control_thread_is_misuse() {
    let cx = control();
    let (vfs, _store) = memory_vfs(&cx);

    // The pager reads the header while opening, so the open itself fails
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let err = Connection::open_with_flags_and_vfs("local.db", flags, vfs.name()).unwrap_err();
    assert!(matches!(
        err,
        rusqlite::Error::SqliteFailure(ffi_err, _) if ffi_err.code == ErrorCode::ApiMisuse
    ));
    assert_eq!(vfs.open_files(), 0);
}

#[test]
fn test_statement_on_control_thread_is_misuse() {
    let cx = control();
    let (vfs, _store) = memory_vfs(&cx);
    let conn = open(&cx, &vfs, "local.db");

    assert!(conn.execute_batch("CREATE TABLE t (x)").is_err());
    close(&cx, conn);
}

#[test]
fn test_path_longer_than_limit_cannot_open() {
    let config = BridgeConfigBuilder::new()
        .worker_threads(1)
        .max_pathname(64)
        .build()
        .unwrap();
    let cx = Control::new(config).unwrap();
    let (vfs, _store) = memory_vfs(&cx);

    let name = format!("{}.db", "x".repeat(100));
    let vfs_name = vfs.name().to_string();
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let result = cx.block_on(cx.submit(move || {
        Ok(Connection::open_with_flags_and_vfs(&name, flags, vfs_name.as_str())?)
    }));
    assert!(matches!(result, Err(BridgeError::Engine(_))));
}

#[test]
fn test_resolve_full_path() {
    assert_eq!(resolve_full_path("test.db", 4096).unwrap(), "test.db");
    assert_eq!(resolve_full_path("abc", 4).unwrap(), "abc");
    assert!(matches!(
        resolve_full_path("abcd", 4),
        Err(BridgeError::PathTooLong { len: 4, max: 3 })
    ));
}

#[test]
fn test_full_pathname_hook_copies_or_refuses() {
    let name = std::ffi::CString::new("abc").unwrap();
    let mut out = [0x7f as std::os::raw::c_char; 8];

    let rc = unsafe { vfs_full_pathname(std::ptr::null_mut(), name.as_ptr(), 4, out.as_mut_ptr()) };
    assert_eq!(rc, libsqlite3_sys::SQLITE_OK);
    assert_eq!(unsafe { std::ffi::CStr::from_ptr(out.as_ptr()) }, name.as_c_str());

    let rc = unsafe { vfs_full_pathname(std::ptr::null_mut(), name.as_ptr(), 3, out.as_mut_ptr()) };
    assert_eq!(rc, libsqlite3_sys::SQLITE_CANTOPEN);
}

#[test]
fn test_julian_clock() {
    assert_eq!(julian_day(UNIX_EPOCH), 2440587.5);
    assert_eq!(julian_millis(UNIX_EPOCH), 210_866_760_000_000);

    let one_day = UNIX_EPOCH + Duration::from_secs(86400);
    assert_eq!(julian_day(one_day), 2440588.5);
    assert_eq!(julian_millis(one_day) - julian_millis(UNIX_EPOCH), 86_400_000);
}
