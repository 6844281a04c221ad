//! File role classification
//!
//! Maps SQLite open flags, or a file name when flags are unavailable
//! (xDelete, xAccess), to the role a file plays for its database. Handlers
//! use the role to multiplex storage, e.g. one blob per role.

use libsqlite3_sys as ffi;
use std::fmt;
use std::os::raw::c_int;

/// Semantic role of a file opened through the VFS
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileRole {
    /// Main database file
    Primary = 0,
    /// Rollback journal
    Journal = 1,
    /// Write-ahead log
    Wal = 2,
    /// Anything else (temp files, sub-journals, ...)
    Unknown = -1,
}

impl FileRole {
    /// Classify from `xOpen` flags: main db, then main journal, then WAL
    pub fn from_flags(flags: c_int) -> Self {
        if flags & ffi::SQLITE_OPEN_MAIN_DB != 0 {
            return FileRole::Primary;
        }
        if flags & ffi::SQLITE_OPEN_MAIN_JOURNAL != 0 {
            return FileRole::Journal;
        }
        if flags & ffi::SQLITE_OPEN_WAL != 0 {
            return FileRole::Wal;
        }
        FileRole::Unknown
    }

    /// Classify from a file name suffix; never returns `Unknown`
    pub fn from_name(name: &str) -> Self {
        if name.ends_with("-journal") {
            FileRole::Journal
        } else if name.ends_with("-wal") {
            FileRole::Wal
        } else {
            FileRole::Primary
        }
    }

    /// Numeric code handed to handlers (0, 1, 2 or -1)
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(FileRole::Primary),
            1 => Some(FileRole::Journal),
            2 => Some(FileRole::Wal),
            -1 => Some(FileRole::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileRole::Primary => "primary",
            FileRole::Journal => "journal",
            FileRole::Wal => "wal",
            FileRole::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
