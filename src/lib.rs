//! # vfs-bridge - SQLite storage served from a single-threaded control loop
//!
//! `vfs-bridge` registers SQLite virtual file systems whose storage is answered
//! by handlers living on one thread, the *control context*, while SQLite itself
//! runs on worker threads:
//!
//! - **Bridged VFS**: reads, writes, sizes, existence checks and deletes block
//!   the SQLite thread until the handler on the control loop has answered
//! - **File roles**: every file is classified as the primary database, its
//!   rollback journal or its WAL, so one handler can serve all three
//! - **Deferred completion**: handlers may keep a request and finish it on a
//!   later turn of the loop
//! - **Database handle**: open, execute and close are offloaded to a work pool
//!   and settle back on the loop; result rows arrive there one at a time
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vfs_bridge::{register_vfs, BridgeConfig, Control, Database, Handlers, MemoryStorage, Result};
//!
//! # fn main() -> Result<()> {
//! let cx = Control::new(BridgeConfig::default())?;
//! let vfs = register_vfs(&cx, Handlers::immediate(MemoryStorage::new()))?;
//!
//! let db = Database::init(&cx, |_, values, names| {
//!     println!("{names:?} = {values:?}");
//! });
//! cx.block_on(db.open("test.db", &vfs))?;
//! cx.block_on(db.exec("CREATE TABLE t (id INTEGER, name TEXT); INSERT INTO t VALUES (1, 'a')"))?;
//! cx.block_on(db.exec("SELECT * FROM t"))?;
//! cx.block_on(db.close())?;
//!
//! vfs.unregister()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Configuration
//!
//! ```rust,no_run
//! use vfs_bridge::{BridgeConfigBuilder, Control, Result};
//!
//! # fn main() -> Result<()> {
//! let config = BridgeConfigBuilder::new()
//!     .queue_limit(16)
//!     .worker_threads(2)
//!     .name_prefix("app")
//!     .build()?;
//! let cx = Control::new(config)?;
//! # let _ = cx;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;

pub use crate::config::{BridgeConfig, BridgeConfigBuilder};
pub use crate::core::{
    bridge::{
        AccessRequest, DeferredStorageHandler, DeleteRequest, Handlers, ReadRequest, SizeRequest,
        StorageClient, StorageHandler, WriteRequest,
    },
    classify::FileRole,
    control::{Control, RowCallback},
    database::Database,
    memory::{MemoryFile, MemoryStorage, PAGE_SIZE},
    offload::Pending,
    vfs::{register_vfs, resolve_full_path, VfsRegistration},
};
pub use crate::error::{BridgeError, Result};
