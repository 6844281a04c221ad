//! Core implementation: control loop, call bridge, VFS and database handle

pub mod bridge;
pub mod classify;
pub mod control;
pub mod database;
pub mod memory;
pub mod offload;
pub mod vfs;

pub use bridge::{Handlers, StorageClient};
pub use classify::FileRole;
pub use control::{Control, RowCallback};
pub use database::Database;
pub use memory::MemoryStorage;
pub use offload::Pending;
pub use vfs::{register_vfs, VfsRegistration};
