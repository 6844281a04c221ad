//! In-memory storage handler
//!
//! Keeps one growable byte blob per [`FileRole`]. The store is shared through
//! `Rc`, so the control context can keep a clone and inspect what SQLite
//! wrote after handing the other clone to [`Handlers::immediate`].
//!
//! [`Handlers::immediate`]: crate::core::bridge::Handlers::immediate

use crate::core::bridge::StorageHandler;
use crate::core::classify::FileRole;
use crate::core::control::Control;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{trace, warn};

/// Page granularity of the in-memory files
pub const PAGE_SIZE: usize = 4096;

/// A growable in-memory file
///
/// Capacity starts at [`PAGE_SIZE`] and doubles until a write fits. The
/// logical size is the furthest byte ever written.
#[derive(Debug, Clone, Default)]
pub struct MemoryFile {
    buffer: Vec<u8>,
    size: usize,
}

/// One [`PAGE_SIZE`] slice of a [`MemoryFile`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<'a> {
    pub index: usize,
    pub data: &'a [u8],
}

impl MemoryFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logical size in bytes
    pub fn size(&self) -> u64 {
        self.size as u64
    }

    /// Allocated bytes (a power-of-two multiple of [`PAGE_SIZE`])
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Logical contents
    pub fn bytes(&self) -> &[u8] {
        &self.buffer[..self.size]
    }

    /// Copy the bytes at `offset` into `buf`, zero-filling past the end
    pub fn read(&self, offset: u64, buf: &mut [u8]) {
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(self.buffer.len());
        let available = (self.buffer.len() - start).min(buf.len());

        buf[..available].copy_from_slice(&self.buffer[start..start + available]);
        buf[available..].fill(0);
    }

    /// Copy `data` in at `offset`, growing the buffer as needed
    ///
    /// A write whose end cannot be addressed is dropped with a warning.
    pub fn write(&mut self, offset: u64, data: &[u8]) {
        let Some((start, end, capacity)) = self.span(offset, data.len()) else {
            warn!(offset, len = data.len(), "write beyond addressable range ignored");
            return;
        };

        if capacity > self.buffer.len() {
            self.buffer.resize(capacity, 0);
        }

        self.size = self.size.max(end);
        self.buffer[start..end].copy_from_slice(data);
    }

    /// Byte range of a write and the capacity needed to hold it
    fn span(&self, offset: u64, len: usize) -> Option<(usize, usize, usize)> {
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(len)?;

        let mut capacity = if self.buffer.is_empty() {
            PAGE_SIZE
        } else {
            self.buffer.len()
        };
        while capacity < end {
            capacity = capacity.checked_mul(2)?;
        }
        Some((start, end, capacity))
    }

    /// Allocated buffer split into pages
    pub fn pages(&self) -> impl Iterator<Item = Page<'_>> {
        self.buffer
            .chunks(PAGE_SIZE)
            .enumerate()
            .map(|(index, data)| Page { index, data })
    }
}

/// [`StorageHandler`] keeping every role's file in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Rc<RefCell<HashMap<FileRole, MemoryFile>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, role: FileRole) -> bool {
        self.files.borrow().contains_key(&role)
    }

    pub fn file_size(&self, role: FileRole) -> u64 {
        self.files.borrow().get(&role).map(MemoryFile::size).unwrap_or(0)
    }

    /// Copy of the logical contents of `role`'s file
    pub fn snapshot(&self, role: FileRole) -> Option<Vec<u8>> {
        self.files.borrow().get(&role).map(|file| file.bytes().to_vec())
    }

    /// Copies of the allocated pages of `role`'s file
    pub fn pages(&self, role: FileRole) -> Vec<(usize, Vec<u8>)> {
        self.files
            .borrow()
            .get(&role)
            .map(|file| file.pages().map(|p| (p.index, p.data.to_vec())).collect())
            .unwrap_or_default()
    }
}

impl StorageHandler for MemoryStorage {
    fn access(&mut self, _cx: &Control, role: FileRole) -> bool {
        self.exists(role)
    }

    fn size(&mut self, _cx: &Control, role: FileRole) -> u64 {
        self.file_size(role)
    }

    fn read(&mut self, _cx: &Control, role: FileRole, buf: &mut [u8], offset: u64) {
        trace!(%role, offset, len = buf.len(), "memory read");
        match self.files.borrow().get(&role) {
            Some(file) => file.read(offset, buf),
            None => buf.fill(0),
        }
    }

    fn write(&mut self, _cx: &Control, role: FileRole, buf: &[u8], offset: u64) {
        trace!(%role, offset, len = buf.len(), "memory write");
        self.files
            .borrow_mut()
            .entry(role)
            .or_default()
            .write(offset, buf);
    }

    fn delete(&mut self, _cx: &Control, role: FileRole) {
        self.files.borrow_mut().remove(&role);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_doubles_from_one_page() {
        let mut file = MemoryFile::new();
        file.write(0, b"abc");
        assert_eq!(file.capacity(), PAGE_SIZE);
        assert_eq!(file.size(), 3);

        file.write(PAGE_SIZE as u64, b"x");
        assert_eq!(file.capacity(), 2 * PAGE_SIZE);

        file.write(5 * PAGE_SIZE as u64, b"y");
        assert_eq!(file.capacity(), 8 * PAGE_SIZE);
        assert_eq!(file.size(), 5 * PAGE_SIZE as u64 + 1);
    }

    #[test]
    fn test_read_zero_fills_past_end() {
        let mut file = MemoryFile::new();
        file.write(0, &[7u8; 10]);

        let mut buf = [0xffu8; 16];
        file.read(PAGE_SIZE as u64 - 4, &mut buf);
        assert_eq!(buf, [0u8; 16]);

        let mut buf = [0xffu8; 12];
        file.read(4, &mut buf);
        assert_eq!(&buf[..6], &[7u8; 6]);
        assert!(buf[6..].iter().all(|&b| b == 0));

        let mut buf = [0xffu8; 4];
        file.read(u64::MAX, &mut buf);
        assert_eq!(buf, [0u8; 4]);
    }

    #[test]
    fn test_size_is_high_water_mark() {
        let mut file = MemoryFile::new();
        file.write(100, b"tail");
        file.write(0, b"head");
        assert_eq!(file.size(), 104);
        assert_eq!(&file.bytes()[..4], b"head");
        assert_eq!(&file.bytes()[100..], b"tail");
    }

    #[test]
    fn test_unaddressable_write_is_ignored() {
        let mut file = MemoryFile::new();
        file.write(0, b"keep");

        file.write(u64::MAX - 1, b"abc");
        file.write(usize::MAX as u64, b"x");
        assert_eq!(file.size(), 4);
        assert_eq!(file.capacity(), PAGE_SIZE);
        assert_eq!(file.bytes(), b"keep");
    }

    #[test]
    fn test_pages_cover_buffer() {
        let mut file = MemoryFile::new();
        file.write(0, &[1u8; PAGE_SIZE + 1]);

        let pages: Vec<_> = file.pages().collect();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].index, 0);
        assert_eq!(pages[1].data[0], 1);
        assert_eq!(pages[1].data[1], 0);
    }

    #[test]
    fn test_storage_roles_are_separate() {
        let cx = Control::new(crate::config::BridgeConfig::default()).unwrap();
        let store = MemoryStorage::new();
        let mut handler = store.clone();

        handler.write(&cx, FileRole::Primary, b"main", 0);
        handler.write(&cx, FileRole::Journal, b"journal", 0);
        assert!(handler.access(&cx, FileRole::Journal));
        assert!(!handler.access(&cx, FileRole::Wal));

        handler.delete(&cx, FileRole::Journal);
        assert!(!store.exists(FileRole::Journal));
        assert_eq!(store.snapshot(FileRole::Primary).unwrap(), b"main");
        assert_eq!(store.file_size(FileRole::Primary), 4);
    }
}
