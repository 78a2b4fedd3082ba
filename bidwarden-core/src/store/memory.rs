//! In-memory storage backend.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{StorageBackend, StoreError};

/// In-memory backend for testing and development.
///
/// The raw JSON document is kept as a string so that the same
/// serialization path as the file backend is exercised. Writes are counted
/// and can be made to fail on demand.
///
/// # Thread Safety
///
/// This implementation uses interior mutability via `RwLock` and atomics and
/// is safe to share across threads.
#[derive(Default)]
pub struct MemoryBackend {
    contents: RwLock<Option<String>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend holding an initial raw document.
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: RwLock::new(Some(contents.into())),
            ..Self::default()
        }
    }

    /// Current raw document, if any has been written.
    pub fn contents(&self) -> Option<String> {
        self.contents.read().clone()
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make subsequent writes fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("has_contents", &self.contents.read().is_some())
            .field("writes", &self.write_count())
            .finish()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn read(&self) -> Result<Option<String>, StoreError> {
        Ok(self.contents.read().clone())
    }

    async fn write(&self, contents: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                location: self.location(),
                source: std::io::Error::other("simulated write failure"),
            });
        }

        *self.contents.write() = Some(contents.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
