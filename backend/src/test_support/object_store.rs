//! Filesystem object store rooted in a throwaway directory.

use std::io;
use std::path::Path;

use tempfile::TempDir;

use crate::outbound::object_store::FsObjectStore;

/// [`FsObjectStore`] that owns its root; the directory is removed on drop.
pub struct TempObjectStore {
    dir: TempDir,
    store: FsObjectStore,
}

impl TempObjectStore {
    /// Create a fresh empty store.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when the temporary directory cannot be created.
    pub fn new() -> io::Result<Self> {
        let dir = TempDir::new()?;
        let store = FsObjectStore::open(dir.path())?;
        Ok(Self { dir, store })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// A handle onto the same directory, for wiring into services.
    pub fn store(&self) -> FsObjectStore {
        self.store.clone()
    }
}
