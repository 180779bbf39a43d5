//! Filesystem object store confined to one capability directory.
//!
//! Keys are relative `/`-separated paths resolved beneath the root with
//! `cap-std`, so no key can reach outside it. Writes are staged under a
//! unique temporary name and renamed into place, so readers never observe a
//! partially written stream.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cap_std::{ambient_authority, fs::Dir};
use uuid::Uuid;

use crate::domain::ports::{ObjectStore, ObjectStoreError};

/// Object store adapter writing one file per key.
#[derive(Clone)]
pub struct FsObjectStore {
    root: Arc<Dir>,
}

impl FsObjectStore {
    /// Open (creating if needed) the store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when the directory cannot be created or opened.
    pub fn open(root: &Path) -> io::Result<Self> {
        Dir::create_ambient_dir_all(root, ambient_authority())?;
        let dir = Dir::open_ambient_dir(root, ambient_authority())?;
        Ok(Self {
            root: Arc::new(dir),
        })
    }

    async fn blocking<T, F>(&self, key: &str, op: F) -> Result<T, ObjectStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Dir) -> Result<T, ObjectStoreError> + Send + 'static,
    {
        let root = Arc::clone(&self.root);
        tokio::task::spawn_blocking(move || op(&root))
            .await
            .map_err(|err| ObjectStoreError::io(key, err.to_string()))?
    }
}

/// Resolve `key` into a relative path, rejecting anything that could escape
/// the root or alias another key.
fn object_path(key: &str) -> Result<PathBuf, ObjectStoreError> {
    let invalid = |reason: &str| ObjectStoreError::invalid_key(key, reason);
    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.starts_with('/') {
        return Err(invalid("key must be relative"));
    }
    if key.contains('\\') || key.contains('\0') {
        return Err(invalid("key contains a forbidden character"));
    }
    let mut path = PathBuf::new();
    for segment in key.split('/') {
        match segment {
            "" => return Err(invalid("key contains an empty segment")),
            "." | ".." => return Err(invalid("key contains a relative segment")),
            _ => path.push(segment),
        }
    }
    Ok(path)
}

fn map_io_error(key: &str, error: io::Error) -> ObjectStoreError {
    if error.kind() == io::ErrorKind::NotFound {
        ObjectStoreError::not_found(key)
    } else {
        ObjectStoreError::io(key, error.to_string())
    }
}

fn write_object(
    root: &Dir,
    key: &str,
    path: &Path,
    bytes: &[u8],
) -> Result<(), ObjectStoreError> {
    let io_error = |error: io::Error| ObjectStoreError::io(key, error.to_string());
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        root.create_dir_all(parent).map_err(io_error)?;
    }

    let mut staged = path.as_os_str().to_owned();
    staged.push(format!(".tmp-{}", Uuid::new_v4().simple()));
    let staged = PathBuf::from(staged);
    root.write(&staged, bytes).map_err(io_error)?;
    root.rename(&staged, root, path).map_err(|error| {
        let _cleanup_result = root.remove_file(&staged);
        io_error(error)
    })
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError> {
        let path = object_path(key)?;
        let owned_key = key.to_owned();
        self.blocking(key, move |root| write_object(root, &owned_key, &path, &bytes))
            .await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let path = object_path(key)?;
        let owned_key = key.to_owned();
        self.blocking(key, move |root| {
            root.read(&path).map_err(|error| map_io_error(&owned_key, error))
        })
        .await
    }
}
