//! JSON file store for venue metadata.
//!
//! Adapters use this to persist documents like exchange-info snapshots
//! between runs, keyed by file name inside a configured directory.
//!
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::follow::error::{FollowError, Result};

/// Stores values of `T` as JSON files under a directory.
///
/// The directory is created lazily on the first save; reads of missing files
/// surface the underlying `NotFound` error for callers to branch on.
pub struct FileStore<T> {
    dir: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FileStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if dir.is_file() {
            return Err(FollowError::Internal(format!(
                "path {} already exists and is not a directory",
                dir.display()
            )));
        }
        Ok(Self {
            dir,
            _marker: PhantomData,
        })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    pub fn read(&self, name: &str) -> Result<T> {
        let bytes = std::fs::read(self.path(name))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, name: &str, value: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let bytes = serde_json::to_vec(value)?;
        std::fs::write(self.path(name), bytes)?;
        Ok(())
    }

    fn path(&self, name: &str) -> PathBuf {
        Path::new(&self.dir).join(name)
    }
}
