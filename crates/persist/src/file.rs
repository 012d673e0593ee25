//! Directory-backed key-value store.
//!
//! Layout inside the store directory:
//! ```text
//! <key>.json      - one file per key, key characters outside [A-Za-z0-9._-] mapped to '_'
//! <key>.json.tmp  - transient, present only during an interrupted write
//! ```

use crate::kv::{KeyValueStore, KvError};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Key-value store keeping one file per key inside a directory.
///
/// Writes go to a temporary file which is synced and renamed over the
/// target, so a reader sees either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open or create a store at the given directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KvError> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Get the path to the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding `key`, or `None` if the key has no safe file name.
    pub fn path_for(&self, key: &str) -> Option<PathBuf> {
        if key.is_empty() {
            return None;
        }
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        Some(self.root.join(format!("{name}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read key, treating as absent");
                None
            }
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), KvError> {
        let path = self
            .path_for(key)
            .ok_or_else(|| KvError::InvalidKey(key.to_string()))?;
        atomic_write(&path, value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        let Some(path) = self.path_for(key) else {
            return;
        };
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove key");
            }
        }
    }
}

fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = File::create(&tmp)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}
