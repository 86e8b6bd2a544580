//! JSON document loading and saving

use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};

use crate::{Error, Result, io};

/// Canonical byte form of a JSON document.
///
/// Pretty-printed with a trailing newline. Identical values always produce
/// identical bytes, which keeps repeated persists idempotent.
pub fn to_canonical_bytes<T: Serialize>(path: &Path, value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| Error::Serialize {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// JSON document store.
///
/// Loads documents, when present, with descriptive parse errors and saves them in canonical
/// form through [`io::write_atomic`].
#[derive(Debug, Default, Clone)]
pub struct JsonStore {
    retry: io::LockRetry,
}

impl JsonStore {
    /// Create a new JsonStore with the default lock retry policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a document, returning `None` when the file does not exist.
    pub fn load_optional<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match io::read_if_exists(path)? {
            Some(content) => parse(path, &content).map(Some),
            None => Ok(None),
        }
    }

    /// Save a document atomically in canonical form.
    pub fn save<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = to_canonical_bytes(path, value)?;
        io::write_atomic(path, &bytes, self.retry)
    }
}

fn parse<T: DeserializeOwned>(path: &Path, content: &str) -> Result<T> {
    serde_json::from_str(content).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
