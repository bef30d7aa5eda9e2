// JSON-file persistence shared by the allow-list and the playerlist.
//
// Both stores keep their whole map in memory and rewrite the file after
// every change. A missing file is created holding an empty map.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode store: {0}")]
    Encode(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Read `path`, creating it with `T::default()` first if it does not exist.
/// An empty file also yields the default.
pub fn load_or_create<T>(path: &Path) -> Result<T, StoreError>
where
    T: Default + Serialize + DeserializeOwned,
{
    if !path.exists() {
        info!(path = %path.display(), "creating empty store");
        let value = T::default();
        save_pretty(path, &value)?;
        return Ok(value);
    }
    let raw = std::fs::read_to_string(path).map_err(io_error(path))?;
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&raw).map_err(|source| StoreError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_pretty<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let encoded = serde_json::to_string_pretty(value)?;
    std::fs::write(path, encoded).map_err(io_error(path))
}
