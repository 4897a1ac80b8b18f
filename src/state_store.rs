//! Persistence for the requester channel.
//!
//! The only durable state is the identifier of whoever issued the last
//! start, kept so that asynchronous outcomes reach them after a restart.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use ortho_config::toml;
use thiserror::Error;
use tokio::task;

use crate::model::RequesterChannel;

const REQUESTER_KEY: &str = "requester_channel";

/// Errors raised while reading or writing the state file.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when parsing existing TOML content fails.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the blocking task running a store call is lost.
    #[error("state store task ended abnormally: {message}")]
    Interrupted {
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the file has an unexpected structure.
    #[error("invalid state in {path}: {message}")]
    InvalidStructure {
        /// Path that had invalid content.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Storage for the most recent requester channel.
pub trait RequesterStore: Send + Sync {
    /// Returns the stored requester, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the backing store cannot be read.
    fn load(&self) -> Result<Option<RequesterChannel>, StateStoreError>;

    /// Replaces the stored requester.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the backing store cannot be written.
    fn save(&self, channel: &RequesterChannel) -> Result<(), StateStoreError>;
}

/// Runs [`RequesterStore::load`] on the blocking pool so file access stays
/// off the async workers.
///
/// # Errors
///
/// Returns the store's error, or [`StateStoreError::Interrupted`] when the
/// blocking task panics or is cancelled.
pub async fn load_requester(
    store: &Arc<dyn RequesterStore>,
) -> Result<Option<RequesterChannel>, StateStoreError> {
    let owned = Arc::clone(store);
    task::spawn_blocking(move || owned.load())
        .await
        .map_err(|err| StateStoreError::Interrupted {
            message: err.to_string(),
        })?
}

/// Runs [`RequesterStore::save`] on the blocking pool.
///
/// # Errors
///
/// Returns the store's error, or [`StateStoreError::Interrupted`] when the
/// blocking task panics or is cancelled.
pub async fn save_requester(
    store: &Arc<dyn RequesterStore>,
    channel: &RequesterChannel,
) -> Result<(), StateStoreError> {
    let owned = Arc::clone(store);
    let requester = channel.clone();
    task::spawn_blocking(move || owned.save(&requester))
        .await
        .map_err(|err| StateStoreError::Interrupted {
            message: err.to_string(),
        })?
}

/// Keeps the requester in a TOML file.
#[derive(Clone, Debug)]
pub struct FileRequesterStore {
    path: Utf8PathBuf,
}

impl FileRequesterStore {
    /// Stores state at `path`; the file and its parent are created on the
    /// first save.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl RequesterStore for FileRequesterStore {
    fn load(&self) -> Result<Option<RequesterChannel>, StateStoreError> {
        if !path_exists(&self.path)? {
            return Ok(None);
        }
        let contents = read_state(&self.path)?;
        let value = parse_toml(&self.path, &contents)?;
        read_requester(&self.path, &value)
    }

    fn save(&self, channel: &RequesterChannel) -> Result<(), StateStoreError> {
        let contents = if path_exists(&self.path)? {
            read_state(&self.path)?
        } else {
            String::new()
        };
        let mut value = parse_toml(&self.path, &contents)?;
        let table = value
            .as_table_mut()
            .ok_or_else(|| StateStoreError::InvalidStructure {
                path: self.path.clone(),
                message: String::from("state root is not a table"),
            })?;
        table.insert(
            String::from(REQUESTER_KEY),
            toml::Value::String(channel.as_str().to_owned()),
        );
        write_state(&self.path, &value)
    }
}

/// Keeps the requester in memory only.
#[derive(Debug, Default)]
pub struct MemoryRequesterStore {
    value: Mutex<Option<RequesterChannel>>,
}

impl MemoryRequesterStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `channel`.
    #[must_use]
    pub fn with_requester(channel: RequesterChannel) -> Self {
        Self {
            value: Mutex::new(Some(channel)),
        }
    }
}

impl RequesterStore for MemoryRequesterStore {
    fn load(&self) -> Result<Option<RequesterChannel>, StateStoreError> {
        Ok(self
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, channel: &RequesterChannel) -> Result<(), StateStoreError> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(channel.clone());
        Ok(())
    }
}

fn split_path(path: &Utf8Path) -> Result<(&Utf8Path, &str), StateStoreError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| StateStoreError::InvalidStructure {
            path: path.to_path_buf(),
            message: String::from("state file path is missing a filename"),
        })?;
    Ok((parent, file_name))
}

fn path_exists(path: &Utf8Path) -> Result<bool, StateStoreError> {
    let (parent, file_name) = split_path(path)?;
    match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir.try_exists(file_name).map_err(|err| StateStoreError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(StateStoreError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        }),
    }
}

fn read_state(path: &Utf8Path) -> Result<String, StateStoreError> {
    let (parent, file_name) = split_path(path)?;
    let dir =
        Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| StateStoreError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        })?;
    dir.read_to_string(file_name)
        .map_err(|err| StateStoreError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}

fn parse_toml(path: &Utf8Path, contents: &str) -> Result<toml::Value, StateStoreError> {
    if contents.trim().is_empty() {
        return Ok(toml::Value::Table(toml::value::Table::new()));
    }
    toml::from_str(contents).map_err(|err| StateStoreError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn read_requester(
    path: &Utf8Path,
    value: &toml::Value,
) -> Result<Option<RequesterChannel>, StateStoreError> {
    let table = value
        .as_table()
        .ok_or_else(|| StateStoreError::InvalidStructure {
            path: path.to_path_buf(),
            message: String::from("state root is not a table"),
        })?;

    table.get(REQUESTER_KEY).map_or(Ok(None), |raw| {
        raw.as_str()
            .map(|id| Some(RequesterChannel::new(id)).filter(|channel| !channel.is_empty()))
            .ok_or_else(|| StateStoreError::InvalidStructure {
                path: path.to_path_buf(),
                message: format!("{REQUESTER_KEY} must be a string"),
            })
    })
}

fn write_state(path: &Utf8Path, value: &toml::Value) -> Result<(), StateStoreError> {
    let (parent, file_name) = split_path(path)?;
    Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(|err| {
        StateStoreError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        }
    })?;
    let dir =
        Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| StateStoreError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        })?;

    let rendered = toml::to_string_pretty(value).map_err(|err| StateStoreError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    dir.write(file_name, rendered)
        .map_err(|err| StateStoreError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}
