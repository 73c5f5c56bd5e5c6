//! Output writers.
//!
//! A writer accumulates resources under unique `<type>.<name>` keys and
//! serializes them on `sync`:
//!
//! ```text
//! Empty ──write──▶ Populating ──sync──▶ Synced
//!                     ▲                   │
//!                     └───────write───────┘
//! ```
//!
//! Nothing is removed once written. A write after a sync is allowed and
//! becomes visible at the next sync.

pub mod hcl;
pub mod state;

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::types::{AddressError, EncodeError, Resource, ResourceAddress};

pub use hcl::HclWriter;
pub use state::{InstanceRecord, ResourceMode, ResourceRecord, StateDocument, StateWriter};

/// Error type for writer operations.
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    /// Key was empty.
    #[error("key is required")]
    RequiredKey,
    /// Key is not `<type>.<name>`.
    #[error("invalid key {0:?}: expected \"<type>.<name>\"")]
    InvalidKey(String),
    /// Resource lacks a required capability value.
    #[error("resource {key} is missing a required value: {field}")]
    RequiredValue {
        /// Key being written.
        key: String,
        /// Missing field.
        field: &'static str,
    },
    /// Resource type does not match the key's type.
    #[error("key {key} names type {expected:?} but the resource has type {actual:?}")]
    InvalidType {
        /// Key being written.
        key: String,
        /// Type from the key.
        expected: String,
        /// Type reported by the resource.
        actual: String,
    },
    /// Key was already written.
    #[error("key already written: {0}")]
    DuplicateKey(String),
    /// Instance payload could not be encoded.
    #[error("failed to encode {key}: {source}")]
    Encode {
        /// Key being written.
        key: String,
        /// Underlying error.
        #[source]
        source: EncodeError,
    },
    /// Document serialization failed.
    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Configuration text could not be rendered.
    #[error("failed to render configuration: {0}")]
    Format(#[from] std::fmt::Error),
    /// Sink failed.
    #[error("failed to persist document: {0}")]
    Io(#[from] io::Error),
}

impl WriterError {
    /// Whether this is a duplicate-key rejection (recoverable by renaming).
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }
}

/// Destination for resources discovered during an import.
pub trait Writer {
    /// Add `resource` under `key` (`<type>.<name>`).
    fn write(&mut self, key: &str, resource: &dyn Resource) -> Result<(), WriterError>;

    /// Whether `key` was already written.
    fn has(&self, key: &str) -> bool;

    /// Serialize everything written so far to the sink.
    fn sync(&mut self) -> Result<(), WriterError>;

    /// Whether this writer wants symbolic references instead of literals.
    fn interpolates(&self) -> bool {
        false
    }
}

/// Check `key` and the resource's capabilities, returning the parsed address.
pub(crate) fn validate(key: &str, resource: &dyn Resource) -> Result<ResourceAddress, WriterError> {
    let address = ResourceAddress::parse(key).map_err(|e| match e {
        AddressError::Empty => WriterError::RequiredKey,
        AddressError::Malformed(key) => WriterError::InvalidKey(key),
    })?;

    if resource.resource_type().is_empty() {
        return Err(WriterError::RequiredValue {
            key: key.to_string(),
            field: "resource type",
        });
    }
    if resource.provider().is_empty() {
        return Err(WriterError::RequiredValue {
            key: key.to_string(),
            field: "provider",
        });
    }
    if resource.resource_type() != address.resource_type() {
        return Err(WriterError::InvalidType {
            key: key.to_string(),
            expected: address.resource_type().to_string(),
            actual: resource.resource_type().to_string(),
        });
    }

    Ok(address)
}

/// Where a writer persists its serialized document.
///
/// Every `persist` call carries the complete document and replaces what a
/// previous call stored.
pub trait SyncTarget {
    /// Replace the stored document with `bytes`.
    fn persist(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl SyncTarget for Vec<u8> {
    fn persist(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.clear();
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// File sink. Writes a sibling temp file and renames it over the target.
#[derive(Debug, Clone)]
pub struct FileTarget {
    path: PathBuf,
}

impl FileTarget {
    /// Sink persisting to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SyncTarget for FileTarget {
    fn persist(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let persisted = fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(bytes)?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&tmp, &self.path));

        if let Err(e) = persisted {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(path = %tmp.display(), error = %cleanup, "failed to remove temp file");
                }
            }
            return Err(e);
        }
        Ok(())
    }
}
