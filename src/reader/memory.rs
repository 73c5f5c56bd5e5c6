//! In-memory reader, also loadable from a JSON discovery snapshot.
//!
//! Snapshot format:
//!
//! ```text
//! {
//!   "provider": "aws",
//!   "schemas": { "aws_vpc": { "version": 1, "attributes": { "id": "string" } } },
//!   "resources": [ { "type": "aws_vpc", "id": "vpc-1", "name": "main",
//!                    "attributes": { "id": "vpc-1" } } ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use super::{DiscoveredObject, Reader};
use crate::types::{AttributeMap, Schema};

/// Error type for the in-memory reader.
#[derive(Debug, thiserror::Error)]
pub enum InMemoryError {
    /// No schema or resources for this type.
    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),
    /// No object with this ID.
    #[error("resource not found: {resource_type} {id}")]
    ResourceNotFound {
        /// Resource type.
        resource_type: String,
        /// Object ID.
        id: String,
    },
    /// Snapshot file could not be read.
    #[error("failed to read snapshot {path}: {source}")]
    Io {
        /// Snapshot path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Snapshot is not valid JSON of the expected shape.
    #[error("failed to parse snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One object in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotResource {
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Raw cloud identifier.
    pub id: String,
    /// Human name.
    #[serde(default)]
    pub name: Option<String>,
    /// Flat attributes.
    #[serde(default)]
    pub attributes: AttributeMap,
}

/// Reader over objects held in memory.
///
/// Counts attribute reads so callers can check that filtered objects were
/// never read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryReader {
    provider: String,
    #[serde(default)]
    schemas: BTreeMap<String, Schema>,
    #[serde(default)]
    resources: Vec<SnapshotResource>,
    #[serde(skip)]
    reads: Cell<usize>,
}

impl InMemoryReader {
    /// Create an empty reader for `provider`.
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON snapshot.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, InMemoryError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Load a JSON snapshot file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, InMemoryError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| InMemoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_slice(&bytes)
    }

    /// Declare the schema of a resource type.
    pub fn add_schema(&mut self, resource_type: impl Into<String>, schema: Schema) {
        self.schemas.insert(resource_type.into(), schema);
    }

    /// Add a discoverable object.
    pub fn add_resource(
        &mut self,
        resource_type: impl Into<String>,
        id: impl Into<String>,
        name: Option<&str>,
        attributes: AttributeMap,
    ) {
        self.resources.push(SnapshotResource {
            resource_type: resource_type.into(),
            id: id.into(),
            name: name.map(str::to_string),
            attributes,
        });
    }

    /// Number of `read_attributes` calls served.
    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    fn knows(&self, resource_type: &str) -> bool {
        self.schemas.contains_key(resource_type)
            || self.resources.iter().any(|r| r.resource_type == resource_type)
    }
}

impl Reader for InMemoryReader {
    type Error = InMemoryError;

    fn provider(&self) -> &str {
        &self.provider
    }

    fn resource_types(&self) -> Vec<String> {
        let types: BTreeSet<&str> = self
            .schemas
            .keys()
            .map(String::as_str)
            .chain(self.resources.iter().map(|r| r.resource_type.as_str()))
            .collect();
        types.into_iter().map(str::to_string).collect()
    }

    fn schema(&self, resource_type: &str) -> Result<Schema, Self::Error> {
        self.schemas
            .get(resource_type)
            .cloned()
            .ok_or_else(|| InMemoryError::UnknownResourceType(resource_type.to_string()))
    }

    fn list(&self, resource_type: &str) -> Result<Vec<DiscoveredObject>, Self::Error> {
        if !self.knows(resource_type) {
            return Err(InMemoryError::UnknownResourceType(resource_type.to_string()));
        }

        Ok(self
            .resources
            .iter()
            .filter(|r| r.resource_type == resource_type)
            .map(|r| DiscoveredObject {
                id: r.id.clone(),
                name: r.name.clone(),
            })
            .collect())
    }

    fn read_attributes(&self, resource_type: &str, id: &str) -> Result<AttributeMap, Self::Error> {
        let resource = self
            .resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.id == id)
            .ok_or_else(|| InMemoryError::ResourceNotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            })?;

        self.reads.set(self.reads.get() + 1);
        Ok(resource.attributes.clone())
    }
}
