//! Discovery backends.

pub mod memory;

use serde::{Deserialize, Serialize};

use crate::types::{AttributeMap, Schema};

/// A cloud object found by listing, before its attributes are read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredObject {
    /// Raw cloud identifier.
    pub id: String,
    /// Human name, if the cloud object has one.
    pub name: Option<String>,
}

/// Source of discovered resources for one provider.
///
/// Listing and attribute reads are separate so excluded objects are never
/// read. Implementations own their network calls, retries and cancellation.
pub trait Reader {
    /// Error type for reader operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Provider namespace, e.g. `aws`.
    fn provider(&self) -> &str;

    /// Resource types this reader can discover, in import order.
    fn resource_types(&self) -> Vec<String>;

    /// Schema for `resource_type`.
    fn schema(&self, resource_type: &str) -> Result<Schema, Self::Error>;

    /// Objects of `resource_type`.
    fn list(&self, resource_type: &str) -> Result<Vec<DiscoveredObject>, Self::Error>;

    /// Flat attributes of one object.
    fn read_attributes(&self, resource_type: &str, id: &str) -> Result<AttributeMap, Self::Error>;
}

pub use memory::InMemoryReader;
