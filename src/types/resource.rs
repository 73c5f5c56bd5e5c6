//! Resource instances handed from the pipeline to writers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::address::ResourceAddress;
use super::schema::Schema;

/// Attribute name → literal value for one resource instance.
///
/// BTreeMap keeps iteration order stable for matching and hashing.
pub type AttributeMap = BTreeMap<String, String>;

/// Capabilities a writer requires from a resource.
pub trait Resource {
    /// Resource type, e.g. `aws_instance`.
    fn resource_type(&self) -> &str;

    /// Owning provider, e.g. `aws`.
    fn provider(&self) -> &str;

    /// Versioned schema the instance payload is encoded under.
    fn schema(&self) -> &Schema;

    /// Final attribute values (literals or references).
    fn instance_state(&self) -> &AttributeMap;

    /// Whether the value of `key` is a symbolic reference rather than a literal.
    fn is_reference(&self, _key: &str) -> bool {
        false
    }
}

/// A discovered resource with its final attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInstance {
    address: ResourceAddress,
    id: String,
    provider: String,
    schema: Arc<Schema>,
    attributes: AttributeMap,
    references: BTreeSet<String>,
}

impl ResourceInstance {
    /// Create a resource instance.
    pub fn new(
        address: ResourceAddress,
        id: impl Into<String>,
        provider: impl Into<String>,
        schema: Arc<Schema>,
        attributes: AttributeMap,
    ) -> Self {
        Self {
            address,
            id: id.into(),
            provider: provider.into(),
            schema,
            attributes,
            references: BTreeSet::new(),
        }
    }

    /// Address this resource is registered under.
    pub fn address(&self) -> &ResourceAddress {
        &self.address
    }

    /// Resource name.
    pub fn name(&self) -> &str {
        self.address.name()
    }

    /// Raw cloud identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Attribute values.
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Copy of this resource under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            address: self.address.with_name(name),
            ..self.clone()
        }
    }

    /// Copy of this resource with replaced attributes, all literal.
    pub fn with_attributes(&self, attributes: AttributeMap) -> Self {
        Self {
            attributes,
            references: BTreeSet::new(),
            ..self.clone()
        }
    }

    /// Mark the values of `keys` as references.
    pub fn with_references(mut self, keys: BTreeSet<String>) -> Self {
        self.references = keys;
        self
    }

    /// Keys whose values are references.
    pub fn references(&self) -> &BTreeSet<String> {
        &self.references
    }
}

impl Resource for ResourceInstance {
    fn resource_type(&self) -> &str {
        self.address.resource_type()
    }

    fn provider(&self) -> &str {
        &self.provider
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn instance_state(&self) -> &AttributeMap {
        &self.attributes
    }

    fn is_reference(&self, key: &str) -> bool {
        self.references.contains(key)
    }
}
