//! Persisted state document.
//!
//! ## Document shape
//!
//! ```text
//! {
//!   "version": 4,
//!   "serial": 1,
//!   "lineage": "<uuid>",
//!   "resources": [
//!     { "mode": "managed", "type": "aws_instance", "name": "web",
//!       "provider": "provider.aws",
//!       "instances": [ { "schema_version": 1, "attributes": { ... } } ] }
//!   ]
//! }
//! ```
//!
//! ## Sync guarantees
//!
//! - Lineage is fixed when the writer is created and never regenerated.
//! - Serial increases on every sync whose content differs from the last
//!   synced content, and stays put otherwise.
//! - The whole document is serialized before the sink is touched.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info};
use uuid::Uuid;

use super::{validate, SyncTarget, Writer, WriterError};
use crate::canonical::canonical_hash_hex;
use crate::types::{AttributeMap, EncodeError, Resource, ResourceAddress, Schema};
use crate::STATE_FORMAT_VERSION;

/// Resource mode. Imports only produce managed resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMode {
    /// Resource managed by the configuration.
    Managed,
    /// Read-only data source.
    Data,
}

/// One instance of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Version of the schema `attributes` was encoded under.
    pub schema_version: u64,
    /// Schema-typed payload.
    pub attributes: Value,
}

/// One resource in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Resource mode.
    pub mode: ResourceMode,
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resource name.
    pub name: String,
    /// Provider reference, e.g. `provider.aws`.
    pub provider: String,
    /// Instances (imports write exactly one).
    pub instances: Vec<InstanceRecord>,
}

impl ResourceRecord {
    /// `<type>.<name>` address of this record.
    pub fn address(&self) -> ResourceAddress {
        ResourceAddress::new(self.resource_type.clone(), self.name.clone())
    }

    /// Decode the first instance's payload under `schema`.
    pub fn decode_attributes(&self, schema: &Schema) -> Result<AttributeMap, EncodeError> {
        let instance = self.instances.first().ok_or_else(|| {
            EncodeError::MalformedPayload(format!("{} has no instances", self.address()))
        })?;

        if instance.schema_version != schema.version {
            return Err(EncodeError::SchemaVersionMismatch {
                expected: schema.version,
                found: instance.schema_version,
            });
        }

        schema.decode(&instance.attributes)
    }
}

/// The persisted state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    /// Format version.
    pub version: u32,
    /// Bumped whenever synced content changes.
    pub serial: u64,
    /// Stable identifier for the run that produced this document.
    pub lineage: String,
    /// Records in write order.
    pub resources: Vec<ResourceRecord>,
}

impl StateDocument {
    /// Empty document for `lineage`.
    pub fn new(lineage: impl Into<String>) -> Self {
        Self {
            version: STATE_FORMAT_VERSION,
            serial: 0,
            lineage: lineage.into(),
            resources: Vec::new(),
        }
    }

    /// Parse a serialized document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Record stored under `address`.
    pub fn record(&self, address: &ResourceAddress) -> Option<&ResourceRecord> {
        self.resources
            .iter()
            .find(|r| r.resource_type == address.resource_type() && r.name == address.name())
    }
}

/// Writer producing a [`StateDocument`].
pub struct StateWriter<T: SyncTarget = Vec<u8>> {
    target: T,
    document: Mutex<StateDocument>,
    keys: BTreeSet<String>,
    synced_fingerprint: Option<String>,
}

impl<T: SyncTarget> StateWriter<T> {
    /// Writer with a fresh random lineage.
    pub fn new(target: T) -> Self {
        Self::with_lineage(target, Uuid::new_v4().to_string())
    }

    /// Writer continuing an existing lineage.
    pub fn with_lineage(target: T, lineage: impl Into<String>) -> Self {
        Self {
            target,
            document: Mutex::new(StateDocument::new(lineage)),
            keys: BTreeSet::new(),
            synced_fingerprint: None,
        }
    }

    /// Lineage stamped on every sync.
    pub fn lineage(&self) -> String {
        self.document.lock().lineage.clone()
    }

    /// Snapshot of the in-progress document.
    pub fn document(&self) -> StateDocument {
        self.document.lock().clone()
    }

    /// The sink.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Number of written resources.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether nothing was written.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<T: SyncTarget> Writer for StateWriter<T> {
    fn write(&mut self, key: &str, resource: &dyn Resource) -> Result<(), WriterError> {
        let address = validate(key, resource)?;
        if self.keys.contains(key) {
            return Err(WriterError::DuplicateKey(key.to_string()));
        }

        let schema = resource.schema();
        let attributes = schema
            .encode(resource.instance_state())
            .map_err(|source| WriterError::Encode {
                key: key.to_string(),
                source,
            })?;

        self.document.lock().resources.push(ResourceRecord {
            mode: ResourceMode::Managed,
            resource_type: address.resource_type().to_string(),
            name: address.name().to_string(),
            provider: format!("provider.{}", resource.provider()),
            instances: vec![InstanceRecord {
                schema_version: schema.version,
                attributes,
            }],
        });
        self.keys.insert(key.to_string());

        debug!(key, schema_version = schema.version, "state record written");
        Ok(())
    }

    fn has(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn sync(&mut self) -> Result<(), WriterError> {
        let mut document = self.document.lock();

        let fingerprint = canonical_hash_hex(&document.resources)?;
        let changed = self.synced_fingerprint.as_deref() != Some(fingerprint.as_str());
        let previous_serial = document.serial;
        if changed {
            document.serial += 1;
        }
        document.version = STATE_FORMAT_VERSION;

        let persisted = serde_json::to_vec_pretty(&*document)
            .map_err(WriterError::from)
            .and_then(|bytes| self.target.persist(&bytes).map_err(WriterError::from));
        if let Err(e) = persisted {
            document.serial = previous_serial;
            return Err(e);
        }

        self.synced_fingerprint = Some(fingerprint);
        info!(
            lineage = %document.lineage,
            serial = document.serial,
            resources = document.resources.len(),
            "state synced"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttributeType, ResourceInstance};
    use std::io;
    use std::sync::Arc;

    fn resource(resource_type: &str, name: &str, id: &str) -> ResourceInstance {
        let schema = Schema::new(2)
            .with_attribute("id", AttributeType::String)
            .with_attribute("size", AttributeType::Number);
        let mut attributes = AttributeMap::new();
        attributes.insert("id".to_string(), id.to_string());
        attributes.insert("size".to_string(), "8".to_string());
        ResourceInstance::new(
            ResourceAddress::new(resource_type, name),
            id,
            "test",
            Arc::new(schema),
            attributes,
        )
    }

    fn synced(writer: &StateWriter) -> StateDocument {
        StateDocument::from_slice(writer.target()).unwrap()
    }

    #[test]
    fn test_write_and_sync() {
        let mut writer = StateWriter::new(Vec::<u8>::new());
        let r = resource("type", "name", "x-1");
        writer.write("type.name", &r).unwrap();
        writer.sync().unwrap();

        let document = synced(&writer);
        assert_eq!(document.version, STATE_FORMAT_VERSION);
        assert_eq!(document.serial, 1);
        assert_eq!(document.resources.len(), 1);

        let record = &document.resources[0];
        assert_eq!(record.mode, ResourceMode::Managed);
        assert_eq!(record.resource_type, "type");
        assert_eq!(record.name, "name");
        assert_eq!(record.provider, "provider.test");
        assert_eq!(record.instances[0].schema_version, 2);
        assert_eq!(
            record.decode_attributes(r.schema()).unwrap(),
            *r.instance_state()
        );
    }

    #[test]
    fn test_duplicate_key_leaves_document_unchanged() {
        let mut writer = StateWriter::new(Vec::<u8>::new());
        writer.write("type.name", &resource("type", "name", "x-1")).unwrap();
        let before = writer.document();

        let err = writer
            .write("type.name", &resource("type", "name", "x-2"))
            .unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(writer.document(), before);
        assert_eq!(writer.len(), 1);
    }

    #[test]
    fn test_encode_failure_is_not_recorded() {
        let mut writer = StateWriter::new(Vec::<u8>::new());
        let bad = resource("type", "name", "x-1").with_attributes(
            [("unknown".to_string(), "v".to_string())].into_iter().collect(),
        );

        assert!(matches!(
            writer.write("type.name", &bad),
            Err(WriterError::Encode { .. })
        ));
        assert!(!writer.has("type.name"));
        assert!(writer.document().resources.is_empty());
    }

    #[test]
    fn test_resync_preserves_lineage_and_serial() {
        let mut writer = StateWriter::new(Vec::<u8>::new());
        writer.write("type.a", &resource("type", "a", "x-1")).unwrap();

        writer.sync().unwrap();
        let first = synced(&writer);
        writer.sync().unwrap();
        let second = synced(&writer);

        assert_eq!(first.lineage, second.lineage);
        assert_eq!(first.lineage, writer.lineage());
        assert_eq!(first.serial, second.serial);
    }

    #[test]
    fn test_write_after_sync_bumps_serial() {
        let mut writer = StateWriter::with_lineage(Vec::<u8>::new(), "fixed-lineage");
        writer.write("type.a", &resource("type", "a", "x-1")).unwrap();
        writer.sync().unwrap();

        writer.write("type.b", &resource("type", "b", "x-2")).unwrap();
        writer.sync().unwrap();

        let document = synced(&writer);
        assert_eq!(document.lineage, "fixed-lineage");
        assert_eq!(document.serial, 2);
        assert_eq!(document.resources.len(), 2);
        assert!(document.record(&ResourceAddress::new("type", "b")).is_some());
    }

    #[test]
    fn test_decode_rejects_other_schema_version() {
        let mut writer = StateWriter::new(Vec::<u8>::new());
        writer.write("type.a", &resource("type", "a", "x-1")).unwrap();
        let document = writer.document();

        let newer = Schema::new(3).with_attribute("id", AttributeType::String);
        assert_eq!(
            document.resources[0].decode_attributes(&newer),
            Err(EncodeError::SchemaVersionMismatch { expected: 3, found: 2 })
        );
    }

    struct FailingTarget;

    impl SyncTarget for FailingTarget {
        fn persist(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    #[test]
    fn test_failed_sync_keeps_serial() {
        let mut writer = StateWriter::new(FailingTarget);
        writer.write("type.a", &resource("type", "a", "x-1")).unwrap();

        assert!(matches!(writer.sync(), Err(WriterError::Io(_))));
        assert_eq!(writer.document().serial, 0);
    }
}
