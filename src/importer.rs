//! Import pipeline.
//!
//! ```text
//! Reader → Filter → Cache → Interpolator → Writers → sync
//! ```
//!
//! 1. Resource types passing the include list are discovered once each;
//!    a type already in the cache is never read again.
//! 2. Objects with an excluded ID are dropped before their attributes are
//!    read; objects without a matching tag are dropped after.
//! 3. Every kept resource is registered with the interpolator under a
//!    unique sanitized name.
//! 4. Each writer receives every resource, with references substituted when
//!    the writer asks for them, and is synced once at the end.
//!
//! All access is sequential; the importer owns its cache and interpolator
//! for the duration of one run.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{CacheError, ResourceCache};
use crate::config::ImportConfig;
use crate::interpolator::{Interpolator, InterpolatorError};
use crate::reader::Reader;
use crate::types::{sanitize_name, AttributeMap, ResourceAddress, ResourceInstance};
use crate::writer::{Writer, WriterError};

/// Error type for import runs.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Reader failure.
    #[error("reader error: {0}")]
    Reader(String),
    /// Cache failure.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// Interpolator registration failure.
    #[error(transparent)]
    Interpolator(#[from] InterpolatorError),
    /// Writer failure.
    #[error(transparent)]
    Writer(#[from] WriterError),
}

impl ImportError {
    /// Create a reader error from any error type.
    pub fn from_reader<E: std::error::Error>(e: E) -> Self {
        Self::Reader(e.to_string())
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Resource types imported.
    pub resource_types: usize,
    /// Objects listed by the reader.
    pub discovered: usize,
    /// Objects dropped by the filter.
    pub excluded: usize,
    /// Writes performed, across all writers.
    pub written: usize,
    /// Literals replaced by references, across all writers.
    pub references: usize,
}

/// Drives one import run.
pub struct Importer<'a, R: Reader> {
    reader: &'a R,
    config: &'a ImportConfig,
    cache: ResourceCache,
    interpolator: Interpolator,
}

impl<'a, R: Reader> Importer<'a, R> {
    /// Create an importer for `reader`'s provider.
    pub fn new(reader: &'a R, config: &'a ImportConfig) -> Self {
        Self {
            reader,
            config,
            cache: ResourceCache::new(),
            interpolator: Interpolator::new(reader.provider()),
        }
    }

    /// Resources discovered so far, per type.
    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Reference index built so far.
    pub fn interpolator(&self) -> &Interpolator {
        &self.interpolator
    }

    /// Discover, write and sync everything.
    pub fn run(&mut self, writers: &mut [&mut dyn Writer]) -> Result<ImportSummary, ImportError> {
        info!(
            provider = self.reader.provider(),
            filter = %self.config.filter,
            "starting import"
        );

        let mut summary = ImportSummary::default();
        let types = self.discover(&mut summary)?;

        for writer in writers.iter_mut() {
            let interpolate = self.config.interpolate && writer.interpolates();
            for resource_type in &types {
                for resource in self.cache.get(resource_type)? {
                    if interpolate {
                        let (resolved, references) = self.interpolated(resource);
                        summary.references += references;
                        write_resource(&mut **writer, &resolved)?;
                    } else {
                        write_resource(&mut **writer, resource)?;
                    }
                    summary.written += 1;
                }
            }
            writer.sync()?;
        }

        info!(
            resource_types = summary.resource_types,
            discovered = summary.discovered,
            excluded = summary.excluded,
            written = summary.written,
            references = summary.references,
            "import finished"
        );
        Ok(summary)
    }

    /// Populate the cache and interpolator; returns the imported types in order.
    pub fn discover(&mut self, summary: &mut ImportSummary) -> Result<Vec<String>, ImportError> {
        let mut seen = BTreeSet::new();
        let mut types = Vec::new();

        for resource_type in self.reader.resource_types() {
            if !self.config.filter.is_included(&resource_type) || !seen.insert(resource_type.clone()) {
                continue;
            }
            self.load(&resource_type, summary)?;
            types.push(resource_type);
        }

        summary.resource_types = types.len();
        Ok(types)
    }

    fn load(&mut self, resource_type: &str, summary: &mut ImportSummary) -> Result<(), ImportError> {
        if self.cache.contains(resource_type) {
            debug!(resource_type, "served from cache");
            return Ok(());
        }

        let filter = &self.config.filter;
        let schema = Arc::new(
            self.reader
                .schema(resource_type)
                .map_err(ImportError::from_reader)?,
        );
        let objects = self
            .reader
            .list(resource_type)
            .map_err(ImportError::from_reader)?;

        let mut names = BTreeSet::new();
        let mut resources = Vec::with_capacity(objects.len());
        for object in objects {
            summary.discovered += 1;
            if filter.is_excluded(&object.id) {
                debug!(resource_type, id = %object.id, "excluded");
                summary.excluded += 1;
                continue;
            }

            let attributes = self
                .reader
                .read_attributes(resource_type, &object.id)
                .map_err(ImportError::from_reader)?;
            if !filter.matches_tags(&attributes) {
                debug!(resource_type, id = %object.id, "no matching tag");
                summary.excluded += 1;
                continue;
            }

            let name = unique_name(&names, object.name.as_deref(), &object.id);
            names.insert(name.clone());

            let address = ResourceAddress::new(resource_type, name);
            self.interpolator
                .add_resource_attributes(&address, attributes.clone())?;
            resources.push(ResourceInstance::new(
                address,
                object.id,
                self.reader.provider(),
                Arc::clone(&schema),
                attributes,
            ));
        }

        info!(resource_type, count = resources.len(), "resource type discovered");
        self.cache.set(resource_type, resources)?;
        Ok(())
    }

    /// Copy of `resource` with literals replaced by references, and the
    /// number of references made.
    fn interpolated(&self, resource: &ResourceInstance) -> (ResourceInstance, usize) {
        let mut referenced = BTreeSet::new();
        let attributes: AttributeMap = resource
            .attributes()
            .iter()
            .map(|(key, value)| {
                // Map entries (`tags.Name`) and configured keys keep their literal.
                if key.contains('.') || self.config.skip_interpolation.contains(key) {
                    return (key.clone(), value.clone());
                }
                match self
                    .interpolator
                    .interpolate_for(resource.address(), key, value)
                {
                    Some(reference) => {
                        referenced.insert(key.clone());
                        (key.clone(), reference)
                    }
                    None => (key.clone(), value.clone()),
                }
            })
            .collect();

        let references = referenced.len();
        (
            resource.with_attributes(attributes).with_references(referenced),
            references,
        )
    }
}

/// Sanitized name not yet in `taken`.
///
/// Falls back to the raw ID when there is no name, and appends the ID (then
/// a counter) on collision.
fn unique_name(taken: &BTreeSet<String>, name: Option<&str>, id: &str) -> String {
    let base = sanitize_name(name.unwrap_or(id));
    if !taken.contains(&base) {
        return base;
    }

    let with_id = format!("{base}_{}", sanitize_name(id));
    let mut candidate = with_id.clone();
    let mut n = 2;
    while taken.contains(&candidate) {
        candidate = format!("{with_id}_{n}");
        n += 1;
    }
    candidate
}

/// Write once, retrying under `<name>_<id>` on a duplicate key.
fn write_resource(writer: &mut dyn Writer, resource: &ResourceInstance) -> Result<(), WriterError> {
    let key = resource.address().to_string();
    match writer.write(&key, resource) {
        Err(e) if e.is_duplicate() => {
            let renamed =
                resource.renamed(format!("{}_{}", resource.name(), sanitize_name(resource.id())));
            warn!(
                key = %key,
                renamed = %renamed.address(),
                "duplicate key, retrying under derived name"
            );
            writer.write(&renamed.address().to_string(), &renamed)
        }
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::InMemoryReader;
    use crate::types::{AttributeType, Resource, Schema};
    use crate::writer::StateWriter;

    fn attrs(pairs: &[(&str, &str)]) -> AttributeMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_unique_name() {
        let mut taken = BTreeSet::new();
        assert_eq!(unique_name(&taken, Some("web"), "i-1"), "web");
        taken.insert("web".to_string());
        assert_eq!(unique_name(&taken, Some("web"), "i-2"), "web_i-2");
        taken.insert("web_i-2".to_string());
        assert_eq!(unique_name(&taken, Some("web"), "i-2"), "web_i-2_2");
        assert_eq!(unique_name(&taken, None, "vpc-1"), "vpc-1");
    }

    #[test]
    fn test_write_resource_renames_on_duplicate() {
        let schema = Arc::new(Schema::new(1).with_attribute("id", AttributeType::String));
        let first = ResourceInstance::new(
            ResourceAddress::new("aws_vpc", "main"),
            "vpc-1",
            "aws",
            Arc::clone(&schema),
            attrs(&[("id", "vpc-1")]),
        );
        let second = ResourceInstance::new(
            ResourceAddress::new("aws_vpc", "main"),
            "vpc-2",
            "aws",
            schema,
            attrs(&[("id", "vpc-2")]),
        );

        let mut writer = StateWriter::new(Vec::<u8>::new());
        write_resource(&mut writer, &first).unwrap();
        write_resource(&mut writer, &second).unwrap();

        assert!(writer.has("aws_vpc.main"));
        assert!(writer.has("aws_vpc.main_vpc-2"));

        // A third collision on the derived name is not retried again.
        assert!(write_resource(&mut writer, &second)
            .unwrap_err()
            .is_duplicate());
    }

    #[test]
    fn test_load_uses_cache() {
        let mut reader = InMemoryReader::new("aws");
        reader.add_schema("aws_vpc", Schema::new(1).with_attribute("id", AttributeType::String));
        reader.add_resource("aws_vpc", "vpc-1", Some("main"), attrs(&[("id", "vpc-1")]));

        let config = ImportConfig::default();
        let mut importer = Importer::new(&reader, &config);
        let mut summary = ImportSummary::default();

        importer.load("aws_vpc", &mut summary).unwrap();
        importer.load("aws_vpc", &mut summary).unwrap();

        assert_eq!(reader.reads(), 1);
        assert_eq!(summary.discovered, 1);
        assert_eq!(importer.cache().get("aws_vpc").unwrap().len(), 1);
        assert_eq!(importer.interpolator().len(), 1);
    }

    #[test]
    fn test_interpolated_skips_configured_and_map_keys() {
        let mut reader = InMemoryReader::new("aws");
        let schema = Schema::new(1)
            .with_attribute("id", AttributeType::String)
            .with_attribute("vpc_id", AttributeType::String)
            .with_attribute("tags", AttributeType::Map);
        reader.add_schema("aws_vpc", schema.clone());
        reader.add_schema("aws_subnet", schema);
        reader.add_resource("aws_vpc", "vpc-1", Some("main"), attrs(&[("id", "vpc-1")]));
        reader.add_resource(
            "aws_subnet",
            "subnet-1",
            Some("a"),
            attrs(&[("id", "vpc-1"), ("vpc_id", "vpc-1"), ("tags.vpc", "vpc-1")]),
        );

        let config = ImportConfig::default();
        let mut importer = Importer::new(&reader, &config);
        importer.discover(&mut ImportSummary::default()).unwrap();

        let subnet = &importer.cache().get("aws_subnet").unwrap()[0];
        let (resolved, references) = importer.interpolated(subnet);

        assert_eq!(references, 1);
        assert_eq!(resolved.attributes()["vpc_id"], "${aws_vpc.main.id}");
        assert_eq!(resolved.references().len(), 1);
        assert!(resolved.is_reference("vpc_id"));
        assert!(!resolved.is_reference("id"));
        assert_eq!(resolved.attributes()["id"], "vpc-1");
        assert_eq!(resolved.attributes()["tags.vpc"], "vpc-1");
    }
}
