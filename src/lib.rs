//! # import-kernel
//!
//! Reference resolution and state assembly for importing existing cloud
//! infrastructure as code.
//!
//! The kernel answers one question:
//!
//! > Given a literal attribute value, which already-discovered resource does it **refer to**?
//!
//! ## Core Contract
//!
//! 1. Discover resources through a [`Reader`], narrowed by a [`FilterSpec`]
//! 2. Memoize each resource type once in a [`ResourceCache`]
//! 3. Replace literal values with `${type.name.attr}` references via the [`Interpolator`]
//! 4. Emit a versioned state document ([`StateWriter`]) and configuration ([`HclWriter`])
//!
//! ## Architecture
//!
//! ```text
//! Reader → FilterSpec → ResourceCache → Interpolator → Writer::write → Writer::sync
//!                                                          ↓
//!                                                    SyncTarget (file or memory)
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same discovered resources + same filter → identical references
//! - Group and instance iteration is ordered (BTreeMap)
//! - The state serial only moves when the document content changes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod filter;
pub mod cache;
pub mod interpolator;
pub mod reader;
pub mod writer;
pub mod importer;
pub mod config;
pub mod canonical;

// Re-exports
pub use types::{
    sanitize_name, AddressError, AttributeMap, AttributeType, EncodeError, Resource,
    ResourceAddress, ResourceInstance, Schema,
};
pub use filter::{FilterSpec, Tag};
pub use cache::{CacheError, ResourceCache};
pub use interpolator::{Interpolator, InterpolatorError, MatchStrategy};
pub use reader::{DiscoveredObject, InMemoryReader, Reader};
pub use reader::memory::InMemoryError;
pub use writer::{
    FileTarget, HclWriter, InstanceRecord, ResourceMode, ResourceRecord, StateDocument,
    StateWriter, SyncTarget, Writer, WriterError,
};
pub use importer::{ImportError, ImportSummary, Importer};
pub use config::{ConfigError, ImportConfig};
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};

/// Format version of emitted state documents.
pub const STATE_FORMAT_VERSION: u32 = 4;
