//! Core types for the import kernel.

pub mod address;
pub mod resource;
pub mod schema;

pub use address::{sanitize_name, AddressError, ResourceAddress};
pub use resource::{AttributeMap, Resource, ResourceInstance};
pub use schema::{AttributeType, EncodeError, Schema};
