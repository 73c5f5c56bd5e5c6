//! Resource schemas and schema-typed instance payloads.
//!
//! Discovered attributes arrive as flat string literals. The state document
//! stores them as typed JSON according to the resource's schema:
//!
//! ```text
//! {"id": "i-1", "cpu": "2", "tags.Name": "web"}
//!     → {"id": "i-1", "cpu": 2, "tags": {"Name": "web"}}
//! ```
//!
//! Encoding only succeeds if the payload decodes back to the exact same
//! literals, so every persisted payload is decodable under its declared
//! schema version.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

use super::resource::AttributeMap;

/// Error encoding or decoding an instance payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// Attribute not declared by the schema.
    #[error("attribute {0:?} is not declared by the schema")]
    UnknownAttribute(String),
    /// Literal cannot be parsed as the declared type.
    #[error("attribute {attribute:?}: literal {literal:?} is not a valid {expected}")]
    InvalidLiteral {
        /// Attribute key.
        attribute: String,
        /// Offending literal.
        literal: String,
        /// Declared type.
        expected: AttributeType,
    },
    /// Literal parses but would not decode back to the same text.
    #[error("attribute {attribute:?}: literal {literal:?} does not survive encoding")]
    NotRoundTrippable {
        /// Attribute key.
        attribute: String,
        /// Offending literal.
        literal: String,
    },
    /// Payload was written under a different schema version.
    #[error("schema version mismatch: payload has {found}, schema has {expected}")]
    SchemaVersionMismatch {
        /// Version of the schema used for decoding.
        expected: u64,
        /// Version recorded with the payload.
        found: u64,
    },
    /// Payload shape does not match the schema.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Declared type of a schema attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    /// Plain string.
    String,
    /// Integer or float.
    Number,
    /// `true` / `false`.
    Bool,
    /// String map, flattened as `<attribute>.<key>`.
    Map,
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Bool => write!(f, "bool"),
            Self::Map => write!(f, "map"),
        }
    }
}

impl AttributeType {
    fn encode_literal(self, attribute: &str, literal: &str) -> Result<Value, EncodeError> {
        let invalid = || EncodeError::InvalidLiteral {
            attribute: attribute.to_string(),
            literal: literal.to_string(),
            expected: self,
        };

        match self {
            Self::String => Ok(Value::String(literal.to_string())),
            Self::Number => {
                if let Ok(n) = literal.parse::<i64>() {
                    return Ok(Value::Number(Number::from(n)));
                }
                literal
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(invalid)
            }
            Self::Bool => match literal {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(invalid()),
            },
            // Map entries are always flattened; a bare key has no literal form.
            Self::Map => Err(invalid()),
        }
    }
}

/// Versioned attribute schema for one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Schema version recorded with every encoded payload.
    pub version: u64,
    /// Declared attributes.
    pub attributes: BTreeMap<String, AttributeType>,
}

impl Schema {
    /// Create an empty schema at `version`.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            attributes: BTreeMap::new(),
        }
    }

    /// Declare an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, kind: AttributeType) -> Self {
        self.attributes.insert(name.into(), kind);
        self
    }

    /// Encode flat literals into a typed payload.
    pub fn encode(&self, attributes: &AttributeMap) -> Result<Value, EncodeError> {
        let mut object = Map::new();

        for (key, literal) in attributes {
            let (attribute, entry) = match key.split_once('.') {
                Some((attribute, entry)) => (attribute, Some(entry)),
                None => (key.as_str(), None),
            };
            let kind = self
                .attributes
                .get(attribute)
                .copied()
                .ok_or_else(|| EncodeError::UnknownAttribute(key.clone()))?;

            match (kind, entry) {
                (AttributeType::Map, Some(entry)) => {
                    let slot = object
                        .entry(attribute.to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(map) = slot {
                        map.insert(entry.to_string(), Value::String(literal.clone()));
                    }
                }
                (_, Some(_)) => return Err(EncodeError::UnknownAttribute(key.clone())),
                (kind, None) => {
                    object.insert(key.clone(), kind.encode_literal(key, literal)?);
                }
            }
        }

        let payload = Value::Object(object);
        let decoded = self.decode(&payload)?;
        if let Some((key, literal)) = attributes
            .iter()
            .find(|(key, literal)| decoded.get(*key) != Some(*literal))
        {
            return Err(EncodeError::NotRoundTrippable {
                attribute: key.clone(),
                literal: literal.clone(),
            });
        }

        Ok(payload)
    }

    /// Decode a typed payload back into flat literals.
    pub fn decode(&self, payload: &Value) -> Result<AttributeMap, EncodeError> {
        let object = payload
            .as_object()
            .ok_or_else(|| EncodeError::MalformedPayload("payload is not an object".to_string()))?;

        let mut attributes = AttributeMap::new();
        for (attribute, value) in object {
            let kind = self
                .attributes
                .get(attribute)
                .copied()
                .ok_or_else(|| EncodeError::UnknownAttribute(attribute.clone()))?;

            match (kind, value) {
                (AttributeType::String, Value::String(s)) => {
                    attributes.insert(attribute.clone(), s.clone());
                }
                (AttributeType::Number, Value::Number(n)) => {
                    attributes.insert(attribute.clone(), n.to_string());
                }
                (AttributeType::Bool, Value::Bool(b)) => {
                    attributes.insert(attribute.clone(), b.to_string());
                }
                (AttributeType::Map, Value::Object(entries)) => {
                    for (entry, value) in entries {
                        let literal = value.as_str().ok_or_else(|| {
                            EncodeError::MalformedPayload(format!(
                                "map attribute {attribute:?} has non-string entry {entry:?}"
                            ))
                        })?;
                        attributes.insert(format!("{attribute}.{entry}"), literal.to_string());
                    }
                }
                _ => {
                    return Err(EncodeError::MalformedPayload(format!(
                        "attribute {attribute:?} does not hold a {kind}"
                    )))
                }
            }
        }

        Ok(attributes)
    }
}
