//! Declarative configuration output.
//!
//! Each resource becomes a block:
//!
//! ```text
//! resource "aws_instance" "web" {
//!   subnet_id = "${aws_subnet.main.id}"
//!   tags = {
//!     "Name" = "web"
//!   }
//! }
//! ```
//!
//! Flat `<map>.<key>` attributes are regrouped into map objects. Values the
//! resource marks as references are emitted as-is; literal values have `${`
//! and `%{` escaped to `$${` and `%%{` so they never become live templates.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};
use tracing::info;

use super::{validate, SyncTarget, Writer, WriterError};
use crate::types::{AttributeMap, Resource, ResourceAddress};

struct Block {
    address: ResourceAddress,
    attributes: AttributeMap,
    references: BTreeSet<String>,
}

/// Writer producing configuration text.
pub struct HclWriter<T: SyncTarget = Vec<u8>> {
    target: T,
    blocks: Vec<Block>,
    keys: BTreeSet<String>,
}

impl<T: SyncTarget> HclWriter<T> {
    /// Writer persisting to `target`.
    pub fn new(target: T) -> Self {
        Self {
            target,
            blocks: Vec::new(),
            keys: BTreeSet::new(),
        }
    }

    /// The sink.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Render every block written so far.
    pub fn render(&self) -> Result<String, WriterError> {
        let mut out = String::new();
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            render_block(&mut out, block)?;
        }
        Ok(out)
    }
}

impl<T: SyncTarget> Writer for HclWriter<T> {
    fn write(&mut self, key: &str, resource: &dyn Resource) -> Result<(), WriterError> {
        let address = validate(key, resource)?;
        if self.keys.contains(key) {
            return Err(WriterError::DuplicateKey(key.to_string()));
        }

        let attributes = resource.instance_state().clone();
        let references = attributes
            .keys()
            .filter(|key| resource.is_reference(key))
            .cloned()
            .collect();
        self.blocks.push(Block {
            address,
            attributes,
            references,
        });
        self.keys.insert(key.to_string());
        Ok(())
    }

    fn has(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn sync(&mut self) -> Result<(), WriterError> {
        let rendered = self.render()?;
        self.target.persist(rendered.as_bytes())?;
        info!(resources = self.blocks.len(), "configuration synced");
        Ok(())
    }

    fn interpolates(&self) -> bool {
        true
    }
}

fn render_block(out: &mut String, block: &Block) -> fmt::Result {
    let mut scalars: Vec<(&str, &str)> = Vec::new();
    let mut maps: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
    for (key, value) in &block.attributes {
        match key.split_once('.') {
            Some((map, entry)) => maps.entry(map).or_default().push((entry, value.as_str())),
            None => scalars.push((key.as_str(), value.as_str())),
        }
    }
    let render_value = |key: &str, value: &str| quote(value, !block.references.contains(key));

    writeln!(
        out,
        "resource {} {} {{",
        quote(block.address.resource_type(), true),
        quote(block.address.name(), true)
    )?;
    for (key, literal) in scalars {
        writeln!(out, "  {} = {}", key, render_value(key, literal))?;
    }
    for (map, entries) in maps {
        writeln!(out, "  {} = {{", map)?;
        for (entry, literal) in entries {
            let key = format!("{map}.{entry}");
            writeln!(out, "    {} = {}", quote(entry, true), render_value(&key, literal))?;
        }
        out.push_str("  }\n");
    }
    out.push_str("}\n");
    Ok(())
}

/// Quote `value` as a string; `literal` escapes template sequences.
fn quote(value: &str, literal: bool) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            '$' | '%' if literal && chars.peek() == Some(&'{') => {
                quoted.push(c);
                quoted.push(c);
            }
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
