// src/metadata/mod.rs

//! The immutable schema graph built by one refresh.

pub mod keyspace;
pub mod options;
pub mod table;
pub mod types;

pub use keyspace::{Aggregate, Function, FunctionSignature, Keyspace, UserType};
pub use options::{OptionMap, OptionValue, TableOptions};
pub use table::{ClusteringOrder, Column, ColumnKind, ColumnLayout, Index, IndexKind, Table, View};
pub use types::{DataType, NativeType};

use serde::Serialize;
use std::{borrow::Cow, collections::BTreeMap};

use crate::{family::SchemaFamily, version::Version};

/// Normalise a user-supplied identifier the way CQL does.
///
/// `"Quoted"` names are taken literally (with `""` unescaped); anything else is
/// case-insensitive and therefore lower-cased.
pub fn handle_id(id: &str) -> Cow<'_, str> {
    if id.len() >= 2 && id.starts_with('"') && id.ends_with('"') {
        Cow::Owned(id[1..id.len() - 1].replace("\"\"", "\""))
    } else if id.chars().any(|c| c.is_ascii_uppercase()) {
        Cow::Owned(id.to_ascii_lowercase())
    } else {
        Cow::Borrowed(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    node: String,
    version: Version,
    family: SchemaFamily,
    keyspaces: BTreeMap<String, Keyspace>,
}

impl Metadata {
    pub fn new(
        node: &str,
        version: Version,
        family: SchemaFamily,
        keyspaces: BTreeMap<String, Keyspace>,
    ) -> Self {
        Self {
            node: node.to_string(),
            version,
            family,
            keyspaces,
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn family(&self) -> SchemaFamily {
        self.family
    }

    pub fn keyspaces(&self) -> &BTreeMap<String, Keyspace> {
        &self.keyspaces
    }

    pub fn keyspace(&self, name: &str) -> Option<&Keyspace> {
        self.keyspaces.get(handle_id(name).as_ref())
    }

    pub fn table(&self, keyspace: &str, name: &str) -> Option<&Table> {
        self.keyspace(keyspace)?.tables.get(handle_id(name).as_ref())
    }

    pub fn view(&self, keyspace: &str, name: &str) -> Option<&View> {
        self.keyspace(keyspace)?.views.get(handle_id(name).as_ref())
    }

    pub fn user_type(&self, keyspace: &str, name: &str) -> Option<&UserType> {
        self.keyspace(keyspace)?
            .user_types
            .get(handle_id(name).as_ref())
    }

    /// Look up one overload; `argument_types` are CQL type strings such as `int` or
    /// `frozen<list<text>>`.
    pub fn function(&self, keyspace: &str, name: &str, argument_types: &[&str]) -> Option<&Function> {
        let key = signature_key(name, argument_types)?;
        self.keyspace(keyspace)?.functions.get(&key)
    }

    pub fn aggregate(
        &self,
        keyspace: &str,
        name: &str,
        argument_types: &[&str],
    ) -> Option<&Aggregate> {
        let key = signature_key(name, argument_types)?;
        self.keyspace(keyspace)?.aggregates.get(&key)
    }
}

/// The map key of an overload, or `None` when an argument is not a CQL type.
///
/// Arguments go through the type parser so that spacing, case and aliases such as
/// `varchar` resolve to the same key the graph stores.
fn signature_key(name: &str, argument_types: &[&str]) -> Option<String> {
    let types = argument_types
        .iter()
        .map(|raw| crate::parser::parse_cql_type(raw.trim()))
        .collect::<Result<Vec<DataType>, _>>()
        .ok()?;
    Some(FunctionSignature::new(&handle_id(name), &types).to_string())
}
