// src/metadata/keyspace.rs

use serde::Serialize;
use std::{collections::BTreeMap, fmt};

use super::{
    table::{Table, View},
    types::DataType,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Keyspace {
    pub name: String,
    pub durable_writes: bool,
    pub replication: BTreeMap<String, String>,
    #[serde(rename = "virtual")]
    pub virtual_keyspace: bool,
    pub tables: BTreeMap<String, Table>,
    pub views: BTreeMap<String, View>,
    pub user_types: BTreeMap<String, UserType>,
    /// Keyed by [`FunctionSignature`] rendering, e.g. `plus(int,int)`.
    pub functions: BTreeMap<String, Function>,
    pub aggregates: BTreeMap<String, Aggregate>,
}

impl Keyspace {
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            durable_writes: true,
            replication: BTreeMap::new(),
            virtual_keyspace: false,
            tables: BTreeMap::new(),
            views: BTreeMap::new(),
            user_types: BTreeMap::new(),
            functions: BTreeMap::new(),
            aggregates: BTreeMap::new(),
        }
    }

    /// User types ordered so that every type comes after the types it references.
    ///
    /// Ties are broken by name; references to types outside the keyspace are ignored.
    pub fn user_types_in_dependency_order(&self) -> Vec<&UserType> {
        let mut ordered: Vec<&UserType> = Vec::with_capacity(self.user_types.len());
        let mut placed = std::collections::BTreeSet::new();

        while ordered.len() < self.user_types.len() {
            let before = ordered.len();
            for udt in self.user_types.values() {
                if placed.contains(udt.name.as_str()) {
                    continue;
                }
                let ready = udt.dependencies().iter().all(|dep| {
                    *dep == udt.name
                        || placed.contains(dep)
                        || !self.user_types.contains_key(*dep)
                });
                if ready {
                    placed.insert(udt.name.as_str());
                    ordered.push(udt);
                }
            }
            if ordered.len() == before {
                // a cycle cannot be created through CQL; emit the rest by name
                ordered.extend(
                    self.user_types
                        .values()
                        .filter(|udt| !placed.contains(udt.name.as_str())),
                );
                break;
            }
        }
        ordered
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserType {
    pub name: String,
    pub keyspace: String,
    pub fields: Vec<(String, DataType)>,
}

impl UserType {
    pub fn field(&self, name: &str) -> Option<&DataType> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, t)| t)
    }

    pub fn dependencies(&self) -> Vec<&str> {
        self.fields
            .iter()
            .flat_map(|(_, t)| t.referenced_user_types())
            .collect()
    }
}

/// Name and argument types; what identifies an overload.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FunctionSignature {
    pub name: String,
    pub argument_types: Vec<String>,
}

impl FunctionSignature {
    pub fn new(name: &str, argument_types: &[DataType]) -> Self {
        Self {
            name: name.to_string(),
            argument_types: argument_types.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.argument_types.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Function {
    pub name: String,
    pub keyspace: String,
    pub arguments: Vec<(String, DataType)>,
    pub return_type: DataType,
    pub language: String,
    pub body: String,
    pub called_on_null_input: bool,
}

impl Function {
    pub fn signature(&self) -> FunctionSignature {
        let types: Vec<DataType> = self.arguments.iter().map(|(_, t)| t.clone()).collect();
        FunctionSignature::new(&self.name, &types)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Aggregate {
    pub name: String,
    pub keyspace: String,
    pub argument_types: Vec<DataType>,
    pub state_function: String,
    pub state_type: DataType,
    pub final_function: Option<String>,
    /// Already formatted as a CQL literal.
    pub initial_condition: Option<String>,
    pub return_type: DataType,
}

impl Aggregate {
    pub fn signature(&self) -> FunctionSignature {
        FunctionSignature::new(&self.name, &self.argument_types)
    }
}
