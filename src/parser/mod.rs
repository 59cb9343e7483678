// src/parser/mod.rs

//! Turns [`RawSchemaRows`] into a [`Metadata`] graph.
//!
//! Parsing never fails as a whole. Rows that cannot be used are dropped and reported
//! as [`ParseWarning`]s, options that cannot be read fall back to their defaults and
//! are marked invalid.

pub mod keyspace;
pub mod options;
pub mod table;
pub mod types;

pub use options::TableOptionKind;
pub use types::{parse_class_name, parse_cql_type, parse_type, TypeParseError};

use serde::Serialize;
use std::{collections::BTreeMap, fmt};
use tracing::{info, instrument, warn};

use crate::{
    family::{FamilyProfile, SchemaFamily},
    metadata::{DataType, Keyspace, Metadata},
    rows::{RawSchemaRows, Row, RowError, SchemaCategory},
    version::Version,
};
use options::OptionReader;

/// Something the parser had to skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    pub category: SchemaCategory,
    pub keyspace: Option<String>,
    pub object: Option<String>,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.category)?;
        match (&self.keyspace, &self.object) {
            (Some(ks), Some(object)) => write!(f, " {}.{}", ks, object)?,
            (Some(ks), None) => write!(f, " {}", ks)?,
            (None, Some(object)) => write!(f, " {}", object)?,
            (None, None) => {}
        }
        write!(f, ": {}", self.message)
    }
}

/// The result of one parse: the graph plus everything that was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSchema {
    pub metadata: Metadata,
    pub warnings: Vec<ParseWarning>,
}

#[derive(Debug, Clone)]
pub struct SchemaParser {
    family: SchemaFamily,
    version: Version,
}

impl SchemaParser {
    pub fn new(family: SchemaFamily, version: Version) -> Self {
        Self { family, version }
    }

    pub fn family(&self) -> SchemaFamily {
        self.family
    }

    #[instrument(skip_all, fields(node = %rows.node(), family = %self.family))]
    pub fn parse(&self, rows: &RawSchemaRows) -> ParsedSchema {
        let mut run = ParseRun {
            family: self.family,
            profile: self.family.profile(),
            options: OptionReader::new(self.family, &self.version),
            warnings: Vec::new(),
        };

        for malformed in rows.malformed() {
            run.warn(
                malformed.category,
                None,
                None,
                format!("category dropped: {}", malformed.reason),
            );
        }

        let mut keyspaces = BTreeMap::new();
        for row in rows.keyspaces() {
            if let Some(mut keyspace) = keyspace::parse_keyspace(&mut run, row) {
                if let Some(children) = rows.keyspace(&keyspace.name) {
                    keyspace::populate(&mut run, &mut keyspace, children);
                }
                keyspaces.insert(keyspace.name.clone(), keyspace);
            }
        }
        for row in rows.virtual_keyspaces() {
            if let Some(mut keyspace) = keyspace::parse_virtual_keyspace(row) {
                if let Some(children) = rows.keyspace(&keyspace.name) {
                    table::populate_virtual(&mut run, &mut keyspace, children);
                }
                keyspaces.insert(keyspace.name.clone(), keyspace);
            }
        }

        info!(
            keyspaces = keyspaces.len(),
            warnings = run.warnings.len(),
            "parsed schema"
        );
        ParsedSchema {
            metadata: Metadata::new(rows.node(), self.version.clone(), self.family, keyspaces),
            warnings: run.warnings,
        }
    }
}

/// State shared by the per-category parsers during one parse.
pub(crate) struct ParseRun<'a> {
    pub(crate) family: SchemaFamily,
    pub(crate) profile: &'static FamilyProfile,
    pub(crate) options: OptionReader<'a>,
    pub(crate) warnings: Vec<ParseWarning>,
}

impl ParseRun<'_> {
    pub(crate) fn warn(
        &mut self,
        category: SchemaCategory,
        keyspace: Option<&str>,
        object: Option<&str>,
        message: String,
    ) {
        warn!(
            %category,
            keyspace = keyspace.unwrap_or("-"),
            object = object.unwrap_or("-"),
            %message,
            "skipping schema object"
        );
        self.warnings.push(ParseWarning {
            category,
            keyspace: keyspace.map(str::to_string),
            object: object.map(str::to_string),
            message,
        });
    }

    /// The object name of a row; identity columns were checked when the rows were
    /// collected, so this only fails for rows built by hand.
    pub(crate) fn name<'r>(&self, row: &'r Row, column: &str) -> Result<&'r str, RowError> {
        crate::rows::required(column, row.get_string(column))
    }

    pub(crate) fn data_type(&self, raw: &str) -> Result<DataType, RowError> {
        parse_type(self.family, raw).map_err(|e| RowError::InvalidValue {
            column: "type".to_string(),
            reason: e.to_string(),
        })
    }

    /// Lists that 2.x may store as JSON text.
    pub(crate) fn string_list(&self, row: &Row, column: &str) -> Result<Vec<String>, RowError> {
        let value = if self.family.is_legacy() {
            row.get_json_or_list(column)
        } else {
            row.get_string_list(column)
        };
        crate::rows::required(column, value)
    }
}
