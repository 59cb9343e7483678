// src/rows.rs

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{family::SchemaFamily, version::Version};

/// One kind of schema object, and therefore one schema query per refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaCategory {
    Keyspaces,
    Tables,
    Columns,
    Indexes,
    Views,
    Types,
    Functions,
    Aggregates,
    VirtualKeyspaces,
    VirtualTables,
    VirtualColumns,
}

impl SchemaCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaCategory::Keyspaces => "keyspaces",
            SchemaCategory::Tables => "tables",
            SchemaCategory::Columns => "columns",
            SchemaCategory::Indexes => "indexes",
            SchemaCategory::Views => "views",
            SchemaCategory::Types => "types",
            SchemaCategory::Functions => "functions",
            SchemaCategory::Aggregates => "aggregates",
            SchemaCategory::VirtualKeyspaces => "virtual_keyspaces",
            SchemaCategory::VirtualTables => "virtual_tables",
            SchemaCategory::VirtualColumns => "virtual_columns",
        }
    }

    /// Columns every row of this category must carry; a row without them makes the
    /// whole category unusable.
    pub fn identity_columns(&self, family: SchemaFamily) -> [&'static str; 2] {
        let table = family.profile().table_name_column;
        match self {
            SchemaCategory::Keyspaces | SchemaCategory::VirtualKeyspaces => {
                ["keyspace_name", "keyspace_name"]
            }
            SchemaCategory::Tables | SchemaCategory::Columns | SchemaCategory::Indexes => {
                ["keyspace_name", table]
            }
            SchemaCategory::VirtualTables | SchemaCategory::VirtualColumns => {
                ["keyspace_name", "table_name"]
            }
            SchemaCategory::Views => ["keyspace_name", "view_name"],
            SchemaCategory::Types => ["keyspace_name", "type_name"],
            SchemaCategory::Functions => ["keyspace_name", "function_name"],
            SchemaCategory::Aggregates => ["keyspace_name", "aggregate_name"],
        }
    }
}

impl fmt::Display for SchemaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A driver-agnostic cell value as handed over by the channel layer.
///
/// UUIDs arrive as text and blobs as `0x`-prefixed hex text; sets arrive as lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CqlValue {
    Null,
    Boolean(bool),
    Int(i64),
    Double(f64),
    Text(String),
    List(Vec<CqlValue>),
    Map(BTreeMap<String, CqlValue>),
}

impl CqlValue {
    fn kind(&self) -> &'static str {
        match self {
            CqlValue::Null => "null",
            CqlValue::Boolean(_) => "boolean",
            CqlValue::Int(_) => "int",
            CqlValue::Double(_) => "double",
            CqlValue::Text(_) => "text",
            CqlValue::List(_) => "list",
            CqlValue::Map(_) => "map",
        }
    }

    /// Scalar rendering used when a map or list value is read as text.
    fn as_plain_string(&self) -> Option<String> {
        match self {
            CqlValue::Text(s) => Some(s.clone()),
            CqlValue::Boolean(b) => Some(b.to_string()),
            CqlValue::Int(i) => Some(i.to_string()),
            CqlValue::Double(d) => Some(d.to_string()),
            _ => None,
        }
    }
}

impl From<&str> for CqlValue {
    fn from(s: &str) -> Self {
        CqlValue::Text(s.to_string())
    }
}

impl From<String> for CqlValue {
    fn from(s: String) -> Self {
        CqlValue::Text(s)
    }
}

impl From<bool> for CqlValue {
    fn from(b: bool) -> Self {
        CqlValue::Boolean(b)
    }
}

impl From<i64> for CqlValue {
    fn from(i: i64) -> Self {
        CqlValue::Int(i)
    }
}

impl From<i32> for CqlValue {
    fn from(i: i32) -> Self {
        CqlValue::Int(i64::from(i))
    }
}

impl From<f64> for CqlValue {
    fn from(d: f64) -> Self {
        CqlValue::Double(d)
    }
}

/// Why a single value could not be read from a row.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowError {
    #[error("missing required column `{column}`")]
    Missing { column: String },

    #[error("column `{column}` holds a {found}, expected {expected}")]
    WrongType {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("column `{column}` holds an invalid value: {reason}")]
    InvalidValue { column: String, reason: String },
}

/// A single row of a system schema table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    columns: BTreeMap<String, CqlValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<CqlValue>) -> Self {
        self.columns.insert(column.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<CqlValue>) {
        self.columns.insert(column.to_string(), value.into());
    }

    /// The value of `column`, or `None` if it is absent or null.
    pub fn get(&self, column: &str) -> Option<&CqlValue> {
        match self.columns.get(column) {
            None | Some(CqlValue::Null) => None,
            Some(value) => Some(value),
        }
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    fn wrong_type(column: &str, expected: &'static str, found: &CqlValue) -> RowError {
        RowError::WrongType {
            column: column.to_string(),
            expected,
            found: found.kind(),
        }
    }

    fn invalid(column: &str, reason: impl Into<String>) -> RowError {
        RowError::InvalidValue {
            column: column.to_string(),
            reason: reason.into(),
        }
    }

    pub fn get_string(&self, column: &str) -> Result<Option<&str>, RowError> {
        match self.get(column) {
            None => Ok(None),
            Some(CqlValue::Text(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(Self::wrong_type(column, "text", other)),
        }
    }

    pub fn get_bool(&self, column: &str) -> Result<Option<bool>, RowError> {
        match self.get(column) {
            None => Ok(None),
            Some(CqlValue::Boolean(b)) => Ok(Some(*b)),
            Some(other) => Err(Self::wrong_type(column, "boolean", other)),
        }
    }

    pub fn get_i32(&self, column: &str) -> Result<Option<i32>, RowError> {
        match self.get(column) {
            None => Ok(None),
            Some(CqlValue::Int(i)) => i32::try_from(*i)
                .map(Some)
                .map_err(|_| Self::invalid(column, format!("{} does not fit an int", i))),
            Some(other) => Err(Self::wrong_type(column, "int", other)),
        }
    }

    pub fn get_f64(&self, column: &str) -> Result<Option<f64>, RowError> {
        match self.get(column) {
            None => Ok(None),
            Some(CqlValue::Double(d)) => Ok(Some(*d)),
            Some(CqlValue::Int(i)) => Ok(Some(*i as f64)),
            Some(other) => Err(Self::wrong_type(column, "double", other)),
        }
    }

    pub fn get_uuid(&self, column: &str) -> Result<Option<Uuid>, RowError> {
        match self.get_string(column)? {
            None => Ok(None),
            Some(s) => Uuid::parse_str(s)
                .map(Some)
                .map_err(|e| Self::invalid(column, e.to_string())),
        }
    }

    /// Blobs are handed over as `0x`-prefixed hex text.
    pub fn get_blob(&self, column: &str) -> Result<Option<Vec<u8>>, RowError> {
        match self.get_string(column)? {
            None => Ok(None),
            Some(s) => {
                let hex = s
                    .strip_prefix("0x")
                    .ok_or_else(|| Self::invalid(column, "blob without 0x prefix"))?;
                decode_hex(hex)
                    .map(Some)
                    .ok_or_else(|| Self::invalid(column, "malformed hex"))
            }
        }
    }

    pub fn get_string_list(&self, column: &str) -> Result<Option<Vec<String>>, RowError> {
        match self.get(column) {
            None => Ok(None),
            Some(CqlValue::List(items)) => items
                .iter()
                .map(|item| match item {
                    CqlValue::Text(s) => Ok(s.clone()),
                    other => Err(Self::wrong_type(column, "list<text>", other)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(Self::wrong_type(column, "list<text>", other)),
        }
    }

    pub fn get_string_map(
        &self,
        column: &str,
    ) -> Result<Option<BTreeMap<String, String>>, RowError> {
        match self.get(column) {
            None => Ok(None),
            Some(CqlValue::Map(entries)) => entries
                .iter()
                .map(|(k, v)| {
                    v.as_plain_string()
                        .map(|v| (k.clone(), v))
                        .ok_or_else(|| Self::wrong_type(column, "map<text, text>", v))
                })
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Some),
            Some(other) => Err(Self::wrong_type(column, "map<text, text>", other)),
        }
    }

    /// 2.x stores maps as JSON objects inside a text column.
    pub fn get_json_map(&self, column: &str) -> Result<Option<BTreeMap<String, String>>, RowError> {
        let Some(raw) = self.get_string(column)? else {
            return Ok(None);
        };
        let parsed: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(raw).map_err(|e| Self::invalid(column, e.to_string()))?;
        Ok(Some(
            parsed
                .into_iter()
                .map(|(k, v)| {
                    let v = match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (k, v)
                })
                .collect(),
        ))
    }

    /// 2.x also stores some lists (argument names of user types) as JSON arrays.
    pub fn get_json_or_list(&self, column: &str) -> Result<Option<Vec<String>>, RowError> {
        match self.get(column) {
            Some(CqlValue::Text(raw)) => serde_json::from_str::<Vec<String>>(raw)
                .map(Some)
                .map_err(|e| Self::invalid(column, e.to_string())),
            _ => self.get_string_list(column),
        }
    }
}

/// Turn an absent value into [`RowError::Missing`].
pub fn required<T>(column: &str, value: Result<Option<T>, RowError>) -> Result<T, RowError> {
    value?.ok_or_else(|| RowError::Missing {
        column: column.to_string(),
    })
}

pub(crate) fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

/// A category rejected because at least one row lacked an identity column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedCategory {
    pub category: SchemaCategory,
    pub reason: String,
}

/// Rows of one keyspace, split by category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyspaceRows {
    pub tables: Vec<Row>,
    pub columns: Vec<Row>,
    pub indexes: Vec<Row>,
    pub views: Vec<Row>,
    pub types: Vec<Row>,
    pub functions: Vec<Row>,
    pub aggregates: Vec<Row>,
    pub virtual_tables: Vec<Row>,
    pub virtual_columns: Vec<Row>,
}

impl KeyspaceRows {
    fn rows_mut(&mut self, category: SchemaCategory) -> Option<&mut Vec<Row>> {
        match category {
            SchemaCategory::Tables => Some(&mut self.tables),
            SchemaCategory::Columns => Some(&mut self.columns),
            SchemaCategory::Indexes => Some(&mut self.indexes),
            SchemaCategory::Views => Some(&mut self.views),
            SchemaCategory::Types => Some(&mut self.types),
            SchemaCategory::Functions => Some(&mut self.functions),
            SchemaCategory::Aggregates => Some(&mut self.aggregates),
            SchemaCategory::VirtualTables => Some(&mut self.virtual_tables),
            SchemaCategory::VirtualColumns => Some(&mut self.virtual_columns),
            SchemaCategory::Keyspaces | SchemaCategory::VirtualKeyspaces => None,
        }
    }
}

/// Every row returned by one refresh's schema queries.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSchemaRows {
    node: String,
    version: Version,
    family: SchemaFamily,
    keyspaces: Vec<Row>,
    virtual_keyspaces: Vec<Row>,
    per_keyspace: BTreeMap<String, KeyspaceRows>,
    received: BTreeSet<SchemaCategory>,
    malformed: Vec<MalformedCategory>,
}

impl RawSchemaRows {
    pub fn builder(node: &str, version: Version, family: SchemaFamily) -> RawSchemaRowsBuilder {
        RawSchemaRowsBuilder {
            rows: RawSchemaRows {
                node: node.to_string(),
                version,
                family,
                keyspaces: Vec::new(),
                virtual_keyspaces: Vec::new(),
                per_keyspace: BTreeMap::new(),
                received: BTreeSet::new(),
                malformed: Vec::new(),
            },
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

    pub fn keyspaces(&self) -> &[Row] {
        &self.keyspaces
    }

    pub fn virtual_keyspaces(&self) -> &[Row] {
        &self.virtual_keyspaces
    }

    pub fn keyspace(&self, name: &str) -> Option<&KeyspaceRows> {
        self.per_keyspace.get(name)
    }

    pub fn received(&self) -> &BTreeSet<SchemaCategory> {
        &self.received
    }

    pub fn malformed(&self) -> &[MalformedCategory] {
        &self.malformed
    }

    pub fn is_malformed(&self, category: SchemaCategory) -> bool {
        self.malformed.iter().any(|m| m.category == category)
    }
}

/// Collects query results one category at a time, in whatever order they complete.
#[derive(Debug)]
pub struct RawSchemaRowsBuilder {
    rows: RawSchemaRows,
}

impl RawSchemaRowsBuilder {
    pub fn add(&mut self, category: SchemaCategory, rows: Vec<Row>) -> &mut Self {
        self.rows.received.insert(category);

        // 1) every row must carry its identity columns, otherwise drop the whole category
        let identity = category.identity_columns(self.rows.family);
        let offender = rows.iter().enumerate().find_map(|(idx, row)| {
            identity
                .iter()
                .find(|col| !matches!(row.get(col), Some(CqlValue::Text(_))))
                .map(|col| (idx, *col))
        });
        if let Some((idx, column)) = offender {
            let reason = format!("row #{} has no `{}`", idx, column);
            warn!(node = %self.rows.node, %category, %reason, "dropping malformed schema category");
            self.rows.malformed.push(MalformedCategory { category, reason });
            return self;
        }

        debug!(node = %self.rows.node, %category, rows = rows.len(), "received schema rows");

        // 2) group by keyspace
        match category {
            SchemaCategory::Keyspaces => self.rows.keyspaces.extend(rows),
            SchemaCategory::VirtualKeyspaces => self.rows.virtual_keyspaces.extend(rows),
            _ => {
                for row in rows {
                    let keyspace = match row.get("keyspace_name") {
                        Some(CqlValue::Text(ks)) => ks.clone(),
                        _ => continue,
                    };
                    if let Some(bucket) = self
                        .rows
                        .per_keyspace
                        .entry(keyspace)
                        .or_default()
                        .rows_mut(category)
                    {
                        bucket.push(row);
                    }
                }
            }
        }
        self
    }

    pub fn has_received(&self, category: SchemaCategory) -> bool {
        self.rows.received.contains(&category)
    }

    pub fn build(self) -> RawSchemaRows {
        self.rows
    }
}
