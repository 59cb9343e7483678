// src/family.rs

use serde::Serialize;
use std::fmt;

use crate::{
    error::{Result, SchemaError},
    rows::SchemaCategory,
    version::Version,
};

/// DSE 6.x reports `4.0.0.<build>` where `<build>` is either a raw build counter
/// (`2284`, `2349`) or its own release number with the dots removed (`602`, `680`).
const VENDOR_BUILDS: std::ops::RangeInclusive<u32> = 100..=9999;

/// The groups of server releases that share one system-table layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SchemaFamily {
    Cassandra21,
    Cassandra22,
    Cassandra3,
    Cassandra4,
}

/// Per-family behaviour, looked up from [`SchemaFamily::profile`].
#[derive(Debug)]
pub struct FamilyProfile {
    pub family: SchemaFamily,
    /// Column holding the table name in table, column and index rows.
    pub table_name_column: &'static str,
    /// 2.x stores types as marshal class names instead of CQL type strings.
    pub class_name_types: bool,
    /// Indexes are sub-columns of `system.schema_columns` instead of a table of their own.
    pub indexes_on_columns: bool,
    /// Every `(category, system table)` pair a refresh queries, in issue order.
    pub tables: &'static [(SchemaCategory, &'static str)],
}

static CASSANDRA_21: FamilyProfile = FamilyProfile {
    family: SchemaFamily::Cassandra21,
    table_name_column: "columnfamily_name",
    class_name_types: true,
    indexes_on_columns: true,
    tables: &[
        (SchemaCategory::Keyspaces, "system.schema_keyspaces"),
        (SchemaCategory::Tables, "system.schema_columnfamilies"),
        (SchemaCategory::Columns, "system.schema_columns"),
        (SchemaCategory::Types, "system.schema_usertypes"),
    ],
};

static CASSANDRA_22: FamilyProfile = FamilyProfile {
    family: SchemaFamily::Cassandra22,
    table_name_column: "columnfamily_name",
    class_name_types: true,
    indexes_on_columns: true,
    tables: &[
        (SchemaCategory::Keyspaces, "system.schema_keyspaces"),
        (SchemaCategory::Tables, "system.schema_columnfamilies"),
        (SchemaCategory::Columns, "system.schema_columns"),
        (SchemaCategory::Types, "system.schema_usertypes"),
        (SchemaCategory::Functions, "system.schema_functions"),
        (SchemaCategory::Aggregates, "system.schema_aggregates"),
    ],
};

static CASSANDRA_3: FamilyProfile = FamilyProfile {
    family: SchemaFamily::Cassandra3,
    table_name_column: "table_name",
    class_name_types: false,
    indexes_on_columns: false,
    tables: &[
        (SchemaCategory::Keyspaces, "system_schema.keyspaces"),
        (SchemaCategory::Tables, "system_schema.tables"),
        (SchemaCategory::Columns, "system_schema.columns"),
        (SchemaCategory::Indexes, "system_schema.indexes"),
        (SchemaCategory::Views, "system_schema.views"),
        (SchemaCategory::Types, "system_schema.types"),
        (SchemaCategory::Functions, "system_schema.functions"),
        (SchemaCategory::Aggregates, "system_schema.aggregates"),
    ],
};

static CASSANDRA_4: FamilyProfile = FamilyProfile {
    family: SchemaFamily::Cassandra4,
    table_name_column: "table_name",
    class_name_types: false,
    indexes_on_columns: false,
    tables: &[
        (SchemaCategory::Keyspaces, "system_schema.keyspaces"),
        (SchemaCategory::Tables, "system_schema.tables"),
        (SchemaCategory::Columns, "system_schema.columns"),
        (SchemaCategory::Indexes, "system_schema.indexes"),
        (SchemaCategory::Views, "system_schema.views"),
        (SchemaCategory::Types, "system_schema.types"),
        (SchemaCategory::Functions, "system_schema.functions"),
        (SchemaCategory::Aggregates, "system_schema.aggregates"),
        (
            SchemaCategory::VirtualKeyspaces,
            "system_virtual_schema.keyspaces",
        ),
        (SchemaCategory::VirtualTables, "system_virtual_schema.tables"),
        (SchemaCategory::VirtualColumns, "system_virtual_schema.columns"),
    ],
};

impl SchemaFamily {
    /// Pick the family for a node's release version.
    ///
    /// Pre-release labels are ignored. `node` is only used for the error message.
    pub fn for_version(node: &str, version: &Version) -> Result<Self> {
        let family = match (version.major(), version.minor()) {
            (2, 1) => SchemaFamily::Cassandra21,
            // 2.3 was never released but older drivers treated it as 2.2
            (2, minor) if minor >= 2 => SchemaFamily::Cassandra22,
            (3, _) => SchemaFamily::Cassandra3,
            (4, 0) if version.patch() == 0 && Self::is_vendor_build(version) => {
                SchemaFamily::Cassandra3
            }
            (major, _) if major >= 4 => SchemaFamily::Cassandra4,
            _ => {
                return Err(SchemaError::UnsupportedVersion {
                    node: node.to_string(),
                    version: version.clone(),
                })
            }
        };
        Ok(family)
    }

    /// `4.0.0.<build>` reported by the vendor fork, which kept the 3.x schema tables.
    pub fn is_vendor_build(version: &Version) -> bool {
        version.major() == 4
            && version.minor() == 0
            && version
                .build()
                .map_or(false, |build| VENDOR_BUILDS.contains(&build))
    }

    pub fn profile(self) -> &'static FamilyProfile {
        match self {
            SchemaFamily::Cassandra21 => &CASSANDRA_21,
            SchemaFamily::Cassandra22 => &CASSANDRA_22,
            SchemaFamily::Cassandra3 => &CASSANDRA_3,
            SchemaFamily::Cassandra4 => &CASSANDRA_4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SchemaFamily::Cassandra21 => "2.1",
            SchemaFamily::Cassandra22 => "2.2",
            SchemaFamily::Cassandra3 => "3.x",
            SchemaFamily::Cassandra4 => "4.x",
        }
    }

    pub fn is_legacy(self) -> bool {
        matches!(self, SchemaFamily::Cassandra21 | SchemaFamily::Cassandra22)
    }
}

impl fmt::Display for SchemaFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
