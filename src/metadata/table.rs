// src/metadata/table.rs

use serde::Serialize;
use std::{collections::BTreeMap, fmt};
use uuid::Uuid;

use super::{options::TableOptions, types::DataType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClusteringOrder {
    Asc,
    Desc,
}

impl ClusteringOrder {
    pub fn from_cql(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(ClusteringOrder::Asc),
            "desc" => Some(ClusteringOrder::Desc),
            // columns that are not clustering columns report "none"
            _ => None,
        }
    }
}

impl fmt::Display for ClusteringOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusteringOrder::Asc => f.write_str("ASC"),
            ClusteringOrder::Desc => f.write_str("DESC"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    PartitionKey,
    Clustering,
    Static,
    Regular,
}

impl ColumnKind {
    /// Accepts both the 3.x names and the 2.x ones (`partition_key`, `clustering_key`,
    /// `compact_value`).
    pub fn from_cql(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "partition_key" => Some(ColumnKind::PartitionKey),
            "clustering" | "clustering_key" => Some(ColumnKind::Clustering),
            "static" => Some(ColumnKind::Static),
            "regular" | "compact_value" => Some(ColumnKind::Regular),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub table: String,
    pub data_type: DataType,
    pub kind: ColumnKind,
    /// Position inside the partition or clustering key.
    pub position: Option<usize>,
    pub clustering_order: Option<ClusteringOrder>,
}

impl Column {
    pub fn is_static(&self) -> bool {
        self.kind == ColumnKind::Static
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexKind {
    Keys,
    Composites,
    Custom,
}

impl IndexKind {
    pub fn from_cql(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "KEYS" => Some(IndexKind::Keys),
            "COMPOSITES" => Some(IndexKind::Composites),
            "CUSTOM" => Some(IndexKind::Custom),
            _ => None,
        }
    }
}

/// A secondary index, owned by the table it indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Index {
    pub name: String,
    pub keyspace: String,
    pub table: String,
    pub kind: IndexKind,
    /// Indexed expression as it appears in `ON table (target)`.
    pub target: String,
    pub class_name: Option<String>,
    /// Options other than `target` and `class_name`.
    pub options: BTreeMap<String, String>,
}

impl Index {
    pub fn is_custom(&self) -> bool {
        self.kind == IndexKind::Custom || self.class_name.is_some()
    }
}

/// The key layout and columns shared by tables and materialized views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnLayout {
    pub partition_key: Vec<String>,
    pub clustering_key: Vec<String>,
    pub columns: BTreeMap<String, Column>,
}

impl ColumnLayout {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn partition_key_columns(&self) -> impl Iterator<Item = &Column> {
        self.partition_key
            .iter()
            .filter_map(|name| self.columns.get(name))
    }

    pub fn clustering_columns(&self) -> impl Iterator<Item = &Column> {
        self.clustering_key
            .iter()
            .filter_map(|name| self.columns.get(name))
    }

    /// Partition key, then clustering key, then everything else by name.
    pub fn ordered_columns(&self) -> Vec<&Column> {
        let mut out: Vec<&Column> = self.partition_key_columns().collect();
        out.extend(self.clustering_columns());
        out.extend(self.columns.values().filter(|c| {
            matches!(c.kind, ColumnKind::Static | ColumnKind::Regular)
        }));
        out
    }

    pub fn clustering_order(&self) -> Vec<(&str, ClusteringOrder)> {
        self.clustering_columns()
            .map(|c| {
                (
                    c.name.as_str(),
                    c.clustering_order.unwrap_or(ClusteringOrder::Asc),
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub keyspace: String,
    pub id: Option<Uuid>,
    #[serde(flatten)]
    pub layout: ColumnLayout,
    pub options: TableOptions,
    pub indexes: BTreeMap<String, Index>,
    pub compact_storage: bool,
    #[serde(rename = "virtual")]
    pub virtual_table: bool,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.layout.column(name)
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.get(name)
    }

    pub fn ordered_columns(&self) -> Vec<&Column> {
        self.layout.ordered_columns()
    }
}

/// A materialized view, owned by the keyspace of its base table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct View {
    pub name: String,
    pub keyspace: String,
    pub base_table: String,
    pub id: Option<Uuid>,
    pub include_all_columns: bool,
    pub where_clause: Option<String>,
    #[serde(flatten)]
    pub layout: ColumnLayout,
    pub options: TableOptions,
}

impl View {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.layout.column(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::types::NativeType;

    fn column(name: &str, kind: ColumnKind, position: Option<usize>) -> Column {
        Column {
            name: name.into(),
            table: "t".into(),
            data_type: DataType::Native(NativeType::Int),
            kind,
            position,
            clustering_order: None,
        }
    }

    #[test]
    fn test_ordered_columns() {
        let mut columns = BTreeMap::new();
        for c in [
            column("v", ColumnKind::Regular, None),
            column("b", ColumnKind::Clustering, Some(1)),
            column("s", ColumnKind::Static, None),
            column("k2", ColumnKind::PartitionKey, Some(1)),
            column("a", ColumnKind::Clustering, Some(0)),
            column("k1", ColumnKind::PartitionKey, Some(0)),
        ] {
            columns.insert(c.name.clone(), c);
        }
        let layout = ColumnLayout {
            partition_key: vec!["k1".into(), "k2".into()],
            clustering_key: vec!["a".into(), "b".into()],
            columns,
        };

        let names: Vec<_> = layout
            .ordered_columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, ["k1", "k2", "a", "b", "s", "v"]);
        assert_eq!(
            layout.clustering_order(),
            [("a", ClusteringOrder::Asc), ("b", ClusteringOrder::Asc)]
        );
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ColumnKind::from_cql("clustering_key"), Some(ColumnKind::Clustering));
        assert_eq!(ColumnKind::from_cql("compact_value"), Some(ColumnKind::Regular));
        assert_eq!(ColumnKind::from_cql("bogus"), None);
        assert_eq!(ClusteringOrder::from_cql("none"), None);
        assert_eq!(ClusteringOrder::from_cql("DESC"), Some(ClusteringOrder::Desc));
    }
}
