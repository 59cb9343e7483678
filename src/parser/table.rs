// src/parser/table.rs

use std::collections::BTreeMap;
use tracing::debug;

use crate::{
    metadata::{
        ClusteringOrder, Column, ColumnKind, ColumnLayout, DataType, Index, IndexKind, Keyspace,
        Table, View,
    },
    rows::{required, KeyspaceRows, Row, RowError, SchemaCategory},
};

use super::{types, ParseRun};

/// Column rows grouped by the table (or view) that owns them.
fn group_columns<'r>(rows: &'r [Row], owner_column: &str) -> BTreeMap<&'r str, Vec<&'r Row>> {
    let mut grouped: BTreeMap<&str, Vec<&Row>> = BTreeMap::new();
    for row in rows {
        if let Ok(Some(owner)) = row.get_string(owner_column) {
            grouped.entry(owner).or_default().push(row);
        }
    }
    grouped
}

/// A column, or `None` for compact-storage placeholders that are never shown.
fn read_column(run: &ParseRun<'_>, owner: &str, row: &Row) -> Result<Option<Column>, RowError> {
    let name = required("column_name", row.get_string("column_name"))?;
    let legacy = run.family.is_legacy();

    let (kind_column, type_column) = if legacy {
        ("type", "validator")
    } else {
        ("kind", "type")
    };
    let raw_kind = required(kind_column, row.get_string(kind_column))?;
    let kind = ColumnKind::from_cql(raw_kind).ok_or_else(|| RowError::InvalidValue {
        column: kind_column.to_string(),
        reason: format!("unknown column kind `{}`", raw_kind),
    })?;
    let raw_type = required(type_column, row.get_string(type_column))?;
    if name.is_empty() || types::is_empty_type(run.family, raw_type) {
        return Ok(None);
    }
    let data_type = run.data_type(raw_type)?;

    let keyed = matches!(kind, ColumnKind::PartitionKey | ColumnKind::Clustering);
    let position = if legacy {
        // a single-column key reports no component index
        row.get_i32("component_index")?
            .or(if keyed { Some(0) } else { None })
    } else {
        row.get_i32("position")?
    };
    let position = position
        .filter(|p| *p >= 0 && keyed)
        .map(|p| p as usize);

    let clustering_order = match kind {
        ColumnKind::Clustering if legacy => Some(if types::is_reversed_class(raw_type) {
            ClusteringOrder::Desc
        } else {
            ClusteringOrder::Asc
        }),
        ColumnKind::Clustering => Some(
            row.get_string("clustering_order")?
                .and_then(ClusteringOrder::from_cql)
                .unwrap_or(ClusteringOrder::Asc),
        ),
        _ => None,
    };

    Ok(Some(Column {
        name: name.to_string(),
        table: owner.to_string(),
        data_type,
        kind,
        position,
        clustering_order,
    }))
}

/// Parse every column of one table or view.
///
/// Unusable static or regular columns are skipped with a warning. An unusable key
/// column, or key positions that do not run 0, 1, 2... per kind, fail the whole layout.
fn build_layout(
    run: &mut ParseRun<'_>,
    keyspace: &str,
    owner: &str,
    rows: &[&Row],
) -> Result<ColumnLayout, String> {
    let mut columns = BTreeMap::new();
    let mut broken_key = None;
    for row in rows {
        match read_column(run, owner, row) {
            Ok(Some(column)) => {
                columns.insert(column.name.clone(), column);
            }
            Ok(None) => {}
            Err(e) => {
                let column = row.get_string("column_name").ok().flatten().unwrap_or("?");
                if broken_key.is_none() && is_key_row(run, row) {
                    broken_key = Some(format!("key column `{}` is unusable: {}", column, e));
                }
                run.warn(
                    SchemaCategory::Columns,
                    Some(keyspace),
                    Some(format!("{}.{}", owner, column).as_str()),
                    e.to_string(),
                );
            }
        }
    }
    if let Some(reason) = broken_key {
        return Err(reason);
    }

    let key = |kind: ColumnKind| -> Result<Vec<String>, String> {
        let mut keyed: Vec<&Column> = columns.values().filter(|c| c.kind == kind).collect();
        keyed.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.name.cmp(&b.name)));
        for (expected, column) in keyed.iter().enumerate() {
            if column.position != Some(expected) {
                return Err(format!(
                    "key column `{}` has position {:?}, expected {}",
                    column.name, column.position, expected
                ));
            }
        }
        Ok(keyed.into_iter().map(|c| c.name.clone()).collect())
    };
    let partition_key = key(ColumnKind::PartitionKey)?;
    let clustering_key = key(ColumnKind::Clustering)?;
    if partition_key.is_empty() {
        return Err("no partition key columns".to_string());
    }

    Ok(ColumnLayout {
        partition_key,
        clustering_key,
        columns,
    })
}

/// Whether a column row claims a primary key kind, whatever else is wrong with it.
fn is_key_row(run: &ParseRun<'_>, row: &Row) -> bool {
    let kind_column = if run.family.is_legacy() { "type" } else { "kind" };
    matches!(
        row.get_string(kind_column).ok().flatten().and_then(ColumnKind::from_cql),
        Some(ColumnKind::PartitionKey | ColumnKind::Clustering)
    )
}

fn is_compact_storage(run: &ParseRun<'_>, row: &Row) -> Result<bool, RowError> {
    if run.family.is_legacy() {
        let dense = row.get_bool("is_dense")?.unwrap_or(false);
        let composite = row
            .get_string("comparator")?
            .map_or(true, types::is_composite_comparator);
        Ok(dense || !composite)
    } else {
        Ok(match row.get_string_list("flags")? {
            Some(flags) => {
                let has = |flag: &str| flags.iter().any(|f| f.eq_ignore_ascii_case(flag));
                has("dense") || has("super") || !has("compound")
            }
            None => false,
        })
    }
}

fn read_table(
    run: &mut ParseRun<'_>,
    keyspace: &str,
    name: &str,
    row: &Row,
    columns: &[&Row],
) -> Result<Table, String> {
    let layout = build_layout(run, keyspace, name, columns)?;

    let id_column = if run.family.is_legacy() { "cf_id" } else { "id" };
    let id = row.get_uuid(id_column).unwrap_or_else(|e| {
        debug!(table = name, error = %e, "ignoring unreadable table id");
        None
    });
    let compact_storage = is_compact_storage(run, row).unwrap_or_else(|e| {
        debug!(table = name, error = %e, "ignoring unreadable table flags");
        false
    });

    Ok(Table {
        name: name.to_string(),
        keyspace: keyspace.to_string(),
        id,
        layout,
        options: run.options.table_options(row),
        indexes: BTreeMap::new(),
        compact_storage,
        virtual_table: false,
    })
}

/// Target of a 2.x index, rebuilt from the options stored on its column.
fn legacy_target(column: &Column, options: &BTreeMap<String, String>) -> String {
    let name = crate::cql::quote_if_necessary(&column.name);
    if options.contains_key("index_keys") {
        format!("keys({})", name)
    } else if options.contains_key("index_keys_and_values") {
        format!("entries({})", name)
    } else if matches!(
        column.data_type,
        DataType::List { frozen: true, .. }
            | DataType::Set { frozen: true, .. }
            | DataType::Map { frozen: true, .. }
    ) {
        format!("full({})", name)
    } else {
        name.into_owned()
    }
}

fn read_legacy_index(table: &Table, row: &Row) -> Result<Option<Index>, RowError> {
    let Some(name) = row.get_string("index_name")? else {
        return Ok(None);
    };
    let column_name = required("column_name", row.get_string("column_name"))?;
    let column = table.column(column_name).ok_or_else(|| RowError::InvalidValue {
        column: "column_name".to_string(),
        reason: format!("index on unknown column `{}`", column_name),
    })?;
    let raw_kind = required("index_type", row.get_string("index_type"))?;
    let kind = IndexKind::from_cql(raw_kind).ok_or_else(|| RowError::InvalidValue {
        column: "index_type".to_string(),
        reason: format!("unknown index type `{}`", raw_kind),
    })?;

    let mut options = row.get_json_map("index_options")?.unwrap_or_default();
    let target = legacy_target(column, &options);
    options.remove("index_keys");
    options.remove("index_keys_and_values");
    let class_name = options.remove("class_name");

    Ok(Some(Index {
        name: name.to_string(),
        keyspace: table.keyspace.clone(),
        table: table.name.clone(),
        kind,
        target,
        class_name,
        options,
    }))
}

fn read_index(keyspace: &str, row: &Row) -> Result<Index, RowError> {
    let table = required("table_name", row.get_string("table_name"))?;
    let name = required("index_name", row.get_string("index_name"))?;
    let raw_kind = required("kind", row.get_string("kind"))?;
    let kind = IndexKind::from_cql(raw_kind).ok_or_else(|| RowError::InvalidValue {
        column: "kind".to_string(),
        reason: format!("unknown index kind `{}`", raw_kind),
    })?;
    let mut options = row.get_string_map("options")?.unwrap_or_default();
    let target = options.remove("target").ok_or_else(|| RowError::Missing {
        column: "options.target".to_string(),
    })?;
    let class_name = options.remove("class_name");

    Ok(Index {
        name: name.to_string(),
        keyspace: keyspace.to_string(),
        table: table.to_string(),
        kind,
        target,
        class_name,
        options,
    })
}

fn read_view(
    run: &mut ParseRun<'_>,
    keyspace: &str,
    name: &str,
    row: &Row,
    columns: &[&Row],
) -> Result<View, RowError> {
    let base_table = required("base_table_name", row.get_string("base_table_name"))?;
    let layout = build_layout(run, keyspace, name, columns).map_err(|reason| {
        RowError::InvalidValue {
            column: "column_name".to_string(),
            reason,
        }
    })?;
    Ok(View {
        name: name.to_string(),
        keyspace: keyspace.to_string(),
        base_table: base_table.to_string(),
        id: row.get_uuid("id")?,
        include_all_columns: row.get_bool("include_all_columns")?.unwrap_or(false),
        where_clause: row.get_string("where_clause")?.map(str::to_string),
        layout,
        options: run.options.table_options(row),
    })
}

/// Tables with their columns and indexes, then views.
pub(crate) fn populate(run: &mut ParseRun<'_>, keyspace: &mut Keyspace, rows: &KeyspaceRows) {
    let table_column = run.profile.table_name_column;
    let columns = group_columns(&rows.columns, table_column);
    let ks_name = keyspace.name.clone();
    let ks = ks_name.as_str();

    for row in &rows.tables {
        let Ok(Some(name)) = row.get_string(table_column) else {
            continue;
        };
        let owned = columns.get(name).map(Vec::as_slice).unwrap_or_default();
        match read_table(run, ks, name, row, owned) {
            Ok(mut table) => {
                if run.profile.indexes_on_columns {
                    for column_row in owned {
                        match read_legacy_index(&table, column_row) {
                            Ok(Some(index)) => {
                                table.indexes.insert(index.name.clone(), index);
                            }
                            Ok(None) => {}
                            Err(e) => run.warn(
                                SchemaCategory::Indexes,
                                Some(ks),
                                Some(name),
                                e.to_string(),
                            ),
                        }
                    }
                }
                keyspace.tables.insert(table.name.clone(), table);
            }
            Err(reason) => run.warn(SchemaCategory::Tables, Some(ks), Some(name), reason),
        }
    }

    for row in &rows.indexes {
        let index = match read_index(ks, row) {
            Ok(index) => index,
            Err(e) => {
                let object = row.get_string("index_name").ok().flatten();
                run.warn(SchemaCategory::Indexes, Some(ks), object, e.to_string());
                continue;
            }
        };
        match keyspace.tables.get_mut(&index.table) {
            Some(table) => {
                table.indexes.insert(index.name.clone(), index);
            }
            None => {
                let message = format!("index on unknown table `{}`", index.table);
                run.warn(SchemaCategory::Indexes, Some(ks), Some(index.name.as_str()), message);
            }
        }
    }

    for row in &rows.views {
        let Ok(Some(name)) = row.get_string("view_name") else {
            continue;
        };
        let owned = columns.get(name).map(Vec::as_slice).unwrap_or_default();
        match read_view(run, ks, name, row, owned) {
            Ok(view) => {
                keyspace.views.insert(view.name.clone(), view);
            }
            Err(e) => run.warn(SchemaCategory::Views, Some(ks), Some(name), e.to_string()),
        }
    }
}

/// Virtual tables of a virtual keyspace.
pub(crate) fn populate_virtual(
    run: &mut ParseRun<'_>,
    keyspace: &mut Keyspace,
    rows: &KeyspaceRows,
) {
    let columns = group_columns(&rows.virtual_columns, "table_name");
    let ks_name = keyspace.name.clone();
    let ks = ks_name.as_str();

    for row in &rows.virtual_tables {
        let Ok(Some(name)) = row.get_string("table_name") else {
            continue;
        };
        let owned = columns.get(name).map(Vec::as_slice).unwrap_or_default();
        let layout = match build_layout(run, ks, name, owned) {
            Ok(layout) => layout,
            Err(reason) => {
                run.warn(SchemaCategory::VirtualTables, Some(ks), Some(name), reason);
                continue;
            }
        };
        let table = Table {
            name: name.to_string(),
            keyspace: ks.to_string(),
            id: None,
            layout,
            options: run.options.virtual_table_options(row),
            indexes: BTreeMap::new(),
            compact_storage: false,
            virtual_table: true,
        };
        keyspace.tables.insert(table.name.clone(), table);
    }
}
