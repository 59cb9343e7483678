// src/test_util.rs

//! System table fixtures shared by the unit tests.

use std::collections::BTreeMap;
use tracing_subscriber::EnvFilter;

use crate::{
    channel::MemoryChannel,
    family::SchemaFamily,
    rows::{CqlValue, RawSchemaRows, Row},
    version::Version,
};

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

fn list(items: &[&str]) -> CqlValue {
    CqlValue::List(items.iter().map(|s| (*s).into()).collect())
}

fn map(entries: &[(&str, &str)]) -> CqlValue {
    CqlValue::Map(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), (*v).into()))
            .collect(),
    )
}

pub fn simple_replication() -> CqlValue {
    map(&[
        ("class", "org.apache.cassandra.locator.SimpleStrategy"),
        ("replication_factor", "1"),
    ])
}

pub fn keyspace_row(family: SchemaFamily, name: &str) -> Row {
    let row = Row::new()
        .with("keyspace_name", name)
        .with("durable_writes", true);
    if family.is_legacy() {
        row.with("strategy_class", "org.apache.cassandra.locator.SimpleStrategy")
            .with("strategy_options", r#"{"replication_factor":"1"}"#)
    } else {
        row.with("replication", simple_replication())
    }
}

/// A 3.x `system_schema.tables` row with the usual option columns.
pub fn table_row(keyspace: &str, name: &str) -> Row {
    Row::new()
        .with("keyspace_name", keyspace)
        .with("table_name", name)
        .with("id", "5bc52802-de25-35ed-aeab-188eecebb090")
        .with("flags", list(&["compound"]))
        .with("bloom_filter_fp_chance", 0.01)
        .with("caching", map(&[("keys", "ALL"), ("rows_per_partition", "NONE")]))
        .with("comment", "")
        .with(
            "compaction",
            map(&[
                ("class", "org.apache.cassandra.db.compaction.SizeTieredCompactionStrategy"),
                ("max_threshold", "32"),
                ("min_threshold", "4"),
            ]),
        )
        .with(
            "compression",
            map(&[
                ("chunk_length_in_kb", "64"),
                ("class", "org.apache.cassandra.io.compress.LZ4Compressor"),
            ]),
        )
        .with("crc_check_chance", 1.0)
        .with("dclocal_read_repair_chance", 0.1)
        .with("read_repair_chance", 0.0)
        .with("default_time_to_live", 0)
        .with("gc_grace_seconds", 864000)
        .with("min_index_interval", 128)
        .with("max_index_interval", 2048)
        .with("memtable_flush_period_in_ms", 0)
        .with("speculative_retry", "99PERCENTILE")
}

pub fn column_row(
    keyspace: &str,
    table: &str,
    name: &str,
    kind: &str,
    position: i32,
    data_type: &str,
) -> Row {
    Row::new()
        .with("keyspace_name", keyspace)
        .with("table_name", table)
        .with("column_name", name)
        .with("kind", kind)
        .with("position", position)
        .with("clustering_order", "none")
        .with("type", data_type)
}

/// A 2.x `system.schema_columns` row in keyspace `ks`.
pub fn legacy_column_row(
    table: &str,
    name: &str,
    kind: &str,
    component_index: Option<i32>,
    validator: &str,
) -> Row {
    Row::new()
        .with("keyspace_name", "ks")
        .with("columnfamily_name", table)
        .with("column_name", name)
        .with("type", kind)
        .with(
            "component_index",
            component_index.map_or(CqlValue::Null, CqlValue::from),
        )
        .with("validator", validator)
}

/// Every 3.x system table, keyed by its qualified name.
///
/// Keyspace `ks` holds a `users` table with an index, a view over it, a user type, a
/// function and an aggregate.
pub fn cassandra3_tables() -> BTreeMap<String, Vec<Row>> {
    let mut tables = BTreeMap::new();
    tables.insert(
        "system_schema.keyspaces".to_string(),
        vec![keyspace_row(SchemaFamily::Cassandra3, "ks")],
    );
    tables.insert(
        "system_schema.tables".to_string(),
        vec![table_row("ks", "users")],
    );
    tables.insert(
        "system_schema.columns".to_string(),
        vec![
            column_row("ks", "users", "id", "partition_key", 0, "uuid"),
            column_row("ks", "users", "email", "regular", -1, "text"),
            column_row("ks", "users", "home", "regular", -1, "frozen<address>"),
            column_row("ks", "users_by_email", "email", "partition_key", 0, "text"),
            column_row("ks", "users_by_email", "id", "clustering", 0, "uuid")
                .with("clustering_order", "asc"),
        ],
    );
    let mut index_options = BTreeMap::new();
    index_options.insert("target".to_string(), CqlValue::from("email"));
    tables.insert(
        "system_schema.indexes".to_string(),
        vec![Row::new()
            .with("keyspace_name", "ks")
            .with("table_name", "users")
            .with("index_name", "users_email_idx")
            .with("kind", "COMPOSITES")
            .with("options", CqlValue::Map(index_options))],
    );
    tables.insert(
        "system_schema.views".to_string(),
        vec![table_row("ks", "users")
            .with("view_name", "users_by_email")
            .with("base_table_name", "users")
            .with("include_all_columns", false)
            .with("where_clause", "email IS NOT NULL AND id IS NOT NULL")],
    );
    tables.insert(
        "system_schema.types".to_string(),
        vec![Row::new()
            .with("keyspace_name", "ks")
            .with("type_name", "address")
            .with("field_names", list(&["street", "zip"]))
            .with("field_types", list(&["text", "int"]))],
    );
    tables.insert(
        "system_schema.functions".to_string(),
        vec![Row::new()
            .with("keyspace_name", "ks")
            .with("function_name", "plus")
            .with("argument_names", list(&["a", "b"]))
            .with("argument_types", list(&["int", "int"]))
            .with("return_type", "int")
            .with("language", "java")
            .with("body", "return a+b;")
            .with("called_on_null_input", false)],
    );
    tables.insert(
        "system_schema.aggregates".to_string(),
        vec![Row::new()
            .with("keyspace_name", "ks")
            .with("aggregate_name", "total")
            .with("argument_types", list(&["int"]))
            .with("state_func", "plus")
            .with("state_type", "int")
            .with("return_type", "int")
            .with("initcond", "0")],
    );
    tables
}

/// The 4.x tables: everything 3.x has plus one virtual keyspace.
pub fn cassandra4_tables() -> BTreeMap<String, Vec<Row>> {
    let mut tables = cassandra3_tables();
    for row in tables
        .get_mut("system_schema.tables")
        .into_iter()
        .flatten()
    {
        row.insert("read_repair", "BLOCKING");
        row.insert("additional_write_policy", "99p");
        row.insert("cdc", false);
    }
    tables.insert(
        "system_virtual_schema.keyspaces".to_string(),
        vec![Row::new().with("keyspace_name", "system_views")],
    );
    tables.insert(
        "system_virtual_schema.tables".to_string(),
        vec![Row::new()
            .with("keyspace_name", "system_views")
            .with("table_name", "clients")
            .with("comment", "currently connected clients")],
    );
    tables.insert(
        "system_virtual_schema.columns".to_string(),
        vec![
            column_row("system_views", "clients", "address", "partition_key", 0, "inet"),
            column_row("system_views", "clients", "port", "clustering", 0, "int"),
            column_row("system_views", "clients", "username", "regular", -1, "text"),
        ],
    );
    tables
}

/// Every 2.x system table. Keyspace `ks` holds a `users` table.
pub fn legacy_tables(family: SchemaFamily) -> BTreeMap<String, Vec<Row>> {
    const UTF8: &str = "org.apache.cassandra.db.marshal.UTF8Type";
    const UUID: &str = "org.apache.cassandra.db.marshal.UUIDType";
    const INT: &str = "org.apache.cassandra.db.marshal.Int32Type";

    let mut tables = BTreeMap::new();
    tables.insert(
        "system.schema_keyspaces".to_string(),
        vec![keyspace_row(family, "ks")],
    );
    tables.insert(
        "system.schema_columnfamilies".to_string(),
        vec![Row::new()
            .with("keyspace_name", "ks")
            .with("columnfamily_name", "users")
            .with("cf_id", "5bc52802-de25-35ed-aeab-188eecebb090")
            .with("is_dense", false)
            .with(
                "comparator",
                format!("org.apache.cassandra.db.marshal.CompositeType({})", UTF8),
            )
            .with("bloom_filter_fp_chance", 0.01)
            .with("caching", r#"{"keys":"ALL", "rows_per_partition":"NONE"}"#)
            .with("comment", "")
            .with(
                "compaction_strategy_class",
                "org.apache.cassandra.db.compaction.SizeTieredCompactionStrategy",
            )
            .with("compaction_strategy_options", "{}")
            .with(
                "compression_parameters",
                r#"{"sstable_compression":"org.apache.cassandra.io.compress.LZ4Compressor"}"#,
            )
            .with("local_read_repair_chance", 0.1)
            .with("read_repair_chance", 0.0)
            .with("default_time_to_live", 0)
            .with("gc_grace_seconds", 864000)
            .with("min_index_interval", 128)
            .with("max_index_interval", 2048)
            .with("memtable_flush_period_in_ms", 0)
            .with("speculative_retry", "99.0PERCENTILE")],
    );
    tables.insert(
        "system.schema_columns".to_string(),
        vec![
            legacy_column_row("users", "id", "partition_key", None, UUID),
            legacy_column_row("users", "email", "regular", Some(0), UTF8),
            legacy_column_row("users", "visits", "regular", Some(0), INT),
        ],
    );
    tables.insert(
        "system.schema_usertypes".to_string(),
        vec![Row::new()
            .with("keyspace_name", "ks")
            .with("type_name", "address")
            .with("field_names", list(&["street", "zip"]))
            .with("field_types", list(&[UTF8, INT]))],
    );
    if family == SchemaFamily::Cassandra22 {
        tables.insert(
            "system.schema_functions".to_string(),
            vec![Row::new()
                .with("keyspace_name", "ks")
                .with("function_name", "plus")
                .with("signature", list(&["int", "int"]))
                .with("argument_names", list(&["a", "b"]))
                .with("argument_types", list(&[INT, INT]))
                .with("return_type", INT)
                .with("language", "java")
                .with("body", "return a+b;")
                .with("called_on_null_input", false)],
        );
        tables.insert(
            "system.schema_aggregates".to_string(),
            vec![Row::new()
                .with("keyspace_name", "ks")
                .with("aggregate_name", "total")
                .with("signature", list(&["int"]))
                .with("argument_types", list(&[INT]))
                .with("state_func", "plus")
                .with("state_type", INT)
                .with("return_type", INT)
                .with("initcond", "0x00000000")],
        );
    }
    tables
}

fn tables_for(family: SchemaFamily) -> BTreeMap<String, Vec<Row>> {
    match family {
        SchemaFamily::Cassandra21 | SchemaFamily::Cassandra22 => legacy_tables(family),
        SchemaFamily::Cassandra3 => cassandra3_tables(),
        SchemaFamily::Cassandra4 => cassandra4_tables(),
    }
}

/// Collect fixture tables the way a refresh would, without a channel.
pub fn collect(
    family: SchemaFamily,
    version: Version,
    tables: BTreeMap<String, Vec<Row>>,
) -> RawSchemaRows {
    let mut builder = RawSchemaRows::builder("node1", version, family);
    for (category, table) in family.profile().tables {
        builder.add(*category, tables.get(*table).cloned().unwrap_or_default());
    }
    builder.build()
}

pub fn cassandra3_rows(version: Version) -> RawSchemaRows {
    collect(SchemaFamily::Cassandra3, version, cassandra3_tables())
}

pub fn cassandra4_rows(version: Version) -> RawSchemaRows {
    collect(SchemaFamily::Cassandra4, version, cassandra4_tables())
}

pub fn legacy_rows(family: SchemaFamily, version: Version) -> RawSchemaRows {
    collect(family, version, legacy_tables(family))
}

pub fn channel_for(family: SchemaFamily) -> MemoryChannel {
    let channel = MemoryChannel::new();
    for (table, rows) in tables_for(family) {
        channel.set_table(&table, rows);
    }
    channel
}

pub fn cassandra3_channel() -> MemoryChannel {
    channel_for(SchemaFamily::Cassandra3)
}
