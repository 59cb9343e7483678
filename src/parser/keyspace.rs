// src/parser/keyspace.rs

use crate::{
    cql::{format_double, quote_string},
    metadata::{Aggregate, DataType, Function, Keyspace, NativeType, UserType},
    rows::{required, KeyspaceRows, Row, RowError, SchemaCategory},
};

use super::{table, ParseRun};

pub(crate) fn parse_keyspace(run: &mut ParseRun<'_>, row: &Row) -> Option<Keyspace> {
    match read_keyspace(run, row) {
        Ok(keyspace) => Some(keyspace),
        Err(e) => {
            let name = row.get_string("keyspace_name").ok().flatten();
            run.warn(SchemaCategory::Keyspaces, name, None, e.to_string());
            None
        }
    }
}

fn read_keyspace(run: &ParseRun<'_>, row: &Row) -> Result<Keyspace, RowError> {
    let name = run.name(row, "keyspace_name")?;
    let replication = if run.family.is_legacy() {
        // 2.x: strategy_class + JSON strategy_options
        let class = required("strategy_class", row.get_string("strategy_class"))?;
        let mut replication = row
            .get_json_map("strategy_options")?
            .unwrap_or_default();
        replication.insert("class".to_string(), class.to_string());
        replication
    } else {
        required("replication", row.get_string_map("replication"))?
    };

    let mut keyspace = Keyspace::empty(name);
    keyspace.durable_writes = row.get_bool("durable_writes")?.unwrap_or(true);
    keyspace.replication = replication;
    Ok(keyspace)
}

/// Virtual keyspaces only have a name.
pub(crate) fn parse_virtual_keyspace(row: &Row) -> Option<Keyspace> {
    let name = row.get_string("keyspace_name").ok().flatten()?;
    let mut keyspace = Keyspace::empty(name);
    keyspace.virtual_keyspace = true;
    keyspace.durable_writes = false;
    Some(keyspace)
}

/// Attach every child object found in `rows` to `keyspace`.
pub(crate) fn populate(run: &mut ParseRun<'_>, keyspace: &mut Keyspace, rows: &KeyspaceRows) {
    for row in &rows.types {
        if let Some(udt) = parse_or_warn(
            run,
            SchemaCategory::Types,
            keyspace,
            row,
            "type_name",
            read_user_type,
        ) {
            keyspace.user_types.insert(udt.name.clone(), udt);
        }
    }

    table::populate(run, keyspace, rows);

    for row in &rows.functions {
        if let Some(function) = parse_or_warn(
            run,
            SchemaCategory::Functions,
            keyspace,
            row,
            "function_name",
            read_function,
        ) {
            keyspace
                .functions
                .insert(function.signature().to_string(), function);
        }
    }
    for row in &rows.aggregates {
        if let Some(aggregate) = parse_or_warn(
            run,
            SchemaCategory::Aggregates,
            keyspace,
            row,
            "aggregate_name",
            read_aggregate,
        ) {
            keyspace
                .aggregates
                .insert(aggregate.signature().to_string(), aggregate);
        }
    }
}

fn parse_or_warn<T>(
    run: &mut ParseRun<'_>,
    category: SchemaCategory,
    keyspace: &Keyspace,
    row: &Row,
    name_column: &str,
    read: impl FnOnce(&ParseRun<'_>, &str, &Row) -> Result<T, RowError>,
) -> Option<T> {
    match read(run, &keyspace.name, row) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            let object = row.get_string(name_column).ok().flatten();
            run.warn(category, Some(keyspace.name.as_str()), object, e.to_string());
            None
        }
    }
}

fn types_list(run: &ParseRun<'_>, row: &Row, column: &str) -> Result<Vec<DataType>, RowError> {
    run.string_list(row, column)?
        .iter()
        .map(|raw| run.data_type(raw))
        .collect()
}

fn read_user_type(run: &ParseRun<'_>, keyspace: &str, row: &Row) -> Result<UserType, RowError> {
    let name = run.name(row, "type_name")?;
    let field_names = run.string_list(row, "field_names")?;
    let field_types = types_list(run, row, "field_types")?;
    if field_names.len() != field_types.len() {
        return Err(RowError::InvalidValue {
            column: "field_types".to_string(),
            reason: format!(
                "{} field names but {} field types",
                field_names.len(),
                field_types.len()
            ),
        });
    }
    Ok(UserType {
        name: name.to_string(),
        keyspace: keyspace.to_string(),
        fields: field_names.into_iter().zip(field_types).collect(),
    })
}

fn read_function(run: &ParseRun<'_>, keyspace: &str, row: &Row) -> Result<Function, RowError> {
    let name = run.name(row, "function_name")?;
    let argument_names = run.string_list(row, "argument_names").or_else(|e| match e {
        // functions without arguments may report null
        RowError::Missing { .. } => Ok(Vec::new()),
        e => Err(e),
    })?;
    let argument_types = if argument_names.is_empty() {
        Vec::new()
    } else {
        types_list(run, row, "argument_types")?
    };
    if argument_names.len() != argument_types.len() {
        return Err(RowError::InvalidValue {
            column: "argument_types".to_string(),
            reason: "argument names and types differ in length".to_string(),
        });
    }
    let return_type = run.data_type(required("return_type", row.get_string("return_type"))?)?;

    Ok(Function {
        name: name.to_string(),
        keyspace: keyspace.to_string(),
        arguments: argument_names.into_iter().zip(argument_types).collect(),
        return_type,
        language: required("language", row.get_string("language"))?.to_string(),
        body: required("body", row.get_string("body"))?.to_string(),
        called_on_null_input: required(
            "called_on_null_input",
            row.get_bool("called_on_null_input"),
        )?,
    })
}

fn read_aggregate(run: &ParseRun<'_>, keyspace: &str, row: &Row) -> Result<Aggregate, RowError> {
    let name = run.name(row, "aggregate_name")?;
    let argument_types = match row.get("argument_types") {
        None => Vec::new(),
        Some(_) => types_list(run, row, "argument_types")?,
    };
    let state_type = run.data_type(required("state_type", row.get_string("state_type"))?)?;
    let return_type = run.data_type(required("return_type", row.get_string("return_type"))?)?;

    // 3.x stores the initial condition as a CQL literal, 2.2 as the serialized value
    let initial_condition = if run.family.is_legacy() {
        row.get_blob("initcond")?
            .map(|bytes| format_serialized(&state_type, &bytes))
    } else {
        row.get_string("initcond")?.map(str::to_string)
    };

    Ok(Aggregate {
        name: name.to_string(),
        keyspace: keyspace.to_string(),
        argument_types,
        state_function: required("state_func", row.get_string("state_func"))?.to_string(),
        state_type,
        final_function: row.get_string("final_func")?.map(str::to_string),
        initial_condition,
        return_type,
    })
}

/// Render a serialized value of `data_type` as a CQL literal; anything not handled
/// here becomes a blob literal.
fn format_serialized(data_type: &DataType, bytes: &[u8]) -> String {
    let native = match data_type {
        DataType::Native(native) => *native,
        _ => return blob_literal(bytes),
    };
    match (native, bytes.len()) {
        (NativeType::Int, 4) => {
            i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]).to_string()
        }
        (NativeType::BigInt | NativeType::Counter, 8) => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            i64::from_be_bytes(buf).to_string()
        }
        (NativeType::Double, 8) => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            format_double(f64::from_be_bytes(buf))
        }
        (NativeType::Boolean, 1) => (bytes[0] != 0).to_string(),
        (NativeType::Text | NativeType::Ascii, _) => match std::str::from_utf8(bytes) {
            Ok(s) => quote_string(s),
            Err(_) => blob_literal(bytes),
        },
        _ => blob_literal(bytes),
    }
}

fn blob_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
