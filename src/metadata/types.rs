// src/metadata/types.rs

use serde::Serialize;
use std::fmt;

use crate::cql::quote_if_necessary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeType {
    Ascii,
    BigInt,
    Blob,
    Boolean,
    Counter,
    Date,
    Decimal,
    Double,
    Duration,
    Float,
    Inet,
    Int,
    SmallInt,
    Text,
    Time,
    Timestamp,
    TimeUuid,
    TinyInt,
    Uuid,
    Varint,
}

impl NativeType {
    pub fn from_cql_name(name: &str) -> Option<Self> {
        let native = match name.to_ascii_lowercase().as_str() {
            "ascii" => NativeType::Ascii,
            "bigint" => NativeType::BigInt,
            "blob" => NativeType::Blob,
            "boolean" => NativeType::Boolean,
            "counter" => NativeType::Counter,
            "date" => NativeType::Date,
            "decimal" => NativeType::Decimal,
            "double" => NativeType::Double,
            "duration" => NativeType::Duration,
            "float" => NativeType::Float,
            "inet" => NativeType::Inet,
            "int" => NativeType::Int,
            "smallint" => NativeType::SmallInt,
            "text" | "varchar" => NativeType::Text,
            "time" => NativeType::Time,
            "timestamp" => NativeType::Timestamp,
            "timeuuid" => NativeType::TimeUuid,
            "tinyint" => NativeType::TinyInt,
            "uuid" => NativeType::Uuid,
            "varint" => NativeType::Varint,
            _ => return None,
        };
        Some(native)
    }

    pub fn cql_name(&self) -> &'static str {
        match self {
            NativeType::Ascii => "ascii",
            NativeType::BigInt => "bigint",
            NativeType::Blob => "blob",
            NativeType::Boolean => "boolean",
            NativeType::Counter => "counter",
            NativeType::Date => "date",
            NativeType::Decimal => "decimal",
            NativeType::Double => "double",
            NativeType::Duration => "duration",
            NativeType::Float => "float",
            NativeType::Inet => "inet",
            NativeType::Int => "int",
            NativeType::SmallInt => "smallint",
            NativeType::Text => "text",
            NativeType::Time => "time",
            NativeType::Timestamp => "timestamp",
            NativeType::TimeUuid => "timeuuid",
            NativeType::TinyInt => "tinyint",
            NativeType::Uuid => "uuid",
            NativeType::Varint => "varint",
        }
    }
}

/// The type of a column, a UDT field, or a function argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Native(NativeType),
    List {
        element: Box<DataType>,
        frozen: bool,
    },
    Set {
        element: Box<DataType>,
        frozen: bool,
    },
    Map {
        key: Box<DataType>,
        value: Box<DataType>,
        frozen: bool,
    },
    /// Tuples are always frozen.
    Tuple(Vec<DataType>),
    Vector {
        element: Box<DataType>,
        dimensions: u32,
    },
    /// Resolved by name inside the owning keyspace.
    UserDefined { name: String, frozen: bool },
    /// A server-side class with no CQL name.
    Custom(String),
}

impl DataType {
    pub fn frozen(self) -> Self {
        match self {
            DataType::List { element, .. } => DataType::List {
                element,
                frozen: true,
            },
            DataType::Set { element, .. } => DataType::Set {
                element,
                frozen: true,
            },
            DataType::Map { key, value, .. } => DataType::Map {
                key,
                value,
                frozen: true,
            },
            DataType::UserDefined { name, .. } => DataType::UserDefined { name, frozen: true },
            other => other,
        }
    }

    /// Names of the user types this type refers to, in reading order.
    pub fn referenced_user_types(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_user_types(&mut out);
        out
    }

    fn collect_user_types<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            DataType::Native(_) | DataType::Custom(_) => {}
            DataType::List { element, .. }
            | DataType::Set { element, .. }
            | DataType::Vector { element, .. } => element.collect_user_types(out),
            DataType::Map { key, value, .. } => {
                key.collect_user_types(out);
                value.collect_user_types(out);
            }
            DataType::Tuple(items) => items.iter().for_each(|t| t.collect_user_types(out)),
            DataType::UserDefined { name, .. } => out.push(name),
        }
    }
}

fn write_frozen(
    f: &mut fmt::Formatter<'_>,
    frozen: bool,
    inner: impl FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result,
) -> fmt::Result {
    if frozen {
        f.write_str("frozen<")?;
        inner(f)?;
        f.write_str(">")
    } else {
        inner(f)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Native(native) => f.write_str(native.cql_name()),
            DataType::List { element, frozen } => {
                write_frozen(f, *frozen, |f| write!(f, "list<{}>", element))
            }
            DataType::Set { element, frozen } => {
                write_frozen(f, *frozen, |f| write!(f, "set<{}>", element))
            }
            DataType::Map { key, value, frozen } => {
                write_frozen(f, *frozen, |f| write!(f, "map<{}, {}>", key, value))
            }
            DataType::Tuple(items) => {
                f.write_str("frozen<tuple<")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(">>")
            }
            DataType::Vector {
                element,
                dimensions,
            } => write!(f, "vector<{}, {}>", element, dimensions),
            DataType::UserDefined { name, frozen } => {
                write_frozen(f, *frozen, |f| f.write_str(&quote_if_necessary(name)))
            }
            DataType::Custom(class) => write!(f, "'{}'", class.replace('\'', "''")),
        }
    }
}
