// src/parser/types.rs

//! Column types as the system tables store them.
//!
//! 3.x and later store CQL type strings (`frozen<map<text, int>>`); 2.x stores
//! marshal class names (`org.apache.cassandra.db.marshal.MapType(...)`).

use crate::{
    family::SchemaFamily,
    metadata::{DataType, NativeType},
    rows::decode_hex,
};

const MARSHAL_PACKAGE: &str = "org.apache.cassandra.db.marshal.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot parse type `{input}`: {reason}")]
pub struct TypeParseError {
    pub input: String,
    pub reason: String,
}

/// Parse a stored type for the given family.
pub fn parse_type(family: SchemaFamily, raw: &str) -> Result<DataType, TypeParseError> {
    if family.profile().class_name_types {
        parse_class_name(raw, family)
    } else {
        parse_cql_type(raw)
    }
}

/// Compact-storage placeholder columns carry this type and are never shown.
pub fn is_empty_type(family: SchemaFamily, raw: &str) -> bool {
    if family.profile().class_name_types {
        raw.trim().trim_start_matches(MARSHAL_PACKAGE) == "EmptyType"
    } else {
        raw.trim().eq_ignore_ascii_case("empty")
    }
}

/// 2.x marks descending clustering columns by wrapping their type.
pub fn is_reversed_class(raw: &str) -> bool {
    raw.trim()
        .trim_start_matches(MARSHAL_PACKAGE)
        .starts_with("ReversedType(")
}

// ---------------------------------------------------------------------------
// CQL type strings

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn error(&self, reason: impl Into<String>) -> TypeParseError {
        TypeParseError {
            input: self.input.to_string(),
            reason: reason.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.rest().chars().next()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), TypeParseError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{}` at offset {}", c, self.pos)))
        }
    }

    /// Read up to the next delimiter; used for names and class names.
    fn word(&mut self, delimiters: &[char]) -> &'a str {
        self.skip_ws();
        let rest = self.rest();
        let end = rest.find(|c: char| delimiters.contains(&c)).unwrap_or(rest.len());
        self.pos += end;
        rest[..end].trim_end()
    }

    /// A string delimited by `quote`, with doubled quotes as escapes.
    fn quoted(&mut self, quote: char) -> Result<String, TypeParseError> {
        self.expect(quote)?;
        let mut out = String::new();
        let mut chars = self.rest().char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == quote {
                if matches!(chars.peek(), Some((_, next)) if *next == quote) {
                    out.push(quote);
                    chars.next();
                    continue;
                }
                self.pos += i + c.len_utf8();
                return Ok(out);
            }
            out.push(c);
        }
        Err(self.error("unterminated quoted name"))
    }

    fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }
}

/// Parse a 3.x+ CQL type string.
pub fn parse_cql_type(raw: &str) -> Result<DataType, TypeParseError> {
    let mut cursor = Cursor::new(raw);
    let parsed = cql_type(&mut cursor)?;
    if !cursor.at_end() {
        return Err(cursor.error(format!("trailing input at offset {}", cursor.pos)));
    }
    Ok(parsed)
}

fn cql_type(cursor: &mut Cursor<'_>) -> Result<DataType, TypeParseError> {
    match cursor.peek() {
        Some('\'') => return Ok(DataType::Custom(cursor.quoted('\'')?)),
        Some('"') => {
            return Ok(DataType::UserDefined {
                name: cursor.quoted('"')?,
                frozen: false,
            })
        }
        None => return Err(cursor.error("unexpected end of input")),
        _ => {}
    }

    let name = cursor.word(&['<', '>', ',']).to_ascii_lowercase();
    if name.is_empty() {
        return Err(cursor.error(format!("expected a type at offset {}", cursor.pos)));
    }
    if !cursor.eat('<') {
        return Ok(NativeType::from_cql_name(&name)
            .map(DataType::Native)
            .unwrap_or(DataType::UserDefined {
                name,
                frozen: false,
            }));
    }

    let parsed = match name.as_str() {
        "frozen" => cql_type(cursor)?.frozen(),
        "list" => DataType::List {
            element: Box::new(cql_type(cursor)?),
            frozen: false,
        },
        "set" => DataType::Set {
            element: Box::new(cql_type(cursor)?),
            frozen: false,
        },
        "map" => {
            let key = cql_type(cursor)?;
            cursor.expect(',')?;
            DataType::Map {
                key: Box::new(key),
                value: Box::new(cql_type(cursor)?),
                frozen: false,
            }
        }
        "tuple" => {
            let mut items = vec![cql_type(cursor)?];
            while cursor.eat(',') {
                items.push(cql_type(cursor)?);
            }
            DataType::Tuple(items)
        }
        "vector" => {
            let element = cql_type(cursor)?;
            cursor.expect(',')?;
            let raw = cursor.word(&['>']);
            let dimensions = raw
                .parse::<u32>()
                .map_err(|_| cursor.error(format!("invalid vector dimension `{}`", raw)))?;
            DataType::Vector {
                element: Box::new(element),
                dimensions,
            }
        }
        other => return Err(cursor.error(format!("unknown parameterized type `{}`", other))),
    };
    cursor.expect('>')?;
    Ok(parsed)
}

// ---------------------------------------------------------------------------
// 2.x marshal class names

/// `Name(param, key:param, ...)` as found in 2.x validators.
#[derive(Debug)]
struct ClassNode<'a> {
    name: &'a str,
    params: Vec<(Option<&'a str>, ClassNode<'a>)>,
}

fn class_node<'a>(cursor: &mut Cursor<'a>) -> Result<ClassNode<'a>, TypeParseError> {
    let name = cursor.word(&['(', ')', ',', ':']);
    if name.is_empty() {
        return Err(cursor.error(format!("expected a class name at offset {}", cursor.pos)));
    }
    let mut params = Vec::new();
    if cursor.eat('(') {
        if !cursor.eat(')') {
            loop {
                let first = class_node(cursor)?;
                if cursor.eat(':') {
                    params.push((Some(first.name), class_node(cursor)?));
                } else {
                    params.push((None, first));
                }
                if cursor.eat(')') {
                    break;
                }
                cursor.expect(',')?;
            }
        }
    }
    Ok(ClassNode {
        name: name.trim_start_matches(MARSHAL_PACKAGE),
        params,
    })
}

fn native_for_class(name: &str) -> Option<NativeType> {
    let native = match name {
        "AsciiType" => NativeType::Ascii,
        "LongType" => NativeType::BigInt,
        "BytesType" => NativeType::Blob,
        "BooleanType" => NativeType::Boolean,
        "CounterColumnType" => NativeType::Counter,
        "SimpleDateType" => NativeType::Date,
        "DecimalType" => NativeType::Decimal,
        "DoubleType" => NativeType::Double,
        "DurationType" => NativeType::Duration,
        "FloatType" => NativeType::Float,
        "InetAddressType" => NativeType::Inet,
        "Int32Type" => NativeType::Int,
        "ShortType" => NativeType::SmallInt,
        "UTF8Type" => NativeType::Text,
        "TimeType" => NativeType::Time,
        "DateType" | "TimestampType" => NativeType::Timestamp,
        "TimeUUIDType" => NativeType::TimeUuid,
        "ByteType" => NativeType::TinyInt,
        "UUIDType" => NativeType::Uuid,
        "IntegerType" => NativeType::Varint,
        _ => return None,
    };
    Some(native)
}

/// Parse a 2.x marshal class name into a CQL type.
///
/// `ReversedType` is unwrapped (see [`is_reversed_class`]); user types and tuples are
/// always frozen since 2.x has no other kind.
pub fn parse_class_name(raw: &str, family: SchemaFamily) -> Result<DataType, TypeParseError> {
    let mut cursor = Cursor::new(raw);
    let node = class_node(&mut cursor)?;
    if !cursor.at_end() {
        return Err(cursor.error(format!("trailing input at offset {}", cursor.pos)));
    }
    class_to_type(&node, raw, family)
}

fn class_to_type(
    node: &ClassNode<'_>,
    raw: &str,
    family: SchemaFamily,
) -> Result<DataType, TypeParseError> {
    let error = |reason: String| TypeParseError {
        input: raw.to_string(),
        reason,
    };
    let param = |i: usize| -> Result<DataType, TypeParseError> {
        let (_, inner) = node
            .params
            .get(i)
            .ok_or_else(|| error(format!("{} needs parameter #{}", node.name, i + 1)))?;
        class_to_type(inner, raw, family)
    };

    let parsed = match node.name {
        "ReversedType" => param(0)?,
        "FrozenType" => param(0)?.frozen(),
        "ListType" => DataType::List {
            element: Box::new(param(0)?),
            frozen: false,
        },
        "SetType" => DataType::Set {
            element: Box::new(param(0)?),
            frozen: false,
        },
        "MapType" => DataType::Map {
            key: Box::new(param(0)?),
            value: Box::new(param(1)?),
            frozen: false,
        },
        "TupleType" => DataType::Tuple(
            (0..node.params.len())
                .map(param)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        "UserType" => {
            // UserType(keyspace, hex(name), hex(field):type, ...)
            let hex_name = node
                .params
                .get(1)
                .map(|(_, n)| n.name)
                .ok_or_else(|| error("UserType without a name".to_string()))?;
            let name = decode_hex(hex_name)
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .ok_or_else(|| error(format!("invalid user type name `{}`", hex_name)))?;
            DataType::UserDefined {
                name,
                frozen: family.is_legacy(),
            }
        }
        name => match native_for_class(name) {
            Some(native) => DataType::Native(native),
            None => DataType::Custom(raw_class(node)),
        },
    };
    Ok(parsed)
}

/// Re-assemble the fully qualified class name for custom types.
fn raw_class(node: &ClassNode<'_>) -> String {
    let mut out = if node.name.contains('.') {
        node.name.to_string()
    } else {
        format!("{}{}", MARSHAL_PACKAGE, node.name)
    };
    if !node.params.is_empty() {
        let params: Vec<String> = node
            .params
            .iter()
            .map(|(key, n)| match key {
                Some(key) => format!("{}:{}", key, raw_class(n)),
                None => raw_class(n),
            })
            .collect();
        out.push('(');
        out.push_str(&params.join(","));
        out.push(')');
    }
    out
}

/// A 2.x comparator describes a compound (non-compact) layout only when it is a
/// `CompositeType`.
pub fn is_composite_comparator(raw: &str) -> bool {
    raw.trim()
        .trim_start_matches(MARSHAL_PACKAGE)
        .starts_with("CompositeType(")
}
