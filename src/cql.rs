// src/cql.rs

//! Canonical creation statements for every schema entity.

use once_cell::sync::Lazy;
use regex::Regex;
use std::{borrow::Cow, collections::BTreeMap, fmt::Write};

use crate::metadata::{
    Aggregate, ColumnKind, ColumnLayout, Function, Index, Keyspace, OptionValue, Table,
    TableOptions, UserType, View,
};

static UNQUOTED_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("identifier regex should compile"));

/// Keywords that can never appear as a bare identifier.
const RESERVED_KEYWORDS: &[&str] = &[
    "add", "allow", "alter", "and", "apply", "asc", "authorize", "batch", "begin", "by",
    "columnfamily", "create", "default", "delete", "desc", "describe", "drop", "entries",
    "execute", "from", "full", "grant", "if", "in", "index", "infinity", "insert", "into", "is",
    "keyspace", "limit", "materialized", "mbean", "mbeans", "modify", "nan", "norecursive",
    "not", "null", "of", "on", "or", "order", "primary", "rename", "replace", "revoke",
    "schema", "select", "set", "table", "to", "token", "truncate", "unlogged", "unset",
    "update", "use", "using", "view", "where", "with",
];

pub fn is_reserved_keyword(id: &str) -> bool {
    RESERVED_KEYWORDS.contains(&id.to_ascii_lowercase().as_str())
}

/// Emit `id` bare when CQL would read it back unchanged, double-quoted otherwise.
pub fn quote_if_necessary(id: &str) -> Cow<'_, str> {
    if UNQUOTED_ID.is_match(id) && !is_reserved_keyword(id) {
        Cow::Borrowed(id)
    } else {
        Cow::Owned(format!("\"{}\"", id.replace('"', "\"\"")))
    }
}

/// Single-quoted CQL string literal.
pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Doubles always carry a fractional part so the server never reads them as ints.
pub fn format_double(d: f64) -> String {
    let s = d.to_string();
    if d.is_finite() && !s.contains('.') {
        format!("{}.0", s)
    } else if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        s
    }
}

/// `{ 'k' : 'v', ... }`, or `{}` when empty.
pub fn format_map(map: &BTreeMap<String, String>) -> String {
    format_entries(map.iter())
}

fn format_entries<'a>(entries: impl Iterator<Item = (&'a String, &'a String)>) -> String {
    let body: Vec<String> = entries
        .map(|(k, v)| format!("{} : {}", quote_string(k), quote_string(v)))
        .collect();
    if body.is_empty() {
        "{}".to_string()
    } else {
        format!("{{ {} }}", body.join(", "))
    }
}

fn qualified(keyspace: &str, name: &str) -> String {
    format!("{}.{}", quote_if_necessary(keyspace), quote_if_necessary(name))
}

/// Anything that renders as a single CQL statement.
pub trait AsCql {
    fn write_cql(&self, generator: &CqlGenerator, include_internals: bool, out: &mut String);

    /// Shorthand for [`CqlGenerator::pretty`].
    fn as_cql_query(&self, include_internals: bool) -> String {
        CqlGenerator::pretty().as_cql_query(self, include_internals)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CqlGenerator {
    pretty: bool,
}

impl Default for CqlGenerator {
    fn default() -> Self {
        Self::pretty()
    }
}

impl CqlGenerator {
    /// Multi-line output with four-space indentation.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    /// Every statement on one line.
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    pub fn as_cql_query<E: AsCql + ?Sized>(&self, entity: &E, include_internals: bool) -> String {
        let mut out = String::new();
        entity.write_cql(self, include_internals, &mut out);
        out
    }

    /// The keyspace followed by its types (dependency order), tables and their indexes,
    /// views, functions and aggregates.
    pub fn describe_with_children(&self, keyspace: &Keyspace, include_internals: bool) -> String {
        let mut statements = vec![self.as_cql_query(keyspace, include_internals)];
        statements.extend(
            keyspace
                .user_types_in_dependency_order()
                .into_iter()
                .map(|t| self.as_cql_query(t, include_internals)),
        );
        statements.extend(
            keyspace
                .tables
                .values()
                .map(|t| self.describe_table(t, include_internals)),
        );
        statements.extend(
            keyspace
                .views
                .values()
                .map(|v| self.as_cql_query(v, include_internals)),
        );
        statements.extend(
            keyspace
                .functions
                .values()
                .map(|f| self.as_cql_query(f, include_internals)),
        );
        statements.extend(
            keyspace
                .aggregates
                .values()
                .map(|a| self.as_cql_query(a, include_internals)),
        );
        statements.join(self.statement_separator())
    }

    /// A table followed by its indexes.
    pub fn describe_table(&self, table: &Table, include_internals: bool) -> String {
        let mut statements = vec![self.as_cql_query(table, include_internals)];
        statements.extend(
            table
                .indexes
                .values()
                .map(|i| self.as_cql_query(i, include_internals)),
        );
        statements.join(self.statement_separator())
    }

    fn statement_separator(&self) -> &'static str {
        if self.pretty {
            "\n\n"
        } else {
            "\n"
        }
    }

    /// Break before an indented line, or a single space in compact mode.
    fn indent(&self) -> &'static str {
        if self.pretty {
            "\n    "
        } else {
            " "
        }
    }

    fn close_paren(&self) -> &'static str {
        if self.pretty {
            "\n)"
        } else {
            " )"
        }
    }

    fn write_columns(&self, layout: &ColumnLayout, out: &mut String) {
        out.push_str(" (");
        for column in layout.ordered_columns() {
            let _ = write!(
                out,
                "{}{} {}",
                self.indent(),
                quote_if_necessary(&column.name),
                column.data_type
            );
            if column.kind == ColumnKind::Static {
                out.push_str(" static");
            }
            out.push(',');
        }
        let _ = write!(out, "{}{}", self.indent(), primary_key(layout));
        out.push_str(self.close_paren());
    }

    /// `WITH a AND b ...`, nothing when there are no clauses.
    fn write_with(&self, clauses: &[String], out: &mut String) {
        for (i, clause) in clauses.iter().enumerate() {
            if i == 0 {
                out.push_str(" WITH ");
            } else {
                out.push_str(self.indent());
                out.push_str("AND ");
            }
            out.push_str(clause);
        }
    }
}

fn primary_key(layout: &ColumnLayout) -> String {
    let partition: Vec<_> = layout
        .partition_key
        .iter()
        .map(|c| quote_if_necessary(c))
        .collect();
    let mut parts = vec![match partition.as_slice() {
        [single] => single.to_string(),
        _ => format!("({})", partition.join(", ")),
    }];
    parts.extend(
        layout
            .clustering_key
            .iter()
            .map(|c| quote_if_necessary(c).into_owned()),
    );
    format!("PRIMARY KEY ({})", parts.join(", "))
}

fn clustering_order_clause(layout: &ColumnLayout) -> Option<String> {
    let order = layout.clustering_order();
    if order.is_empty() {
        return None;
    }
    let items: Vec<String> = order
        .into_iter()
        .map(|(name, order)| format!("{} {}", quote_if_necessary(name), order))
        .collect();
    Some(format!("CLUSTERING ORDER BY ({})", items.join(", ")))
}

fn push_option<T>(
    clauses: &mut Vec<String>,
    name: &str,
    option: &OptionValue<T>,
    render: impl Fn(&T) -> String,
) {
    if let Some(value) = option.get() {
        clauses.push(format!("{} = {}", name, render(value)));
    }
}

/// Option clauses in their canonical order; invalid options are skipped.
fn option_clauses(options: &TableOptions) -> Vec<String> {
    let mut c = Vec::new();
    let double = |d: &f64| format_double(*d);
    let int = |i: &i32| i.to_string();
    let text = |s: &String| quote_string(s);

    push_option(&mut c, "read_repair_chance", &options.read_repair_chance, double);
    push_option(
        &mut c,
        "dclocal_read_repair_chance",
        &options.dclocal_read_repair_chance,
        double,
    );
    push_option(&mut c, "gc_grace_seconds", &options.gc_grace_seconds, int);
    push_option(
        &mut c,
        "bloom_filter_fp_chance",
        &options.bloom_filter_fp_chance,
        double,
    );
    push_option(&mut c, "caching", &options.caching, format_map);
    push_option(&mut c, "comment", &options.comment, text);
    push_option(&mut c, "compaction", &options.compaction, format_map);
    push_option(&mut c, "compression", &options.compression, format_map);
    push_option(&mut c, "default_time_to_live", &options.default_time_to_live, int);
    push_option(&mut c, "speculative_retry", &options.speculative_retry, text);
    push_option(&mut c, "min_index_interval", &options.min_index_interval, int);
    push_option(&mut c, "max_index_interval", &options.max_index_interval, int);
    push_option(&mut c, "crc_check_chance", &options.crc_check_chance, double);
    push_option(&mut c, "cdc", &options.cdc, |b: &bool| b.to_string());
    push_option(
        &mut c,
        "memtable_flush_period_in_ms",
        &options.memtable_flush_period_in_ms,
        int,
    );
    push_option(
        &mut c,
        "additional_write_policy",
        &options.additional_write_policy,
        text,
    );
    push_option(&mut c, "read_repair", &options.read_repair, text);
    push_option(&mut c, "nodesync", &options.nodesync, format_map);
    c
}

/// Virtual objects cannot be recreated, so their CQL is shown inside a block comment.
/// A `*/` in a name or option value would end that comment early.
fn virtual_comment(statement: String) -> String {
    format!("/* {} */", statement.replace("*/", "* /"))
}

impl AsCql for Keyspace {
    fn write_cql(&self, _generator: &CqlGenerator, _include_internals: bool, out: &mut String) {
        if self.virtual_keyspace {
            out.push_str(&virtual_comment(format!(
                "VIRTUAL KEYSPACE {}",
                quote_if_necessary(&self.name)
            )));
            return;
        }
        // class first, then the remaining settings in key order
        let class = self.replication.get_key_value("class");
        let replication = format_entries(
            class
                .into_iter()
                .chain(self.replication.iter().filter(|(k, _)| *k != "class")),
        );
        let _ = write!(
            out,
            "CREATE KEYSPACE {} WITH REPLICATION = {} AND DURABLE_WRITES = {};",
            quote_if_necessary(&self.name),
            replication,
            self.durable_writes
        );
    }
}

impl AsCql for Table {
    fn write_cql(&self, generator: &CqlGenerator, include_internals: bool, out: &mut String) {
        let mut statement = String::new();
        let _ = write!(
            statement,
            "{}TABLE {}",
            if self.virtual_table { "VIRTUAL " } else { "CREATE " },
            qualified(&self.keyspace, &self.name)
        );
        generator.write_columns(&self.layout, &mut statement);

        let mut clauses = Vec::new();
        if include_internals {
            if let Some(id) = self.id {
                clauses.push(format!("ID = {}", id));
            }
        }
        if self.compact_storage {
            clauses.push("COMPACT STORAGE".to_string());
        }
        clauses.extend(clustering_order_clause(&self.layout));
        clauses.extend(option_clauses(&self.options));
        generator.write_with(&clauses, &mut statement);
        statement.push(';');

        if self.virtual_table {
            out.push_str(&virtual_comment(statement));
        } else {
            out.push_str(&statement);
        }
    }
}

impl AsCql for View {
    fn write_cql(&self, generator: &CqlGenerator, include_internals: bool, out: &mut String) {
        let selected = if self.include_all_columns {
            "*".to_string()
        } else {
            self.layout
                .ordered_columns()
                .iter()
                .map(|c| quote_if_necessary(&c.name).into_owned())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let _ = write!(
            out,
            "CREATE MATERIALIZED VIEW {} AS{}SELECT {}{}FROM {}",
            qualified(&self.keyspace, &self.name),
            generator.indent(),
            selected,
            generator.indent(),
            qualified(&self.keyspace, &self.base_table),
        );
        if let Some(where_clause) = &self.where_clause {
            let _ = write!(out, "{}WHERE {}", generator.indent(), where_clause);
        }
        let _ = write!(out, "{}{}", generator.indent(), primary_key(&self.layout));

        let mut clauses = Vec::new();
        if include_internals {
            if let Some(id) = self.id {
                clauses.push(format!("ID = {}", id));
            }
        }
        clauses.extend(clustering_order_clause(&self.layout));
        clauses.extend(option_clauses(&self.options));
        // unlike tables, WITH starts its own line
        for (i, clause) in clauses.iter().enumerate() {
            out.push_str(generator.indent());
            out.push_str(if i == 0 { "WITH " } else { "AND " });
            out.push_str(clause);
        }
        out.push(';');
    }
}

impl AsCql for Index {
    fn write_cql(&self, _generator: &CqlGenerator, _include_internals: bool, out: &mut String) {
        let target = &self.target;
        let on = qualified(&self.keyspace, &self.table);
        match &self.class_name {
            Some(class) => {
                let _ = write!(
                    out,
                    "CREATE CUSTOM INDEX {} ON {} ({}) USING {}",
                    quote_if_necessary(&self.name),
                    on,
                    target,
                    quote_string(class)
                );
                if !self.options.is_empty() {
                    let _ = write!(out, " WITH OPTIONS = {}", format_map(&self.options));
                }
            }
            None => {
                let _ = write!(
                    out,
                    "CREATE INDEX {} ON {} ({})",
                    quote_if_necessary(&self.name),
                    on,
                    target
                );
            }
        }
        out.push(';');
    }
}

impl AsCql for UserType {
    fn write_cql(&self, generator: &CqlGenerator, _include_internals: bool, out: &mut String) {
        let _ = write!(out, "CREATE TYPE {} (", qualified(&self.keyspace, &self.name));
        for (i, (name, data_type)) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(
                out,
                "{}{} {}",
                generator.indent(),
                quote_if_necessary(name),
                data_type
            );
        }
        out.push_str(generator.close_paren());
        out.push(';');
    }
}

impl AsCql for Function {
    fn write_cql(&self, generator: &CqlGenerator, _include_internals: bool, out: &mut String) {
        let arguments: Vec<String> = self
            .arguments
            .iter()
            .map(|(name, t)| format!("{} {}", quote_if_necessary(name), t))
            .collect();
        let _ = write!(
            out,
            "CREATE FUNCTION {}({}){}{} ON NULL INPUT{}RETURNS {}{}LANGUAGE {}{}AS {};",
            qualified(&self.keyspace, &self.name),
            arguments.join(","),
            generator.indent(),
            if self.called_on_null_input {
                "CALLED"
            } else {
                "RETURNS NULL"
            },
            generator.indent(),
            self.return_type,
            generator.indent(),
            self.language,
            generator.indent(),
            quote_string(&self.body)
        );
    }
}

impl AsCql for Aggregate {
    fn write_cql(&self, generator: &CqlGenerator, _include_internals: bool, out: &mut String) {
        let arguments: Vec<String> = self.argument_types.iter().map(|t| t.to_string()).collect();
        let _ = write!(
            out,
            "CREATE AGGREGATE {}({}){}SFUNC {}{}STYPE {}",
            qualified(&self.keyspace, &self.name),
            arguments.join(","),
            generator.indent(),
            quote_if_necessary(&self.state_function),
            generator.indent(),
            self.state_type
        );
        if let Some(final_function) = &self.final_function {
            let _ = write!(
                out,
                "{}FINALFUNC {}",
                generator.indent(),
                quote_if_necessary(final_function)
            );
        }
        if let Some(init) = &self.initial_condition {
            let _ = write!(out, "{}INITCOND {}", generator.indent(), init);
        }
        out.push(';');
    }
}
