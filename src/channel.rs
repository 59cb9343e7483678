// src/channel.rs

//! The boundary to the connection layer, plus an in-memory implementation.

use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Mutex, RwLock},
    time::Duration,
};
use tracing::debug;

use crate::{error::ChannelError, rows::Row};

/// Runs one schema query against one node.
pub trait SchemaChannel: Debug + Send + Sync {
    fn query<'a>(&'a self, cql: &'a str) -> BoxFuture<'a, Result<Vec<Row>, ChannelError>>;
}

/// `SELECT * FROM <table> [WHERE keyspace_name IN (...)]`
static SCHEMA_QUERY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^SELECT \* FROM ([A-Za-z0-9_]+\.[A-Za-z0-9_]+)(?: WHERE keyspace_name IN \((.*)\))?$")
        .expect("schema query regex should compile")
});

static QUOTED_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'((?:[^']|'')*)'").expect("quoted name regex should compile"));

/// Server error code for an invalid query.
const INVALID_QUERY: i32 = 0x2200;

/// Serves canned rows per system table.
///
/// Every issued query is recorded; failures and latency can be injected per table.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    failures: Mutex<HashMap<String, ChannelError>>,
    latency: Mutex<HashMap<String, Duration>>,
    issued: Mutex<Vec<String>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table: &str, rows: Vec<Row>) -> Self {
        self.set_table(table, rows);
        self
    }

    pub fn set_table(&self, table: &str, rows: Vec<Row>) {
        self.tables
            .write()
            .unwrap()
            .insert(table.to_string(), rows);
    }

    /// Make every query on `table` fail with `error` until [`Self::clear_failures`].
    pub fn fail_table(&self, table: &str, error: ChannelError) {
        self.failures
            .lock()
            .unwrap()
            .insert(table.to_string(), error);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn set_latency(&self, table: &str, latency: Duration) {
        self.latency
            .lock()
            .unwrap()
            .insert(table.to_string(), latency);
    }

    pub fn issued_queries(&self) -> Vec<String> {
        self.issued.lock().unwrap().clone()
    }

    fn answer(&self, table: &str, keyspaces: Option<&str>) -> Result<Vec<Row>, ChannelError> {
        if let Some(error) = self.failures.lock().unwrap().get(table) {
            return Err(error.clone());
        }
        let tables = self.tables.read().unwrap();
        let rows = tables.get(table).ok_or_else(|| ChannelError::Server {
            code: INVALID_QUERY,
            message: format!("unconfigured table {}", table),
        })?;

        let Some(list) = keyspaces else {
            return Ok(rows.clone());
        };
        let wanted: Vec<String> = QUOTED_NAME_RE
            .captures_iter(list)
            .map(|c| c[1].replace("''", "'"))
            .collect();
        Ok(rows
            .iter()
            .filter(|row| {
                row.get_string("keyspace_name")
                    .ok()
                    .flatten()
                    .map_or(false, |ks| wanted.iter().any(|w| w == ks))
            })
            .cloned()
            .collect())
    }
}

impl SchemaChannel for MemoryChannel {
    fn query<'a>(&'a self, cql: &'a str) -> BoxFuture<'a, Result<Vec<Row>, ChannelError>> {
        Box::pin(async move {
            self.issued.lock().unwrap().push(cql.to_string());

            let caps = SCHEMA_QUERY_RE.captures(cql.trim()).ok_or_else(|| ChannelError::Server {
                code: INVALID_QUERY,
                message: format!("unsupported query: {}", cql),
            })?;
            let table = caps[1].to_ascii_lowercase();

            let latency = self.latency.lock().unwrap().get(&table).copied();
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }

            let result = self.answer(&table, caps.get(2).map(|m| m.as_str()));
            debug!(%table, ok = result.is_ok(), "memory channel answered");
            result
        })
    }
}
