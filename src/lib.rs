// src/lib.rs

//! Schema metadata for CQL clusters.
//!
//! A refresh picks the system-table query set matching the node's release, runs it
//! through a [`SchemaChannel`], parses the rows into an immutable [`Metadata`] graph and
//! publishes it. The graph renders back to CQL through [`cql::CqlGenerator`].

pub mod channel;
pub mod config;
pub mod cql;
pub mod error;
pub mod family;
pub mod fixture;
pub mod metadata;
pub mod node;
pub mod parser;
pub mod queries;
pub mod refresh;
pub mod rows;
pub mod version;

#[cfg(test)]
mod test_util;

pub use channel::{MemoryChannel, SchemaChannel};
pub use config::SchemaConfig;
pub use cql::{AsCql, CqlGenerator};
pub use error::{ChannelError, SchemaError};
pub use family::SchemaFamily;
pub use metadata::Metadata;
pub use node::Node;
pub use parser::{ParseWarning, ParsedSchema, SchemaParser};
pub use queries::{RefreshHandle, SchemaQueries, SchemaQueriesFactory};
pub use refresh::{Published, SchemaChangeEvent, SchemaChangeKind, SchemaElement, SchemaRefresher};
pub use rows::{CqlValue, RawSchemaRows, Row, SchemaCategory};
pub use version::Version;
