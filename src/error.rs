// src/error.rs

use std::time::Duration;

use crate::{rows::SchemaCategory, version::Version};

/// Failures raised by the channel layer while running one schema query.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,

    #[error("server error [{code:#06x}]: {message}")]
    Server { code: i32, message: String },

    #[error("{0}")]
    Other(String),
}

/// Errors that abort a refresh for one node.
///
/// Parse-local problems never show up here; they are recovered and reported as
/// [`crate::parser::ParseWarning`]s instead.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("node {node} runs unsupported server version {version}")]
    UnsupportedVersion { node: String, version: Version },

    #[error("node {node} did not report a server version, schema is unavailable")]
    VersionUnavailable { node: String },

    #[error("schema query for {category} failed on node {node}: {source}")]
    QueryExecution {
        node: String,
        category: SchemaCategory,
        #[source]
        source: ChannelError,
    },

    #[error("schema queries on node {node} did not complete within {elapsed:?}")]
    Timeout { node: String, elapsed: Duration },

    #[error("schema refresh on node {node} was cancelled")]
    Cancelled { node: String },
}

pub type Result<T, E = SchemaError> = std::result::Result<T, E>;
