// src/queries.rs

//! Which system tables to query for a node, and running those queries.

use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, info, instrument, warn};

use crate::{
    channel::SchemaChannel,
    config::SchemaConfig,
    error::{ChannelError, Result, SchemaError},
    family::SchemaFamily,
    node::Node,
    rows::{RawSchemaRows, Row, SchemaCategory},
    version::Version,
};

/// Cancels one in-flight refresh.
#[derive(Debug, Clone, Default)]
pub struct RefreshHandle {
    token: CancellationToken,
}

impl RefreshHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

/// The fixed query set of one family, bound to one node and channel.
///
/// Nothing runs until [`SchemaQueries::execute`] is awaited.
#[derive(Debug)]
pub struct SchemaQueries {
    node: String,
    version: Version,
    family: SchemaFamily,
    channel: Arc<dyn SchemaChannel>,
    handle: RefreshHandle,
    queries: Vec<(SchemaCategory, String)>,
    timeout: Duration,
}

impl SchemaQueries {
    pub fn family(&self) -> SchemaFamily {
        self.family
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// `(category, cql)` pairs in issue order.
    pub fn queries(&self) -> &[(SchemaCategory, String)] {
        &self.queries
    }

    pub fn handle(&self) -> &RefreshHandle {
        &self.handle
    }

    /// Run every query concurrently and collect the rows.
    ///
    /// The first failing query fails the whole execution; queries still in flight are
    /// dropped and their results never surface.
    #[instrument(skip(self), fields(node = %self.node, family = %self.family))]
    pub async fn execute(&self) -> Result<RawSchemaRows> {
        let started = Instant::now();
        let mut builder = RawSchemaRows::builder(&self.node, self.version.clone(), self.family);

        let mut pending: FuturesUnordered<
            BoxFuture<'_, (SchemaCategory, std::result::Result<Vec<Row>, ChannelError>)>,
        > = self
            .queries
            .iter()
            .map(|(category, cql)| {
                let channel = &self.channel;
                async move { (*category, channel.query(cql).await) }.boxed()
            })
            .collect();
        debug!(queries = pending.len(), "issued schema queries");

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = self.handle.cancelled() => {
                    info!("schema queries cancelled");
                    return Err(SchemaError::Cancelled { node: self.node.clone() });
                }
                _ = &mut deadline => {
                    warn!(elapsed = ?started.elapsed(), "schema queries timed out");
                    return Err(SchemaError::Timeout {
                        node: self.node.clone(),
                        elapsed: started.elapsed(),
                    });
                }
                next = pending.next() => match next {
                    Some((category, Ok(rows))) => {
                        builder.add(category, rows);
                    }
                    Some((category, Err(source))) => {
                        warn!(%category, error = %source, "schema query failed");
                        return Err(SchemaError::QueryExecution {
                            node: self.node.clone(),
                            category,
                            source,
                        });
                    }
                    None => break,
                },
            }
        }

        debug!(elapsed = ?started.elapsed(), "schema queries complete");
        Ok(builder.build())
    }
}

/// Picks the query set for a node's version.
#[derive(Debug, Clone, Default)]
pub struct SchemaQueriesFactory {
    config: SchemaConfig,
}

impl SchemaQueriesFactory {
    pub fn new(config: SchemaConfig) -> Self {
        Self { config }
    }

    pub fn new_instance(
        &self,
        node: &Node,
        channel: Arc<dyn SchemaChannel>,
        handle: RefreshHandle,
    ) -> Result<SchemaQueries> {
        let version = node.require_version()?;
        let family = SchemaFamily::for_version(&node.address, version)?;
        debug!(node = %node.address, %version, %family, "selected schema queries");

        let filter = keyspace_filter(&self.config.refreshed_keyspaces);
        let queries = family
            .profile()
            .tables
            .iter()
            .map(|(category, table)| {
                let cql = match &filter {
                    Some(filter) => format!("SELECT * FROM {} WHERE {}", table, filter),
                    None => format!("SELECT * FROM {}", table),
                };
                (*category, cql)
            })
            .collect();

        Ok(SchemaQueries {
            node: node.address.clone(),
            version: version.clone(),
            family,
            channel,
            handle,
            queries,
            timeout: self.config.request_timeout(),
        })
    }
}

fn keyspace_filter(keyspaces: &[String]) -> Option<String> {
    if keyspaces.is_empty() {
        return None;
    }
    let quoted: Vec<String> = keyspaces
        .iter()
        .map(|ks| crate::cql::quote_string(ks))
        .collect();
    Some(format!("keyspace_name IN ({})", quoted.join(",")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{channel::MemoryChannel, test_util};

    fn node(version: &str) -> Node {
        Node::new("127.0.0.1:9042", Version::parse(version).unwrap())
    }

    fn factory() -> SchemaQueriesFactory {
        SchemaQueriesFactory::default()
    }

    fn tables(queries: &SchemaQueries) -> Vec<String> {
        queries
            .queries()
            .iter()
            .map(|(_, cql)| cql.trim_start_matches("SELECT * FROM ").to_string())
            .collect()
    }

    #[test]
    fn test_scenarios() {
        let channel: Arc<dyn SchemaChannel> = Arc::new(MemoryChannel::new());
        let cases = [
            ("4.0.0.602", SchemaFamily::Cassandra3, 8),
            ("4.1.0", SchemaFamily::Cassandra4, 11),
            ("2.3.0", SchemaFamily::Cassandra22, 6),
            ("3.0.0", SchemaFamily::Cassandra3, 8),
            ("2.1.0", SchemaFamily::Cassandra21, 4),
        ];
        for (version, family, count) in cases {
            let queries = factory()
                .new_instance(&node(version), channel.clone(), RefreshHandle::new())
                .unwrap();
            assert_eq!(queries.family(), family, "version {}", version);
            assert_eq!(queries.queries().len(), count, "version {}", version);
        }

        let legacy = factory()
            .new_instance(&node("2.2.0"), channel.clone(), RefreshHandle::new())
            .unwrap();
        assert!(tables(&legacy).contains(&"system.schema_aggregates".to_string()));
        let modern = factory()
            .new_instance(&node("4.0.0"), channel, RefreshHandle::new())
            .unwrap();
        assert!(tables(&modern).contains(&"system_virtual_schema.columns".to_string()));
    }

    #[test]
    fn test_version_errors() {
        let channel: Arc<dyn SchemaChannel> = Arc::new(MemoryChannel::new());
        let err = factory()
            .new_instance(&node("2.0.9"), channel.clone(), RefreshHandle::new())
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedVersion { .. }));
        let err = factory()
            .new_instance(&Node::unversioned("n"), channel, RefreshHandle::new())
            .unwrap_err();
        assert!(matches!(err, SchemaError::VersionUnavailable { .. }));
    }

    #[test]
    fn test_keyspace_filter() {
        let config = SchemaConfig {
            refreshed_keyspaces: vec!["ks1".into(), "it's".into()],
            ..SchemaConfig::default()
        };
        let channel: Arc<dyn SchemaChannel> = Arc::new(MemoryChannel::new());
        let queries = SchemaQueriesFactory::new(config)
            .new_instance(&node("3.11.4"), channel, RefreshHandle::new())
            .unwrap();
        assert_eq!(
            queries.queries()[0].1,
            "SELECT * FROM system_schema.keyspaces WHERE keyspace_name IN ('ks1','it''s')"
        );
    }

    #[tokio::test]
    async fn test_execute_collects_every_category() {
        test_util::init_logging();
        let channel = Arc::new(test_util::cassandra3_channel());
        let queries = factory()
            .new_instance(&node("3.11.4"), channel.clone(), RefreshHandle::new())
            .unwrap();
        let rows = queries.execute().await.unwrap();

        assert_eq!(rows.received().len(), 8);
        assert_eq!(rows.keyspaces().len(), 1);
        assert!(!rows.keyspace("ks").unwrap().tables.is_empty());
        assert_eq!(channel.issued_queries().len(), 8);
    }

    #[tokio::test]
    async fn test_first_failure_fails_execution() {
        let channel = Arc::new(test_util::cassandra3_channel());
        channel.fail_table(
            "system_schema.views",
            ChannelError::Server {
                code: 0x1100,
                message: "timeout".into(),
            },
        );
        let queries = factory()
            .new_instance(&node("3.11.4"), channel, RefreshHandle::new())
            .unwrap();
        match queries.execute().await {
            Err(SchemaError::QueryExecution { category, .. }) => {
                assert_eq!(category, SchemaCategory::Views)
            }
            other => panic!("expected a query failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let channel = Arc::new(test_util::cassandra3_channel());
        channel.set_latency("system_schema.columns", Duration::from_secs(60));
        let queries = factory()
            .new_instance(&node("3.11.4"), channel, RefreshHandle::new())
            .unwrap();
        assert!(matches!(
            queries.execute().await,
            Err(SchemaError::Timeout { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation() {
        let channel = Arc::new(test_util::cassandra3_channel());
        channel.set_latency("system_schema.tables", Duration::from_secs(1));
        let handle = RefreshHandle::new();
        let queries = factory()
            .new_instance(&node("3.11.4"), channel, handle.clone())
            .unwrap();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.cancel();
        });
        assert!(matches!(
            queries.execute().await,
            Err(SchemaError::Cancelled { .. })
        ));
        canceller.await.unwrap();
    }
}
