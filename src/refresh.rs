// src/refresh.rs

//! Refresh orchestration: query, parse, publish.
//!
//! A [`SchemaRefresher`] owns the currently published [`Metadata`]. Every successful
//! refresh swaps in a new immutable graph and broadcasts what changed relative to the
//! previous one. A failed or cancelled refresh leaves the published graph untouched.

use arc_swap::ArcSwapOption;
use serde::Serialize;
use std::{collections::BTreeMap, fmt, sync::Arc};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    channel::SchemaChannel,
    config::SchemaConfig,
    error::{Result, SchemaError},
    metadata::{Keyspace, Metadata},
    node::Node,
    parser::{ParseWarning, SchemaParser},
    queries::{RefreshHandle, SchemaQueriesFactory},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaChangeKind {
    Created,
    Updated,
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaElement {
    Keyspace,
    Table,
    View,
    Type,
    Function,
    Aggregate,
}

/// One difference between two consecutive published graphs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaChangeEvent {
    pub kind: SchemaChangeKind,
    pub element: SchemaElement,
    pub keyspace: String,
    /// Object name within the keyspace; functions and aggregates use their signature.
    pub name: Option<String>,
}

impl fmt::Display for SchemaChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?} {}", self.kind, self.element, self.keyspace)?;
        if let Some(name) = &self.name {
            write!(f, ".{}", name)?;
        }
        Ok(())
    }
}

/// One published graph together with the warnings of the parse that built it.
#[derive(Debug)]
pub struct Published {
    pub metadata: Arc<Metadata>,
    pub warnings: Arc<Vec<ParseWarning>>,
}

#[derive(Debug)]
pub struct SchemaRefresher {
    factory: SchemaQueriesFactory,
    published: ArcSwapOption<Published>,
    events: broadcast::Sender<SchemaChangeEvent>,
    root: CancellationToken,
}

impl SchemaRefresher {
    pub fn new(config: SchemaConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            factory: SchemaQueriesFactory::new(config),
            published: ArcSwapOption::empty(),
            events,
            root: CancellationToken::new(),
        }
    }

    /// The last successful publish, graph and warnings read in one load.
    pub fn published(&self) -> Option<Arc<Published>> {
        self.published.load_full()
    }

    /// The last successfully published graph.
    pub fn current(&self) -> Option<Arc<Metadata>> {
        self.published.load().as_ref().map(|p| Arc::clone(&p.metadata))
    }

    /// Warnings of the parse that produced [`Self::current`]; empty before the first
    /// publish.
    pub fn last_warnings(&self) -> Arc<Vec<ParseWarning>> {
        self.published
            .load()
            .as_ref()
            .map_or_else(Default::default, |p| Arc::clone(&p.warnings))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchemaChangeEvent> {
        self.events.subscribe()
    }

    /// A handle for one refresh; closing the refresher cancels it too.
    pub fn handle(&self) -> RefreshHandle {
        RefreshHandle::from_token(self.root.child_token())
    }

    /// Cancel every in-flight refresh and refuse new ones.
    pub fn close(&self) {
        info!("closing schema refresher");
        self.root.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.root.is_cancelled()
    }

    pub async fn refresh(
        &self,
        node: &Node,
        channel: Arc<dyn SchemaChannel>,
    ) -> Result<Arc<Metadata>> {
        self.refresh_with(node, channel, self.handle()).await
    }

    #[instrument(skip_all, fields(node = %node.address))]
    pub async fn refresh_with(
        &self,
        node: &Node,
        channel: Arc<dyn SchemaChannel>,
        handle: RefreshHandle,
    ) -> Result<Arc<Metadata>> {
        let queries = self.factory.new_instance(node, channel, handle.clone())?;
        let rows = queries.execute().await?;
        let parsed = SchemaParser::new(rows.family(), rows.version().clone()).parse(&rows);

        if handle.is_cancelled() {
            debug!("refresh cancelled after parsing, not publishing");
            return Err(SchemaError::Cancelled {
                node: node.address.clone(),
            });
        }

        let metadata = Arc::new(parsed.metadata);
        let previous = self.published.swap(Some(Arc::new(Published {
            metadata: Arc::clone(&metadata),
            warnings: Arc::new(parsed.warnings),
        })));

        let changes = diff(previous.as_deref().map(|p| &*p.metadata), &metadata);
        info!(
            keyspaces = metadata.keyspaces().len(),
            changes = changes.len(),
            "published schema metadata"
        );
        for change in changes {
            // no subscribers is fine
            if self.events.send(change).is_err() {
                break;
            }
        }
        Ok(metadata)
    }
}

/// Everything that differs between `previous` and `current`.
///
/// Created and dropped keyspaces produce one keyspace event only; keyspaces present in
/// both graphs are compared element by element.
pub fn diff(previous: Option<&Metadata>, current: &Metadata) -> Vec<SchemaChangeEvent> {
    let empty = BTreeMap::new();
    let old = previous.map_or(&empty, |m| m.keyspaces());
    let new = current.keyspaces();
    let mut events = Vec::new();

    for name in old.keys().filter(|name| !new.contains_key(*name)) {
        events.push(event(SchemaChangeKind::Dropped, SchemaElement::Keyspace, name, None));
    }
    for (name, keyspace) in new {
        let Some(before) = old.get(name) else {
            events.push(event(SchemaChangeKind::Created, SchemaElement::Keyspace, name, None));
            continue;
        };
        if !same_keyspace_settings(before, keyspace) {
            events.push(event(SchemaChangeKind::Updated, SchemaElement::Keyspace, name, None));
        }
        diff_elements(&mut events, SchemaElement::Type, name, &before.user_types, &keyspace.user_types);
        diff_elements(&mut events, SchemaElement::Table, name, &before.tables, &keyspace.tables);
        diff_elements(&mut events, SchemaElement::View, name, &before.views, &keyspace.views);
        diff_elements(&mut events, SchemaElement::Function, name, &before.functions, &keyspace.functions);
        diff_elements(&mut events, SchemaElement::Aggregate, name, &before.aggregates, &keyspace.aggregates);
    }
    events
}

fn same_keyspace_settings(a: &Keyspace, b: &Keyspace) -> bool {
    a.durable_writes == b.durable_writes
        && a.replication == b.replication
        && a.virtual_keyspace == b.virtual_keyspace
}

fn diff_elements<T: PartialEq>(
    events: &mut Vec<SchemaChangeEvent>,
    element: SchemaElement,
    keyspace: &str,
    old: &BTreeMap<String, T>,
    new: &BTreeMap<String, T>,
) {
    for name in old.keys().filter(|name| !new.contains_key(*name)) {
        events.push(event(SchemaChangeKind::Dropped, element, keyspace, Some(name.as_str())));
    }
    for (name, value) in new {
        let kind = match old.get(name) {
            None => SchemaChangeKind::Created,
            Some(before) if before != value => SchemaChangeKind::Updated,
            Some(_) => continue,
        };
        events.push(event(kind, element, keyspace, Some(name.as_str())));
    }
}

fn event(
    kind: SchemaChangeKind,
    element: SchemaElement,
    keyspace: &str,
    name: Option<&str>,
) -> SchemaChangeEvent {
    SchemaChangeEvent {
        kind,
        element,
        keyspace: keyspace.to_string(),
        name: name.map(str::to_string),
    }
}

/// Log each warning of the last refresh once; used by the binaries.
pub fn log_warnings(warnings: &[ParseWarning]) {
    for warning in warnings {
        warn!(%warning, "schema object skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::MemoryChannel,
        error::ChannelError,
        family::SchemaFamily,
        test_util,
        version::Version,
    };
    use std::time::Duration;

    fn node(version: &str) -> Node {
        Node::new("127.0.0.1:9042", Version::parse(version).unwrap())
    }

    fn refresher() -> SchemaRefresher {
        SchemaRefresher::new(SchemaConfig::default())
    }

    #[tokio::test]
    async fn test_refresh_publishes() {
        test_util::init_logging();
        let refresher = refresher();
        assert!(refresher.current().is_none());

        let channel = Arc::new(test_util::cassandra3_channel());
        let metadata = refresher.refresh(&node("3.11.4"), channel).await.unwrap();
        assert_eq!(metadata.family(), SchemaFamily::Cassandra3);
        assert!(metadata.table("ks", "users").is_some());
        assert!(Arc::ptr_eq(&metadata, &refresher.current().unwrap()));
        assert!(refresher.last_warnings().is_empty());
    }

    #[tokio::test]
    async fn test_version_scenarios() {
        let cases = [
            ("4.0.0.602", SchemaFamily::Cassandra3),
            ("4.1.0", SchemaFamily::Cassandra4),
            ("2.3.0", SchemaFamily::Cassandra22),
            ("3.0.0", SchemaFamily::Cassandra3),
        ];
        for (version, family) in cases {
            let channel: Arc<dyn SchemaChannel> = Arc::new(test_util::channel_for(family));
            let metadata = refresher()
                .refresh(&node(version), channel)
                .await
                .unwrap();
            assert_eq!(metadata.family(), family, "version {}", version);
            assert!(metadata.keyspace("ks").is_some(), "version {}", version);
        }
    }

    #[tokio::test]
    async fn test_virtual_keyspaces_on_4x() {
        let channel = Arc::new(test_util::channel_for(SchemaFamily::Cassandra4));
        let metadata = refresher().refresh(&node("4.0.1"), channel).await.unwrap();
        let ks = metadata.keyspace("system_views").unwrap();
        assert!(ks.virtual_keyspace);
        let table = metadata.table("system_views", "clients").unwrap();
        assert!(table.virtual_table);
        assert_eq!(table.layout.partition_key, ["address"]);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_graph() {
        let refresher = refresher();
        let channel = Arc::new(test_util::cassandra3_channel());
        let first = refresher
            .refresh(&node("3.11.4"), channel.clone())
            .await
            .unwrap();

        channel.fail_table("system_schema.columns", ChannelError::Closed);
        let err = refresher
            .refresh(&node("3.11.4"), channel.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::QueryExecution { .. }));
        assert!(Arc::ptr_eq(&first, &refresher.current().unwrap()));
    }

    #[tokio::test]
    async fn test_warnings_travel_with_their_graph() {
        let refresher = refresher();
        assert!(refresher.published().is_none());
        assert!(refresher.last_warnings().is_empty());

        let channel = Arc::new(test_util::cassandra3_channel());
        let mut tables = test_util::cassandra3_tables();
        tables
            .get_mut("system_schema.columns")
            .unwrap()
            .push(test_util::column_row("ks", "users", "broken", "regular", -1, "map<int"));
        channel.set_table("system_schema.columns", tables["system_schema.columns"].clone());

        let noisy = refresher
            .refresh(&node("3.11.4"), channel.clone())
            .await
            .unwrap();
        let published = refresher.published().unwrap();
        assert!(Arc::ptr_eq(&published.metadata, &noisy));
        assert_eq!(published.warnings.len(), 1);
        assert_eq!(published.warnings[0].object.as_deref(), Some("users.broken"));

        // a failed refresh keeps the pair as it was
        channel.fail_table("system_schema.tables", ChannelError::Closed);
        assert!(refresher.refresh(&node("3.11.4"), channel.clone()).await.is_err());
        assert!(Arc::ptr_eq(&refresher.published().unwrap(), &published));

        channel.clear_failures();
        channel.set_table(
            "system_schema.columns",
            test_util::cassandra3_tables()["system_schema.columns"].clone(),
        );
        let clean = refresher.refresh(&node("3.11.4"), channel).await.unwrap();
        let published = refresher.published().unwrap();
        assert!(Arc::ptr_eq(&published.metadata, &clean));
        assert!(published.warnings.is_empty());
        assert!(refresher.last_warnings().is_empty());
        assert!(Arc::ptr_eq(&refresher.current().unwrap(), &clean));
    }

    #[tokio::test]
    async fn test_unsupported_version_issues_no_queries() {
        let refresher = refresher();
        let channel = Arc::new(MemoryChannel::new());
        let err = refresher
            .refresh(&node("1.2.19"), channel.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedVersion { .. }));
        assert!(channel.issued_queries().is_empty());
        assert!(refresher.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_in_flight_refresh() {
        let refresher = Arc::new(refresher());
        let channel = Arc::new(test_util::cassandra3_channel());
        channel.set_latency("system_schema.tables", Duration::from_secs(1));

        let task = {
            let refresher = Arc::clone(&refresher);
            let channel: Arc<dyn SchemaChannel> = channel;
            tokio::spawn(async move { refresher.refresh(&node("3.11.4"), channel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        refresher.close();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(SchemaError::Cancelled { .. })));
        assert!(refresher.current().is_none());
        assert!(refresher.is_closed());
    }

    #[tokio::test]
    async fn test_cancelled_handle_publishes_nothing() {
        let refresher = refresher();
        let handle = refresher.handle();
        handle.cancel();
        let channel = Arc::new(test_util::cassandra3_channel());
        let result = refresher
            .refresh_with(&node("3.11.4"), channel, handle)
            .await;
        assert!(matches!(result, Err(SchemaError::Cancelled { .. })));
        assert!(refresher.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let refresher = SchemaRefresher::new(SchemaConfig {
            request_timeout_ms: 50,
            ..SchemaConfig::default()
        });
        let channel = Arc::new(test_util::cassandra3_channel());
        channel.set_latency("system_schema.views", Duration::from_secs(5));
        let result = refresher.refresh(&node("3.11.4"), channel).await;
        assert!(matches!(result, Err(SchemaError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_change_events() {
        let refresher = refresher();
        let mut events = refresher.subscribe();
        let channel = Arc::new(test_util::cassandra3_channel());
        refresher
            .refresh(&node("3.11.4"), channel.clone())
            .await
            .unwrap();
        let created = events.recv().await.unwrap();
        assert_eq!(created.kind, SchemaChangeKind::Created);
        assert_eq!(created.element, SchemaElement::Keyspace);
        assert_eq!(created.keyspace, "ks");

        // add a table, change the comment of another and drop the view
        let mut tables = test_util::cassandra3_tables();
        let table_rows = tables.get_mut("system_schema.tables").unwrap();
        for row in table_rows.iter_mut() {
            if row.get_string("table_name").unwrap() == Some("users") {
                row.insert("comment", "changed");
            }
        }
        table_rows.push(test_util::table_row("ks", "extra"));
        tables
            .get_mut("system_schema.columns")
            .unwrap()
            .push(test_util::column_row("ks", "extra", "k", "partition_key", 0, "int"));
        tables.insert("system_schema.views".to_string(), Vec::new());
        for (table, rows) in tables {
            channel.set_table(&table, rows);
        }

        refresher.refresh(&node("3.11.4"), channel).await.unwrap();
        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event.to_string());
        }
        assert_eq!(
            received,
            [
                "Created Table ks.extra",
                "Updated Table ks.users",
                "Dropped View ks.users_by_email",
            ]
        );
    }

    #[test]
    fn test_diff_keyspace_settings() {
        let mut a = Keyspace::empty("ks");
        a.replication.insert("class".into(), "SimpleStrategy".into());
        let mut b = a.clone();
        b.durable_writes = false;

        let meta = |ks: Keyspace| {
            let mut keyspaces = BTreeMap::new();
            keyspaces.insert(ks.name.clone(), ks);
            Metadata::new("n", Version::new(3, 11, 4), SchemaFamily::Cassandra3, keyspaces)
        };
        let events = diff(Some(&meta(a.clone())), &meta(b));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, SchemaChangeKind::Updated);

        assert!(diff(Some(&meta(a.clone())), &meta(a.clone())).is_empty());
        let dropped = diff(
            Some(&meta(a)),
            &Metadata::new("n", Version::new(3, 11, 4), SchemaFamily::Cassandra3, BTreeMap::new()),
        );
        assert_eq!(dropped[0].to_string(), "Dropped Keyspace ks");
    }

    #[test]
    fn test_event_serializes() {
        let event = event(SchemaChangeKind::Created, SchemaElement::Function, "ks", Some("f(int)"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "created");
        assert_eq!(json["element"], "function");
    }
}
