// src/fixture.rs

//! YAML snapshots of a node's system schema tables, served through a [`MemoryChannel`].
//!
//! ```yaml
//! node:
//!   address: 127.0.0.1:9042
//!   version: 3.11.4
//! tables:
//!   system_schema.keyspaces:
//!     - { keyspace_name: ks, durable_writes: true, replication: { class: SimpleStrategy } }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};
use tracing::debug;

use crate::{channel::MemoryChannel, config::SchemaConfig, node::Node, rows::Row};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub node: Node,
    #[serde(default)]
    pub config: SchemaConfig,
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<Row>>,
}

impl Fixture {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("parsing schema fixture")
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        let fixture = Self::from_yaml_str(&yaml)
            .with_context(|| format!("loading {}", path.display()))?;
        debug!(path = %path.display(), tables = fixture.tables.len(), "loaded fixture");
        Ok(fixture)
    }

    /// A channel answering with this fixture's rows. Tables the fixture omits are
    /// served empty so that older snapshots still refresh.
    pub fn channel(&self) -> Result<MemoryChannel> {
        let family = self.node.family()?;
        let channel = MemoryChannel::new();
        for (_, table) in family.profile().tables {
            channel.set_table(table, self.tables.get(*table).cloned().unwrap_or_default());
        }
        for (table, rows) in &self.tables {
            channel.set_table(table, rows.clone());
        }
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{family::SchemaFamily, refresh::SchemaRefresher};
    use std::{io::Write, sync::Arc};
    use tempfile::NamedTempFile;

    const FIXTURE: &str = r#"
node:
  address: 127.0.0.1:9042
  version: 3.11.4
config:
  request_timeout_ms: 500
tables:
  system_schema.keyspaces:
    - keyspace_name: ks
      durable_writes: true
      replication:
        class: org.apache.cassandra.locator.SimpleStrategy
        replication_factor: "3"
  system_schema.tables:
    - keyspace_name: ks
      table_name: t
      flags: [compound]
      gc_grace_seconds: 3600
  system_schema.columns:
    - { keyspace_name: ks, table_name: t, column_name: k, kind: partition_key, position: 0, type: int }
    - { keyspace_name: ks, table_name: t, column_name: v, kind: regular, position: -1, type: "list<text>" }
"#;

    #[test]
    fn test_from_yaml() {
        let fixture = Fixture::from_yaml_str(FIXTURE).unwrap();
        assert_eq!(fixture.node.family().unwrap(), SchemaFamily::Cassandra3);
        assert_eq!(fixture.config.request_timeout_ms, 500);
        assert_eq!(fixture.tables["system_schema.columns"].len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_from_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(FIXTURE.as_bytes())?;
        let fixture = Fixture::from_path(file.path())?;

        let refresher = SchemaRefresher::new(fixture.config.clone());
        let metadata = refresher
            .refresh(&fixture.node, Arc::new(fixture.channel()?))
            .await?;
        let table = metadata.table("ks", "t").unwrap();
        assert_eq!(table.options.gc_grace_seconds.get(), Some(&3600));
        assert!(!table.options.compaction.is_valid());
        assert_eq!(
            metadata.keyspace("ks").unwrap().replication["replication_factor"],
            "3"
        );
        Ok(())
    }

    #[test]
    fn test_missing_version_is_reported() {
        let fixture = Fixture::from_yaml_str("node: { address: n1 }").unwrap();
        assert!(fixture.channel().is_err());
    }
}
