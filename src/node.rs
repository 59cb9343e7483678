// src/node.rs

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    error::{Result, SchemaError},
    family::SchemaFamily,
    version::Version,
};

/// A cluster member as seen by the topology layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub address: String,
    /// The release version the node reported, if it reported one.
    #[serde(default)]
    pub version: Option<Version>,
}

impl Node {
    pub fn new(address: &str, version: Version) -> Self {
        Self {
            address: address.to_string(),
            version: Some(version),
        }
    }

    pub fn unversioned(address: &str) -> Self {
        Self {
            address: address.to_string(),
            version: None,
        }
    }

    /// The reported version, or [`SchemaError::VersionUnavailable`].
    pub fn require_version(&self) -> Result<&Version> {
        self.version
            .as_ref()
            .ok_or_else(|| SchemaError::VersionUnavailable {
                node: self.address.clone(),
            })
    }

    pub fn family(&self) -> Result<SchemaFamily> {
        SchemaFamily::for_version(&self.address, self.require_version()?)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} ({})", self.address, version),
            None => write!(f, "{} (unknown version)", self.address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_from_node() {
        let node = Node::new("10.0.0.1:9042", Version::parse("4.0.0.602").unwrap());
        assert_eq!(node.family().unwrap(), SchemaFamily::Cassandra3);

        let node = Node::unversioned("10.0.0.2:9042");
        assert!(matches!(
            node.family(),
            Err(SchemaError::VersionUnavailable { node }) if node == "10.0.0.2:9042"
        ));
    }

    #[test]
    fn test_node_from_yaml() {
        let node: Node = serde_yaml::from_str("address: 127.0.0.1:9042\nversion: 3.11.4\n").unwrap();
        assert_eq!(node.version, Some(Version::new(3, 11, 4)));
        let node: Node = serde_yaml::from_str("address: 127.0.0.1:9042\n").unwrap();
        assert!(node.version.is_none());
    }
}
