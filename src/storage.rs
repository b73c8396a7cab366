use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{
    error::AppError,
    models::{Location, Node},
};

/// Filter for node lookups. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    pub address: Option<String>,
    pub network: Option<String>,
}

impl NodeFilter {
    pub fn by_address(address: &str) -> Self {
        NodeFilter {
            address: Some(address.to_string()),
            network: None,
        }
    }

    pub fn with_network(mut self, network: &str) -> Self {
        self.network = Some(network.to_string());
        self
    }

    pub fn matches(&self, node: &Node) -> bool {
        self.address.as_deref().map_or(true, |a| a == node.address)
            && self.network.as_deref().map_or(true, |n| n == node.network)
    }
}

/// Persistence of crawled nodes and their locations
#[async_trait]
pub trait Storage: Send + Sync {
    /// First node matching the filter, if any
    async fn query_node(&self, filter: &NodeFilter) -> Result<Option<Node>, AppError>;

    /// Create or update the node keyed by (address, network), along with its
    /// location. Returns the stored record.
    async fn upsert_node(&self, node: &Node) -> Result<Node, AppError>;

    /// Delete every node at the node's address. Deleting a missing node is
    /// not an error.
    async fn delete_node(&self, node: &Node) -> Result<(), AppError>;

    /// Nodes last updated before `threshold`
    async fn get_stale_nodes(&self, threshold: DateTime<Utc>) -> Result<Vec<Node>, AppError>;

    async fn query_location(
        &self,
        latitude: &str,
        longitude: &str,
    ) -> Result<Option<Location>, AppError>;

    /// Create or update the location keyed by (latitude, longitude)
    async fn upsert_location(&self, location: &Location) -> Result<Location, AppError>;
}

#[derive(Default)]
struct MemoryInner {
    nodes: HashMap<(String, String), Node>,
    locations: HashMap<(String, String), Location>,
}

impl MemoryInner {
    fn upsert_location(&mut self, location: &Location) -> Result<Location, AppError> {
        if !location.has_coordinates() {
            return Err(AppError::ValidationError(
                "longitude and latitude are required".to_string(),
            ));
        }

        let key = (location.latitude.clone(), location.longitude.clone());
        self.locations.insert(key, location.clone());
        Ok(location.clone())
    }
}

/// Storage kept in process memory, used when no database is configured
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all stored nodes
    pub fn nodes(&self) -> Vec<Node> {
        self.inner.lock().nodes.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn query_node(&self, filter: &NodeFilter) -> Result<Option<Node>, AppError> {
        let inner = self.inner.lock();
        Ok(inner.nodes.values().find(|n| filter.matches(n)).cloned())
    }

    async fn upsert_node(&self, node: &Node) -> Result<Node, AppError> {
        let mut inner = self.inner.lock();
        let location = inner.upsert_location(&node.location)?;

        let key = (node.address.clone(), node.network.clone());
        let now = Utc::now();
        let created_at = inner
            .nodes
            .get(&key)
            .map_or(now, |existing| existing.created_at);

        let record = Node {
            location,
            created_at,
            updated_at: now,
            ..node.clone()
        };
        inner.nodes.insert(key, record.clone());

        Ok(record)
    }

    async fn delete_node(&self, node: &Node) -> Result<(), AppError> {
        self.inner
            .lock()
            .nodes
            .retain(|_, n| n.address != node.address);
        Ok(())
    }

    async fn get_stale_nodes(&self, threshold: DateTime<Utc>) -> Result<Vec<Node>, AppError> {
        let inner = self.inner.lock();
        Ok(inner
            .nodes
            .values()
            .filter(|n| n.updated_at < threshold)
            .cloned()
            .collect())
    }

    async fn query_location(
        &self,
        latitude: &str,
        longitude: &str,
    ) -> Result<Option<Location>, AppError> {
        let inner = self.inner.lock();
        Ok(inner
            .locations
            .get(&(latitude.to_string(), longitude.to_string()))
            .cloned())
    }

    async fn upsert_location(&self, location: &Location) -> Result<Location, AppError> {
        self.inner.lock().upsert_location(location)
    }
}
