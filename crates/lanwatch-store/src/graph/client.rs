//! Neo4j connection management for the inventory graph.

use neo4rs::{query, ConfigBuilder, Graph, Query};

use crate::error::StoreError;

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "lanwatch-dev".to_string(),
            max_connections: 16,
            fetch_size: 256,
        }
    }
}

/// Hardware addresses and scan ids are unique by database constraint.
const SCHEMA: [&str; 2] = [
    "CREATE CONSTRAINT device_mac IF NOT EXISTS FOR (d:Device) REQUIRE d.mac_address IS UNIQUE",
    "CREATE CONSTRAINT scan_record_id IF NOT EXISTS FOR (s:ScanRecord) REQUIRE s.id IS UNIQUE",
];

/// Neo4j-backed inventory. Clones share one connection pool.
#[derive(Clone)]
pub struct GraphStore {
    graph: Graph,
}

impl GraphStore {
    /// Connect to Neo4j and ensure the inventory schema exists.
    pub async fn connect(config: &GraphConfig) -> Result<Self, StoreError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        for constraint in SCHEMA {
            graph.run(query(constraint)).await?;
        }

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// The pooled connection, for transactions and ad-hoc statements.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }

    /// Rows of a read query, stopping after `limit` when given.
    pub(crate) async fn fetch(
        &self,
        query: Query,
        limit: Option<usize>,
    ) -> Result<Vec<neo4rs::Row>, StoreError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while limit.map_or(true, |n| rows.len() < n) {
            match stream.next().await? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    pub(crate) async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>, StoreError> {
        self.fetch(query, None).await
    }

    pub(crate) async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>, StoreError> {
        Ok(self.fetch(query, Some(1)).await?.pop())
    }
}
