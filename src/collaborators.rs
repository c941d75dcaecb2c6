/*!
 * Collaborator interfaces
 *
 * The engine never talks to the network itself. Container metadata,
 * partition ranges, replica addresses, regional endpoints, and the live
 * connection pool are reached through these narrow traits, implemented by the
 * surrounding client (or by `StaticTopology` in tests and the CLI).
 */

use crate::error::CollaboratorError;
use async_trait::async_trait;
use faultline_core_rules::{ConnectionErrorKind, FeedRange};
use std::sync::Arc;

/// Result type for collaborator calls
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Collection metadata cache
#[async_trait]
pub trait CollectionCache: Send + Sync {
    /// Resolve a container name to its identifier. Fails with `NotFound` if unknown.
    async fn resolve_container(&self, name: &str) -> CollaboratorResult<String>;
}

/// Partition-key-range cache
#[async_trait]
pub trait PartitionKeyRangeCache: Send + Sync {
    /// Partitions of `container_id` overlapping `feed_range`
    async fn resolve_partitions(
        &self,
        feed_range: &FeedRange,
        container_id: &str,
    ) -> CollaboratorResult<Vec<String>>;
}

/// A physical replica of a partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaAddress {
    pub uri: String,
    pub is_primary: bool,
}

impl ReplicaAddress {
    pub fn primary(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            is_primary: true,
        }
    }

    pub fn secondary(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            is_primary: false,
        }
    }
}

/// Replica address resolver
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve_primary_address(
        &self,
        container_id: &str,
        partition_id: &str,
    ) -> CollaboratorResult<String>;

    /// Every replica of the partition, in no particular order
    async fn resolve_replica_addresses(
        &self,
        container_id: &str,
        partition_id: &str,
    ) -> CollaboratorResult<Vec<ReplicaAddress>>;
}

/// Regional endpoint directory
pub trait EndpointDirectory: Send + Sync {
    fn available_read_endpoints(&self) -> Vec<String>;

    fn available_write_endpoints(&self) -> Vec<String>;

    /// Account-level endpoint used when no region applies
    fn default_endpoint(&self) -> String;

    /// Endpoint serving `region`. With `write_only`, the region must accept writes.
    fn resolve_endpoint_for_region(
        &self,
        region: &str,
        write_only: bool,
    ) -> CollaboratorResult<String>;
}

/// Live pool of direct connections
pub trait ConnectionPool: Send + Sync {
    fn list_endpoints(&self) -> Vec<Arc<dyn PooledEndpoint>>;

    /// Endpoint serving `address` (a replica address or a server key)
    fn get_endpoint(&self, address: &str) -> Option<Arc<dyn PooledEndpoint>>;
}

/// One pooled server endpoint
pub trait PooledEndpoint: Send + Sync {
    /// `scheme://host:port` identity of the endpoint
    fn server_key(&self) -> String;

    /// Make the next `threshold` uses of this endpoint fail with `kind`
    fn inject_connection_error(
        &self,
        rule_id: &str,
        threshold: u32,
        kind: ConnectionErrorKind,
    ) -> CollaboratorResult<()>;
}

/// Bundle of the resolution collaborators the rule processor needs
#[derive(Clone)]
pub struct Resolvers {
    pub collections: Arc<dyn CollectionCache>,
    pub partitions: Arc<dyn PartitionKeyRangeCache>,
    pub addresses: Arc<dyn AddressResolver>,
    pub endpoints: Arc<dyn EndpointDirectory>,
}

impl Resolvers {
    /// Use one value for every resolution role
    pub fn from_single<T>(topology: Arc<T>) -> Self
    where
        T: CollectionCache + PartitionKeyRangeCache + AddressResolver + EndpointDirectory + 'static,
    {
        Self {
            collections: topology.clone(),
            partitions: topology.clone(),
            addresses: topology.clone(),
            endpoints: topology,
        }
    }
}

impl std::fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolvers").finish_non_exhaustive()
    }
}
