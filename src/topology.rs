/*!
 * Static, in-memory account topology
 *
 * Implements every resolution collaborator from a fixed description of an
 * account: regions with their endpoints, containers, and the replica sets of
 * each partition. Used by the `plan` command and by tests; a live client
 * would back the same traits with its caches.
 *
 * ```toml
 * default_endpoint = "https://acct.example.net:443/"
 *
 * [[regions]]
 * name = "West US"
 * endpoint = "https://acct-westus.example.net:443/"
 * writable = true
 *
 * [[containers]]
 * name = "orders"
 * id = "coll-1"
 *
 * [[containers.partitions]]
 * id = "0"
 * min = ""
 * max = "FF"
 * primary = "rntbd://n1.example.net:14000/apps/a/partitions/0/replicas/1p/"
 * secondaries = ["rntbd://n2.example.net:14000/apps/a/partitions/0/replicas/2s/"]
 * ```
 */

use crate::collaborators::{
    AddressResolver, CollaboratorResult, CollectionCache, EndpointDirectory, PartitionKeyRangeCache,
    ReplicaAddress,
};
use crate::error::{CollaboratorError, FaultError, Result};
use async_trait::async_trait;
use faultline_core_rules::FeedRange;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticTopology {
    pub default_endpoint: String,

    #[serde(default)]
    pub regions: Vec<RegionSpec>,

    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub writable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub partitions: Vec<PartitionSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    pub id: String,
    /// Inclusive lower bound of the partition's key range
    pub min: String,
    /// Exclusive upper bound of the partition's key range
    pub max: String,
    pub primary: String,
    #[serde(default)]
    pub secondaries: Vec<String>,
}

impl StaticTopology {
    pub fn new(default_endpoint: impl Into<String>) -> Self {
        Self {
            default_endpoint: default_endpoint.into(),
            regions: Vec::new(),
            containers: Vec::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| FaultError::parse(format!("topology {}", path.display()), e))
    }

    pub fn with_region(
        mut self,
        name: impl Into<String>,
        endpoint: impl Into<String>,
        writable: bool,
    ) -> Self {
        self.regions.push(RegionSpec {
            name: name.into(),
            endpoint: endpoint.into(),
            writable,
        });
        self
    }

    pub fn with_container(mut self, container: ContainerSpec) -> Self {
        self.containers.push(container);
        self
    }

    fn container_by_id(&self, container_id: &str) -> CollaboratorResult<&ContainerSpec> {
        self.containers
            .iter()
            .find(|c| c.id == container_id)
            .ok_or_else(|| CollaboratorError::NotFound(format!("container id {}", container_id)))
    }

    fn partition(
        &self,
        container_id: &str,
        partition_id: &str,
    ) -> CollaboratorResult<&PartitionSpec> {
        self.container_by_id(container_id)?
            .partitions
            .iter()
            .find(|p| p.id == partition_id)
            .ok_or_else(|| {
                CollaboratorError::NotFound(format!(
                    "partition {} of container {}",
                    partition_id, container_id
                ))
            })
    }
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            partitions: Vec::new(),
        }
    }

    pub fn with_partition(mut self, partition: PartitionSpec) -> Self {
        self.partitions.push(partition);
        self
    }
}

#[async_trait]
impl CollectionCache for StaticTopology {
    async fn resolve_container(&self, name: &str) -> CollaboratorResult<String> {
        self.containers
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.id.clone())
            .ok_or_else(|| CollaboratorError::NotFound(format!("container {}", name)))
    }
}

#[async_trait]
impl PartitionKeyRangeCache for StaticTopology {
    async fn resolve_partitions(
        &self,
        feed_range: &FeedRange,
        container_id: &str,
    ) -> CollaboratorResult<Vec<String>> {
        Ok(self
            .container_by_id(container_id)?
            .partitions
            .iter()
            .filter(|p| feed_range.overlaps(&p.min, &p.max))
            .map(|p| p.id.clone())
            .collect())
    }
}

#[async_trait]
impl AddressResolver for StaticTopology {
    async fn resolve_primary_address(
        &self,
        container_id: &str,
        partition_id: &str,
    ) -> CollaboratorResult<String> {
        Ok(self.partition(container_id, partition_id)?.primary.clone())
    }

    async fn resolve_replica_addresses(
        &self,
        container_id: &str,
        partition_id: &str,
    ) -> CollaboratorResult<Vec<ReplicaAddress>> {
        let partition = self.partition(container_id, partition_id)?;
        let mut replicas = vec![ReplicaAddress::primary(partition.primary.clone())];
        replicas.extend(partition.secondaries.iter().cloned().map(ReplicaAddress::secondary));
        Ok(replicas)
    }
}

impl EndpointDirectory for StaticTopology {
    fn available_read_endpoints(&self) -> Vec<String> {
        self.regions.iter().map(|r| r.endpoint.clone()).collect()
    }

    fn available_write_endpoints(&self) -> Vec<String> {
        self.regions
            .iter()
            .filter(|r| r.writable)
            .map(|r| r.endpoint.clone())
            .collect()
    }

    fn default_endpoint(&self) -> String {
        self.default_endpoint.clone()
    }

    fn resolve_endpoint_for_region(
        &self,
        region: &str,
        write_only: bool,
    ) -> CollaboratorResult<String> {
        let spec = self
            .regions
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(region))
            .ok_or_else(|| CollaboratorError::NotFound(format!("region {}", region)))?;
        if write_only && !spec.writable {
            return Err(CollaboratorError::Permanent(format!(
                "region {} does not accept writes",
                spec.name
            )));
        }
        Ok(spec.endpoint.clone())
    }
}
