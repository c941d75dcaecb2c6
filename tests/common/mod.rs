/*!
 * Shared fakes for integration tests
 */
#![allow(dead_code)]

use async_trait::async_trait;
use faultline::collaborators::{
    AddressResolver, CollaboratorResult, ConnectionPool, PooledEndpoint, ReplicaAddress,
};
use faultline::rules::address::server_key;
use faultline::rules::ConnectionErrorKind;
use faultline::topology::{ContainerSpec, PartitionSpec, StaticTopology};
use faultline::CollaboratorError;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const WEST: &str = "https://acct-westus.example.net:443/";
pub const EAST: &str = "https://acct-eastus.example.net:443/";
pub const DEFAULT: &str = "https://acct.example.net:443/";

pub const PRIMARY: &str = "rntbd://n1.example.net:14000/apps/a/partitions/0/replicas/1p/";
pub const SECONDARY_B: &str = "rntbd://n3.example.net:14000/apps/a/partitions/0/replicas/3s/";
pub const SECONDARY_A: &str = "rntbd://n2.example.net:14000/apps/a/partitions/0/replicas/2s/";

/// One container ("orders" / "coll-1") with a single three-replica partition
pub fn topology() -> StaticTopology {
    StaticTopology::new(DEFAULT)
        .with_region("West US", WEST, true)
        .with_region("East US", EAST, false)
        .with_container(ContainerSpec::new("orders", "coll-1").with_partition(PartitionSpec {
            id: "0".into(),
            min: "".into(),
            max: "FF".into(),
            primary: PRIMARY.into(),
            secondaries: vec![SECONDARY_B.into(), SECONDARY_A.into()],
        }))
}

/// Same containers without any regions, so rules resolve no region endpoints
pub fn regionless_topology() -> StaticTopology {
    let mut regionless = StaticTopology::new(DEFAULT);
    regionless.containers = topology().containers;
    regionless
}

/// Pooled endpoint counting injected connection events
#[derive(Debug)]
pub struct RecordingEndpoint {
    key: String,
    fail: bool,
    events: Mutex<Vec<(String, u32, ConnectionErrorKind)>>,
}

impl RecordingEndpoint {
    pub fn events(&self) -> Vec<(String, u32, ConnectionErrorKind)> {
        self.events.lock().clone()
    }
}

impl PooledEndpoint for RecordingEndpoint {
    fn server_key(&self) -> String {
        self.key.clone()
    }

    fn inject_connection_error(
        &self,
        rule_id: &str,
        threshold: u32,
        kind: ConnectionErrorKind,
    ) -> CollaboratorResult<()> {
        if self.fail {
            return Err(CollaboratorError::Transient(format!("{} unreachable", self.key)));
        }
        self.events.lock().push((rule_id.to_string(), threshold, kind));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingPool {
    endpoints: BTreeMap<String, Arc<RecordingEndpoint>>,
}

impl RecordingPool {
    pub fn new(keys: &[&str]) -> Arc<Self> {
        Self::with_failures(keys, &[])
    }

    pub fn with_failures(keys: &[&str], failing: &[&str]) -> Arc<Self> {
        let endpoints = keys
            .iter()
            .map(|key| {
                (
                    key.to_string(),
                    Arc::new(RecordingEndpoint {
                        key: key.to_string(),
                        fail: failing.contains(key),
                        events: Mutex::new(Vec::new()),
                    }),
                )
            })
            .collect();
        Arc::new(Self { endpoints })
    }

    pub fn endpoint(&self, key: &str) -> Arc<RecordingEndpoint> {
        self.endpoints[key].clone()
    }

    pub fn event_count(&self, key: &str) -> usize {
        self.endpoints[key].events().len()
    }
}

impl ConnectionPool for RecordingPool {
    fn list_endpoints(&self) -> Vec<Arc<dyn PooledEndpoint>> {
        self.endpoints
            .values()
            .cloned()
            .map(|e| e as Arc<dyn PooledEndpoint>)
            .collect()
    }

    fn get_endpoint(&self, address: &str) -> Option<Arc<dyn PooledEndpoint>> {
        let key = server_key(address).unwrap_or_else(|| address.to_string());
        self.endpoints.get(&key).cloned().map(|e| e as Arc<dyn PooledEndpoint>)
    }
}

/// Address resolver failing a fixed number of times before delegating
pub struct FlakyAddresses<R> {
    inner: Arc<R>,
    remaining_failures: AtomicU32,
    error: CollaboratorError,
    pub calls: AtomicU32,
}

impl<R> FlakyAddresses<R> {
    pub fn new(inner: Arc<R>, failures: u32, error: CollaboratorError) -> Self {
        Self {
            inner,
            remaining_failures: AtomicU32::new(failures),
            error,
            calls: AtomicU32::new(0),
        }
    }

    pub fn throttled(inner: Arc<R>, failures: u32) -> Self {
        Self::new(
            inner,
            failures,
            CollaboratorError::Throttled {
                retry_after: Duration::from_millis(5),
            },
        )
    }

    fn fail(&self) -> Option<CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| self.error.clone())
    }
}

#[async_trait]
impl<R: AddressResolver + 'static> AddressResolver for FlakyAddresses<R> {
    async fn resolve_primary_address(
        &self,
        container_id: &str,
        partition_id: &str,
    ) -> CollaboratorResult<String> {
        if let Some(err) = self.fail() {
            return Err(err);
        }
        self.inner.resolve_primary_address(container_id, partition_id).await
    }

    async fn resolve_replica_addresses(
        &self,
        container_id: &str,
        partition_id: &str,
    ) -> CollaboratorResult<Vec<ReplicaAddress>> {
        if let Some(err) = self.fail() {
            return Err(err);
        }
        self.inner.resolve_replica_addresses(container_id, partition_id).await
    }
}
