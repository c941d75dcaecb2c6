/*!
 * Rule processor: declared rules to effective rules
 *
 * A declared rule names a region and a feed range. Before it can be matched
 * against requests it is bound to the concrete service endpoints and replica
 * addresses those names resolve to right now:
 *
 * 1. container name to container id
 * 2. connection type checked against the client's connectivity
 * 3. operation scoping, region endpoints, replica addresses
 * 4. effective rule built from the processed condition and the declared result
 */

use crate::collaborators::{ReplicaAddress, Resolvers};
use crate::error::{FaultError, Result};
use crate::retry::ResolutionRetryPolicy;
use faultline_core_rules::address::server_keys;
use faultline_core_rules::{
    Condition, ConnectionErrorRule, ConnectionType, EffectiveRule, FaultInjectionCondition,
    FaultInjectionEndpoints, FaultInjectionResult, FaultInjectionRule, RuleCore, ServerErrorRule,
};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct RuleProcessor {
    connection_mode: ConnectionType,
    resolvers: Resolvers,
    retry: ResolutionRetryPolicy,
}

impl RuleProcessor {
    pub fn new(
        connection_mode: ConnectionType,
        resolvers: Resolvers,
        retry: ResolutionRetryPolicy,
    ) -> Self {
        Self {
            connection_mode,
            resolvers,
            retry,
        }
    }

    /// Resolve `rule` against the container named `container_name`
    pub async fn process(
        &self,
        rule: &FaultInjectionRule,
        container_name: &str,
    ) -> Result<EffectiveRule> {
        let container_id = self
            .resolvers
            .collections
            .resolve_container(container_name)
            .await
            .map_err(|e| FaultError::resolution(format!("container {}", container_name), e))?;

        let declared = rule.condition();
        if declared.connection_type() == ConnectionType::Direct
            && self.connection_mode == ConnectionType::Gateway
        {
            return Err(FaultError::UnsupportedConfiguration(format!(
                "rule {} targets direct connections but the client is gateway-only",
                rule.id()
            )));
        }

        let effective = match rule.result() {
            FaultInjectionResult::ServerError(result) => {
                let operation_scoped = result.kind().is_operation_scoped();
                let condition = self
                    .build_condition(declared, &container_id, operation_scoped)
                    .await?;
                let core = self.core(rule, rule.hit_limit(), condition)?;
                EffectiveRule::ServerError(Arc::new(ServerErrorRule::new(core, result.clone())))
            }
            FaultInjectionResult::ConnectionError(result) => {
                // Connection errors act on whole endpoints, never on one operation
                let condition = self.build_condition(declared, &container_id, false).await?;
                let core = self.core(rule, None, condition)?;
                let connection_rule = ConnectionErrorRule::new(core, result.clone());
                EffectiveRule::ConnectionError(Arc::new(connection_rule))
            }
        };

        let summary = effective.summary();
        info!(
            rule_id = %summary.id,
            kind = %summary.kind,
            container = %summary.container_id,
            region_endpoints = summary.region_endpoints.len(),
            addresses = summary.addresses.len(),
            "Processed fault rule"
        );
        Ok(effective)
    }

    fn core(
        &self,
        rule: &FaultInjectionRule,
        hit_limit: Option<u64>,
        condition: Condition,
    ) -> Result<RuleCore> {
        Ok(RuleCore::new(
            rule.id(),
            rule.is_enabled(),
            rule.start_delay(),
            rule.duration(),
            hit_limit,
            condition,
        )?)
    }

    async fn build_condition(
        &self,
        declared: &FaultInjectionCondition,
        container_id: &str,
        operation_scoped: bool,
    ) -> Result<Condition> {
        let mut builder = Condition::builder(container_id, declared.connection_type());
        if operation_scoped {
            if let Some(op) = declared.operation_type() {
                builder = builder.operation_type(op);
            }
        }

        let region_endpoints = self.resolve_region_endpoints(declared)?;

        let mut addresses = match declared.endpoints() {
            Some(selector) => self.resolve_addresses(declared, selector, container_id).await?,
            None => Vec::new(),
        };
        if !operation_scoped {
            addresses = server_keys(&addresses);
        }

        Ok(builder
            .region_endpoints(region_endpoints)
            .addresses(addresses)
            .primary_only(declared.primary_only())
            .build())
    }

    /// Explicit region: that region's endpoint plus the account default.
    /// No region: every read endpoint, or every write endpoint for writes.
    ///
    /// A condition without an operation type falls back to read endpoints even
    /// for kinds that are not operation-scoped.
    fn resolve_region_endpoints(&self, declared: &FaultInjectionCondition) -> Result<Vec<String>> {
        let directory = &self.resolvers.endpoints;
        let is_write = declared.operation_type().is_some_and(|op| op.is_write());

        let endpoints = match declared.region() {
            Some(region) => {
                let endpoint = directory
                    .resolve_endpoint_for_region(region, is_write)
                    .map_err(|e| FaultError::resolution(format!("region {}", region), e))?;
                let mut endpoints = vec![endpoint];
                let default = directory.default_endpoint();
                if !endpoints.contains(&default) {
                    endpoints.push(default);
                }
                endpoints
            }
            None if is_write => directory.available_write_endpoints(),
            None => directory.available_read_endpoints(),
        };
        debug!(?endpoints, "Resolved region endpoints");
        Ok(endpoints)
    }

    async fn resolve_addresses(
        &self,
        declared: &FaultInjectionCondition,
        selector: &FaultInjectionEndpoints,
        container_id: &str,
    ) -> Result<Vec<String>> {
        let feed_range = selector.feed_range();
        let partitions = self
            .retry
            .execute("partitions", || {
                self.resolvers.partitions.resolve_partitions(feed_range, container_id)
            })
            .await
            .map_err(|e| FaultError::resolution(format!("partitions of {}", container_id), e))?;

        let primary_only = declared.primary_only()
            || declared.operation_type().is_some_and(|op| op.is_write());

        let mut addresses: Vec<String> = Vec::new();
        for partition_id in &partitions {
            let resolved = if primary_only {
                let primary = self
                    .retry
                    .execute("primary address", || {
                        self.resolvers
                            .addresses
                            .resolve_primary_address(container_id, partition_id)
                    })
                    .await
                    .map_err(|e| {
                        FaultError::resolution(format!("primary of partition {}", partition_id), e)
                    })?;
                vec![primary]
            } else {
                let replicas = self
                    .retry
                    .execute("replica addresses", || {
                        self.resolvers
                            .addresses
                            .resolve_replica_addresses(container_id, partition_id)
                    })
                    .await
                    .map_err(|e| {
                        FaultError::resolution(format!("replicas of partition {}", partition_id), e)
                    })?;
                select_replicas(replicas, selector.include_primary(), selector.replica_count())
            };

            for address in resolved {
                if !addresses.contains(&address) {
                    addresses.push(address);
                }
            }
        }
        Ok(addresses)
    }
}

/// Order replicas primary first, the rest by address, and keep at most `replica_count`.
///
/// With `include_primary` unset the primary is dropped.
pub fn select_replicas(
    replicas: Vec<ReplicaAddress>,
    include_primary: bool,
    replica_count: usize,
) -> Vec<String> {
    let (primaries, mut secondaries): (Vec<_>, Vec<_>) =
        replicas.into_iter().partition(|r| r.is_primary);
    secondaries.sort_by(|a, b| a.uri.cmp(&b.uri));

    let primaries = primaries.into_iter().filter(|_| include_primary);
    primaries
        .chain(secondaries)
        .map(|r| r.uri)
        .take(replica_count)
        .collect()
}
