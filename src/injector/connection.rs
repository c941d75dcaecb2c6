/*!
 * Connection-error injection
 *
 * Every accepted connection-error rule gets one recurring task on the
 * injection worker pool:
 *
 * ```text
 * loop {
 *     sleep(interval)
 *     still in store && valid?  ── no ──▶ exit
 *     inject `threshold` events into each target endpoint
 * }
 * remove rule from store
 * ```
 *
 * Targets are the rule's resolved addresses if it has any, otherwise the
 * pooled endpoints behind its region endpoints, otherwise every pooled
 * endpoint. A failed injection is logged and the task carries on.
 */

use crate::collaborators::{ConnectionPool, PooledEndpoint};
use crate::error::Result;
use crate::scheduler::InjectionScheduler;
use faultline_core_rules::address::server_key;
use faultline_core_rules::{ConnectionErrorRule, ConnectionType, EffectiveRule, RuleStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ConnectionErrorInjector {
    store: Arc<RuleStore>,
    pool: Arc<dyn ConnectionPool>,
    scheduler: Arc<InjectionScheduler>,
}

impl ConnectionErrorInjector {
    pub fn new(
        store: Arc<RuleStore>,
        pool: Arc<dyn ConnectionPool>,
        scheduler: Arc<InjectionScheduler>,
    ) -> Self {
        Self {
            store,
            pool,
            scheduler,
        }
    }

    /// Schedule the recurring task for a direct connection-error rule.
    ///
    /// Returns `Ok(false)` without scheduling anything for any other rule shape,
    /// and an error only when the worker pool cannot be started.
    pub fn accept(&self, rule: &EffectiveRule) -> Result<bool> {
        let rule = match rule {
            EffectiveRule::ConnectionError(rule)
                if rule.connection_type() == ConnectionType::Direct =>
            {
                rule.clone()
            }
            _ => return Ok(false),
        };

        let task = run(rule.clone(), self.store.clone(), self.pool.clone());
        self.scheduler.spawn(task)?;
        info!(
            rule_id = %rule.id(),
            kind = %rule.result().kind(),
            interval_ms = rule.result().interval().as_millis() as u64,
            "Scheduled connection error injection"
        );
        Ok(true)
    }
}

impl std::fmt::Debug for ConnectionErrorInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionErrorInjector")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

/// Removes the rule from the store however the task ends
struct StoreCleanup {
    store: Arc<RuleStore>,
    rule: Arc<ConnectionErrorRule>,
}

impl Drop for StoreCleanup {
    fn drop(&mut self) {
        if self.store.remove_connection_rule(&self.rule) {
            info!(rule_id = %self.rule.id(), "Connection error rule expired, removed from store");
        }
    }
}

async fn run(rule: Arc<ConnectionErrorRule>, store: Arc<RuleStore>, pool: Arc<dyn ConnectionPool>) {
    let _cleanup = StoreCleanup {
        store: store.clone(),
        rule: rule.clone(),
    };

    loop {
        tokio::time::sleep(rule.result().interval()).await;

        if !(store.contains_connection_rule(&rule) && rule.is_valid()) {
            break;
        }

        let injected = inject_once(&rule, pool.as_ref());
        debug!(rule_id = %rule.id(), endpoints = injected, "Connection error injection attempt");
    }
}

/// One injection attempt. Returns the number of endpoints injected into.
pub(crate) fn inject_once(rule: &ConnectionErrorRule, pool: &dyn ConnectionPool) -> usize {
    let result = rule.result();
    let mut injected = 0;
    for endpoint in targets(rule, pool) {
        match endpoint.inject_connection_error(rule.id(), result.threshold(), result.kind()) {
            Ok(()) => injected += 1,
            Err(e) => warn!(
                rule_id = %rule.id(),
                endpoint = %endpoint.server_key(),
                error = %e,
                "Connection error injection failed"
            ),
        }
    }
    injected
}

fn targets(rule: &ConnectionErrorRule, pool: &dyn ConnectionPool) -> Vec<Arc<dyn PooledEndpoint>> {
    let condition = rule.core().condition();

    if !condition.addresses().is_empty() {
        return condition
            .addresses()
            .iter()
            .filter_map(|address| pool.get_endpoint(address))
            .collect();
    }

    if !condition.region_endpoints().is_empty() {
        let keys: Vec<String> = condition.region_endpoints().iter().map(|e| normalize(e)).collect();
        return pool
            .list_endpoints()
            .into_iter()
            .filter(|endpoint| keys.contains(&normalize(&endpoint.server_key())))
            .collect();
    }

    pool.list_endpoints()
}

fn normalize(address: &str) -> String {
    server_key(address).unwrap_or_else(|| address.to_string())
}
