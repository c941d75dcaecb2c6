/*!
 * Fault-injection engine
 *
 * Top-level entry point tying the pieces together:
 *
 * ```text
 * configure(rule, container)
 *   │
 *   ├─▶ RuleProcessor      resolve endpoints and addresses
 *   ├─▶ RuleStore          publish the effective rule
 *   └─▶ ConnectionErrorInjector (connection rules only)
 *
 * request pipeline ──▶ direct_injector() / gateway_injector() ──▶ RuleStore
 * ```
 *
 * The engine owns the injection worker pool; dropping the engine shuts it down.
 */

use crate::collaborators::{ConnectionPool, Resolvers};
use crate::config::EngineConfig;
use crate::error::{FaultError, Result};
use crate::injector::{ConnectionErrorInjector, RuleBasedServerErrorInjector, ServerErrorInjector};
use crate::processor::RuleProcessor;
use crate::retry::ResolutionRetryPolicy;
use crate::scheduler::InjectionScheduler;
use faultline_core_rules::{EffectiveRule, FaultInjectionRule, RuleStore, RuleSummary};
use std::sync::Arc;
use tracing::{info, warn};

pub struct FaultInjectionEngine {
    config: EngineConfig,
    store: Arc<RuleStore>,
    processor: RuleProcessor,
    direct: Arc<RuleBasedServerErrorInjector>,
    gateway: Arc<RuleBasedServerErrorInjector>,
    connection: ConnectionErrorInjector,
}

impl FaultInjectionEngine {
    /// Build an engine with its own injection worker pool
    pub fn new(
        config: EngineConfig,
        resolvers: Resolvers,
        pool: Arc<dyn ConnectionPool>,
    ) -> Result<Self> {
        let scheduler = Arc::new(InjectionScheduler::new(config.injection_workers));
        Self::with_scheduler(config, resolvers, pool, scheduler)
    }

    /// Build an engine scheduling connection-error tasks on `scheduler`
    pub fn with_scheduler(
        config: EngineConfig,
        resolvers: Resolvers,
        pool: Arc<dyn ConnectionPool>,
        scheduler: Arc<InjectionScheduler>,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(RuleStore::new());
        let processor = RuleProcessor::new(
            config.connection_mode,
            resolvers,
            ResolutionRetryPolicy::new(config.resolution_retry.clone()),
        );

        Ok(Self {
            direct: Arc::new(RuleBasedServerErrorInjector::direct(store.clone())),
            gateway: Arc::new(RuleBasedServerErrorInjector::gateway(store.clone())),
            connection: ConnectionErrorInjector::new(store.clone(), pool, scheduler),
            processor,
            store,
            config,
        })
    }

    /// Register a rule against the container named `container_name`.
    ///
    /// On failure the rule never enters the store.
    pub async fn configure(
        &self,
        rule: &FaultInjectionRule,
        container_name: &str,
    ) -> Result<EffectiveRule> {
        let effective = self.processor.process(rule, container_name).await?;
        self.store.add(&effective);

        if let EffectiveRule::ConnectionError(connection_rule) = &effective {
            let scheduled = self.connection.accept(&effective);
            match scheduled {
                Ok(true) => {}
                Ok(false) => {
                    self.store.remove_connection_rule(connection_rule);
                    return Err(FaultError::UnsupportedConfiguration(format!(
                        "connection error rule {} requires direct connectivity",
                        rule.id()
                    )));
                }
                Err(e) => {
                    self.store.remove_connection_rule(connection_rule);
                    return Err(e);
                }
            }
        }

        info!(
            rule_id = %effective.id(),
            container = container_name,
            connection_type = %effective.connection_type(),
            "Registered fault rule"
        );
        Ok(effective)
    }

    /// Register several rules in order, stopping at the first failure
    pub async fn configure_all(
        &self,
        rules: &[FaultInjectionRule],
        container_name: &str,
    ) -> Result<Vec<EffectiveRule>> {
        let mut effective = Vec::with_capacity(rules.len());
        for rule in rules {
            match self.configure(rule, container_name).await {
                Ok(registered) => effective.push(registered),
                Err(e) => {
                    warn!(
                        rule_id = %rule.id(),
                        error = %e,
                        category = %e.category(),
                        fatal = e.is_fatal(),
                        "Rule registration failed"
                    );
                    return Err(e);
                }
            }
        }
        Ok(effective)
    }

    /// Hooks for requests sent over direct connections
    pub fn direct_injector(&self) -> Arc<dyn ServerErrorInjector> {
        self.direct.clone()
    }

    /// Hooks for requests sent through the gateway
    pub fn gateway_injector(&self) -> Arc<dyn ServerErrorInjector> {
        self.gateway.clone()
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Summaries of every registered rule
    pub fn rules(&self) -> Vec<RuleSummary> {
        self.store.rules().iter().map(EffectiveRule::summary).collect()
    }
}

impl std::fmt::Debug for FaultInjectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultInjectionEngine")
            .field("config", &self.config)
            .field("rules", &self.store.len())
            .finish_non_exhaustive()
    }
}
