//! User-declared fault rules
//!
//! These are the rules operators write: conditions name regions and feed
//! ranges, not concrete endpoints. They are validated when built and turned
//! into [`EffectiveRule`](crate::rule::EffectiveRule)s by the rule processor.
//!
//! # Example
//!
//! ```
//! use faultline_core_rules::declared::{FaultInjectionCondition, FaultInjectionRule};
//! use faultline_core_rules::request::{ConnectionType, OperationType};
//! use faultline_core_rules::result::{ServerErrorKind, ServerErrorResult};
//! use std::time::Duration;
//!
//! let rule = FaultInjectionRule::builder("gone-rule")
//!     .condition(
//!         FaultInjectionCondition::builder()
//!             .connection_type(ConnectionType::Direct)
//!             .operation_type(OperationType::Read)
//!             .region("West US")
//!             .build()
//!             .unwrap(),
//!     )
//!     .server_error(ServerErrorResult::builder(ServerErrorKind::Gone).times(2).build().unwrap())
//!     .duration(Duration::from_secs(60))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(rule.id(), "gone-rule");
//! ```

use crate::error::RuleError;
use crate::request::{ConnectionType, OperationType};
use crate::result::{ConnectionErrorResult, ServerErrorResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Range of the partition key space, `[min, max)` over effective partition keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedRange {
    pub min: String,
    pub max: String,
}

impl FeedRange {
    pub const MIN_KEY: &'static str = "";
    pub const MAX_KEY: &'static str = "FF";

    pub fn new(min: impl Into<String>, max: impl Into<String>) -> Result<Self, RuleError> {
        let range = Self {
            min: min.into(),
            max: max.into(),
        };
        range.validate()?;
        Ok(range)
    }

    /// The whole key space
    pub fn full() -> Self {
        Self {
            min: Self::MIN_KEY.to_string(),
            max: Self::MAX_KEY.to_string(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.min == Self::MIN_KEY && self.max == Self::MAX_KEY
    }

    /// Whether `[min, max)` overlaps this range
    pub fn overlaps(&self, min: &str, max: &str) -> bool {
        self.min.as_str() < max && min < self.max.as_str()
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        if self.min >= self.max {
            return Err(RuleError::config(format!(
                "feed range min {:?} must sort before max {:?}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Replica selection for rules scoped to part of the key space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultInjectionEndpoints {
    feed_range: FeedRange,
    replica_count: usize,
    include_primary: bool,
}

impl FaultInjectionEndpoints {
    /// Replicas per partition when no cap is given
    pub const DEFAULT_REPLICA_COUNT: usize = 4;

    pub fn new(feed_range: FeedRange) -> Self {
        Self {
            feed_range,
            replica_count: Self::DEFAULT_REPLICA_COUNT,
            include_primary: true,
        }
    }

    pub fn with_replica_count(mut self, replica_count: usize) -> Result<Self, RuleError> {
        if replica_count == 0 {
            return Err(RuleError::config("replica count must be positive"));
        }
        self.replica_count = replica_count;
        Ok(self)
    }

    pub fn with_include_primary(mut self, include_primary: bool) -> Self {
        self.include_primary = include_primary;
        self
    }

    pub fn feed_range(&self) -> &FeedRange {
        &self.feed_range
    }

    pub fn replica_count(&self) -> usize {
        self.replica_count
    }

    pub fn include_primary(&self) -> bool {
        self.include_primary
    }
}

/// Condition as declared by the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultInjectionCondition {
    operation_type: Option<OperationType>,
    region: Option<String>,
    connection_type: ConnectionType,
    primary_only: bool,
    endpoints: Option<FaultInjectionEndpoints>,
}

impl FaultInjectionCondition {
    pub fn builder() -> FaultInjectionConditionBuilder {
        FaultInjectionConditionBuilder::default()
    }

    pub fn operation_type(&self) -> Option<OperationType> {
        self.operation_type
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    pub fn primary_only(&self) -> bool {
        self.primary_only
    }

    pub fn endpoints(&self) -> Option<&FaultInjectionEndpoints> {
        self.endpoints.as_ref()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FaultInjectionConditionBuilder {
    operation_type: Option<OperationType>,
    region: Option<String>,
    connection_type: Option<ConnectionType>,
    primary_only: bool,
    endpoints: Option<FaultInjectionEndpoints>,
}

impl FaultInjectionConditionBuilder {
    pub fn operation_type(mut self, operation_type: OperationType) -> Self {
        self.operation_type = Some(operation_type);
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn connection_type(mut self, connection_type: ConnectionType) -> Self {
        self.connection_type = Some(connection_type);
        self
    }

    pub fn primary_only(mut self, primary_only: bool) -> Self {
        self.primary_only = primary_only;
        self
    }

    pub fn endpoints(mut self, endpoints: FaultInjectionEndpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    pub fn build(self) -> Result<FaultInjectionCondition, RuleError> {
        let connection_type = self
            .connection_type
            .ok_or_else(|| RuleError::config("condition requires a connection type"))?;
        if let Some(region) = &self.region {
            if region.trim().is_empty() {
                return Err(RuleError::config("region name must not be blank"));
            }
        }

        Ok(FaultInjectionCondition {
            operation_type: self.operation_type,
            region: self.region,
            connection_type,
            primary_only: self.primary_only,
            endpoints: self.endpoints,
        })
    }
}

/// What a declared rule does once it applies
#[derive(Debug, Clone, PartialEq)]
pub enum FaultInjectionResult {
    ServerError(ServerErrorResult),
    ConnectionError(ConnectionErrorResult),
}

impl From<ServerErrorResult> for FaultInjectionResult {
    fn from(result: ServerErrorResult) -> Self {
        FaultInjectionResult::ServerError(result)
    }
}

impl From<ConnectionErrorResult> for FaultInjectionResult {
    fn from(result: ConnectionErrorResult) -> Self {
        FaultInjectionResult::ConnectionError(result)
    }
}

/// A fault rule before region and address resolution
#[derive(Debug, Clone, PartialEq)]
pub struct FaultInjectionRule {
    id: String,
    enabled: bool,
    start_delay: Option<Duration>,
    duration: Option<Duration>,
    hit_limit: Option<u64>,
    condition: FaultInjectionCondition,
    result: FaultInjectionResult,
}

impl FaultInjectionRule {
    pub fn builder(id: impl Into<String>) -> FaultInjectionRuleBuilder {
        FaultInjectionRuleBuilder {
            id: id.into(),
            enabled: true,
            start_delay: None,
            duration: None,
            hit_limit: None,
            condition: None,
            result: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn start_delay(&self) -> Option<Duration> {
        self.start_delay
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Only meaningful for server-error rules
    pub fn hit_limit(&self) -> Option<u64> {
        self.hit_limit
    }

    pub fn condition(&self) -> &FaultInjectionCondition {
        &self.condition
    }

    pub fn result(&self) -> &FaultInjectionResult {
        &self.result
    }
}

#[derive(Debug, Clone)]
pub struct FaultInjectionRuleBuilder {
    id: String,
    enabled: bool,
    start_delay: Option<Duration>,
    duration: Option<Duration>,
    hit_limit: Option<u64>,
    condition: Option<FaultInjectionCondition>,
    result: Option<FaultInjectionResult>,
}

impl FaultInjectionRuleBuilder {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn hit_limit(mut self, hit_limit: u64) -> Self {
        self.hit_limit = Some(hit_limit);
        self
    }

    pub fn condition(mut self, condition: FaultInjectionCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn result(mut self, result: impl Into<FaultInjectionResult>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn server_error(self, result: ServerErrorResult) -> Self {
        self.result(result)
    }

    pub fn connection_error(self, result: ConnectionErrorResult) -> Self {
        self.result(result)
    }

    pub fn build(self) -> Result<FaultInjectionRule, RuleError> {
        if self.id.trim().is_empty() {
            return Err(RuleError::config("rule id must not be empty"));
        }
        let condition = self
            .condition
            .ok_or_else(|| RuleError::config(format!("rule {} has no condition", self.id)))?;
        let result = self
            .result
            .ok_or_else(|| RuleError::config(format!("rule {} has no result", self.id)))?;

        if let FaultInjectionResult::ConnectionError(_) = result {
            if self.hit_limit.is_some() {
                return Err(RuleError::config(format!(
                    "rule {}: connection error rules do not take a hit limit",
                    self.id
                )));
            }
        }

        Ok(FaultInjectionRule {
            id: self.id,
            enabled: self.enabled,
            start_delay: self.start_delay,
            duration: self.duration,
            hit_limit: self.hit_limit,
            condition,
            result,
        })
    }
}
