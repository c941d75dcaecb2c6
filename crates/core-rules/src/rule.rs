//! Effective fault rules
//!
//! Both rule variants share a [`RuleCore`]: caller-supplied id, one-way enabled
//! flag, a validity window fixed at construction, a monotonic hit counter, and
//! the processed [`Condition`].
//!
//! ```text
//! is_valid() == enabled && start <= now < expiry
//! ```
//!
//! A [`ServerErrorRule`] additionally runs the admission state machine on every
//! lookup (see [`ServerErrorRule::evaluate`]). A [`ConnectionErrorRule`] has no
//! admission logic: it stays active for as long as it is valid.
//!
//! Everything except the counters and the enabled flag is immutable once the
//! rule is published, so rules are shared as `Arc`s without further locking.

use crate::condition::Condition;
use crate::error::RuleError;
use crate::request::{ConnectionType, OperationType, RequestArgs, ResourceType};
use crate::result::{ConnectionErrorResult, ServerErrorKind, ServerErrorResult};
use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Identity, lifecycle, and hit accounting shared by every rule
#[derive(Debug)]
pub struct RuleCore {
    id: String,
    enabled: AtomicBool,
    start: Instant,
    /// `None` means the rule never expires
    expiry: Option<Instant>,
    hit_count: AtomicU64,
    hit_limit: Option<u64>,
    condition: Condition,
}

impl RuleCore {
    /// Create the core of a rule, anchoring its validity window at `Instant::now()`
    pub fn new(
        id: impl Into<String>,
        enabled: bool,
        start_delay: Option<Duration>,
        duration: Option<Duration>,
        hit_limit: Option<u64>,
        condition: Condition,
    ) -> Result<Self, RuleError> {
        Self::new_at(Instant::now(), id, enabled, start_delay, duration, hit_limit, condition)
    }

    /// Same as [`RuleCore::new`] with an explicit anchor instant
    pub fn new_at(
        now: Instant,
        id: impl Into<String>,
        enabled: bool,
        start_delay: Option<Duration>,
        duration: Option<Duration>,
        hit_limit: Option<u64>,
        condition: Condition,
    ) -> Result<Self, RuleError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(RuleError::config("rule id must not be empty"));
        }

        let start = now
            .checked_add(start_delay.unwrap_or(Duration::ZERO))
            .ok_or_else(|| {
                RuleError::config(format!("start delay of rule {} is out of range", id))
            })?;
        // A duration too large to represent behaves like no duration at all
        let expiry = duration.and_then(|d| start.checked_add(d));

        Ok(Self {
            id,
            enabled: AtomicBool::new(enabled),
            start,
            expiry,
            hit_count: AtomicU64::new(0),
            hit_limit,
            condition,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.condition.connection_type()
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn expiry(&self) -> Option<Instant> {
        self.expiry
    }

    pub fn hit_limit(&self) -> Option<u64> {
        self.hit_limit
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Permanently disable the rule. There is no way back.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Instant::now())
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        self.is_enabled() && now >= self.start && self.expiry.map_or(true, |expiry| now < expiry)
    }

    fn record_hit(&self) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Why a server-error rule did not fire on an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    DisabledOrExpired,
    ConditionMismatch,
    /// The result's `times` limit was reached for this logical request
    ApplyLimitReached,
    /// The request already refreshed its addresses
    AddressRefreshAlreadyForced,
    /// The rule-wide hit limit was reached
    HitLimitReached,
    InjectionRateMiss,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::DisabledOrExpired => write!(f, "disabled or expired"),
            Rejection::ConditionMismatch => write!(f, "condition mismatch"),
            Rejection::ApplyLimitReached => write!(f, "apply limit reached"),
            Rejection::AddressRefreshAlreadyForced => write!(f, "address refresh already forced"),
            Rejection::HitLimitReached => write!(f, "hit limit reached"),
            Rejection::InjectionRateMiss => write!(f, "injection rate miss"),
        }
    }
}

/// Outcome of one admission evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Applied,
    Rejected(Rejection),
}

impl Admission {
    pub fn is_applied(&self) -> bool {
        matches!(self, Admission::Applied)
    }
}

/// Rule producing delays or synthetic server errors on the request path
#[derive(Debug)]
pub struct ServerErrorRule {
    core: RuleCore,
    result: ServerErrorResult,
    /// Incremented on every evaluation that gets past the condition and
    /// per-request checks, whether or not the rule then fires
    evaluation_count: AtomicU64,
    hit_details: DashMap<(OperationType, ResourceType), u64>,
}

impl ServerErrorRule {
    pub fn new(core: RuleCore, result: ServerErrorResult) -> Self {
        Self {
            core,
            result,
            evaluation_count: AtomicU64::new(0),
            hit_details: DashMap::new(),
        }
    }

    pub fn core(&self) -> &RuleCore {
        &self.core
    }

    pub fn id(&self) -> &str {
        self.core.id()
    }

    pub fn result(&self) -> &ServerErrorResult {
        &self.result
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.core.connection_type()
    }

    pub fn is_valid(&self) -> bool {
        self.core.is_valid()
    }

    pub fn disable(&self) {
        self.core.disable()
    }

    pub fn hit_count(&self) -> u64 {
        self.core.hit_count()
    }

    pub fn evaluation_count(&self) -> u64 {
        self.evaluation_count.load(Ordering::Relaxed)
    }

    /// Hits broken down by `(operation, resource)`
    pub fn hit_count_details(&self) -> HashMap<(OperationType, ResourceType), u64> {
        self.hit_details
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    /// Whether the rule fires for this request. Counters are updated as a side effect.
    pub fn is_applicable(&self, args: &RequestArgs) -> bool {
        self.evaluate(args).is_applied()
    }

    /// Run the admission state machine:
    ///
    /// 1. validity window and enabled flag
    /// 2. condition
    /// 3. per-request `times` limit (spans retries of one logical request)
    /// 4. stale-address errors never fire twice once the request refreshed addresses
    /// 5. rule-wide hit limit against the evaluation counter
    /// 6. injection-rate coin flip
    /// 7. hit
    pub fn evaluate(&self, args: &RequestArgs) -> Admission {
        let id = self.core.id();

        if !self.core.is_valid() {
            return self.reject(args, Rejection::DisabledOrExpired);
        }

        if !self.core.condition().is_applicable(id, args) {
            // The condition already wrote its own diagnostic
            return Admission::Rejected(Rejection::ConditionMismatch);
        }

        if let Some(times) = self.result.times() {
            if args.context.applied_count(id) >= times {
                return self.reject(args, Rejection::ApplyLimitReached);
            }
        }

        if self.result.kind() == ServerErrorKind::StaleAddressesServerGone
            && args.context.address_refreshed()
        {
            return self.reject(args, Rejection::AddressRefreshAlreadyForced);
        }

        let evaluations = self.evaluation_count.fetch_add(1, Ordering::Relaxed) + 1;
        let within_hit_limit = self.core.hit_limit().map_or(true, |limit| evaluations <= limit);
        if !within_hit_limit {
            return self.reject(args, Rejection::HitLimitReached);
        }

        let draw: f64 = rand::rng().random();
        if draw > self.result.injection_rate() {
            return self.reject(args, Rejection::InjectionRateMiss);
        }

        self.core.record_hit();
        *self
            .hit_details
            .entry((args.operation_type, args.resource_type))
            .or_insert(0) += 1;
        Admission::Applied
    }

    fn reject(&self, args: &RequestArgs, reason: Rejection) -> Admission {
        debug!(rule_id = %self.core.id(), %reason, "fault rule not applied");
        args.context
            .record_evaluation(format!("{} [{}]", self.core.id(), reason));
        Admission::Rejected(reason)
    }
}

/// Rule that periodically breaks pooled connections
#[derive(Debug)]
pub struct ConnectionErrorRule {
    core: RuleCore,
    result: ConnectionErrorResult,
}

impl ConnectionErrorRule {
    pub fn new(core: RuleCore, result: ConnectionErrorResult) -> Self {
        Self { core, result }
    }

    pub fn core(&self) -> &RuleCore {
        &self.core
    }

    pub fn id(&self) -> &str {
        self.core.id()
    }

    pub fn result(&self) -> &ConnectionErrorResult {
        &self.result
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.core.connection_type()
    }

    pub fn is_valid(&self) -> bool {
        self.core.is_valid()
    }

    pub fn disable(&self) {
        self.core.disable()
    }
}

/// A processed rule ready for the store
#[derive(Debug, Clone)]
pub enum EffectiveRule {
    ServerError(Arc<ServerErrorRule>),
    ConnectionError(Arc<ConnectionErrorRule>),
}

impl EffectiveRule {
    pub fn core(&self) -> &RuleCore {
        match self {
            EffectiveRule::ServerError(rule) => rule.core(),
            EffectiveRule::ConnectionError(rule) => rule.core(),
        }
    }

    pub fn id(&self) -> &str {
        self.core().id()
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.core().connection_type()
    }

    pub fn is_valid(&self) -> bool {
        self.core().is_valid()
    }

    pub fn disable(&self) {
        self.core().disable()
    }

    pub fn hit_count(&self) -> u64 {
        self.core().hit_count()
    }

    /// Serializable snapshot for reporting
    pub fn summary(&self) -> RuleSummary {
        let core = self.core();
        let condition = core.condition();
        let kind = match self {
            EffectiveRule::ServerError(rule) => rule.result().kind().to_string(),
            EffectiveRule::ConnectionError(rule) => rule.result().kind().to_string(),
        };
        RuleSummary {
            id: core.id().to_string(),
            kind,
            enabled: core.is_enabled(),
            connection_type: condition.connection_type(),
            container_id: condition.container_id().to_string(),
            operation_type: condition.operation_type(),
            region_endpoints: condition.region_endpoints().to_vec(),
            addresses: condition.addresses().to_vec(),
            primary_only: condition.primary_only(),
            hit_limit: core.hit_limit(),
            hit_count: core.hit_count(),
        }
    }
}

/// Flat view of an effective rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleSummary {
    pub id: String,
    pub kind: String,
    pub enabled: bool,
    pub connection_type: ConnectionType,
    pub container_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_type: Option<OperationType>,
    pub region_endpoints: Vec<String>,
    pub addresses: Vec<String>,
    pub primary_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_limit: Option<u64>,
    pub hit_count: u64,
}
