//! Faultline Core Rules: Pure-logic fault injection rules
//!
//! # Overview
//!
//! This crate holds everything needed to decide, on the request path, whether
//! a fault should be injected into an outgoing data-store request:
//!
//! - **Declared rules**: operator-facing rules naming regions and feed ranges
//! - **Conditions**: immutable validator chains matching a request
//! - **Effective rules**: resolved rules with validity windows, hit limits and
//!   the injection-rate admission state machine
//! - **Rule store**: concurrent, kind-segmented registry scanned in insertion order
//! - **Request context**: per-logical-request bookkeeping shared across retries
//! - **Synthetic errors**: backend-shaped errors for the pipeline to surface
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Transports and connection pools
//! - Partition, address, or region resolution
//! - Async runtimes
//!
//! Resolution and background injection live in the `faultline` crate.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       FaultInjectionRule (declared)     │  ← region names, feed ranges
//! └─────────────┬───────────────────────────┘
//!               │ rule processor (faultline)
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       EffectiveRule                     │  ← endpoints, replica addresses
//! │  (Condition + result + counters)        │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       RuleStore                         │
//! │  response delay │ response error        │
//! │  connection delay │ connection error    │
//! └─────────────┬───────────────────────────┘
//!               │ first admitting rule
//!               ▼
//!     delay / InjectedError / nothing
//! ```
//!
//! # Usage Example
//!
//! ```
//! use faultline_core_rules::prelude::*;
//! use std::sync::Arc;
//!
//! let condition = Condition::builder("coll-1", ConnectionType::Direct).build();
//! let core = RuleCore::new("gone-rule", true, None, None, None, condition).unwrap();
//! let result = ServerErrorResult::builder(ServerErrorKind::Gone).times(2).build().unwrap();
//! let rule = Arc::new(ServerErrorRule::new(core, result));
//!
//! let store = RuleStore::new();
//! store.add(&EffectiveRule::ServerError(rule.clone()));
//!
//! let args = RequestArgs::new(
//!     ConnectionType::Direct,
//!     "coll-1",
//!     OperationType::Read,
//!     ResourceType::Document,
//! );
//! let found = store.find_server_response_error_rule(&args).unwrap();
//! let error = InjectedError::synthesize(found.id(), found.result().kind(), &args).unwrap();
//! assert_eq!(error.status_code(), 410);
//! ```

pub mod address;
pub mod condition;
pub mod context;
pub mod declared;
pub mod error;
pub mod request;
pub mod result;
pub mod rule;
pub mod store;
pub mod synthetic;

// Re-export main types for convenience
pub use condition::{Condition, ConditionBuilder};
pub use context::FaultInjectionContext;
pub use declared::{
    FaultInjectionCondition, FaultInjectionConditionBuilder, FaultInjectionEndpoints,
    FaultInjectionResult, FaultInjectionRule, FaultInjectionRuleBuilder, FeedRange,
};
pub use error::RuleError;
pub use request::{ConnectionType, OperationType, RequestArgs, RequestHeaders, ResourceType};
pub use result::{
    ConnectionErrorKind, ConnectionErrorResult, ServerErrorCategory, ServerErrorKind,
    ServerErrorResult, ServerErrorResultBuilder,
};
pub use rule::{
    Admission, ConnectionErrorRule, EffectiveRule, Rejection, RuleCore, RuleSummary,
    ServerErrorRule,
};
pub use store::RuleStore;
pub use synthetic::InjectedError;

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use faultline_core_rules::prelude::*;
/// ```
pub mod prelude {
    pub use super::condition::{Condition, ConditionBuilder};
    pub use super::context::FaultInjectionContext;
    pub use super::declared::{
        FaultInjectionCondition, FaultInjectionEndpoints, FaultInjectionResult, FaultInjectionRule,
        FeedRange,
    };
    pub use super::error::RuleError;
    pub use super::request::{ConnectionType, OperationType, RequestArgs, ResourceType};
    pub use super::result::{
        ConnectionErrorKind, ConnectionErrorResult, ServerErrorKind, ServerErrorResult,
    };
    pub use super::rule::{ConnectionErrorRule, EffectiveRule, RuleCore, ServerErrorRule};
    pub use super::store::RuleStore;
    pub use super::synthetic::InjectedError;
}
