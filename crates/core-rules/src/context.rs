//! Per-request fault-injection context
//!
//! One context is shared by every retry of a logical request. It remembers
//! which rules already fired (so a rule's `times` limit spans retries), the
//! evaluation trail for diagnostics, and whether the pipeline already forced
//! an address refresh.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Diagnostic and bookkeeping state attached to one logical request
#[derive(Debug, Default)]
pub struct FaultInjectionContext {
    /// Times each rule was applied to this request
    applied_counts: Mutex<HashMap<String, u32>>,
    /// Rule ids in application order
    applied_rules: Mutex<Vec<String>>,
    /// Human-readable reasons rules were skipped
    evaluation_trail: Mutex<Vec<String>>,
    address_refreshed: AtomicBool,
}

impl FaultInjectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a rule injected a fault into this request
    pub fn record_applied_rule(&self, rule_id: &str) {
        *self
            .applied_counts
            .lock()
            .entry(rule_id.to_string())
            .or_insert(0) += 1;
        self.applied_rules.lock().push(rule_id.to_string());
    }

    /// Number of times `rule_id` was applied across all attempts
    pub fn applied_count(&self, rule_id: &str) -> u32 {
        self.applied_counts
            .lock()
            .get(rule_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn applied_rule_ids(&self) -> Vec<String> {
        self.applied_rules.lock().clone()
    }

    /// Append a diagnostic line explaining why a rule did not apply
    pub fn record_evaluation(&self, entry: impl Into<String>) {
        self.evaluation_trail.lock().push(entry.into());
    }

    pub fn evaluation_trail(&self) -> Vec<String> {
        self.evaluation_trail.lock().clone()
    }

    /// Called by the pipeline once it refreshed addresses for this request
    pub fn mark_address_refreshed(&self) {
        self.address_refreshed.store(true, Ordering::Release);
    }

    pub fn address_refreshed(&self) -> bool {
        self.address_refreshed.load(Ordering::Acquire)
    }
}
