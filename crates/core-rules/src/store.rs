//! Rule store: registry of effective rules consulted on the request path
//!
//! Rules are kept in four segments so each pipeline hook only scans the rules
//! that could possibly concern it:
//!
//! - server response-delay rules
//! - server response-error rules
//! - server connection-delay rules
//! - connection-error rules (driven by background tasks, never looked up per request)
//!
//! Lookups take a snapshot of the segment and scan it in insertion order, so
//! concurrent adds and removals never disturb a scan in flight. The first
//! rule that admits the request wins; there is no other precedence.

use crate::request::RequestArgs;
use crate::result::{ServerErrorCategory, ServerErrorResult};
use crate::rule::{ConnectionErrorRule, EffectiveRule, ServerErrorRule};
use parking_lot::RwLock;
use std::sync::Arc;

/// Concurrent registry of effective rules
#[derive(Debug, Default)]
pub struct RuleStore {
    response_delay: RwLock<Vec<Arc<ServerErrorRule>>>,
    response_error: RwLock<Vec<Arc<ServerErrorRule>>>,
    connection_delay: RwLock<Vec<Arc<ServerErrorRule>>>,
    connection_error: RwLock<Vec<Arc<ConnectionErrorRule>>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rule into the segment matching its result kind.
    ///
    /// Rules compare by identity; adding the same `Arc` twice is a no-op.
    pub fn add(&self, rule: &EffectiveRule) {
        match rule {
            EffectiveRule::ServerError(rule) => {
                let segment = self.server_segment(rule.result().kind().category());
                insert_unique(segment, rule);
            }
            EffectiveRule::ConnectionError(rule) => insert_unique(&self.connection_error, rule),
        }
    }

    /// First response-delay rule admitting the request
    pub fn find_server_response_delay_rule(
        &self,
        args: &RequestArgs,
    ) -> Option<Arc<ServerErrorRule>> {
        self.find_server_response_delay_rule_where(args, |_| true)
    }

    /// Same as [`find_server_response_delay_rule`](Self::find_server_response_delay_rule),
    /// but rules whose result fails `stage` are skipped before admission runs,
    /// so they neither count an evaluation nor consume a hit.
    pub fn find_server_response_delay_rule_where(
        &self,
        args: &RequestArgs,
        stage: impl Fn(&ServerErrorResult) -> bool,
    ) -> Option<Arc<ServerErrorRule>> {
        find_server_rule(&self.response_delay, args, stage)
    }

    pub fn find_server_response_error_rule(
        &self,
        args: &RequestArgs,
    ) -> Option<Arc<ServerErrorRule>> {
        find_server_rule(&self.response_error, args, |_| true)
    }

    pub fn find_server_connection_delay_rule(
        &self,
        args: &RequestArgs,
    ) -> Option<Arc<ServerErrorRule>> {
        find_server_rule(&self.connection_delay, args, |_| true)
    }

    pub fn contains_connection_rule(&self, rule: &Arc<ConnectionErrorRule>) -> bool {
        self.connection_error
            .read()
            .iter()
            .any(|candidate| Arc::ptr_eq(candidate, rule))
    }

    /// Remove a connection-error rule. Removing an absent rule is a no-op.
    ///
    /// Returns whether the rule was present.
    pub fn remove_connection_rule(&self, rule: &Arc<ConnectionErrorRule>) -> bool {
        let mut segment = self.connection_error.write();
        let before = segment.len();
        segment.retain(|candidate| !Arc::ptr_eq(candidate, rule));
        segment.len() != before
    }

    /// Snapshot of the registered connection-error rules
    pub fn connection_rules(&self) -> Vec<Arc<ConnectionErrorRule>> {
        self.connection_error.read().clone()
    }

    /// Snapshot of every registered rule
    pub fn rules(&self) -> Vec<EffectiveRule> {
        let mut rules: Vec<EffectiveRule> = Vec::with_capacity(self.len());
        for segment in [&self.response_delay, &self.response_error, &self.connection_delay] {
            rules.extend(segment.read().iter().cloned().map(EffectiveRule::ServerError));
        }
        rules.extend(
            self.connection_error
                .read()
                .iter()
                .cloned()
                .map(EffectiveRule::ConnectionError),
        );
        rules
    }

    pub fn len(&self) -> usize {
        self.response_delay.read().len()
            + self.response_error.read().len()
            + self.connection_delay.read().len()
            + self.connection_error.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn server_segment(&self, category: ServerErrorCategory) -> &RwLock<Vec<Arc<ServerErrorRule>>> {
        match category {
            ServerErrorCategory::ResponseDelay => &self.response_delay,
            ServerErrorCategory::ResponseError => &self.response_error,
            ServerErrorCategory::ConnectionDelay => &self.connection_delay,
        }
    }
}

fn insert_unique<T>(segment: &RwLock<Vec<Arc<T>>>, rule: &Arc<T>) {
    let mut segment = segment.write();
    if !segment.iter().any(|candidate| Arc::ptr_eq(candidate, rule)) {
        segment.push(rule.clone());
    }
}

fn find_server_rule(
    segment: &RwLock<Vec<Arc<ServerErrorRule>>>,
    args: &RequestArgs,
    stage: impl Fn(&ServerErrorResult) -> bool,
) -> Option<Arc<ServerErrorRule>> {
    let snapshot = segment.read().clone();
    snapshot.into_iter().find(|rule| {
        rule.connection_type() == args.connection_type
            && stage(rule.result())
            && rule.is_applicable(args)
    })
}
