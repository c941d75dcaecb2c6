/*!
 * Server-error injection hooks
 *
 * The request pipeline calls one hook per checkpoint. A hook returns the
 * injected value (a delay or a synthetic error) or `None` when no rule fires.
 * A response-delay rule fires at exactly one of the two send hooks:
 *
 * | suppress_service_requests | hook                 |
 * |---------------------------|----------------------|
 * | `Some(false)`             | before send          |
 * | `Some(true)` / unset      | after send           |
 */

use faultline_core_rules::{
    ConnectionType, InjectedError, RequestArgs, RuleError, RuleStore, ServerErrorResult,
    ServerErrorRule,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Pipeline checkpoints at which server faults can be injected
pub trait ServerErrorInjector: Send + Sync {
    /// Delay to apply before the real call is issued
    fn inject_response_delay_before_send(&self, args: &RequestArgs) -> Option<Duration>;

    /// Delay to apply once the real call has been issued
    fn inject_response_delay_after_send(&self, args: &RequestArgs) -> Option<Duration>;

    /// Synthetic error to surface for this request.
    ///
    /// Fails only when a rule carries a kind that has no error shape.
    fn inject_response_error(&self, args: &RequestArgs) -> Result<Option<InjectedError>, RuleError>;

    /// Delay to apply while opening a new connection
    fn inject_connection_delay(&self, args: &RequestArgs) -> Option<Duration>;
}

/// Injector answering from a [`RuleStore`] for one connectivity mode
#[derive(Debug, Clone)]
pub struct RuleBasedServerErrorInjector {
    store: Arc<RuleStore>,
    connection_type: ConnectionType,
}

impl RuleBasedServerErrorInjector {
    pub fn direct(store: Arc<RuleStore>) -> Self {
        Self {
            store,
            connection_type: ConnectionType::Direct,
        }
    }

    pub fn gateway(store: Arc<RuleStore>) -> Self {
        Self {
            store,
            connection_type: ConnectionType::Gateway,
        }
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    /// Requests of the other connectivity mode belong to the other injector
    fn handles(&self, args: &RequestArgs) -> bool {
        args.connection_type == self.connection_type
    }

    fn applied(&self, rule: &ServerErrorRule, args: &RequestArgs, hook: &'static str) {
        args.context.record_applied_rule(rule.id());
        debug!(
            rule_id = %rule.id(),
            hook,
            operation = %args.operation_type,
            container = %args.container_id,
            "Injected server fault"
        );
    }

    fn response_delay(
        &self,
        args: &RequestArgs,
        before_send: bool,
        hook: &'static str,
    ) -> Option<Duration> {
        if !self.handles(args) {
            return None;
        }
        let stage = |result: &ServerErrorResult| {
            let fires_before = result.suppress_service_requests() == Some(false);
            fires_before == before_send
        };
        let rule = self.store.find_server_response_delay_rule_where(args, stage)?;
        self.applied(&rule, args, hook);
        rule.result().delay()
    }
}

impl ServerErrorInjector for RuleBasedServerErrorInjector {
    fn inject_response_delay_before_send(&self, args: &RequestArgs) -> Option<Duration> {
        self.response_delay(args, true, "response_delay_before_send")
    }

    fn inject_response_delay_after_send(&self, args: &RequestArgs) -> Option<Duration> {
        self.response_delay(args, false, "response_delay_after_send")
    }

    fn inject_response_error(
        &self,
        args: &RequestArgs,
    ) -> Result<Option<InjectedError>, RuleError> {
        if !self.handles(args) {
            return Ok(None);
        }
        let Some(rule) = self.store.find_server_response_error_rule(args) else {
            return Ok(None);
        };
        let error = InjectedError::synthesize(rule.id(), rule.result().kind(), args)?;
        self.applied(&rule, args, "response_error");
        Ok(Some(error))
    }

    fn inject_connection_delay(&self, args: &RequestArgs) -> Option<Duration> {
        if !self.handles(args) {
            return None;
        }
        let rule = self.store.find_server_connection_delay_rule(args)?;
        self.applied(&rule, args, "connection_delay");
        rule.result().delay()
    }
}
