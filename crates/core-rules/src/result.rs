//! Fault results: what a rule does once it applies
//!
//! Results form a closed set of variants. Server-error results are consulted
//! synchronously on the request path; connection-error results drive a
//! recurring background task against the connection pool.

use crate::error::RuleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Server-side failure a rule can simulate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerErrorKind {
    /// 410, as if the replica went away
    Gone,
    /// 449
    RetryWith,
    /// 429 with a fixed retry-after hint
    TooManyRequests,
    /// 408
    Timeout,
    /// 500
    InternalServerError,
    /// 404 / read session not available
    ReadSessionNotAvailable,
    /// 410 / partition migration in progress
    PartitionIsMigrating,
    /// 410 / partition split in progress
    PartitionIsSplitting,
    /// Delay the response
    ResponseDelay,
    /// Delay establishing a new connection
    ConnectionDelay,
    /// 410 that forces the client to refresh stale addresses
    StaleAddressesServerGone,
}

/// Which store segment a server-error kind lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorCategory {
    ResponseDelay,
    ResponseError,
    ConnectionDelay,
}

impl ServerErrorKind {
    /// Whether a rule of this kind may be narrowed to a single operation type.
    ///
    /// Connection delays and gone errors act on whole connections, so they are
    /// matched at endpoint granularity instead.
    pub fn is_operation_scoped(&self) -> bool {
        !matches!(self, ServerErrorKind::ConnectionDelay | ServerErrorKind::Gone)
    }

    pub fn category(&self) -> ServerErrorCategory {
        match self {
            ServerErrorKind::ResponseDelay => ServerErrorCategory::ResponseDelay,
            ServerErrorKind::ConnectionDelay => ServerErrorCategory::ConnectionDelay,
            _ => ServerErrorCategory::ResponseError,
        }
    }

    /// Delay kinds carry a delay instead of an error shape
    pub fn is_delay(&self) -> bool {
        matches!(
            self,
            ServerErrorKind::ResponseDelay | ServerErrorKind::ConnectionDelay
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerErrorKind::Gone => "gone",
            ServerErrorKind::RetryWith => "retry_with",
            ServerErrorKind::TooManyRequests => "too_many_requests",
            ServerErrorKind::Timeout => "timeout",
            ServerErrorKind::InternalServerError => "internal_server_error",
            ServerErrorKind::ReadSessionNotAvailable => "read_session_not_available",
            ServerErrorKind::PartitionIsMigrating => "partition_is_migrating",
            ServerErrorKind::PartitionIsSplitting => "partition_is_splitting",
            ServerErrorKind::ResponseDelay => "response_delay",
            ServerErrorKind::ConnectionDelay => "connection_delay",
            ServerErrorKind::StaleAddressesServerGone => "stale_addresses_server_gone",
        }
    }
}

impl fmt::Display for ServerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a server-error rule
#[derive(Debug, Clone, PartialEq)]
pub struct ServerErrorResult {
    kind: ServerErrorKind,
    times: Option<u32>,
    delay: Option<Duration>,
    suppress_service_requests: Option<bool>,
    injection_rate: f64,
}

impl ServerErrorResult {
    pub fn builder(kind: ServerErrorKind) -> ServerErrorResultBuilder {
        ServerErrorResultBuilder {
            kind,
            times: None,
            delay: None,
            suppress_service_requests: None,
            injection_rate: 1.0,
        }
    }

    pub fn kind(&self) -> ServerErrorKind {
        self.kind
    }

    /// Maximum applications per logical request (across retries)
    pub fn times(&self) -> Option<u32> {
        self.times
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    /// `Some(false)`: delay before the real call, which still goes out.
    /// `Some(true)` or unset: delay after the call.
    pub fn suppress_service_requests(&self) -> Option<bool> {
        self.suppress_service_requests
    }

    /// Probability in `[0, 1]` that an eligible evaluation fires
    pub fn injection_rate(&self) -> f64 {
        self.injection_rate
    }
}

/// Builder for [`ServerErrorResult`]
#[derive(Debug, Clone)]
pub struct ServerErrorResultBuilder {
    kind: ServerErrorKind,
    times: Option<u32>,
    delay: Option<Duration>,
    suppress_service_requests: Option<bool>,
    injection_rate: f64,
}

impl ServerErrorResultBuilder {
    pub fn times(mut self, times: u32) -> Self {
        self.times = Some(times);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn suppress_service_requests(mut self, suppress: bool) -> Self {
        self.suppress_service_requests = Some(suppress);
        self
    }

    pub fn injection_rate(mut self, rate: f64) -> Self {
        self.injection_rate = rate;
        self
    }

    pub fn build(self) -> Result<ServerErrorResult, RuleError> {
        if !(0.0..=1.0).contains(&self.injection_rate) {
            return Err(RuleError::config(format!(
                "injection rate must be within [0, 1], got {}",
                self.injection_rate
            )));
        }
        if self.kind.is_delay() && self.delay.is_none() {
            return Err(RuleError::config(format!(
                "{} results require a delay",
                self.kind
            )));
        }

        Ok(ServerErrorResult {
            kind: self.kind,
            times: self.times,
            delay: self.delay,
            suppress_service_requests: self.suppress_service_requests,
            injection_rate: self.injection_rate,
        })
    }
}

/// Connection-level failure simulated on pooled endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionErrorKind {
    /// Abrupt reset of the connection
    ConnectionReset,
    /// Orderly close of the connection
    ConnectionClose,
}

impl fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionErrorKind::ConnectionReset => write!(f, "connection_reset"),
            ConnectionErrorKind::ConnectionClose => write!(f, "connection_close"),
        }
    }
}

/// Result of a connection-error rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionErrorResult {
    kind: ConnectionErrorKind,
    interval: Duration,
    threshold: u32,
}

impl ConnectionErrorResult {
    /// Create a result injecting `threshold` events every `interval`
    pub fn new(
        kind: ConnectionErrorKind,
        interval: Duration,
        threshold: u32,
    ) -> Result<Self, RuleError> {
        if interval.is_zero() {
            return Err(RuleError::config("connection error interval must be positive"));
        }
        if threshold == 0 {
            return Err(RuleError::config("connection error threshold must be positive"));
        }
        Ok(Self {
            kind,
            interval,
            threshold,
        })
    }

    pub fn kind(&self) -> ConnectionErrorKind {
        self.kind
    }

    /// Wait between two injection attempts
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of events each matching endpoint simulates per attempt
    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}
