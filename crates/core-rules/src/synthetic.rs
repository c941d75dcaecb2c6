//! Synthetic server errors
//!
//! When a response-error rule fires, the pipeline surfaces an [`InjectedError`]
//! instead of (or on top of) the real response. The error carries the same
//! status, sub-status, and diagnostic headers a genuine backend failure of that
//! kind would, so retry and error-handling code is exercised as in production.
//!
//! | kind                          | status | sub-status |
//! |-------------------------------|--------|------------|
//! | gone                          | 410    | 21005      |
//! | stale addresses / server gone | 410    | 21005      |
//! | retry with                    | 449    | 0          |
//! | too many requests             | 429    | 0          |
//! | timeout                       | 408    | 0          |
//! | internal server error         | 500    | 0          |
//! | read session not available    | 404    | 1002       |
//! | partition is migrating        | 410    | 1008       |
//! | partition is splitting        | 410    | 1007       |

use crate::error::RuleError;
use crate::request::RequestArgs;
use crate::result::ServerErrorKind;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub const HEADER_LSN: &str = "lsn";
pub const HEADER_LOCAL_LSN: &str = "local-lsn";
pub const HEADER_PARTITION_KEY_RANGE_ID: &str = "partition-key-range-id";
pub const HEADER_ACTIVITY_ID: &str = "activity-id";
pub const HEADER_SESSION_TOKEN: &str = "session-token";
pub const HEADER_SUB_STATUS: &str = "sub-status";
pub const HEADER_RETRY_AFTER_MS: &str = "retry-after-ms";

/// Retry-after hint attached to injected 429s
pub const TOO_MANY_REQUESTS_RETRY_AFTER: Duration = Duration::from_millis(500);

/// Sub-status codes carried by injected errors
pub mod sub_status {
    pub const NONE: u32 = 0;
    pub const READ_SESSION_NOT_AVAILABLE: u32 = 1002;
    pub const COMPLETING_SPLIT: u32 = 1007;
    pub const COMPLETING_PARTITION_MIGRATION: u32 = 1008;
    pub const SERVER_GENERATED_GONE: u32 = 21005;
}

/// A synthetic error shaped like a real backend failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (status {status_code}, sub-status {sub_status_code})")]
pub struct InjectedError {
    rule_id: String,
    kind: ServerErrorKind,
    status_code: u16,
    sub_status_code: u32,
    message: String,
    /// Gone errors claim to originate from a 410 returned by the service
    backend_originated: bool,
    retry_after: Option<Duration>,
    headers: BTreeMap<String, String>,
}

impl InjectedError {
    /// Build the error a rule of `kind` produces for this request.
    ///
    /// Delay kinds have no error shape and fail with
    /// [`RuleError::UnsupportedErrorKind`].
    pub fn synthesize(
        rule_id: &str,
        kind: ServerErrorKind,
        args: &RequestArgs,
    ) -> Result<Self, RuleError> {
        let (status_code, sub_status_code, backend_originated) = match kind {
            ServerErrorKind::Gone | ServerErrorKind::StaleAddressesServerGone => {
                (410, sub_status::SERVER_GENERATED_GONE, true)
            }
            ServerErrorKind::RetryWith => (449, sub_status::NONE, false),
            ServerErrorKind::TooManyRequests => (429, sub_status::NONE, false),
            ServerErrorKind::Timeout => (408, sub_status::NONE, false),
            ServerErrorKind::InternalServerError => (500, sub_status::NONE, false),
            ServerErrorKind::ReadSessionNotAvailable => {
                (404, sub_status::READ_SESSION_NOT_AVAILABLE, false)
            }
            ServerErrorKind::PartitionIsMigrating => {
                (410, sub_status::COMPLETING_PARTITION_MIGRATION, false)
            }
            ServerErrorKind::PartitionIsSplitting => (410, sub_status::COMPLETING_SPLIT, false),
            ServerErrorKind::ResponseDelay | ServerErrorKind::ConnectionDelay => {
                return Err(RuleError::UnsupportedErrorKind(kind))
            }
        };

        let retry_after =
            (kind == ServerErrorKind::TooManyRequests).then_some(TOO_MANY_REQUESTS_RETRY_AFTER);

        let mut headers = BTreeMap::new();
        let request_headers = &args.headers;
        if let Some(lsn) = request_headers.lsn {
            headers.insert(HEADER_LSN.to_string(), lsn.to_string());
            headers.insert(HEADER_LOCAL_LSN.to_string(), lsn.to_string());
        }
        if let Some(range_id) = &request_headers.partition_key_range_id {
            headers.insert(HEADER_PARTITION_KEY_RANGE_ID.to_string(), range_id.clone());
        }
        if let Some(activity_id) = &request_headers.activity_id {
            headers.insert(HEADER_ACTIVITY_ID.to_string(), activity_id.clone());
        }
        if let Some(session_token) = &request_headers.session_token {
            headers.insert(HEADER_SESSION_TOKEN.to_string(), session_token.clone());
        }
        if sub_status_code != sub_status::NONE {
            headers.insert(HEADER_SUB_STATUS.to_string(), sub_status_code.to_string());
        }
        if let Some(retry_after) = retry_after {
            headers.insert(
                HEADER_RETRY_AFTER_MS.to_string(),
                retry_after.as_millis().to_string(),
            );
        }

        Ok(Self {
            rule_id: rule_id.to_string(),
            kind,
            status_code,
            sub_status_code,
            message: format!("Fault injected by rule {}: {}", rule_id, kind),
            backend_originated,
            retry_after,
            headers,
        })
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn kind(&self) -> ServerErrorKind {
        self.kind
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn sub_status_code(&self) -> u32 {
        self.sub_status_code
    }

    pub fn is_backend_originated(&self) -> bool {
        self.backend_originated
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}
