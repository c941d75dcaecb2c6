//! Request-side view of an outgoing operation
//!
//! The transport pipeline describes every request it is about to send as a
//! [`RequestArgs`]. Rules never see the wire request itself, only this
//! snapshot of where the request is routed and what it does.

use crate::context::FaultInjectionContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Logical operation carried by a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Point read of a single item
    Read,
    /// Change feed / read feed page
    ReadFeed,
    /// Query page
    Query,
    /// Item creation
    Create,
    /// Full item replacement
    Replace,
    /// Create-or-replace
    Upsert,
    /// Item deletion
    Delete,
    /// Partial item update
    Patch,
    /// Transactional batch
    Batch,
}

impl OperationType {
    /// Whether the operation must be served by the primary replica
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            OperationType::Create
                | OperationType::Replace
                | OperationType::Upsert
                | OperationType::Delete
                | OperationType::Patch
                | OperationType::Batch
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Read => "read",
            OperationType::ReadFeed => "read_feed",
            OperationType::Query => "query",
            OperationType::Create => "create",
            OperationType::Replace => "replace",
            OperationType::Upsert => "upsert",
            OperationType::Delete => "delete",
            OperationType::Patch => "patch",
            OperationType::Batch => "batch",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of resource a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Document,
    Collection,
    Database,
    PartitionKeyRange,
    StoredProcedure,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Document => "document",
            ResourceType::Collection => "collection",
            ResourceType::Database => "database",
            ResourceType::PartitionKeyRange => "partition_key_range",
            ResourceType::StoredProcedure => "stored_procedure",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the client reaches the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// Direct connections to individual replicas
    Direct,
    /// HTTP calls through the regional gateway
    Gateway,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionType::Direct => write!(f, "direct"),
            ConnectionType::Gateway => write!(f, "gateway"),
        }
    }
}

/// Headers copied off the real request, echoed into synthetic errors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    /// Logical sequence number the request was issued against
    pub lsn: Option<i64>,
    /// Partition key range the request was routed to
    pub partition_key_range_id: Option<String>,
    /// Correlation id of the logical operation
    pub activity_id: Option<String>,
    /// Session token sent with the request
    pub session_token: Option<String>,
}

/// Everything a rule may inspect about one outgoing request
#[derive(Debug, Clone)]
pub struct RequestArgs {
    /// Connectivity used for this request
    pub connection_type: ConnectionType,
    /// Resolved container identifier (not the display name)
    pub container_id: String,
    pub operation_type: OperationType,
    pub resource_type: ResourceType,
    /// Regional service endpoint the request is currently routed to
    pub routed_endpoint: Option<String>,
    /// Physical replica address (direct connectivity only)
    pub physical_address: Option<String>,
    /// Whether `physical_address` is the partition's primary replica
    pub is_primary: bool,
    pub headers: RequestHeaders,
    /// Fault-injection context shared by all retries of the logical request
    pub context: Arc<FaultInjectionContext>,
}

impl RequestArgs {
    /// Describe a request with a fresh fault-injection context
    pub fn new(
        connection_type: ConnectionType,
        container_id: impl Into<String>,
        operation_type: OperationType,
        resource_type: ResourceType,
    ) -> Self {
        Self {
            connection_type,
            container_id: container_id.into(),
            operation_type,
            resource_type,
            routed_endpoint: None,
            physical_address: None,
            is_primary: false,
            headers: RequestHeaders::default(),
            context: Arc::new(FaultInjectionContext::new()),
        }
    }

    pub fn with_routed_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.routed_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_physical_address(mut self, address: impl Into<String>, is_primary: bool) -> Self {
        self.physical_address = Some(address.into());
        self.is_primary = is_primary;
        self
    }

    pub fn with_headers(mut self, headers: RequestHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// Reuse the context of an earlier attempt (retries of the same logical request)
    pub fn with_context(mut self, context: Arc<FaultInjectionContext>) -> Self {
        self.context = context;
        self
    }
}
