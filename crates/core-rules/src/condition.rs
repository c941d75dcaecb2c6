//! Condition evaluation
//!
//! A [`Condition`] decides whether a rule applies to an outgoing request. It is
//! an ordered list of independent validators built once by
//! [`ConditionBuilder::build`] and never mutated afterwards. Evaluation is a
//! logical AND that stops at the first failing validator:
//!
//! ```text
//! container ─▶ operation ─▶ region ─▶ address ─▶ primary
//! ```
//!
//! The first mismatch is written to the request's
//! [`FaultInjectionContext`](crate::context::FaultInjectionContext) as a
//! diagnostic line. Recording never changes the outcome.
//!
//! # Example
//!
//! ```
//! use faultline_core_rules::condition::Condition;
//! use faultline_core_rules::request::{ConnectionType, OperationType, RequestArgs, ResourceType};
//!
//! let condition = Condition::builder("coll-1", ConnectionType::Direct)
//!     .operation_type(OperationType::Read)
//!     .build();
//!
//! let args = RequestArgs::new(
//!     ConnectionType::Direct,
//!     "coll-1",
//!     OperationType::Read,
//!     ResourceType::Document,
//! );
//! assert!(condition.is_applicable("rule-1", &args));
//!
//! let write = RequestArgs::new(
//!     ConnectionType::Direct,
//!     "coll-1",
//!     OperationType::Create,
//!     ResourceType::Document,
//! );
//! assert!(!condition.is_applicable("rule-1", &write));
//! ```

use crate::request::{ConnectionType, OperationType, RequestArgs};

/// One predicate of a condition
#[derive(Debug, Clone, PartialEq, Eq)]
enum Validator {
    Container(String),
    OperationType(OperationType),
    RegionEndpoints(Vec<String>),
    Addresses(Vec<String>),
    PrimaryOnly,
}

impl Validator {
    fn attribute(&self) -> &'static str {
        match self {
            Validator::Container(_) => "container",
            Validator::OperationType(_) => "operation_type",
            Validator::RegionEndpoints(_) => "region_endpoint",
            Validator::Addresses(_) => "address",
            Validator::PrimaryOnly => "primary_only",
        }
    }

    /// `None` when the request passes, otherwise "expected ..., actual ..."
    fn mismatch(&self, args: &RequestArgs) -> Option<String> {
        match self {
            Validator::Container(expected) => (args.container_id != *expected).then(|| {
                format!("expected {}, actual {}", expected, args.container_id)
            }),
            Validator::OperationType(expected) => (args.operation_type != *expected)
                .then(|| format!("expected {}, actual {}", expected, args.operation_type)),
            Validator::RegionEndpoints(endpoints) => {
                let routed = args.routed_endpoint.as_deref();
                match routed {
                    Some(endpoint) if endpoints.iter().any(|e| e == endpoint) => None,
                    _ => Some(format!(
                        "expected one of [{}], actual {}",
                        endpoints.join(", "),
                        routed.unwrap_or("<none>")
                    )),
                }
            }
            Validator::Addresses(prefixes) => {
                let address = args.physical_address.as_deref();
                match address {
                    Some(a) if prefixes.iter().any(|p| a.starts_with(p.as_str())) => None,
                    _ => Some(format!(
                        "expected prefix in [{}], actual {}",
                        prefixes.join(", "),
                        address.unwrap_or("<none>")
                    )),
                }
            }
            Validator::PrimaryOnly => {
                (!args.is_primary).then(|| "expected primary replica, actual secondary".to_string())
            }
        }
    }
}

/// Immutable, processed condition attached to an effective rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    container_id: String,
    connection_type: ConnectionType,
    operation_type: Option<OperationType>,
    region_endpoints: Vec<String>,
    addresses: Vec<String>,
    primary_only: bool,
    validators: Vec<Validator>,
}

impl Condition {
    /// Start a condition for a resolved container
    pub fn builder(
        container_id: impl Into<String>,
        connection_type: ConnectionType,
    ) -> ConditionBuilder {
        ConditionBuilder {
            container_id: container_id.into(),
            connection_type,
            operation_type: None,
            region_endpoints: Vec::new(),
            addresses: Vec::new(),
            primary_only: false,
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    pub fn operation_type(&self) -> Option<OperationType> {
        self.operation_type
    }

    pub fn region_endpoints(&self) -> &[String] {
        &self.region_endpoints
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn primary_only(&self) -> bool {
        self.primary_only
    }

    /// First failing validator as `(attribute, detail)`, if any
    pub fn first_mismatch(&self, args: &RequestArgs) -> Option<(&'static str, String)> {
        self.validators
            .iter()
            .find_map(|v| v.mismatch(args).map(|detail| (v.attribute(), detail)))
    }

    /// Evaluate the condition, recording the first mismatch on the request context
    pub fn is_applicable(&self, rule_id: &str, args: &RequestArgs) -> bool {
        match self.first_mismatch(args) {
            None => true,
            Some((attribute, detail)) => {
                args.context
                    .record_evaluation(format!("{} [{} mismatch] {}", rule_id, attribute, detail));
                false
            }
        }
    }
}

/// Incremental builder for [`Condition`]
#[derive(Debug, Clone)]
pub struct ConditionBuilder {
    container_id: String,
    connection_type: ConnectionType,
    operation_type: Option<OperationType>,
    region_endpoints: Vec<String>,
    addresses: Vec<String>,
    primary_only: bool,
}

impl ConditionBuilder {
    pub fn operation_type(mut self, operation_type: OperationType) -> Self {
        self.operation_type = Some(operation_type);
        self
    }

    /// Service endpoints the routed endpoint must belong to
    pub fn region_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.region_endpoints = endpoints;
        self
    }

    /// Address prefixes the physical replica address must start with
    pub fn addresses(mut self, addresses: Vec<String>) -> Self {
        self.addresses = addresses;
        self
    }

    pub fn primary_only(mut self, primary_only: bool) -> Self {
        self.primary_only = primary_only;
        self
    }

    /// Freeze the condition. Validators are laid out in the fixed evaluation order.
    pub fn build(self) -> Condition {
        let mut validators = vec![Validator::Container(self.container_id.clone())];
        if let Some(op) = self.operation_type {
            validators.push(Validator::OperationType(op));
        }
        if !self.region_endpoints.is_empty() {
            validators.push(Validator::RegionEndpoints(self.region_endpoints.clone()));
        }
        if !self.addresses.is_empty() {
            validators.push(Validator::Addresses(self.addresses.clone()));
        }
        if self.primary_only {
            validators.push(Validator::PrimaryOnly);
        }

        Condition {
            container_id: self.container_id,
            connection_type: self.connection_type,
            operation_type: self.operation_type,
            region_endpoints: self.region_endpoints,
            addresses: self.addresses,
            primary_only: self.primary_only,
            validators,
        }
    }
}
