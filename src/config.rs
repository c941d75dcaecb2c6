/*!
 * Configuration types for Faultline
 *
 * Two kinds of files are read: the engine configuration (connectivity, worker
 * pool, resolution retries, logging) and rule declaration files listing the
 * fault rules to register.
 */

use crate::error::{FaultError, Result};
use faultline_core_rules::{
    ConnectionErrorKind, ConnectionErrorResult, ConnectionType, FaultInjectionCondition,
    FaultInjectionEndpoints, FaultInjectionResult, FaultInjectionRule, FeedRange, OperationType,
    RuleError, ServerErrorKind, ServerErrorResult,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the fault-injection engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Connectivity the client is configured with
    #[serde(default = "default_connection_mode")]
    pub connection_mode: ConnectionType,

    /// Worker threads of the dedicated connection-error pool
    #[serde(default = "default_injection_workers")]
    pub injection_workers: usize,

    /// Retry policy used while resolving addresses during registration
    #[serde(default)]
    pub resolution_retry: ResolutionRetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connection_mode: default_connection_mode(),
            injection_workers: default_injection_workers(),
            resolution_retry: ResolutionRetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&contents)
            .map_err(|e| FaultError::parse(format!("engine config {}", path.display()), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.injection_workers == 0 {
            return Err(FaultError::Configuration(
                "injection_workers must be at least 1".to_string(),
            ));
        }
        self.resolution_retry.validate()
    }
}

/// Combined throttling and network retry settings for address resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRetryConfig {
    /// Throttled attempts retried before giving up
    #[serde(default = "default_max_throttle_retries")]
    pub max_throttle_retries: u32,

    /// Cumulative wait spent on throttling before giving up (seconds)
    #[serde(default = "default_max_throttle_wait_secs")]
    pub max_throttle_wait_secs: u64,

    /// Transient network failures retried before giving up
    #[serde(default = "default_max_network_retries")]
    pub max_network_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for ResolutionRetryConfig {
    fn default() -> Self {
        Self {
            max_throttle_retries: default_max_throttle_retries(),
            max_throttle_wait_secs: default_max_throttle_wait_secs(),
            max_network_retries: default_max_network_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl ResolutionRetryConfig {
    pub fn max_throttle_wait(&self) -> Duration {
        Duration::from_secs(self.max_throttle_wait_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 0.0 {
            return Err(FaultError::Configuration(format!(
                "backoff_multiplier must be positive and finite, got {}",
                self.backoff_multiplier
            )));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(FaultError::Configuration(
                "initial_backoff_ms must not exceed max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for level = debug)
    #[serde(default)]
    pub verbose: bool,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// A rule declaration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<RuleDeclaration>,
}

impl RuleSet {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents).map_err(|e| match e {
            FaultError::ConfigParse { message, .. } => FaultError::ConfigParse {
                what: format!("rule file {}", path.display()),
                message,
            },
            other => other,
        })
    }

    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| FaultError::parse("rule file", e))
    }

    /// Validate every declaration and build the user rules, in file order.
    ///
    /// Duplicate ids are rejected.
    pub fn to_rules(&self) -> Result<Vec<FaultInjectionRule>> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(self.rules.len());
        for declaration in &self.rules {
            if !seen.insert(declaration.id.as_str()) {
                return Err(FaultError::Configuration(format!(
                    "duplicate rule id {}",
                    declaration.id
                )));
            }
            rules.push(FaultInjectionRule::try_from(declaration.clone())?);
        }
        Ok(rules)
    }
}

/// One rule as written in a rule file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDeclaration {
    pub id: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub start_delay_ms: Option<u64>,

    #[serde(default)]
    pub duration_ms: Option<u64>,

    #[serde(default)]
    pub hit_limit: Option<u64>,

    pub condition: ConditionDeclaration,

    pub result: ResultDeclaration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionDeclaration {
    pub connection_type: ConnectionType,

    #[serde(default)]
    pub operation_type: Option<OperationType>,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub primary_only: bool,

    #[serde(default)]
    pub endpoints: Option<EndpointsDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointsDeclaration {
    #[serde(default = "FeedRange::full")]
    pub feed_range: FeedRange,

    #[serde(default)]
    pub replica_count: Option<usize>,

    #[serde(default = "default_true")]
    pub include_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultDeclaration {
    ServerError {
        kind: ServerErrorKind,
        #[serde(default)]
        times: Option<u32>,
        #[serde(default)]
        delay_ms: Option<u64>,
        #[serde(default)]
        suppress_service_requests: Option<bool>,
        #[serde(default)]
        injection_rate: Option<f64>,
    },
    ConnectionError {
        kind: ConnectionErrorKind,
        interval_ms: u64,
        threshold: u32,
    },
}

impl TryFrom<ResultDeclaration> for FaultInjectionResult {
    type Error = RuleError;

    fn try_from(declaration: ResultDeclaration) -> std::result::Result<Self, Self::Error> {
        match declaration {
            ResultDeclaration::ServerError {
                kind,
                times,
                delay_ms,
                suppress_service_requests,
                injection_rate,
            } => {
                let mut builder = ServerErrorResult::builder(kind);
                if let Some(times) = times {
                    builder = builder.times(times);
                }
                if let Some(delay_ms) = delay_ms {
                    builder = builder.delay(Duration::from_millis(delay_ms));
                }
                if let Some(suppress) = suppress_service_requests {
                    builder = builder.suppress_service_requests(suppress);
                }
                if let Some(rate) = injection_rate {
                    builder = builder.injection_rate(rate);
                }
                Ok(builder.build()?.into())
            }
            ResultDeclaration::ConnectionError {
                kind,
                interval_ms,
                threshold,
            } => {
                let interval = Duration::from_millis(interval_ms);
                Ok(ConnectionErrorResult::new(kind, interval, threshold)?.into())
            }
        }
    }
}

impl TryFrom<ConditionDeclaration> for FaultInjectionCondition {
    type Error = RuleError;

    fn try_from(declaration: ConditionDeclaration) -> std::result::Result<Self, Self::Error> {
        let mut builder = FaultInjectionCondition::builder()
            .connection_type(declaration.connection_type)
            .primary_only(declaration.primary_only);
        if let Some(op) = declaration.operation_type {
            builder = builder.operation_type(op);
        }
        if let Some(region) = declaration.region {
            builder = builder.region(region);
        }
        if let Some(endpoints) = declaration.endpoints {
            endpoints.feed_range.validate()?;
            let mut selector = FaultInjectionEndpoints::new(endpoints.feed_range)
                .with_include_primary(endpoints.include_primary);
            if let Some(count) = endpoints.replica_count {
                selector = selector.with_replica_count(count)?;
            }
            builder = builder.endpoints(selector);
        }
        builder.build()
    }
}

impl TryFrom<RuleDeclaration> for FaultInjectionRule {
    type Error = RuleError;

    fn try_from(declaration: RuleDeclaration) -> std::result::Result<Self, Self::Error> {
        let mut builder = FaultInjectionRule::builder(declaration.id)
            .enabled(declaration.enabled)
            .condition(declaration.condition.try_into()?)
            .result(FaultInjectionResult::try_from(declaration.result)?);
        if let Some(ms) = declaration.start_delay_ms {
            builder = builder.start_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = declaration.duration_ms {
            builder = builder.duration(Duration::from_millis(ms));
        }
        if let Some(limit) = declaration.hit_limit {
            builder = builder.hit_limit(limit);
        }
        builder.build()
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_connection_mode() -> ConnectionType {
    ConnectionType::Direct
}

fn default_injection_workers() -> usize {
    2
}

fn default_max_throttle_retries() -> u32 {
    9
}

fn default_max_throttle_wait_secs() -> u64 {
    30
}

fn default_max_network_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const RULES: &str = r#"
[[rules]]
id = "gone-rule"
duration_ms = 60000

[rules.condition]
connection_type = "direct"
operation_type = "read"
region = "West US"

[rules.condition.endpoints]
feed_range = { min = "", max = "FF" }
replica_count = 3

[rules.result]
type = "server_error"
kind = "gone"
times = 2

[[rules]]
id = "reset-everything"
enabled = false

[rules.condition]
connection_type = "direct"

[rules.result]
type = "connection_error"
kind = "connection_reset"
interval_ms = 500
threshold = 1
"#;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.connection_mode, ConnectionType::Direct);
        assert_eq!(config.injection_workers, 2);
        assert_eq!(config.resolution_retry.max_throttle_retries, 9);
        assert_eq!(config.resolution_retry.max_throttle_wait(), Duration::from_secs(30));
        assert_eq!(config.resolution_retry.max_network_retries, 3);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = EngineConfig {
            injection_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.resolution_retry.backoff_multiplier = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_multiplier() {
        for multiplier in [f64::INFINITY, f64::NAN, f64::NEG_INFINITY] {
            let retry = ResolutionRetryConfig {
                backoff_multiplier: multiplier,
                ..Default::default()
            };
            let err = retry.validate().unwrap_err();
            assert!(matches!(err, FaultError::Configuration(_)));
        }

        let retry = ResolutionRetryConfig {
            backoff_multiplier: 1e6,
            ..Default::default()
        };
        assert!(retry.validate().is_ok());
    }

    #[test]
    fn test_engine_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
connection_mode = "gateway"
injection_workers = 4

[resolution_retry]
max_network_retries = 5

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.connection_mode, ConnectionType::Gateway);
        assert_eq!(config.injection_workers, 4);
        assert_eq!(config.resolution_retry.max_network_retries, 5);
        assert_eq!(config.resolution_retry.initial_backoff(), Duration::from_millis(100));
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_rule_set_parsing() {
        let set = RuleSet::parse(RULES).unwrap();
        let rules = set.to_rules().unwrap();
        assert_eq!(rules.len(), 2);

        let gone = &rules[0];
        assert_eq!(gone.id(), "gone-rule");
        assert_eq!(gone.duration(), Some(Duration::from_secs(60)));
        assert_eq!(gone.condition().region(), Some("West US"));
        assert_eq!(gone.condition().endpoints().unwrap().replica_count(), 3);
        match gone.result() {
            FaultInjectionResult::ServerError(result) => {
                assert_eq!(result.kind(), ServerErrorKind::Gone);
                assert_eq!(result.times(), Some(2));
            }
            other => panic!("unexpected result {:?}", other),
        }

        let reset = &rules[1];
        assert!(!reset.is_enabled());
        assert!(matches!(reset.result(), FaultInjectionResult::ConnectionError(_)));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let doubled = format!("{}\n{}", RULES, RULES.replace("reset-everything", "other"));
        let err = RuleSet::parse(&doubled).unwrap().to_rules().unwrap_err();
        assert!(err.to_string().contains("duplicate rule id gone-rule"));
    }

    #[test]
    fn test_invalid_declaration_is_rule_error() {
        let bad = RULES.replace("interval_ms = 500", "interval_ms = 0");
        let err = RuleSet::parse(&bad).unwrap().to_rules().unwrap_err();
        assert!(matches!(err, FaultError::Rule(_)));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[[rules]]\nid = ").unwrap();
        let err = RuleSet::from_file(file.path()).unwrap_err();
        assert!(matches!(err, FaultError::ConfigParse { .. }));
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }
}
