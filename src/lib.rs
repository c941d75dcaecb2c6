/*!
 * Faultline - fault injection for distributed data-store clients
 *
 * Simulates server and network failures on the client side, without touching
 * the service:
 * - Response delays before or after the real call
 * - Synthetic server errors shaped like genuine backend failures
 * - Connection-establishment delays
 * - Recurring connection resets and closes on pooled connections
 *
 * Rules are declared against regions and feed ranges, resolved into concrete
 * endpoints and replica addresses, and consulted on every request through
 * the injector hooks. Pure rule logic lives in `faultline-core-rules`.
 *
 * Author: Shane Wall <shaneawall@gmail.com>
 */

pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod injector;
pub mod logging;
pub mod processor;
pub mod retry;
pub mod scheduler;
pub mod topology;

pub use faultline_core_rules as rules;

// Re-export commonly used types
pub use collaborators::{
    AddressResolver, CollectionCache, ConnectionPool, EndpointDirectory, PartitionKeyRangeCache,
    PooledEndpoint, ReplicaAddress, Resolvers,
};
pub use config::{EngineConfig, LogLevel, LoggingConfig, ResolutionRetryConfig, RuleSet};
pub use engine::FaultInjectionEngine;
pub use error::{CollaboratorError, ErrorCategory, FaultError, Result};
pub use injector::{ConnectionErrorInjector, RuleBasedServerErrorInjector, ServerErrorInjector};
pub use processor::RuleProcessor;
pub use topology::StaticTopology;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
