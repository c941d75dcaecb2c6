/*!
 * Fault injectors
 *
 * - [`server`]: synchronous hooks the request pipeline calls at its
 *   checkpoints (before send, after send, on error, on connect)
 * - [`connection`]: background tasks breaking pooled connections
 */

pub mod connection;
pub mod server;

pub use connection::ConnectionErrorInjector;
pub use server::{RuleBasedServerErrorInjector, ServerErrorInjector};
