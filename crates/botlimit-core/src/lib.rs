//! Shared primitives for the Authorizer and Usage Adjuster services: bot
//! token parsing, the atomic store abstraction and its Redis/in-memory
//! backends, configuration, and error taxonomy.

pub mod config;
pub mod error;
pub mod store;
pub mod telemetry;
pub mod token;

pub use error::{Reason, StoreError};
pub use store::{AuthDecision, MemoryStore, RedisStore, RefundOutcome, Store};
pub use token::{extract as extract_bot_token, tenant_from_token, BotToken};
