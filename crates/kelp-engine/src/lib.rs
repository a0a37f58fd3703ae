//! Object lifecycle coordinator.
//!
//! Turns a logical operation (put, get, head, search, delete) on an object
//! address into a sequence of per-node calls against the placement nodes
//! of the object's container, tolerating node failures up to each
//! operation's quorum rules.
//!
//! The [`ObjectService`] wires every component together and implements the
//! [`ObjectEngine`] trait adapters depend on. The components can also be
//! driven directly with a hand-built [`ExecutionContext`].

pub mod config;
pub mod context;
pub mod delete;
mod driver;
pub mod engine;
pub mod epoch;
pub mod error;
pub mod get;
pub mod head;
pub mod put;
pub mod search;
pub mod service;
pub mod split;
pub mod telemetry;

pub use config::{ConfigError, CoordinatorConfig};
pub use context::ExecutionContext;
pub use delete::{DeleteCoordinator, DeleteOutcome};
pub use engine::ObjectEngine;
pub use epoch::{EpochSource, ManualEpoch};
pub use error::ObjectError;
pub use get::ObjectReader;
pub use head::{HeadOutcome, HeadResolver};
pub use put::{PartialBroadcastFailure, PutOutcome, PutStreamer};
pub use search::SearchExecutor;
pub use service::ObjectService;
pub use split::SplitWalker;

#[cfg(test)]
mod tests;
