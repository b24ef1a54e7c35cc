//! # Sentra Core
//!
//! The coordination fabric of the Sentra host agent: a topic-addressed
//! in-process event bus with bounded per-subscriber queues, a snapshot
//! cache holding the latest record per topic, a lifecycle manager for
//! periodic collectors, a watchdog with probe/remediation handling, an
//! expression-driven alert engine, and the JSON-backed config stores.
//!
//! Metric extraction and command execution are external collaborators:
//! collectors are opaque factories producing one collection per call, and
//! side effects flow through the controller traits in [`control`].

pub mod alert;
pub mod bus;
pub mod cache;
pub mod collector;
pub mod control;
pub mod error;
pub mod store;
pub mod watchdog;

pub use alert::AlertEngine;
pub use bus::{EventBus, Subscription};
pub use cache::SnapshotCache;
pub use collector::{CollectorManager, CollectorState, CollectorStatus};
pub use control::Controllers;
pub use error::{CoreError, Result};
pub use store::{AlertRuleStore, HealthCheckStore};
pub use watchdog::Watchdog;
