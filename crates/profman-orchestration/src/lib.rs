//! # Profman Orchestration
//!
//! The layer that turns events into process work:
//! - One lifecycle actor per profile ([`lifecycle`])
//! - The recovery flow a degraded profile runs ([`recovery`])
//! - The [`Orchestrator`] that owns every actor
//! - The [`SystemGate`] that orders startup, and [`bootstrap`] which uses it
//! - YAML configuration and an optional per-profile event journal

pub mod bootstrap;
pub mod config;
pub mod gate;
pub mod journal;
pub mod lifecycle;
pub mod orchestrator;
pub mod recovery;

pub use bootstrap::{boot, Runtime};
pub use config::OrchestratorConfig;
pub use gate::{SystemGate, DEPENDENCIES_READY};
pub use journal::{replay_state, EventJournal, JournalEntry};
pub use lifecycle::{spawn_lifecycle, LifecycleHandle, LifecycleSettings};
pub use orchestrator::Orchestrator;
pub use recovery::{RecoveryFlow, RecoveryOutcome, RetryingControl};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
