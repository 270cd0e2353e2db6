//! # Profman Registry
//!
//! Durable profile identities and the artifacts derived from them:
//! - `profiles.json`, loaded fully at startup and rewritten atomically
//! - Provisioning with unique aliases and a single master profile
//! - Compare-and-set application of hygiene corrections
//! - Per-launch [`LaunchSpec`] files

pub mod launch_spec;
pub mod paths;
pub mod profile;
pub mod store;

pub use launch_spec::{LaunchSpec, LaunchSpecBuilder};
pub use paths::OrchestratorPaths;
pub use profile::{Correction, Profile, RecordStatus, RegistryDocument, ORPHANED_PID_REASON};
pub use store::{read_document, write_atomic, ProfileRegistry};
