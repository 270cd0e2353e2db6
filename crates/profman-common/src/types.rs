//! Core identifiers shared across the profman crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Profile identifier - stable, generated once at provisioning time.
///
/// # Example
/// ```
/// use profman_common::ProfileId;
///
/// let id = ProfileId::from("p1");
/// assert_eq!(id.as_str(), "p1");
/// assert_eq!(id.browser_process_name(), "browser_p1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name under which the supervisor registers this profile's browser.
    pub fn browser_process_name(&self) -> String {
        format!("{}{}", BROWSER_PROCESS_PREFIX, self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProfileId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ProfileId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supervisor-visible name prefix for per-profile browser processes.
pub const BROWSER_PROCESS_PREFIX: &str = "browser_";

/// Supervisor-visible name of the background engine service.
pub const ENGINE_SERVICE_NAME: &str = "engine_service";

/// Well-known control port of the background engine service.
pub const DEFAULT_CONTROL_PORT: u16 = 5678;
