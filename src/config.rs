//! Configuration types.

use std::time::Duration;

const DAY: u64 = 24 * 60 * 60;

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Opaque permission policy assigned to newly created buckets,
    /// interpreted by the [`PermissionGate`](crate::gate::PermissionGate).
    pub default_policy: String,
    /// Default due duration for newly created buckets.
    pub default_due: Duration,
    /// Trailing window during which closed jobs still count as "active".
    pub active_window: Duration,
    /// Recency window bounding the staff catch-up scan (`list_new`);
    /// jobs submitted before it are excluded even if unread.
    pub new_window: Duration,
    /// Prefix prepended to every notification broadcast.
    pub alert_prefix: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_policy: "see:all;post:all;admin:staff".to_string(),
            default_due: Duration::from_secs(7 * DAY),
            active_window: Duration::from_secs(7 * DAY),
            new_window: Duration::from_secs(14 * DAY),
            alert_prefix: "JOBS".to_string(),
        }
    }
}
