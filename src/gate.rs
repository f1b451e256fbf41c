//! Capability-check seam.
//!
//! The registry never interprets permission policies itself; it asks the
//! gate whether an actor holds a named capability on a resource. The
//! concrete policy representation (rule language, role table, ...) is the
//! gate implementation's business.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::actor::ActorRef;

/// The closed set of capability names the core checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// May see a bucket and its listings.
    See,
    /// May file new jobs into a bucket.
    Post,
    /// May triage: status changes, role changes, private comments.
    Admin,
    /// Registry-level destructive operations (bucket deletion).
    Superuser,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::See => "see",
            Self::Post => "post",
            Self::Admin => "admin",
            Self::Superuser => "superuser",
        };
        f.write_str(name)
    }
}

/// What a capability is being checked against.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    /// The registry itself (bucket administration, deletion).
    Registry,
    /// One bucket, carrying its opaque policy string.
    Bucket { key: &'a str, policy: &'a str },
}

impl Resource<'_> {
    /// Human-readable subject for error messages.
    pub fn subject(&self) -> String {
        match self {
            Self::Registry => "registry".to_string(),
            Self::Bucket { key, .. } => format!("bucket '{key}'"),
        }
    }
}

/// Evaluates `(actor, resource, capability) -> bool`.
pub trait PermissionGate: Send + Sync {
    fn check(&self, actor: &ActorRef, resource: Resource<'_>, capability: Capability) -> bool;
}
