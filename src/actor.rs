//! Actor identity seam.
//!
//! The core does not own accounts or sessions; it works with opaque
//! [`ActorRef`]s and asks the directory to resolve names and enumerate
//! currently-reachable actors for broadcasts.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to one actor identity. Equality and hashing go by id; the
/// name is carried only for interpolation into notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorRef {
    pub id: Uuid,
    pub name: String,
}

impl ActorRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ActorRef {}

impl std::hash::Hash for ActorRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Identity lookup, not owned by the core.
pub trait ActorDirectory: Send + Sync {
    /// Resolve a name to an actor, if one exists.
    fn resolve(&self, name: &str) -> Option<ActorRef>;

    /// Actors currently reachable for best-effort notification delivery.
    fn reachable(&self) -> Vec<ActorRef>;
}

/// Fixed in-memory directory. Every registered actor counts as
/// reachable; suits embedding and tests.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    actors: RwLock<HashMap<String, ActorRef>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actor under its display name (case-insensitive lookup).
    pub fn add(&self, actor: ActorRef) {
        let mut actors = self.actors.write().unwrap();
        actors.insert(actor.name.to_lowercase(), actor);
    }
}

impl ActorDirectory for StaticDirectory {
    fn resolve(&self, name: &str) -> Option<ActorRef> {
        let actors = self.actors.read().unwrap();
        actors.get(&name.to_lowercase()).cloned()
    }

    fn reachable(&self) -> Vec<ActorRef> {
        let actors = self.actors.read().unwrap();
        actors.values().cloned().collect()
    }
}
