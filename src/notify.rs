//! Notification delivery seam.

use async_trait::async_trait;

use crate::actor::ActorRef;

/// Delivers a message to a set of actors. Best-effort and
/// fire-and-forget: delivery failure must never fail the operation that
/// triggered the broadcast, so the trait is infallible by construction.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, targets: &[ActorRef], text: &str);
}

/// Sink that drops everything. Default when the embedder has no
/// delivery channel wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn deliver(&self, _targets: &[ActorRef], _text: &str) {}
}
