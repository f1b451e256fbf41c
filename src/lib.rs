//! Jobdesk — multi-actor job/ticket workflow core.
//!
//! Actors file requests into categorized buckets; staff triage them
//! through a role-gated lifecycle; every action lands in a threaded,
//! partially-private comment log with per-viewer unread tracking.
//! Presentation, persistence, identity, and the concrete permission
//! policy live behind the collaborator traits in [`gate`], [`clock`],
//! [`actor`], and [`notify`].

pub mod actor;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod model;
pub mod notify;
pub mod registry;

pub use actor::{ActorDirectory, ActorRef, StaticDirectory};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RegistryConfig;
pub use error::{Error, Result};
pub use gate::{Capability, PermissionGate, Resource};
pub use model::{ActionKind, Bucket, Comment, Job, JobStatus, Link, Role};
pub use notify::{NotificationSink, NullSink};
pub use registry::{BucketStats, CommentView, JobRegistry, JobView};
