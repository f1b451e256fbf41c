//! Core data model — buckets, jobs, links, comments.
//!
//! Entities live in arena maps inside the registry and point at each
//! other through the id newtypes here; none of the back-references own
//! anything. A [`Bucket`] owns its jobs, a [`Job`] its links, a
//! [`Link`] its comments.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actor::ActorRef;
use crate::error::{Error, Result};

/// Opaque bucket id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketId(pub u64);

/// Job id; assigned monotonically, so id order is submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub u64);

/// Opaque link id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Approved,
    Denied,
    Canceled,
}

impl JobStatus {
    /// Whether the job is closed (has a `close_date`).
    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }

    /// The legal transition table: Pending may close any way; Denied and
    /// Canceled may be revived; Approved is final.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Approved | Self::Denied | Self::Canceled) => true,
            (Self::Denied | Self::Canceled, Self::Pending) => true,
            _ => false,
        }
    }
}

/// An actor's role on one job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Linked for read-tracking only.
    #[default]
    None = 0,
    Helper = 1,
    Handler = 2,
    Owner = 3,
}

impl Role {
    /// Parse an externally supplied role number. The domain is strictly
    /// {0, 1, 2, 3}.
    pub fn from_value(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Helper),
            2 => Ok(Self::Handler),
            3 => Ok(Self::Owner),
            other => Err(Error::invalid(format!("invalid role value: {other}"))),
        }
    }

    pub fn value(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "None",
            Self::Helper => "Helper",
            Self::Handler => "Handler",
            Self::Owner => "Owner",
        };
        f.write_str(name)
    }
}

/// What a comment records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Opened,
    Reply,
    StaffComment,
    Moved,
    Approved,
    Denied,
    Canceled,
    Revived,
    AppointHandler,
    AppointHelper,
    RemoveHandler,
    RemoveHelper,
    DueChanged,
}

impl ActionKind {
    /// Action-only comments render inline rather than as a message body.
    /// Recorded here so the presentation layer can tell them apart.
    pub fn is_action_only(self) -> bool {
        matches!(
            self,
            Self::Moved
                | Self::AppointHandler
                | Self::AppointHelper
                | Self::RemoveHandler
                | Self::RemoveHelper
                | Self::DueChanged
        )
    }

    /// Only staff comments are private.
    pub fn is_private(self) -> bool {
        self == Self::StaffComment
    }
}

/// One immutable entry in a job's comment log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    /// Registry-wide creation sequence; orders the merged log of a job
    /// even when timestamps collide.
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub kind: ActionKind,
    pub is_private: bool,
}

/// Binds one actor to one job. At most one link exists per (actor, job)
/// pair; role changes mutate the link in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub job: JobId,
    pub actor: ActorRef,
    pub role: Role,
    /// Read watermark; `None` until the actor first views the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    pub comments: Vec<Comment>,
}

/// A single ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub bucket: BucketId,
    pub title: String,
    pub status: JobStatus,
    pub submit_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    /// Set on entering a terminal status, cleared on revive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_date: Option<DateTime<Utc>>,
    /// Bumped by every public action.
    pub public_update: DateTime<Utc>,
    /// Bumped by every action, private ones included. Invariant:
    /// `admin_update >= public_update`.
    pub admin_update: DateTime<Utc>,
    pub links: Vec<LinkId>,
}

impl Job {
    /// The watermark relevant to a viewer: admins also see private
    /// activity.
    pub fn relevant_update(&self, admin: bool) -> DateTime<Utc> {
        if admin {
            self.admin_update.max(self.public_update)
        } else {
            self.public_update
        }
    }

    /// Unread rule: no link (or a never-stamped link) is always unread;
    /// otherwise the viewer's relevant watermark must not have passed
    /// their read stamp.
    pub fn unread_for(&self, link: Option<&Link>, admin: bool) -> bool {
        match link.and_then(|l| l.last_checked) {
            None => true,
            Some(checked) => self.relevant_update(admin) > checked,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.due_date < now
    }
}

/// A named queue of jobs with its own visibility policy and due
/// duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket {
    pub id: BucketId,
    /// 3-8 alphabetic characters, unique case-insensitively.
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Opaque policy string, interpreted by the permission gate.
    pub policy: String,
    /// Span added to `submit_date` to produce a new job's `due_date`.
    pub due: Duration,
    /// Owned jobs in submission order.
    pub jobs: Vec<JobId>,
}
