//! The bucket registry — process-wide entry point for every operation.
//!
//! All state lives in one arena behind a `tokio` `RwLock`: every mutation
//! validates its inputs and permissions first, then applies the change
//! under the write guard, so the critical sections (job + owner link +
//! opening comment, link fetch-or-create, status + close date + comment)
//! are atomic and per-job mutations are serialized. Notification
//! delivery happens after the guard is dropped and is best-effort.

mod jobs;
mod links;
mod queries;

pub use queries::{BucketStats, CommentView, JobView};

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::actor::{ActorDirectory, ActorRef};
use crate::clock::Clock;
use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::gate::{Capability, PermissionGate, Resource};
use crate::model::{
    ActionKind, Bucket, BucketId, Comment, Job, JobId, Link, LinkId, Role,
};
use crate::notify::NotificationSink;

static BUCKET_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{3,8}$").expect("bucket name pattern"));

/// Arena storage for all entities, keyed by opaque ids. Navigation is by
/// lookup; nothing here holds an owning back-reference.
pub(crate) struct State {
    pub(crate) buckets: BTreeMap<BucketId, Bucket>,
    pub(crate) jobs: BTreeMap<JobId, Job>,
    pub(crate) links: BTreeMap<LinkId, Link>,
    next_bucket: u64,
    next_job: u64,
    next_link: u64,
    next_comment: u64,
}

impl State {
    fn new() -> Self {
        Self {
            buckets: BTreeMap::new(),
            jobs: BTreeMap::new(),
            links: BTreeMap::new(),
            next_bucket: 1,
            next_job: 1,
            next_link: 1,
            next_comment: 1,
        }
    }

    pub(crate) fn bucket(&self, id: BucketId) -> Result<&Bucket> {
        self.buckets
            .get(&id)
            .ok_or_else(|| Error::not_found("Bucket", format!("#{}", id.0)))
    }

    pub(crate) fn bucket_mut(&mut self, id: BucketId) -> Result<&mut Bucket> {
        self.buckets
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("Bucket", format!("#{}", id.0)))
    }

    pub(crate) fn job(&self, id: JobId) -> Result<&Job> {
        self.jobs
            .get(&id)
            .ok_or_else(|| Error::not_found("Job", id.to_string()))
    }

    pub(crate) fn job_mut(&mut self, id: JobId) -> Result<&mut Job> {
        self.jobs
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("Job", id.to_string()))
    }

    /// The viewer's link on a job, if any.
    pub(crate) fn link_of(&self, job: &Job, actor: &ActorRef) -> Option<&Link> {
        job.links
            .iter()
            .filter_map(|id| self.links.get(id))
            .find(|link| link.actor == *actor)
    }

    /// Links on a job holding exactly `role`.
    pub(crate) fn links_with_role(&self, job: &Job, role: Role) -> Vec<&Link> {
        job.links
            .iter()
            .filter_map(|id| self.links.get(id))
            .filter(|link| link.role == role)
            .collect()
    }

    /// Atomic fetch-or-create of the (actor, job) link. Runs under the
    /// registry write guard, so concurrent promotions cannot race into a
    /// duplicate pair.
    pub(crate) fn ensure_link(&mut self, job_id: JobId, actor: &ActorRef) -> Result<LinkId> {
        if let Some(existing) = self.job(job_id)?.links.iter().find(|id| {
            self.links
                .get(*id)
                .is_some_and(|link| link.actor == *actor)
        }) {
            return Ok(*existing);
        }
        let id = LinkId(self.next_link);
        self.next_link += 1;
        self.links.insert(
            id,
            Link {
                id,
                job: job_id,
                actor: actor.clone(),
                role: Role::None,
                last_checked: None,
                comments: Vec::new(),
            },
        );
        self.job_mut(job_id)?.links.push(id);
        Ok(id)
    }

    /// Append a comment through the author's link and bump the job
    /// watermarks. Private comments touch `admin_update` only, which
    /// keeps `admin_update >= public_update`.
    pub(crate) fn log_comment(
        &mut self,
        now: DateTime<Utc>,
        author: &ActorRef,
        job_id: JobId,
        kind: ActionKind,
        text: Option<String>,
    ) -> Result<Comment> {
        let link_id = self.ensure_link(job_id, author)?;
        let comment = Comment {
            seq: self.next_comment,
            created_at: now,
            text,
            kind,
            is_private: kind.is_private(),
        };
        self.next_comment += 1;
        if let Some(link) = self.links.get_mut(&link_id) {
            link.comments.push(comment.clone());
        }
        let job = self.job_mut(job_id)?;
        job.admin_update = now;
        if !comment.is_private {
            job.public_update = now;
        }
        Ok(comment)
    }
}

/// The process-wide registry. Constructed once at startup with its
/// collaborators injected, then shared.
pub struct JobRegistry {
    gate: Arc<dyn PermissionGate>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
    directory: Arc<dyn ActorDirectory>,
    config: RegistryConfig,
    state: RwLock<State>,
}

impl JobRegistry {
    pub fn new(
        gate: Arc<dyn PermissionGate>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
        directory: Arc<dyn ActorDirectory>,
        config: RegistryConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            gate,
            clock,
            sink,
            directory,
            config,
            state: RwLock::new(State::new()),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn check(
        &self,
        actor: &ActorRef,
        resource: Resource<'_>,
        capability: Capability,
    ) -> bool {
        self.gate.check(actor, resource, capability)
    }

    pub(crate) fn require(
        &self,
        actor: &ActorRef,
        resource: Resource<'_>,
        capability: Capability,
    ) -> Result<()> {
        if self.check(actor, resource, capability) {
            Ok(())
        } else {
            warn!(actor = %actor, %capability, subject = %resource.subject(), "Permission denied");
            Err(Error::denied(capability, resource.subject()))
        }
    }

    pub(crate) fn is_bucket_admin(&self, actor: &ActorRef, bucket: &Bucket) -> bool {
        self.check(actor, bucket_resource(bucket), Capability::Admin)
    }

    /// Resolve an actor name through the directory.
    pub fn resolve_actor(&self, name: &str) -> Result<ActorRef> {
        self.directory
            .resolve(name)
            .ok_or_else(|| Error::not_found("Actor", name))
    }

    /// Build a job broadcast: the text names the bucket, job, and title,
    /// and the target set is the reachable bucket admins plus the job's
    /// participants (handlers only when the event is staff-private).
    pub(crate) fn job_announcement(
        &self,
        state: &State,
        job: &Job,
        message: &str,
        admin_only: bool,
    ) -> Result<(Vec<ActorRef>, String)> {
        let bucket = state.bucket(job.bucket)?;
        let text = format!(
            "{}: {} Job {} '{}': {}",
            self.config.alert_prefix, bucket.key, job.id, job.title, message
        );
        let mut targets: Vec<ActorRef> = Vec::new();
        for actor in self.directory.reachable() {
            let is_admin = self.check(&actor, bucket_resource(bucket), Capability::Admin);
            let link = state.link_of(job, &actor);
            let included = if admin_only {
                is_admin || link.is_some_and(|l| l.role == Role::Handler)
            } else {
                is_admin || link.is_some_and(|l| l.role > Role::None)
            };
            if included && !targets.contains(&actor) {
                targets.push(actor);
            }
        }
        Ok((targets, text))
    }

    /// Broadcast to every reachable actor holding registry-level admin.
    pub(crate) async fn alert_admins(&self, text: &str) {
        let targets: Vec<ActorRef> = self
            .directory
            .reachable()
            .into_iter()
            .filter(|actor| self.check(actor, Resource::Registry, Capability::Admin))
            .collect();
        let text = format!("{}: {}", self.config.alert_prefix, text);
        self.sink.deliver(&targets, &text).await;
    }

    // ── Bucket operations ───────────────────────────────────────────

    /// Create a bucket with the registry's default policy and due
    /// duration. Registry-admin only.
    pub async fn create_bucket(
        &self,
        actor: &ActorRef,
        name: &str,
        description: Option<&str>,
    ) -> Result<Bucket> {
        self.require(actor, Resource::Registry, Capability::Admin)?;
        validate_bucket_name(name)?;
        let bucket = {
            let mut state = self.state.write().await;
            if state
                .buckets
                .values()
                .any(|b| b.key.eq_ignore_ascii_case(name))
            {
                return Err(Error::conflict(format!("bucket name already in use: {name}")));
            }
            let id = BucketId(state.next_bucket);
            state.next_bucket += 1;
            let bucket = Bucket {
                id,
                key: name.to_string(),
                description: description
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(String::from),
                policy: self.config.default_policy.clone(),
                due: self.config.default_due,
                jobs: Vec::new(),
            };
            state.buckets.insert(id, bucket.clone());
            bucket
        };
        info!(bucket = %bucket.key, actor = %actor, "Bucket created");
        self.alert_admins(&format!("Bucket created: {}", bucket.key))
            .await;
        Ok(bucket)
    }

    /// Delete a bucket and all of its jobs. Superuser only, and the
    /// supplied name must match the key exactly (case included) as a
    /// confirmation step.
    pub async fn delete_bucket(&self, actor: &ActorRef, exact_name: &str) -> Result<()> {
        self.require(actor, Resource::Registry, Capability::Superuser)?;
        let removed = {
            let mut state = self.state.write().await;
            let id = self.locate_bucket(&state, actor, exact_name)?;
            let bucket = state.bucket(id)?;
            if bucket.key != exact_name {
                return Err(Error::invalid(
                    "deletion requires the exact bucket name, case included",
                ));
            }
            let Some(bucket) = state.buckets.remove(&id) else {
                return Err(Error::not_found("Bucket", exact_name));
            };
            // Cascade: no orphan jobs or links may survive the bucket.
            for job_id in &bucket.jobs {
                if let Some(job) = state.jobs.remove(job_id) {
                    for link_id in &job.links {
                        state.links.remove(link_id);
                    }
                }
            }
            bucket
        };
        info!(bucket = %removed.key, actor = %actor, jobs = removed.jobs.len(), "Bucket deleted");
        self.alert_admins(&format!("Bucket '{}' deleted", removed.key))
            .await;
        Ok(())
    }

    /// Rename a bucket, re-validating the name pattern and uniqueness.
    pub async fn rename_bucket(
        &self,
        actor: &ActorRef,
        bucket: &str,
        new_name: &str,
    ) -> Result<Bucket> {
        self.require(actor, Resource::Registry, Capability::Admin)?;
        validate_bucket_name(new_name)?;
        let (old_name, renamed) = {
            let mut state = self.state.write().await;
            let id = self.locate_bucket(&state, actor, bucket)?;
            if state
                .buckets
                .values()
                .any(|b| b.id != id && b.key.eq_ignore_ascii_case(new_name))
            {
                return Err(Error::conflict(format!(
                    "bucket name already in use: {new_name}"
                )));
            }
            let entry = state.bucket_mut(id)?;
            let old_name = std::mem::replace(&mut entry.key, new_name.to_string());
            (old_name, entry.clone())
        };
        info!(from = %old_name, to = %renamed.key, "Bucket renamed");
        self.alert_admins(&format!("Bucket '{}' renamed to: {}", old_name, renamed.key))
            .await;
        Ok(renamed)
    }

    /// Replace a bucket's description.
    pub async fn describe_bucket(
        &self,
        actor: &ActorRef,
        bucket: &str,
        description: &str,
    ) -> Result<Bucket> {
        self.require(actor, Resource::Registry, Capability::Admin)?;
        let description = description.trim();
        if description.is_empty() {
            return Err(Error::invalid("description must not be empty"));
        }
        let updated = {
            let mut state = self.state.write().await;
            let id = self.locate_bucket(&state, actor, bucket)?;
            let entry = state.bucket_mut(id)?;
            entry.description = Some(description.to_string());
            entry.clone()
        };
        self.alert_admins(&format!("Bucket '{}' description changed", updated.key))
            .await;
        Ok(updated)
    }

    /// Replace a bucket's opaque permission policy.
    pub async fn set_lock_policy(
        &self,
        actor: &ActorRef,
        bucket: &str,
        policy: &str,
    ) -> Result<Bucket> {
        self.require(actor, Resource::Registry, Capability::Admin)?;
        if policy.trim().is_empty() {
            return Err(Error::invalid("policy must not be empty"));
        }
        let updated = {
            let mut state = self.state.write().await;
            let id = self.locate_bucket(&state, actor, bucket)?;
            let entry = state.bucket_mut(id)?;
            entry.policy = policy.trim().to_string();
            entry.clone()
        };
        info!(bucket = %updated.key, policy = %updated.policy, "Bucket policy changed");
        self.alert_admins(&format!(
            "Bucket '{}' policy changed to: {}",
            updated.key, updated.policy
        ))
        .await;
        Ok(updated)
    }

    /// Change the due duration applied to new jobs in a bucket.
    pub async fn set_due_duration(
        &self,
        actor: &ActorRef,
        bucket: &str,
        due: Duration,
    ) -> Result<Bucket> {
        self.require(actor, Resource::Registry, Capability::Admin)?;
        validate_due(due)?;
        let (old_due, updated) = {
            let mut state = self.state.write().await;
            let id = self.locate_bucket(&state, actor, bucket)?;
            let entry = state.bucket_mut(id)?;
            let old_due = std::mem::replace(&mut entry.due, due);
            (old_due, entry.clone())
        };
        self.alert_admins(&format!(
            "Bucket '{}' due duration changed from {:?} to {:?}",
            updated.key, old_due, updated.due
        ))
        .await;
        Ok(updated)
    }

    /// Resolve a bucket by case-insensitive exact or unique-prefix match
    /// over the buckets the actor can see.
    pub async fn find_bucket(&self, actor: &ActorRef, name: &str) -> Result<Bucket> {
        let state = self.state.read().await;
        let id = self.locate_bucket(&state, actor, name)?;
        state.bucket(id).cloned()
    }

    /// Buckets the actor can see, ordered by key.
    pub async fn visible_buckets(&self, actor: &ActorRef) -> Vec<Bucket> {
        let state = self.state.read().await;
        let mut buckets: Vec<Bucket> = state
            .buckets
            .values()
            .filter(|b| self.check(actor, bucket_resource(b), Capability::See))
            .cloned()
            .collect();
        buckets.sort_by(|a, b| a.key.to_lowercase().cmp(&b.key.to_lowercase()));
        buckets
    }

    pub(crate) fn locate_bucket(
        &self,
        state: &State,
        actor: &ActorRef,
        name: &str,
    ) -> Result<BucketId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid("bucket name must not be empty"));
        }
        let visible: Vec<&Bucket> = state
            .buckets
            .values()
            .filter(|b| self.check(actor, bucket_resource(b), Capability::See))
            .collect();
        if let Some(exact) = visible.iter().find(|b| b.key.eq_ignore_ascii_case(name)) {
            return Ok(exact.id);
        }
        let needle = name.to_lowercase();
        let mut prefixed = visible
            .iter()
            .filter(|b| b.key.to_lowercase().starts_with(&needle));
        match (prefixed.next(), prefixed.next()) {
            (Some(bucket), None) => Ok(bucket.id),
            // No match and ambiguous match both read as "not found".
            _ => Err(Error::not_found("Bucket", name)),
        }
    }
}

pub(crate) fn bucket_resource(bucket: &Bucket) -> Resource<'_> {
    Resource::Bucket {
        key: &bucket.key,
        policy: &bucket.policy,
    }
}

fn validate_bucket_name(name: &str) -> Result<()> {
    if BUCKET_NAME.is_match(name) {
        Ok(())
    } else {
        Err(Error::invalid(
            "bucket names must be 3-8 alphabetic characters",
        ))
    }
}

/// Upper bound on bucket due durations. Keeps `submit_date + due` well
/// inside `DateTime<Utc>`'s representable range.
pub(crate) const MAX_DUE: Duration = Duration::from_secs(3650 * 24 * 60 * 60);

pub(crate) fn validate_due(due: Duration) -> Result<()> {
    if due.is_zero() {
        return Err(Error::invalid("due duration must be positive"));
    }
    if due > MAX_DUE {
        return Err(Error::invalid("due duration must be ten years or less"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_name_pattern() {
        assert!(validate_bucket_name("BUG").is_ok());
        assert!(validate_bucket_name("Requests").is_ok());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("toolongname").is_err());
        assert!(validate_bucket_name("bug-1").is_err());
        assert!(validate_bucket_name("").is_err());
    }

    #[test]
    fn due_validation() {
        assert!(validate_due(Duration::from_secs(60)).is_ok());
        assert!(validate_due(MAX_DUE).is_ok());
        assert!(validate_due(Duration::ZERO).is_err());
        assert!(validate_due(MAX_DUE + Duration::from_secs(1)).is_err());
        assert!(validate_due(Duration::from_secs(1_000_000_000_000_000)).is_err());
    }
}
