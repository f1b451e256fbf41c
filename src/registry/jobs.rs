//! Job lifecycle — creation, lookup, moves, status transitions, due
//! dates.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::actor::ActorRef;
use crate::error::{Error, Result};
use crate::gate::Capability;
use crate::model::{ActionKind, Job, JobId, JobStatus, Role};

use super::{JobRegistry, bucket_resource};

impl JobRegistry {
    /// File a new job into a bucket. Needs `post` on the bucket; the
    /// job, its owner link, and the opening comment are created as one
    /// atomic unit under the write guard.
    pub async fn create_job(
        &self,
        actor: &ActorRef,
        bucket: &str,
        title: &str,
        opening: &str,
    ) -> Result<Job> {
        let title = title.trim();
        let opening = opening.trim();
        if title.is_empty() {
            return Err(Error::invalid("job title must not be empty"));
        }
        if opening.is_empty() {
            return Err(Error::invalid("opening statement must not be empty"));
        }

        let (job, bucket_key) = {
            let mut state = self.state.write().await;
            let bucket_id = self.locate_bucket(&state, actor, bucket)?;
            let entry = state.bucket(bucket_id)?;
            self.require(actor, bucket_resource(entry), Capability::Post)?;
            let due = chrono::Duration::from_std(entry.due)
                .map_err(|_| Error::invalid("bucket due duration out of range"))?;
            let bucket_key = entry.key.clone();

            let now = self.now();
            let due_date = now
                .checked_add_signed(due)
                .ok_or_else(|| Error::invalid("bucket due duration out of range"))?;
            let id = JobId(state.next_job);
            state.next_job += 1;
            state.jobs.insert(
                id,
                Job {
                    id,
                    bucket: bucket_id,
                    title: title.to_string(),
                    status: JobStatus::Pending,
                    submit_date: now,
                    due_date,
                    close_date: None,
                    public_update: now,
                    admin_update: now,
                    links: Vec::new(),
                },
            );
            state.bucket_mut(bucket_id)?.jobs.push(id);

            let link_id = state.ensure_link(id, actor)?;
            if let Some(link) = state.links.get_mut(&link_id) {
                link.role = Role::Owner;
            }
            state.log_comment(now, actor, id, ActionKind::Opened, Some(opening.to_string()))?;
            // Stamp the opener's read watermark last so their own opening
            // does not show as unread.
            if let Some(link) = state.links.get_mut(&link_id) {
                link.last_checked = Some(now);
            }
            (state.job(id)?.clone(), bucket_key)
        };

        info!(job = %job.id, bucket = %bucket_key, actor = %actor, "Job created");
        Ok(job)
    }

    /// Resolve a job by id. Succeeds for bucket admins and for actors
    /// holding any non-None link on the job.
    pub async fn find_job(&self, actor: &ActorRef, id: JobId) -> Result<Job> {
        let state = self.state.read().await;
        let job = state.job(id)?;
        let bucket = state.bucket(job.bucket)?;
        let participant = state
            .link_of(job, actor)
            .is_some_and(|link| link.role > Role::None);
        if self.is_bucket_admin(actor, bucket) || participant {
            Ok(job.clone())
        } else {
            Err(Error::denied(Capability::See, format!("job {id}")))
        }
    }

    /// Move a job to another bucket. Needs admin on both the source and
    /// the destination.
    pub async fn move_job(&self, actor: &ActorRef, id: JobId, destination: &str) -> Result<Job> {
        let (job, old_key, targets, text) = {
            let mut state = self.state.write().await;
            let job = state.job(id)?;
            let source_id = job.bucket;
            let source = state.bucket(source_id)?;
            self.require(actor, bucket_resource(source), Capability::Admin)?;
            let old_key = source.key.clone();

            let dest_id = self.locate_bucket(&state, actor, destination)?;
            let dest = state.bucket(dest_id)?;
            self.require(actor, bucket_resource(dest), Capability::Admin)?;
            let new_key = dest.key.clone();

            let now = self.now();
            state.bucket_mut(source_id)?.jobs.retain(|j| *j != id);
            state.bucket_mut(dest_id)?.jobs.push(id);
            state.job_mut(id)?.bucket = dest_id;
            state.log_comment(
                now,
                actor,
                id,
                ActionKind::Moved,
                Some(format!("{old_key} to {new_key}")),
            )?;

            let job = state.job(id)?.clone();
            let (targets, text) =
                self.job_announcement(&state, &job, &format!("{actor} moved the job"), false)?;
            (job, old_key, targets, text)
        };

        info!(job = %id, from = %old_key, actor = %actor, "Job moved");
        self.sink.deliver(&targets, &text).await;
        Ok(job)
    }

    /// Approve a pending job. Approved is final.
    pub async fn approve_job(
        &self,
        actor: &ActorRef,
        id: JobId,
        reason: Option<&str>,
    ) -> Result<Job> {
        self.transition(actor, id, JobStatus::Approved, ActionKind::Approved, "Approved", reason)
            .await
    }

    /// Deny a pending job.
    pub async fn deny_job(&self, actor: &ActorRef, id: JobId, reason: Option<&str>) -> Result<Job> {
        self.transition(actor, id, JobStatus::Denied, ActionKind::Denied, "Denied", reason)
            .await
    }

    /// Cancel a pending job.
    pub async fn cancel_job(
        &self,
        actor: &ActorRef,
        id: JobId,
        reason: Option<&str>,
    ) -> Result<Job> {
        self.transition(actor, id, JobStatus::Canceled, ActionKind::Canceled, "Canceled", reason)
            .await
    }

    /// Reopen a denied or canceled job. Clears `close_date`.
    pub async fn revive_job(
        &self,
        actor: &ActorRef,
        id: JobId,
        reason: Option<&str>,
    ) -> Result<Job> {
        self.transition(actor, id, JobStatus::Pending, ActionKind::Revived, "Revived", reason)
            .await
    }

    async fn transition(
        &self,
        actor: &ActorRef,
        id: JobId,
        new_status: JobStatus,
        kind: ActionKind,
        verb: &str,
        reason: Option<&str>,
    ) -> Result<Job> {
        let (job, targets, text) = {
            let mut state = self.state.write().await;
            let job = state.job(id)?;
            let bucket = state.bucket(job.bucket)?;
            self.require(actor, bucket_resource(bucket), Capability::Admin)?;
            if !job.status.can_transition_to(new_status) {
                return Err(Error::conflict(format!(
                    "job {id} cannot go from {:?} to {new_status:?}",
                    job.status
                )));
            }

            let now = self.now();
            {
                let job = state.job_mut(id)?;
                job.status = new_status;
                job.close_date = new_status.is_terminal().then_some(now);
            }
            state.log_comment(now, actor, id, kind, reason.map(String::from))?;

            let job = state.job(id)?.clone();
            let (targets, text) =
                self.job_announcement(&state, &job, &format!("{verb} by {actor}"), false)?;
            (job, targets, text)
        };

        info!(job = %id, status = ?job.status, actor = %actor, "Job status changed");
        self.sink.deliver(&targets, &text).await;
        Ok(job)
    }

    /// Change a job's due date. Bucket-admin only; logs a `DueChanged`
    /// comment carrying the old and new dates.
    pub async fn set_job_due(
        &self,
        actor: &ActorRef,
        id: JobId,
        new_due: DateTime<Utc>,
    ) -> Result<Job> {
        let job = {
            let mut state = self.state.write().await;
            let job = state.job(id)?;
            let bucket = state.bucket(job.bucket)?;
            self.require(actor, bucket_resource(bucket), Capability::Admin)?;
            let old_due = job.due_date;

            let now = self.now();
            state.job_mut(id)?.due_date = new_due;
            state.log_comment(
                now,
                actor,
                id,
                ActionKind::DueChanged,
                Some(format!("{} to {}", old_due.to_rfc3339(), new_due.to_rfc3339())),
            )?;
            state.job(id)?.clone()
        };
        info!(job = %id, due = %job.due_date, actor = %actor, "Job due date changed");
        Ok(job)
    }
}
