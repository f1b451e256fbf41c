//! Read-only listings and composed views.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::actor::ActorRef;
use crate::error::{Error, Result};
use crate::gate::Capability;
use crate::model::{ActionKind, Bucket, Job, JobId, JobStatus, Role};

use super::{JobRegistry, State, bucket_resource};

/// One comment in a job view, flattened with its author.
#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub author: ActorRef,
    pub author_role: Role,
    pub created_at: DateTime<Utc>,
    pub kind: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub is_private: bool,
}

/// A job with its cast and comment thread, filtered for one viewer.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub job: Job,
    pub bucket_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<ActorRef>,
    pub handlers: Vec<ActorRef>,
    pub helpers: Vec<ActorRef>,
    pub comments: Vec<CommentView>,
    /// Whether the viewer got the elevated (private-inclusive) view.
    pub admin_view: bool,
}

/// Per-status counts backing the bucket overview table.
#[derive(Debug, Clone, Serialize)]
pub struct BucketStats {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub due: Duration,
    pub pending: usize,
    pub approved: usize,
    pub denied: usize,
    pub canceled: usize,
    pub overdue: usize,
}

impl JobRegistry {
    /// Pending jobs plus jobs closed within the trailing active window,
    /// newest first. Staff listing: needs bucket admin.
    pub async fn active(&self, actor: &ActorRef, bucket: &str) -> Result<Vec<Job>> {
        let state = self.state.read().await;
        let entry = self.admin_bucket(&state, actor, bucket)?;
        let cutoff = self.window_cutoff(self.config.active_window)?;
        let mut jobs: Vec<Job> = bucket_jobs(&state, entry)
            .filter(|job| {
                job.status == JobStatus::Pending
                    || job.close_date.is_some_and(|closed| closed >= cutoff)
            })
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(jobs)
    }

    /// The complement of [`active`](Self::active): non-pending jobs
    /// closed before the trailing window, newest first.
    pub async fn old(&self, actor: &ActorRef, bucket: &str) -> Result<Vec<Job>> {
        let state = self.state.read().await;
        let entry = self.admin_bucket(&state, actor, bucket)?;
        let cutoff = self.window_cutoff(self.config.active_window)?;
        let mut jobs: Vec<Job> = bucket_jobs(&state, entry)
            .filter(|job| {
                job.status.is_terminal() && job.close_date.is_some_and(|closed| closed < cutoff)
            })
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(jobs)
    }

    /// Pending jobs only, newest first.
    pub async fn pending(&self, actor: &ActorRef, bucket: &str) -> Result<Vec<Job>> {
        let state = self.state.read().await;
        let entry = self.admin_bucket(&state, actor, bucket)?;
        let mut jobs: Vec<Job> = bucket_jobs(&state, entry)
            .filter(|job| job.status == JobStatus::Pending)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(jobs)
    }

    /// Staff catch-up scan: over the buckets the actor administers,
    /// jobs submitted within the recency window that are unlinked to
    /// the actor or unread by the admin watermark. Jobs older than the
    /// window are excluded even when unread; the window bounds the scan.
    pub async fn list_new(&self, actor: &ActorRef) -> Result<Vec<Job>> {
        let state = self.state.read().await;
        let cutoff = self.window_cutoff(self.config.new_window)?;
        let mut admined: Vec<&Bucket> = state
            .buckets
            .values()
            .filter(|b| {
                self.check(actor, bucket_resource(b), Capability::See)
                    && self.check(actor, bucket_resource(b), Capability::Admin)
            })
            .collect();
        admined.sort_by(|a, b| a.key.to_lowercase().cmp(&b.key.to_lowercase()));

        let mut out = Vec::new();
        for bucket in admined {
            let mut jobs: Vec<&Job> = bucket_jobs(&state, bucket)
                .filter(|job| {
                    job.submit_date >= cutoff
                        && job.unread_for(state.link_of(job, actor), true)
                })
                .collect();
            jobs.sort_by_key(|job| job.id);
            out.extend(jobs.into_iter().cloned());
        }
        Ok(out)
    }

    /// First job the catch-up scan would show, if any.
    pub async fn next_new(&self, actor: &ActorRef) -> Result<Option<Job>> {
        Ok(self.list_new(actor).await?.into_iter().next())
    }

    /// Full job display: snapshot, cast, and the comment thread with
    /// private comments stripped for non-elevated viewers. Marks the
    /// job read for the viewer.
    pub async fn view_job(&self, actor: &ActorRef, id: JobId) -> Result<JobView> {
        let mut state = self.state.write().await;
        let job = state.job(id)?.clone();
        let bucket = state.bucket(job.bucket)?;
        let bucket_key = bucket.key.clone();
        let admin = self.is_bucket_admin(actor, bucket);
        let viewer_link = state.link_of(&job, actor);
        let participant = viewer_link.is_some_and(|link| link.role > Role::None);
        if !(admin || participant) {
            return Err(Error::denied(Capability::See, format!("job {id}")));
        }
        // Elevated view for bucket admins and the job's handlers; the
        // owner still gets the public thread only.
        let admin_view = admin || viewer_link.is_some_and(|link| link.role == Role::Handler);

        let owner = state
            .links_with_role(&job, Role::Owner)
            .first()
            .map(|link| link.actor.clone());
        let handlers: Vec<ActorRef> = state
            .links_with_role(&job, Role::Handler)
            .iter()
            .map(|link| link.actor.clone())
            .collect();
        let helpers: Vec<ActorRef> = state
            .links_with_role(&job, Role::Helper)
            .iter()
            .map(|link| link.actor.clone())
            .collect();

        let mut comments: Vec<(u64, CommentView)> = Vec::new();
        for link_id in &job.links {
            let Some(link) = state.links.get(link_id) else {
                continue;
            };
            for comment in &link.comments {
                if comment.is_private && !admin_view {
                    continue;
                }
                comments.push((
                    comment.seq,
                    CommentView {
                        author: link.actor.clone(),
                        author_role: link.role,
                        created_at: comment.created_at,
                        kind: comment.kind,
                        text: comment.text.clone(),
                        is_private: comment.is_private,
                    },
                ));
            }
        }
        comments.sort_by_key(|(seq, _)| *seq);

        // Viewing counts as reading.
        let link_id = state.ensure_link(id, actor)?;
        let now = self.now();
        if let Some(link) = state.links.get_mut(&link_id) {
            link.last_checked = Some(now);
        }

        Ok(JobView {
            job,
            bucket_key,
            owner,
            handlers,
            helpers,
            comments: comments.into_iter().map(|(_, view)| view).collect(),
            admin_view,
        })
    }

    /// Per-status and overdue counts for one visible bucket.
    pub async fn bucket_stats(&self, actor: &ActorRef, bucket: &str) -> Result<BucketStats> {
        let state = self.state.read().await;
        let id = self.locate_bucket(&state, actor, bucket)?;
        let entry = state.bucket(id)?;
        let now = self.now();
        let mut stats = BucketStats {
            key: entry.key.clone(),
            description: entry.description.clone(),
            due: entry.due,
            pending: 0,
            approved: 0,
            denied: 0,
            canceled: 0,
            overdue: 0,
        };
        for job in bucket_jobs(&state, entry) {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Approved => stats.approved += 1,
                JobStatus::Denied => stats.denied += 1,
                JobStatus::Canceled => stats.canceled += 1,
            }
            if job.is_overdue(now) {
                stats.overdue += 1;
            }
        }
        Ok(stats)
    }

    fn admin_bucket<'a>(
        &self,
        state: &'a State,
        actor: &ActorRef,
        bucket: &str,
    ) -> Result<&'a Bucket> {
        let id = self.locate_bucket(state, actor, bucket)?;
        let entry = state.bucket(id)?;
        self.require(actor, bucket_resource(entry), Capability::Admin)?;
        Ok(entry)
    }

    fn window_cutoff(&self, window: Duration) -> Result<DateTime<Utc>> {
        let window = chrono::Duration::from_std(window)
            .map_err(|_| Error::invalid("configured window out of range"))?;
        self.now()
            .checked_sub_signed(window)
            .ok_or_else(|| Error::invalid("configured window out of range"))
    }
}

fn bucket_jobs<'a>(state: &'a State, bucket: &'a Bucket) -> impl Iterator<Item = &'a Job> {
    bucket.jobs.iter().filter_map(|id| state.jobs.get(id))
}
