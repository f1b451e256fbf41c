//! Role management, comments, and read tracking.

use tracing::{debug, info};

use crate::actor::ActorRef;
use crate::error::{Error, Result};
use crate::gate::Capability;
use crate::model::{ActionKind, Comment, JobId, Link, Role};

use super::{JobRegistry, State, bucket_resource};

impl JobRegistry {
    /// Guarded role transition on the (target, job) link. Bucket-admin
    /// only. When `required_prior` is given, the link's current role
    /// must match it or the call fails `Conflict`; this is what stops
    /// double promotions and demotions of absent roles. The owner link
    /// is fixed at creation and cannot be granted or reassigned here.
    pub async fn change_role(
        &self,
        actor: &ActorRef,
        job_id: JobId,
        target: &ActorRef,
        new_role: Role,
        required_prior: Option<Role>,
    ) -> Result<Link> {
        let mut state = self.state.write().await;
        let link = self.apply_role_change(&mut state, actor, job_id, target, new_role, required_prior)?;
        debug!(job = %job_id, target = %target, role = %link.role, "Role changed");
        Ok(link)
    }

    /// Appoint a handler or helper. The target must hold no role yet.
    pub async fn promote(
        &self,
        actor: &ActorRef,
        job_id: JobId,
        target: &ActorRef,
        role: Role,
    ) -> Result<Link> {
        let kind = match role {
            Role::Handler => ActionKind::AppointHandler,
            Role::Helper => ActionKind::AppointHelper,
            _ => return Err(Error::invalid("can only promote to Handler or Helper")),
        };
        let message = format!("{actor} appointed a new {role}: {target}");
        self.role_change_with_comment(actor, job_id, target, role, Some(Role::None), kind, message)
            .await
    }

    /// Remove a handler or helper. The target must currently hold the
    /// role being removed.
    pub async fn demote(
        &self,
        actor: &ActorRef,
        job_id: JobId,
        target: &ActorRef,
        role: Role,
    ) -> Result<Link> {
        let kind = match role {
            Role::Handler => ActionKind::RemoveHandler,
            Role::Helper => ActionKind::RemoveHelper,
            _ => return Err(Error::invalid("can only demote a Handler or Helper")),
        };
        let message = format!("{actor} removed a {role}: {target}");
        self.role_change_with_comment(actor, job_id, target, Role::None, Some(role), kind, message)
            .await
    }

    /// Appoint yourself as a handler.
    pub async fn claim(&self, actor: &ActorRef, job_id: JobId) -> Result<Link> {
        self.promote(actor, job_id, actor, Role::Handler).await
    }

    /// Step down as a handler.
    pub async fn unclaim(&self, actor: &ActorRef, job_id: JobId) -> Result<Link> {
        self.demote(actor, job_id, actor, Role::Handler).await
    }

    async fn role_change_with_comment(
        &self,
        actor: &ActorRef,
        job_id: JobId,
        target: &ActorRef,
        new_role: Role,
        required_prior: Option<Role>,
        kind: ActionKind,
        message: String,
    ) -> Result<Link> {
        let (link, targets, text) = {
            let mut state = self.state.write().await;
            let link = self.apply_role_change(
                &mut state,
                actor,
                job_id,
                target,
                new_role,
                required_prior,
            )?;
            let now = self.now();
            state.log_comment(now, actor, job_id, kind, Some(message.clone()))?;
            let job = state.job(job_id)?.clone();
            let (targets, text) = self.job_announcement(&state, &job, &message, false)?;
            (link, targets, text)
        };
        info!(job = %job_id, target = %target, role = %link.role, actor = %actor, "Role updated");
        self.sink.deliver(&targets, &text).await;
        Ok(link)
    }

    fn apply_role_change(
        &self,
        state: &mut State,
        actor: &ActorRef,
        job_id: JobId,
        target: &ActorRef,
        new_role: Role,
        required_prior: Option<Role>,
    ) -> Result<Link> {
        if new_role == Role::Owner {
            return Err(Error::invalid(
                "ownership is assigned at job creation and cannot be granted",
            ));
        }
        let job = state.job(job_id)?;
        let bucket = state.bucket(job.bucket)?;
        self.require(actor, bucket_resource(bucket), Capability::Admin)?;

        let link_id = state.ensure_link(job_id, target)?;
        let link = state
            .links
            .get_mut(&link_id)
            .ok_or_else(|| Error::not_found("Link", format!("#{}", link_id.0)))?;
        if link.role == Role::Owner {
            return Err(Error::conflict(format!(
                "{target} owns job {job_id}; the owner link cannot be reassigned"
            )));
        }
        match required_prior {
            Some(Role::None) if link.role != Role::None => {
                return Err(Error::conflict(format!(
                    "{target} already holds a role on job {job_id}; demote them first"
                )));
            }
            Some(prior) if link.role != prior => {
                return Err(Error::conflict(format!("{target} is not currently a {prior}")));
            }
            _ => {}
        }
        link.role = new_role;
        Ok(link.clone())
    }

    /// Post a free-text comment. Needs a non-None link or bucket admin;
    /// `StaffComment` is staff-only and the only private kind.
    pub async fn add_comment(
        &self,
        actor: &ActorRef,
        job_id: JobId,
        text: &str,
        kind: ActionKind,
        announce: bool,
    ) -> Result<Comment> {
        if !matches!(kind, ActionKind::Reply | ActionKind::StaffComment) {
            return Err(Error::invalid(
                "only Reply and StaffComment may be posted directly",
            ));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::invalid("comment text must not be empty"));
        }

        let (comment, broadcast) = {
            let mut state = self.state.write().await;
            let job = state.job(job_id)?;
            let bucket = state.bucket(job.bucket)?;
            let bucket_admin = self.is_bucket_admin(actor, bucket);
            let participant = state
                .link_of(job, actor)
                .is_some_and(|link| link.role > Role::None);
            if !(bucket_admin || participant) {
                return Err(Error::denied(Capability::Post, format!("job {job_id}")));
            }
            if kind.is_private() && !bucket_admin {
                return Err(Error::denied(
                    Capability::Admin,
                    format!("staff comment on job {job_id}"),
                ));
            }

            let now = self.now();
            let comment = state.log_comment(now, actor, job_id, kind, Some(text.to_string()))?;
            let broadcast = if announce {
                let job = state.job(job_id)?.clone();
                Some(self.job_announcement(
                    &state,
                    &job,
                    &format!("{actor} commented"),
                    comment.is_private,
                )?)
            } else {
                None
            };
            (comment, broadcast)
        };

        debug!(job = %job_id, actor = %actor, kind = ?comment.kind, private = comment.is_private, "Comment added");
        if let Some((targets, text)) = broadcast {
            self.sink.deliver(&targets, &text).await;
        }
        Ok(comment)
    }

    /// Stamp the actor's read watermark on a job, creating the link if
    /// none exists yet. Access is the caller's concern; the flows that
    /// expose this (`view_job`) check it first.
    pub async fn mark_read(&self, actor: &ActorRef, job_id: JobId) -> Result<()> {
        let mut state = self.state.write().await;
        state.job(job_id)?;
        let link_id = state.ensure_link(job_id, actor)?;
        let now = self.now();
        if let Some(link) = state.links.get_mut(&link_id) {
            link.last_checked = Some(now);
        }
        Ok(())
    }

    /// Whether a job shows as unread for this viewer. Admin viewers
    /// track `admin_update` too.
    pub async fn is_unread(&self, actor: &ActorRef, job_id: JobId) -> Result<bool> {
        let state = self.state.read().await;
        let job = state.job(job_id)?;
        let bucket = state.bucket(job.bucket)?;
        let admin = self.is_bucket_admin(actor, bucket);
        Ok(job.unread_for(state.link_of(job, actor), admin))
    }
}
