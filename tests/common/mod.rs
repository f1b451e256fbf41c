//! Shared test harness: a registry wired to controllable collaborators.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use uuid::Uuid;

use jobdesk::{
    ActorRef, Capability, JobRegistry, ManualClock, NotificationSink, PermissionGate,
    RegistryConfig, Resource, StaticDirectory,
};

/// Gate with explicit admin/superuser rosters. `see` and `post` are open
/// to everyone except on buckets marked hidden, which only staff see.
#[derive(Default)]
pub struct TestGate {
    admins: Mutex<HashSet<Uuid>>,
    superusers: Mutex<HashSet<Uuid>>,
    hidden_buckets: Mutex<HashSet<String>>,
}

impl TestGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn grant_admin(&self, actor: &ActorRef) {
        self.admins.lock().unwrap().insert(actor.id);
    }

    pub fn grant_superuser(&self, actor: &ActorRef) {
        self.superusers.lock().unwrap().insert(actor.id);
    }

    pub fn hide_bucket(&self, key: &str) {
        self.hidden_buckets
            .lock()
            .unwrap()
            .insert(key.to_lowercase());
    }
}

impl PermissionGate for TestGate {
    fn check(&self, actor: &ActorRef, resource: Resource<'_>, capability: Capability) -> bool {
        let staff = self.admins.lock().unwrap().contains(&actor.id)
            || self.superusers.lock().unwrap().contains(&actor.id);
        match capability {
            Capability::Superuser => self.superusers.lock().unwrap().contains(&actor.id),
            Capability::Admin => staff,
            Capability::Post => true,
            Capability::See => match resource {
                Resource::Registry => true,
                Resource::Bucket { key, .. } => {
                    staff || !self.hidden_buckets.lock().unwrap().contains(&key.to_lowercase())
                }
            },
        }
    }
}

/// Sink that records every broadcast as (target names, text).
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<(Vec<String>, String)>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<(Vec<String>, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, targets: &[ActorRef], text: &str) {
        let names = targets.iter().map(|a| a.name.clone()).collect();
        self.sent.lock().unwrap().push((names, text.to_string()));
    }
}

pub struct Harness {
    pub registry: Arc<JobRegistry>,
    pub gate: Arc<TestGate>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<RecordingSink>,
    pub directory: Arc<StaticDirectory>,
    /// Regular user; files most test jobs.
    pub alice: ActorRef,
    /// Bucket/registry admin.
    pub bree: ActorRef,
    /// Regular user; promotion target.
    pub cora: ActorRef,
    /// Superuser.
    pub root: ActorRef,
}

pub fn harness() -> Harness {
    init_tracing();
    let gate = TestGate::new();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    ));
    let sink = Arc::new(RecordingSink::default());
    let directory = Arc::new(StaticDirectory::new());

    let alice = ActorRef::new("alice");
    let bree = ActorRef::new("bree");
    let cora = ActorRef::new("cora");
    let root = ActorRef::new("root");
    for actor in [&alice, &bree, &cora, &root] {
        directory.add(actor.clone());
    }
    gate.grant_admin(&bree);
    gate.grant_superuser(&root);

    let registry = JobRegistry::new(
        gate.clone(),
        clock.clone(),
        sink.clone(),
        directory.clone(),
        RegistryConfig::default(),
    );

    Harness {
        registry,
        gate,
        clock,
        sink,
        directory,
        alice,
        bree,
        cora,
        root,
    }
}

impl Harness {
    /// Admin-created bucket with the default policy and due duration.
    pub async fn bucket(&self, name: &str) -> jobdesk::Bucket {
        self.registry
            .create_bucket(&self.bree, name, Some("test bucket"))
            .await
            .expect("create bucket")
    }

    /// Job filed by alice into `bucket`.
    pub async fn job(&self, bucket: &str) -> jobdesk::Job {
        self.registry
            .create_job(&self.alice, bucket, "Crash on load", "It crashes at startup")
            .await
            .expect("create job")
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
