//! kprune core types: resource kinds, live snapshots and job/pod records.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod diff;
mod error;
mod protect;

pub use diff::except;
pub use error::{DeleteError, ListError, ParseKindError, PruneError};
pub use protect::{is_restricted_namespace, ProtectionTable, RESTRICTED_NAMESPACES};

pub mod prelude {
    pub use super::{
        except, DeleteError, JobRecord, KindSelector, ListError, ManagedResource, PodPhase, PodRecord,
        ProtectionTable, PruneError, ResourceKind,
    };
}

/// Kubernetes kinds kprune knows how to list and delete.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Service,
    StatefulSet,
    Deployment,
    CronJob,
    LimitRange,
    DaemonSet,
    Job,
    Pod,
}

impl ResourceKind {
    /// Kinds that may appear in manifests and are reconciled against them.
    pub const DECLARABLE: [ResourceKind; 6] = [
        ResourceKind::Service,
        ResourceKind::StatefulSet,
        ResourceKind::Deployment,
        ResourceKind::CronJob,
        ResourceKind::LimitRange,
        ResourceKind::DaemonSet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Service => "Service",
            ResourceKind::StatefulSet => "StatefulSet",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::CronJob => "CronJob",
            ResourceKind::LimitRange => "LimitRange",
            ResourceKind::DaemonSet => "DaemonSet",
            ResourceKind::Job => "Job",
            ResourceKind::Pod => "Pod",
        }
    }

    pub fn is_declarable(&self) -> bool {
        Self::DECLARABLE.contains(self)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        [
            ResourceKind::Service,
            ResourceKind::StatefulSet,
            ResourceKind::Deployment,
            ResourceKind::CronJob,
            ResourceKind::LimitRange,
            ResourceKind::DaemonSet,
            ResourceKind::Job,
            ResourceKind::Pod,
        ]
        .into_iter()
        .find(|k| k.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| ParseKindError(s.to_string()))
    }
}

/// Which cleaners a run executes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum KindSelector {
    /// A single manifest-backed kind.
    One(ResourceKind),
    /// Finished-job retention only.
    Jobs,
    /// Every cleaner, in [`KindSelector::ALL_ORDER`] followed by jobs.
    #[default]
    All,
}

impl KindSelector {
    pub const ALL_ORDER: [ResourceKind; 6] = [
        ResourceKind::Deployment,
        ResourceKind::Service,
        ResourceKind::CronJob,
        ResourceKind::StatefulSet,
        ResourceKind::DaemonSet,
        ResourceKind::LimitRange,
    ];

    /// Manifest-backed kinds selected, in execution order.
    pub fn manifest_kinds(&self) -> Vec<ResourceKind> {
        match self {
            KindSelector::One(k) => vec![*k],
            KindSelector::Jobs => Vec::new(),
            KindSelector::All => Self::ALL_ORDER.to_vec(),
        }
    }

    pub fn includes_jobs(&self) -> bool {
        matches!(self, KindSelector::Jobs | KindSelector::All)
    }
}

impl fmt::Display for KindSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KindSelector::One(k) => f.write_str(k.as_str()),
            KindSelector::Jobs => f.write_str("Jobs"),
            KindSelector::All => f.write_str("All"),
        }
    }
}

impl FromStr for KindSelector {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t.eq_ignore_ascii_case("all") {
            return Ok(KindSelector::All);
        }
        if t.eq_ignore_ascii_case("jobs") {
            return Ok(KindSelector::Jobs);
        }
        match t.parse::<ResourceKind>()? {
            k if k.is_declarable() => Ok(KindSelector::One(k)),
            _ => Err(ParseKindError(t.to_string())),
        }
    }
}

/// A live object as seen in one listing. Identity is `(kind, namespace, name)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManagedResource {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
    /// Set from the protection table; protected objects are never orphans.
    pub protected: bool,
}

impl ManagedResource {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { kind, namespace: namespace.into(), name: name.into(), protected: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobRecord {
    pub name: String,
    pub namespace: String,
    /// Value of the retention group label, if any.
    pub group_label: Option<String>,
    pub completion_time: Option<DateTime<Utc>>,
    pub succeeded: bool,
}

impl JobRecord {
    /// Only succeeded jobs are reclaimed; failed ones are left for inspection.
    pub fn is_finished(&self) -> bool {
        self.succeeded
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PodPhase {
    Succeeded,
    Failed,
    Other,
}

impl PodPhase {
    pub fn from_phase(phase: Option<&str>) -> Self {
        match phase {
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            _ => PodPhase::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodRecord {
    pub name: String,
    pub namespace: String,
    /// Name of the job that owns this pod (the `job-name` label); empty when unset.
    pub owner_label: String,
    pub phase: PodPhase,
}

impl PodRecord {
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, PodPhase::Succeeded | PodPhase::Failed)
    }
}
