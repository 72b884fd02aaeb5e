//! Finished-job retention: keep the newest `retain` succeeded jobs per group,
//! delete the rest together with their finished pods.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use kprune_core::{JobRecord, PodRecord, PruneError, ResourceKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Pruner;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Finished jobs kept per group.
    pub retain: usize,
    /// Job label carrying the retention group.
    pub group_label: String,
    /// Pod label carrying the owning job's name.
    pub owner_label: String,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { retain: 10, group_label: "jobgroup".into(), owner_label: "job-name".into() }
    }
}

impl RetentionPolicy {
    pub fn with_retain(retain: usize) -> Self {
        Self { retain, ..Self::default() }
    }
}

/// One job to delete and the finished pods it owns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetentionPlan {
    pub group: String,
    pub job: String,
    pub pods: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetentionReport {
    pub plans: Vec<RetentionPlan>,
    pub jobs_deleted: usize,
    pub pods_deleted: usize,
}

impl RetentionReport {
    pub fn job_candidates(&self) -> Vec<String> {
        self.plans.iter().map(|p| p.job.clone()).collect()
    }

    pub fn pod_candidates(&self) -> Vec<String> {
        self.plans.iter().flat_map(|p| p.pods.iter().cloned()).collect()
    }
}

/// Newest first. A job without a completion time sorts ahead of any completed
/// job; two such jobs compare equal and keep their listing order.
pub fn newest_first(a: &JobRecord, b: &JobRecord) -> Ordering {
    match (a.completion_time, b.completion_time) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => y.cmp(&x),
    }
}

/// Compute which jobs and pods to delete. Pure; no cluster access.
///
/// Only succeeded jobs with a non-empty group label and finished pods with a
/// non-empty owner label take part. Within each group, positions past
/// `policy.retain` are candidates, except jobs lacking a completion time.
pub fn plan(jobs: Vec<JobRecord>, pods: Vec<PodRecord>, policy: &RetentionPolicy) -> Vec<RetentionPlan> {
    let mut groups: BTreeMap<String, Vec<JobRecord>> = BTreeMap::new();
    for job in jobs {
        if !job.is_finished() {
            continue;
        }
        let Some(label) = job.group_label.clone().filter(|l| !l.is_empty()) else { continue };
        groups.entry(label).or_default().push(job);
    }

    let mut pods_by_owner: HashMap<String, Vec<String>> = HashMap::new();
    for pod in pods {
        if !pod.is_finished() || pod.owner_label.is_empty() {
            continue;
        }
        pods_by_owner.entry(pod.owner_label).or_default().push(pod.name);
    }

    let mut out = Vec::new();
    for (group, mut members) in groups {
        members.sort_by(newest_first);
        debug!(group = %group, finished = members.len(), retain = policy.retain, "retention group");
        for job in members.into_iter().skip(policy.retain) {
            if job.completion_time.is_none() {
                continue;
            }
            let pods = pods_by_owner.remove(&job.name).unwrap_or_default();
            out.push(RetentionPlan { group: group.clone(), job: job.name, pods });
        }
    }
    out
}

impl<'a> Pruner<'a> {
    /// Apply retention in `namespace`: each candidate job is deleted first,
    /// then its pods. Any list or delete failure ends the pass.
    pub async fn reconcile_jobs(&self, namespace: &str, policy: &RetentionPolicy) -> Result<RetentionReport, PruneError> {
        let jobs = self.live.list_jobs(namespace, &policy.group_label).await?;
        let pods = self.live.list_pods(namespace, &policy.owner_label).await?;
        let plans = plan(jobs, pods, policy);
        info!(ns = %namespace, candidates = plans.len(), retain = policy.retain, dry_run = self.dry_run, "job retention planned");

        let mut report = RetentionReport::default();
        for p in &plans {
            if self.delete_one(ResourceKind::Job, namespace, &p.job).await? {
                report.jobs_deleted += 1;
            }
            for pod in &p.pods {
                if self.delete_one(ResourceKind::Pod, namespace, pod).await? {
                    report.pods_deleted += 1;
                }
            }
        }
        report.plans = plans;
        Ok(report)
    }
}
