//! kprune reconciliation façade.
//!
//! Sequences one pass: manifests → live listing → orphan set → deletion, per
//! kind, then job retention. Frontends (the CLI) depend on this crate only.

#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use kprune_core::{except, is_restricted_namespace, KindSelector, ProtectionTable, PruneError, ResourceKind};
use kprune_kubehub::LiveState;
use kprune_manifest::DesiredIndex;
use kprune_ops::{Pruner, RetentionPolicy, RetentionReport};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use kprune_kubehub::{KubeLive, MemoryLive}; // Re-export live state implementations
pub use kprune_manifest::ManifestWarning;

/// Everything one pass needs; built by the frontend.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub namespace: String,
    pub selector: KindSelector,
    pub dry_run: bool,
    pub directories: Vec<PathBuf>,
    pub retention: RetentionPolicy,
    pub protection: ProtectionTable,
}

impl ReconcileOptions {
    /// Dry-run over all kinds with default retention and protection.
    pub fn new(namespace: impl Into<String>, directories: Vec<PathBuf>) -> Self {
        Self {
            namespace: namespace.into(),
            selector: KindSelector::All,
            dry_run: true,
            directories,
            retention: RetentionPolicy::default(),
            protection: ProtectionTable::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KindReport {
    pub kind: ResourceKind,
    pub live: usize,
    pub declared: usize,
    /// Live objects skipped because they are protected.
    pub protected: Vec<String>,
    pub candidates: Vec<String>,
    pub deleted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcileReport {
    pub namespace: String,
    pub dry_run: bool,
    pub kinds: Vec<KindReport>,
    pub jobs: Option<RetentionReport>,
    pub warnings: Vec<String>,
}

impl ReconcileReport {
    pub fn total_candidates(&self) -> usize {
        let jobs = self.jobs.as_ref().map(|j| j.plans.len() + j.pod_candidates().len()).unwrap_or(0);
        self.kinds.iter().map(|k| k.candidates.len()).sum::<usize>() + jobs
    }
}

/// Runs reconciliation passes against a live cluster.
pub struct Reconciler<'a> {
    live: &'a dyn LiveState,
}

impl<'a> Reconciler<'a> {
    pub fn new(live: &'a dyn LiveState) -> Self {
        Self { live }
    }

    /// One full pass. Kinds run strictly in order; the first fatal error stops
    /// the pass and is returned. Deletions already made are not rolled back.
    pub async fn run(&self, opts: &ReconcileOptions) -> Result<ReconcileReport, PruneError> {
        let t0 = Instant::now();
        if is_restricted_namespace(&opts.namespace) {
            return Err(PruneError::RestrictedNamespace(opts.namespace.clone()));
        }
        let kinds = opts.selector.manifest_kinds();
        info!(ns = %opts.namespace, kind = %opts.selector, dry_run = opts.dry_run, "reconcile pass start");

        let mut report = ReconcileReport {
            namespace: opts.namespace.clone(),
            dry_run: opts.dry_run,
            kinds: Vec::with_capacity(kinds.len()),
            jobs: None,
            warnings: Vec::new(),
        };

        // The index is complete before any live listing starts.
        let index = if kinds.is_empty() {
            DesiredIndex::new()
        } else {
            if opts.directories.is_empty() {
                return Err(PruneError::NoManifestDirectories(opts.selector.to_string()));
            }
            let built = kprune_manifest::build_index(&opts.directories)?;
            report.warnings = built.warnings.iter().map(|w| w.to_string()).collect();
            built.index
        };

        let pruner = Pruner::new(self.live, opts.dry_run);
        for kind in kinds {
            let kr = self.reconcile_kind(kind, &opts.namespace, &index, &opts.protection, &pruner).await?;
            report.kinds.push(kr);
        }
        if opts.selector.includes_jobs() {
            report.jobs = Some(pruner.reconcile_jobs(&opts.namespace, &opts.retention).await?);
        }

        histogram!("kprune_pass_ms", t0.elapsed().as_secs_f64() * 1000.0);
        info!(ns = %opts.namespace, candidates = report.total_candidates(), took_ms = %t0.elapsed().as_millis(), "reconcile pass done");
        Ok(report)
    }

    /// Reconcile one manifest-backed kind against `index`.
    pub async fn reconcile_kind(
        &self,
        kind: ResourceKind,
        namespace: &str,
        index: &DesiredIndex,
        protection: &ProtectionTable,
        pruner: &Pruner<'_>,
    ) -> Result<KindReport, PruneError> {
        let mut live = self.live.list(kind, namespace).await?;
        for item in live.iter_mut() {
            item.protected = protection.is_protected(kind, &item.name);
        }
        let protected: Vec<String> = live.iter().filter(|r| r.protected).map(|r| r.name.clone()).collect();
        for name in &protected {
            warn!(kind = %kind, ns = %namespace, name = %name, "protected; never deleted");
        }

        let empty = HashSet::new();
        let declared = index.names(kind).unwrap_or(&empty);
        let live_names: Vec<&str> = live.iter().map(|r| r.name.as_str()).collect();
        let candidates = except(&live_names, declared, &protection.names(kind));
        counter!("kprune_orphans_total", candidates.len() as u64, "kind" => kind.as_str());
        info!(kind = %kind, ns = %namespace, live = live.len(), declared = declared.len(), orphans = candidates.len(), "orphans computed");

        let deleted = pruner.apply(kind, namespace, &candidates).await?;
        Ok(KindReport { kind, live: live.len(), declared: declared.len(), protected, candidates, deleted })
    }
}
