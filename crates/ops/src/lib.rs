//! kprune ops: imperative deletions against the live cluster.
//! Orphan deletion per kind, and finished-job retention (see [`retention`]).

#![forbid(unsafe_code)]

use std::collections::HashSet;

use kprune_core::{DeleteError, ResourceKind};
use kprune_kubehub::LiveState;
use metrics::counter;
use tracing::{error, info};

pub mod retention;

pub use retention::{RetentionPlan, RetentionPolicy, RetentionReport};

/// Applies deletions through a [`LiveState`]. With `dry_run` set, no mutating
/// call is ever issued; candidates are only reported.
pub struct Pruner<'a> {
    live: &'a dyn LiveState,
    dry_run: bool,
}

impl<'a> Pruner<'a> {
    pub fn new(live: &'a dyn LiveState, dry_run: bool) -> Self {
        Self { live, dry_run }
    }

    pub fn dry_run(&self) -> bool { self.dry_run }

    /// Delete every name in `orphans` (each at most once), stopping at the first failure.
    /// Returns the number of objects actually deleted (always 0 under dry-run).
    pub async fn apply(&self, kind: ResourceKind, namespace: &str, orphans: &[String]) -> Result<usize, DeleteError> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut deleted = 0usize;
        for name in orphans {
            if !seen.insert(name.as_str()) {
                continue;
            }
            if self.delete_one(kind, namespace, name).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Delete (or report) one object. Returns whether a delete call succeeded.
    pub(crate) async fn delete_one(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<bool, DeleteError> {
        if self.dry_run {
            info!(kind = %kind, ns = %namespace, name = %name, dry_run = true, "would delete");
            counter!("kprune_delete_total", 1u64, "kind" => kind.as_str(), "mode" => "dry_run");
            return Ok(false);
        }
        info!(kind = %kind, ns = %namespace, name = %name, "deleting");
        match self.live.delete(kind, namespace, name).await {
            Ok(()) => {
                counter!("kprune_delete_total", 1u64, "kind" => kind.as_str(), "mode" => "live");
                Ok(true)
            }
            Err(e) => {
                counter!("kprune_delete_errors_total", 1u64, "kind" => kind.as_str());
                error!(error = %e, "delete failed; aborting remaining deletions");
                Err(e)
            }
        }
    }
}
