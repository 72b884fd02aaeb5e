use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ParseKindError, ResourceKind};

/// Namespaces a run refuses to touch.
pub const RESTRICTED_NAMESPACES: [&str; 4] = ["kube-system", "kube-public", "kube-node-lease", "spinnaker"];

pub fn is_restricted_namespace(ns: &str) -> bool {
    RESTRICTED_NAMESPACES.contains(&ns)
}

/// Names per kind that are never deletion candidates, declared or not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtectionTable {
    entries: BTreeMap<ResourceKind, HashSet<String>>,
}

impl Default for ProtectionTable {
    /// Cluster defaults: the API service, the namespace limit range and the
    /// cert-manager CA sync job.
    fn default() -> Self {
        let mut t = Self::empty();
        t.insert(ResourceKind::Service, "kubernetes");
        t.insert(ResourceKind::LimitRange, "limits");
        t.insert(ResourceKind::CronJob, "cert-manager-webhook-ca-sync");
        t
    }
}

impl ProtectionTable {
    pub fn empty() -> Self {
        Self { entries: BTreeMap::new() }
    }

    pub fn insert(&mut self, kind: ResourceKind, name: impl Into<String>) -> bool {
        self.entries.entry(kind).or_default().insert(name.into())
    }

    pub fn with(mut self, kind: ResourceKind, name: impl Into<String>) -> Self {
        self.insert(kind, name);
        self
    }

    pub fn is_protected(&self, kind: ResourceKind, name: &str) -> bool {
        self.entries.get(&kind).map(|s| s.contains(name)).unwrap_or(false)
    }

    /// Protected names for `kind` (empty set when none).
    pub fn names(&self, kind: ResourceKind) -> HashSet<String> {
        self.entries.get(&kind).cloned().unwrap_or_default()
    }

    /// Parse a `Kind/name` override, e.g. `Service/ingress-default`.
    pub fn parse_entry(s: &str) -> Result<(ResourceKind, String), ParseKindError> {
        let (kind, name) = s.split_once('/').ok_or_else(|| ParseKindError(s.to_string()))?;
        let kind = ResourceKind::from_str(kind)?;
        if !kind.is_declarable() || name.trim().is_empty() {
            return Err(ParseKindError(s.to_string()));
        }
        Ok((kind, name.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_cluster_builtins() {
        let t = ProtectionTable::default();
        assert!(t.is_protected(ResourceKind::Service, "kubernetes"));
        assert!(t.is_protected(ResourceKind::LimitRange, "limits"));
        assert!(t.is_protected(ResourceKind::CronJob, "cert-manager-webhook-ca-sync"));
        // protection is per kind
        assert!(!t.is_protected(ResourceKind::Deployment, "kubernetes"));
        assert!(t.names(ResourceKind::DaemonSet).is_empty());
    }

    #[test]
    fn overrides_extend_table() {
        let (kind, name) = ProtectionTable::parse_entry("deployment/keep-me").unwrap();
        let t = ProtectionTable::default().with(kind, name);
        assert!(t.is_protected(ResourceKind::Deployment, "keep-me"));
        assert!(ProtectionTable::parse_entry("Deployment").is_err());
        assert!(ProtectionTable::parse_entry("Pod/x").is_err());
        assert!(ProtectionTable::parse_entry("Service/ ").is_err());
    }

    #[test]
    fn restricted_namespaces() {
        assert!(is_restricted_namespace("kube-system"));
        assert!(is_restricted_namespace("spinnaker"));
        assert!(!is_restricted_namespace("default"));
    }
}
