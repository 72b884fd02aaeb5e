//! kprune kubehub – live cluster access: list and delete per kind.

#![forbid(unsafe_code)]

use std::fmt::Debug;
use std::path::Path;

use anyhow::{Context, Result};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{LimitRange, Pod, Service};
use k8s_openapi::NamespaceResourceScope;
use kprune_core::{DeleteError, JobRecord, ListError, ManagedResource, PodPhase, PodRecord, ResourceKind};
use kube::{
    api::{Api, DeleteParams, ListParams},
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config, Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

mod memory;

pub use memory::MemoryLive;

/// Narrow list/delete capability over the live cluster. Implementations must
/// not retry; callers treat every error as terminal for the current kind.
#[async_trait::async_trait]
pub trait LiveState: Send + Sync {
    /// List objects of a manifest-backed kind in `namespace`.
    async fn list(&self, kind: ResourceKind, namespace: &str) -> Result<Vec<ManagedResource>, ListError>;

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), DeleteError>;

    /// List jobs, reading the retention group from `group_label`.
    async fn list_jobs(&self, namespace: &str, group_label: &str) -> Result<Vec<JobRecord>, ListError>;

    /// List pods, reading the owning job name from `owner_label`.
    async fn list_pods(&self, namespace: &str, owner_label: &str) -> Result<Vec<PodRecord>, ListError>;
}

/// Pick the namespace for a run: explicit flag, then kube context default, then `default`.
pub fn resolve_namespace(explicit: Option<&str>, context_default: Option<&str>) -> String {
    explicit
        .filter(|s| !s.is_empty())
        .or(context_default.filter(|s| !s.is_empty()))
        .unwrap_or("default")
        .to_string()
}

/// kube-rs backed [`LiveState`].
#[derive(Clone)]
pub struct KubeLive {
    client: Client,
    default_namespace: String,
}

impl KubeLive {
    /// Build a client from an explicit kubeconfig (if any) and optional context override.
    /// Without either, kube's usual inference applies (KUBECONFIG, ~/.kube/config, in-cluster).
    pub async fn connect(kubeconfig: Option<&Path>, context: Option<&str>) -> Result<Self> {
        let opts = KubeConfigOptions { context: context.map(|s| s.to_string()), ..Default::default() };
        let config = match kubeconfig {
            Some(path) => {
                let kc = Kubeconfig::read_from(path).with_context(|| format!("reading kubeconfig {}", path.display()))?;
                Config::from_custom_kubeconfig(kc, &opts).await.context("loading kubeconfig")?
            }
            None if context.is_some() => Config::from_kubeconfig(&opts).await.context("loading kubeconfig")?,
            None => Config::infer().await.context("inferring kube config")?,
        };
        let default_namespace = config.default_namespace.clone();
        let client = Client::try_from(config).context("building kube client")?;
        info!(context = ?context, default_ns = %default_namespace, "kube client ready");
        Ok(Self { client, default_namespace })
    }

    pub fn from_client(client: Client) -> Self {
        let default_namespace = client.default_namespace().to_string();
        Self { client, default_namespace }
    }

    /// Namespace configured on the selected kube context (`default` when unset).
    pub fn default_namespace(&self) -> &str { &self.default_namespace }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn list_all<K>(&self, namespace: &str) -> Result<Vec<K>, kube::Error>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let list = self.api::<K>(namespace).list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn list_names<K>(&self, namespace: &str) -> Result<Vec<String>, kube::Error>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        Ok(self.list_all::<K>(namespace).await?.iter().map(|o| o.name_any()).collect())
    }

    async fn delete_one<K>(&self, namespace: &str, name: &str) -> Result<(), kube::Error>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let _ = self.api::<K>(namespace).delete(name, &DeleteParams::default()).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl LiveState for KubeLive {
    async fn list(&self, kind: ResourceKind, namespace: &str) -> Result<Vec<ManagedResource>, ListError> {
        let res = match kind {
            ResourceKind::Service => self.list_names::<Service>(namespace).await,
            ResourceKind::StatefulSet => self.list_names::<StatefulSet>(namespace).await,
            ResourceKind::Deployment => self.list_names::<Deployment>(namespace).await,
            ResourceKind::CronJob => self.list_names::<CronJob>(namespace).await,
            ResourceKind::LimitRange => self.list_names::<LimitRange>(namespace).await,
            ResourceKind::DaemonSet => self.list_names::<DaemonSet>(namespace).await,
            ResourceKind::Job => self.list_names::<Job>(namespace).await,
            ResourceKind::Pod => self.list_names::<Pod>(namespace).await,
        };
        let names = res.map_err(|e| ListError { kind, namespace: namespace.to_string(), message: e.to_string() })?;
        debug!(kind = %kind, ns = %namespace, count = names.len(), "listed");
        Ok(names.into_iter().map(|n| ManagedResource::new(kind, namespace, n)).collect())
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), DeleteError> {
        let res = match kind {
            ResourceKind::Service => self.delete_one::<Service>(namespace, name).await,
            ResourceKind::StatefulSet => self.delete_one::<StatefulSet>(namespace, name).await,
            ResourceKind::Deployment => self.delete_one::<Deployment>(namespace, name).await,
            ResourceKind::CronJob => self.delete_one::<CronJob>(namespace, name).await,
            ResourceKind::LimitRange => self.delete_one::<LimitRange>(namespace, name).await,
            ResourceKind::DaemonSet => self.delete_one::<DaemonSet>(namespace, name).await,
            ResourceKind::Job => self.delete_one::<Job>(namespace, name).await,
            ResourceKind::Pod => self.delete_one::<Pod>(namespace, name).await,
        };
        res.map_err(|e| DeleteError {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    async fn list_jobs(&self, namespace: &str, group_label: &str) -> Result<Vec<JobRecord>, ListError> {
        let jobs = self.list_all::<Job>(namespace).await.map_err(|e| ListError {
            kind: ResourceKind::Job,
            namespace: namespace.to_string(),
            message: e.to_string(),
        })?;
        Ok(jobs.iter().map(|j| job_record(j, namespace, group_label)).collect())
    }

    async fn list_pods(&self, namespace: &str, owner_label: &str) -> Result<Vec<PodRecord>, ListError> {
        let pods = self.list_all::<Pod>(namespace).await.map_err(|e| ListError {
            kind: ResourceKind::Pod,
            namespace: namespace.to_string(),
            message: e.to_string(),
        })?;
        Ok(pods.iter().map(|p| pod_record(p, namespace, owner_label)).collect())
    }
}

fn job_record(job: &Job, namespace: &str, group_label: &str) -> JobRecord {
    let status = job.status.as_ref();
    JobRecord {
        name: job.name_any(),
        namespace: job.namespace().unwrap_or_else(|| namespace.to_string()),
        group_label: job.labels().get(group_label).filter(|v| !v.is_empty()).cloned(),
        completion_time: status.and_then(|s| s.completion_time.as_ref()).map(|t| t.0),
        succeeded: status.and_then(|s| s.succeeded).unwrap_or(0) > 0,
    }
}

fn pod_record(pod: &Pod, namespace: &str, owner_label: &str) -> PodRecord {
    PodRecord {
        name: pod.name_any(),
        namespace: pod.namespace().unwrap_or_else(|| namespace.to_string()),
        owner_label: pod.labels().get(owner_label).cloned().unwrap_or_default(),
        phase: PodPhase::from_phase(pod.status.as_ref().and_then(|s| s.phase.as_deref())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::batch::v1::JobStatus;
    use k8s_openapi::api::core::v1::PodStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use std::collections::BTreeMap;

    fn meta(name: &str, labels: &[(&str, &str)]) -> ObjectMeta {
        let labels: BTreeMap<String, String> = labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ObjectMeta { name: Some(name.into()), labels: Some(labels), ..Default::default() }
    }

    #[test]
    fn namespace_resolution_order() {
        assert_eq!(resolve_namespace(Some("team-a"), Some("ctx")), "team-a");
        assert_eq!(resolve_namespace(None, Some("ctx")), "ctx");
        assert_eq!(resolve_namespace(Some(""), Some("ctx")), "ctx");
        assert_eq!(resolve_namespace(None, None), "default");
        assert_eq!(resolve_namespace(None, Some("")), "default");
    }

    #[test]
    fn job_record_reads_group_status_and_completion() {
        let done = chrono::DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z").unwrap().with_timezone(&chrono::Utc);
        let job = Job {
            metadata: meta("backup-1", &[("jobgroup", "backup")]),
            status: Some(JobStatus { succeeded: Some(1), completion_time: Some(Time(done)), ..Default::default() }),
            ..Default::default()
        };
        let r = job_record(&job, "ns", "jobgroup");
        assert_eq!(r.name, "backup-1");
        assert_eq!(r.namespace, "ns");
        assert_eq!(r.group_label.as_deref(), Some("backup"));
        assert_eq!(r.completion_time, Some(done));
        assert!(r.succeeded);

        let running = Job { metadata: meta("r", &[("jobgroup", "")]), ..Default::default() };
        let r = job_record(&running, "ns", "jobgroup");
        assert_eq!(r.group_label, None);
        assert!(!r.succeeded);
        assert_eq!(r.completion_time, None);
    }

    #[test]
    fn pod_record_reads_owner_and_phase() {
        let pod = Pod {
            metadata: meta("backup-1-xyz", &[("job-name", "backup-1")]),
            status: Some(PodStatus { phase: Some("Failed".into()), ..Default::default() }),
            ..Default::default()
        };
        let r = pod_record(&pod, "ns", "job-name");
        assert_eq!(r.owner_label, "backup-1");
        assert_eq!(r.phase, PodPhase::Failed);
        assert!(r.is_finished());

        let bare = Pod { metadata: meta("x", &[]), ..Default::default() };
        let r = pod_record(&bare, "ns", "job-name");
        assert_eq!(r.owner_label, "");
        assert_eq!(r.phase, PodPhase::Other);
    }
}
