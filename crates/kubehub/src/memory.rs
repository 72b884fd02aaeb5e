use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use kprune_core::{DeleteError, JobRecord, ListError, ManagedResource, PodRecord, ResourceKind};

use crate::LiveState;

/// In-memory [`LiveState`] for tests and offline runs.
///
/// Deleting an object removes it, so a second pass sees the updated cluster.
/// Job and pod records are stored already labelled; the label keys passed to
/// `list_jobs`/`list_pods` are ignored.
#[derive(Default)]
pub struct MemoryLive {
    state: Mutex<MemState>,
}

#[derive(Default)]
struct MemState {
    objects: BTreeMap<(ResourceKind, String), Vec<String>>,
    jobs: Vec<JobRecord>,
    pods: Vec<PodRecord>,
    fail_list: HashSet<ResourceKind>,
    fail_delete: HashSet<(ResourceKind, String)>,
    deleted: Vec<(ResourceKind, String, String)>,
}

impl MemoryLive {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, MemState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_objects(self, kind: ResourceKind, namespace: &str, names: &[&str]) -> Self {
        self.lock()
            .objects
            .entry((kind, namespace.to_string()))
            .or_default()
            .extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_job(self, job: JobRecord) -> Self {
        self.lock().jobs.push(job);
        self
    }

    pub fn with_pod(self, pod: PodRecord) -> Self {
        self.lock().pods.push(pod);
        self
    }

    /// Make every `list` of `kind` fail.
    pub fn failing_list(self, kind: ResourceKind) -> Self {
        self.lock().fail_list.insert(kind);
        self
    }

    /// Make deleting `kind/name` fail.
    pub fn failing_delete(self, kind: ResourceKind, name: &str) -> Self {
        self.lock().fail_delete.insert((kind, name.to_string()));
        self
    }

    /// Successful delete calls, in call order.
    pub fn deleted(&self) -> Vec<(ResourceKind, String, String)> {
        self.lock().deleted.clone()
    }

    /// Names of `kind` currently present in `namespace`.
    pub fn names(&self, kind: ResourceKind, namespace: &str) -> Vec<String> {
        let st = self.lock();
        match kind {
            ResourceKind::Job => st.jobs.iter().filter(|j| j.namespace == namespace).map(|j| j.name.clone()).collect(),
            ResourceKind::Pod => st.pods.iter().filter(|p| p.namespace == namespace).map(|p| p.name.clone()).collect(),
            _ => st.objects.get(&(kind, namespace.to_string())).cloned().unwrap_or_default(),
        }
    }
}

fn list_err(kind: ResourceKind, namespace: &str) -> ListError {
    ListError { kind, namespace: namespace.to_string(), message: "injected list failure".to_string() }
}

#[async_trait::async_trait]
impl LiveState for MemoryLive {
    async fn list(&self, kind: ResourceKind, namespace: &str) -> Result<Vec<ManagedResource>, ListError> {
        if self.lock().fail_list.contains(&kind) {
            return Err(list_err(kind, namespace));
        }
        let names = self.names(kind, namespace);
        Ok(names.into_iter().map(|n| ManagedResource::new(kind, namespace, n)).collect())
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), DeleteError> {
        let mut st = self.lock();
        let err = |message: &str| DeleteError {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: message.to_string(),
        };
        if st.fail_delete.contains(&(kind, name.to_string())) {
            return Err(err("injected delete failure"));
        }
        let removed = match kind {
            ResourceKind::Job => {
                let before = st.jobs.len();
                st.jobs.retain(|j| !(j.namespace == namespace && j.name == name));
                before != st.jobs.len()
            }
            ResourceKind::Pod => {
                let before = st.pods.len();
                st.pods.retain(|p| !(p.namespace == namespace && p.name == name));
                before != st.pods.len()
            }
            _ => match st.objects.get_mut(&(kind, namespace.to_string())) {
                Some(names) => match names.iter().position(|n| n == name) {
                    Some(i) => {
                        names.remove(i);
                        true
                    }
                    None => false,
                },
                None => false,
            },
        };
        if !removed {
            return Err(err("not found"));
        }
        st.deleted.push((kind, namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn list_jobs(&self, namespace: &str, _group_label: &str) -> Result<Vec<JobRecord>, ListError> {
        let st = self.lock();
        if st.fail_list.contains(&ResourceKind::Job) {
            return Err(list_err(ResourceKind::Job, namespace));
        }
        Ok(st.jobs.iter().filter(|j| j.namespace == namespace).cloned().collect())
    }

    async fn list_pods(&self, namespace: &str, _owner_label: &str) -> Result<Vec<PodRecord>, ListError> {
        let st = self.lock();
        if st.fail_list.contains(&ResourceKind::Pod) {
            return Err(list_err(ResourceKind::Pod, namespace));
        }
        Ok(st.pods.iter().filter(|p| p.namespace == namespace).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delete_removes_and_second_delete_fails() {
        let live = MemoryLive::new().with_objects(ResourceKind::Service, "ns", &["a", "b"]);
        live.delete(ResourceKind::Service, "ns", "a").await.unwrap();
        assert_eq!(live.names(ResourceKind::Service, "ns"), vec!["b"]);
        let err = live.delete(ResourceKind::Service, "ns", "a").await.unwrap_err();
        assert_eq!(err.message, "not found");
        assert_eq!(live.deleted(), vec![(ResourceKind::Service, "ns".to_string(), "a".to_string())]);
    }

    #[tokio::test]
    async fn listing_is_scoped_by_namespace_and_kind() {
        let live = MemoryLive::new()
            .with_objects(ResourceKind::Service, "ns", &["a"])
            .with_objects(ResourceKind::Service, "other", &["z"])
            .with_objects(ResourceKind::Deployment, "ns", &["d"]);
        let items = live.list(ResourceKind::Service, "ns").await.unwrap();
        assert_eq!(items, vec![ManagedResource::new(ResourceKind::Service, "ns", "a")]);
        assert!(live.list(ResourceKind::DaemonSet, "ns").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn job_and_pod_listing_matches_delete() {
        let job = JobRecord {
            name: "j1".into(),
            namespace: "ns".into(),
            group_label: Some("g".into()),
            completion_time: None,
            succeeded: true,
        };
        let pod = PodRecord {
            name: "j1-abc".into(),
            namespace: "ns".into(),
            owner_label: "j1".into(),
            phase: kprune_core::PodPhase::Succeeded,
        };
        let live = MemoryLive::new().with_job(job).with_pod(pod);
        let jobs = live.list(ResourceKind::Job, "ns").await.unwrap();
        assert_eq!(jobs, vec![ManagedResource::new(ResourceKind::Job, "ns", "j1")]);
        assert_eq!(live.list(ResourceKind::Pod, "ns").await.unwrap().len(), 1);

        live.delete(ResourceKind::Job, "ns", "j1").await.unwrap();
        assert!(live.list(ResourceKind::Job, "ns").await.unwrap().is_empty());
        assert!(live.list_jobs("ns", "jobgroup").await.unwrap().is_empty());
        assert!(live.list(ResourceKind::Pod, "other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_failures() {
        let live = MemoryLive::new()
            .with_objects(ResourceKind::Service, "ns", &["a"])
            .failing_list(ResourceKind::Deployment)
            .failing_delete(ResourceKind::Service, "a");
        assert!(live.list(ResourceKind::Deployment, "ns").await.is_err());
        assert!(live.delete(ResourceKind::Service, "ns", "a").await.is_err());
        assert_eq!(live.names(ResourceKind::Service, "ns"), vec!["a"]);
        assert!(live.deleted().is_empty());
    }
}
