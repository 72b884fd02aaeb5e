#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;

use kprune_core::{PruneError, ResourceKind};
use kprune_manifest::{build_index, ManifestWarning};

fn write(dir: &Path, rel: &str, body: &str) {
    let p = dir.join(rel);
    if let Some(parent) = p.parent() { fs::create_dir_all(parent).unwrap(); }
    fs::write(p, body).unwrap();
}

const DEPLOY_API: &str = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: api\n";

#[test]
fn duplicate_declarations_collapse_to_one_name() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "a.yaml", &format!("{DEPLOY_API}---\n{DEPLOY_API}"));
    write(tmp.path(), "nested/b.yml", &format!("---\n{DEPLOY_API}"));

    let built = build_index(&[tmp.path()]).unwrap();
    let names = built.index.names(ResourceKind::Deployment).unwrap();
    assert_eq!(names.len(), 1);
    assert!(names.contains("api"));
    assert!(built.warnings.is_empty(), "{:?}", built.warnings);
}

#[test]
fn indexes_every_declarable_kind_across_roots() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    write(a.path(), "svc.yaml", "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n");
    write(a.path(), "deep/er/sts.yaml", "apiVersion: apps/v1\nkind: StatefulSet\nmetadata:\n  name: db\n");
    write(b.path(), "cron.yaml", "apiVersion: batch/v1\nkind: CronJob\nmetadata:\n  name: nightly\n");
    write(b.path(), "lr.yaml", "apiVersion: v1\nkind: LimitRange\nmetadata:\n  name: caps\n");
    write(b.path(), "ds.yaml", "apiVersion: apps/v1\nkind: DaemonSet\nmetadata:\n  name: agent\n");
    write(b.path(), "README.md", "kind: Service\nmetadata:\n  name: not-a-manifest\n");

    let built = build_index(&[a.path(), b.path()]).unwrap();
    let idx = &built.index;
    assert!(idx.contains(ResourceKind::Service, "web"));
    assert!(idx.contains(ResourceKind::StatefulSet, "db"));
    assert!(idx.contains(ResourceKind::CronJob, "nightly"));
    assert!(idx.contains(ResourceKind::LimitRange, "caps"));
    assert!(idx.contains(ResourceKind::DaemonSet, "agent"));
    assert!(!idx.contains(ResourceKind::Service, "not-a-manifest"));
    assert_eq!(idx.len(), 5);
}

#[test]
fn malformed_and_unknown_documents_are_skipped_with_warnings() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "mixed.yaml",
        "kind: Service\nmetadata:\n  name: good\n---\nkind: [broken\n---\nkind: ConfigMap\nmetadata:\n  name: cfg\n---\nmetadata:\n  name: kindless\n",
    );

    let built = build_index(&[tmp.path()]).unwrap();
    assert!(built.index.contains(ResourceKind::Service, "good"));
    assert_eq!(built.index.len(), 1);
    assert_eq!(built.warnings.len(), 3);
    assert!(matches!(&built.warnings[0], ManifestWarning::DocumentParse { doc: 2, .. }));
    assert!(matches!(&built.warnings[1], ManifestWarning::UnrecognizedKind { kind, doc: 3, .. } if kind == "ConfigMap"));
    assert!(matches!(&built.warnings[2], ManifestWarning::DocumentParse { doc: 4, message, .. } if message.contains("missing kind")));
}

#[test]
fn job_documents_are_not_indexed() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "job.yaml", "apiVersion: batch/v1\nkind: Job\nmetadata:\n  name: once\n");
    let built = build_index(&[tmp.path()]).unwrap();
    assert!(built.index.is_empty());
    assert!(matches!(&built.warnings[0], ManifestWarning::UnrecognizedKind { kind, .. } if kind == "Job"));
}

#[test]
fn single_file_root_is_accepted() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "only.yml", "kind: Service\nmetadata:\n  name: solo\n");
    let built = build_index(&[tmp.path().join("only.yml")]).unwrap();
    assert!(built.index.contains(ResourceKind::Service, "solo"));
}

#[test]
fn missing_directory_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("nope");
    let err = build_index(&[missing.as_path()]).unwrap_err();
    assert!(matches!(err, PruneError::ManifestIo { ref path, .. } if path == &missing), "{err}");
}

#[test]
fn oversized_manifest_aborts_the_build() {
    let tmp = tempfile::tempdir().unwrap();
    let padding = "# padding\n".repeat((1 << 20) / 10 + 1);
    write(tmp.path(), "big.yaml", &format!("{DEPLOY_API}{padding}"));
    write(tmp.path(), "small.yaml", "kind: Service\nmetadata:\n  name: web\n");
    let err = build_index(&[tmp.path()]).unwrap_err();
    assert!(matches!(err, PruneError::ManifestTooLarge { ref path, max, .. } if path.ends_with("big.yaml") && max == 1 << 20), "{err}");
}

#[test]
fn non_utf8_manifest_aborts_the_build() {
    let tmp = tempfile::tempdir().unwrap();
    let mut body = DEPLOY_API.as_bytes().to_vec();
    body.extend_from_slice(&[0xff, 0xfe, b'\n']);
    fs::write(tmp.path().join("bin.yaml"), body).unwrap();
    let err = build_index(&[tmp.path()]).unwrap_err();
    assert!(matches!(err, PruneError::ManifestIo { ref path, .. } if path.ends_with("bin.yaml")), "{err}");
}
