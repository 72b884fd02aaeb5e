//! kprune manifest: build the desired-state index from directories of YAML manifests.
//!
//! Only a minimal envelope (`kind`, `metadata.name`, `metadata.namespace`) is
//! decoded from each document. Problems with a single document are collected
//! as [`ManifestWarning`]s. A directory or file that cannot be read in full
//! aborts the build, since its declarations would otherwise go missing.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use kprune_core::{PruneError, ResourceKind};
use metrics::counter;
use serde::Deserialize;
use tracing::{debug, info, warn};

fn max_yaml_bytes() -> u64 {
    std::env::var("KPRUNE_MAX_YAML_BYTES")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(1 << 20) // 1 MiB
}

/// Declared names per kind. Set semantics: declaring a name twice is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredIndex {
    by_kind: BTreeMap<ResourceKind, HashSet<String>>,
}

impl DesiredIndex {
    pub fn new() -> Self { Self::default() }

    /// Returns true when the name was not yet declared for `kind`.
    pub fn insert(&mut self, kind: ResourceKind, name: impl Into<String>) -> bool {
        self.by_kind.entry(kind).or_default().insert(name.into())
    }

    pub fn names(&self, kind: ResourceKind) -> Option<&HashSet<String>> {
        self.by_kind.get(&kind)
    }

    pub fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        self.names(kind).map(|s| s.contains(name)).unwrap_or(false)
    }

    /// Total declared (kind, name) pairs.
    pub fn len(&self) -> usize {
        self.by_kind.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Recoverable problems found while indexing; the offending document is skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestWarning {
    #[error("{path} (document {doc}): {message}")]
    DocumentParse { path: PathBuf, doc: usize, message: String },
    #[error("{path} (document {doc}): skipping unsupported kind {kind}")]
    UnrecognizedKind { path: PathBuf, doc: usize, kind: String },
}

#[derive(Debug, Clone, Default)]
pub struct IndexBuild {
    pub index: DesiredIndex,
    pub warnings: Vec<ManifestWarning>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    kind: Option<String>,
    metadata: Option<EnvelopeMeta>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeMeta {
    name: Option<String>,
    namespace: Option<String>,
}

/// A decoded document header.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Declared {
    kind: String,
    name: String,
    namespace: Option<String>,
}

/// Walk every root, parse `.yaml`/`.yml` files and index declared names by kind.
pub fn build_index<P: AsRef<Path>>(directories: &[P]) -> Result<IndexBuild, PruneError> {
    let mut out = IndexBuild::default();
    let max = max_yaml_bytes();
    for root in directories {
        let root = root.as_ref();
        let files = collect_manifest_files(root)?;
        info!(dir = %root.display(), files = files.len(), "scanning manifests");
        for path in files {
            index_file(&path, max, &mut out)?;
        }
    }
    for w in &out.warnings {
        warn!(warning = %w, "manifest skipped");
    }
    info!(declared = out.index.len(), warnings = out.warnings.len(), "desired index built");
    Ok(out)
}

fn index_file(path: &Path, max: u64, out: &mut IndexBuild) -> Result<(), PruneError> {
    let io_err = |source: std::io::Error| PruneError::ManifestIo { path: path.to_path_buf(), source };
    let size = std::fs::metadata(path).map_err(io_err)?.len();
    if size > max {
        return Err(PruneError::ManifestTooLarge { path: path.to_path_buf(), bytes: size, max });
    }
    // non-UTF-8 content surfaces here as InvalidData
    let content = std::fs::read_to_string(path).map_err(io_err)?;
    for (i, doc) in split_documents(&content).iter().enumerate() {
        let doc_no = i + 1;
        counter!("kprune_manifest_documents_total", 1u64);
        let declared = match parse_envelope(doc) {
            Ok(Some(d)) => d,
            Ok(None) => continue, // comment-only segment
            Err(message) => {
                out.warnings.push(ManifestWarning::DocumentParse { path: path.to_path_buf(), doc: doc_no, message });
                continue;
            }
        };
        match declared.kind.parse::<ResourceKind>() {
            Ok(kind) if kind.is_declarable() => {
                debug!(file = %path.display(), kind = %kind, name = %declared.name, ns = ?declared.namespace, "declared");
                out.index.insert(kind, declared.name);
            }
            _ => out.warnings.push(ManifestWarning::UnrecognizedKind {
                path: path.to_path_buf(),
                doc: doc_no,
                kind: declared.kind,
            }),
        }
    }
    Ok(())
}

/// Recursively collect manifest files under `root`. A root that is itself a
/// manifest file is accepted as-is.
fn collect_manifest_files(root: &Path) -> Result<Vec<PathBuf>, PruneError> {
    let io_err = |path: &Path, source| PruneError::ManifestIo { path: path.to_path_buf(), source };
    let meta = std::fs::metadata(root).map_err(|e| io_err(root, e))?;
    if meta.is_file() {
        return Ok(if is_manifest(root) { vec![root.to_path_buf()] } else { Vec::new() });
    }
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = std::fs::read_dir(&current).map_err(|e| io_err(&current, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&current, e))?;
            let path = entry.path();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                stack.push(path);
            } else if path.is_file() && is_manifest(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn is_manifest(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml"))
}

/// Split a multi-document YAML stream on `---` separator and `...` end lines.
/// Blank segments are dropped; comment-only segments are left to the parser.
fn split_documents(content: &str) -> Vec<String> {
    let mut docs = Vec::new();
    let mut cur = String::new();
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("---") {
            let rest_trim = rest.trim_start();
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                docs.push(std::mem::take(&mut cur));
                // `--- {inline: doc}` starts the next document on the same line
                if !rest_trim.is_empty() && !rest_trim.starts_with('#') {
                    cur.push_str(rest_trim);
                    cur.push('\n');
                }
                continue;
            }
        }
        if line.trim_end() == "..." {
            docs.push(std::mem::take(&mut cur));
            continue;
        }
        cur.push_str(line);
        cur.push('\n');
    }
    docs.push(cur);
    docs.into_iter().filter(|d| !d.trim().is_empty()).collect()
}

/// Decode the envelope of one document. `Ok(None)` means the document has no content.
fn parse_envelope(doc: &str) -> Result<Option<Declared>, String> {
    let val: serde_yaml::Value = serde_yaml::from_str(doc).map_err(|e| format!("invalid YAML: {}", e))?;
    if val.is_null() {
        return Ok(None);
    }
    if !val.is_mapping() {
        return Err("document is not a mapping".to_string());
    }
    let env: Envelope = serde_yaml::from_value(val).map_err(|e| format!("invalid envelope: {}", e))?;
    let kind = env.kind.filter(|k| !k.is_empty()).ok_or_else(|| "missing kind".to_string())?;
    let meta = env.metadata.ok_or_else(|| "missing metadata.name".to_string())?;
    let name = meta.name.filter(|n| !n.is_empty()).ok_or_else(|| "missing metadata.name".to_string())?;
    Ok(Some(Declared { kind, name, namespace: meta.namespace }))
}
