use std::path::PathBuf;

use thiserror::Error;

use crate::ResourceKind;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown kind: {0}")]
pub struct ParseKindError(pub String);

/// Listing live objects failed; the current kind cannot be reconciled.
#[derive(Debug, Error, Clone)]
#[error("failed to list {kind} in namespace {namespace}: {message}")]
pub struct ListError {
    pub kind: ResourceKind,
    pub namespace: String,
    pub message: String,
}

/// A delete call failed; the object is in an unknown state.
#[derive(Debug, Error, Clone)]
#[error("failed to delete {kind} {namespace}/{name}: {message}")]
pub struct DeleteError {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
    pub message: String,
}

/// Fatal errors for a reconciliation pass.
#[derive(Debug, Error)]
pub enum PruneError {
    #[error("cannot read manifest directory {path}: {source}")]
    ManifestIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest {path} is too large ({bytes} > {max} bytes)")]
    ManifestTooLarge { path: PathBuf, bytes: u64, max: u64 },
    #[error("namespace {0} is restricted and cannot be pruned")]
    RestrictedNamespace(String),
    #[error("no manifest directories given for {0}")]
    NoManifestDirectories(String),
    #[error(transparent)]
    List(#[from] ListError),
    #[error(transparent)]
    Delete(#[from] DeleteError),
}
