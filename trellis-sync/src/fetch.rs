//! Obtaining build models from the external build tool.
//!
//! The tool exports each build's module tree as JSON under
//! `<root>/.buildtool/model.json`. [`FileModelFetcher`] reads those exports and
//! keeps the last tree per root in memory.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use trellis_core::{BuildRootDescriptor, ModuleNode};

use crate::error::{io_err, FetchError};
use crate::view::BuildModel;

/// Directory the build tool keeps its per-build state in.
pub const TOOL_DIR: &str = ".buildtool";
/// Model export inside [`TOOL_DIR`].
pub const MODEL_FILE: &str = "model.json";

/// Whether a fetch may use cached models, must reload, or must not block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Never contact the tool; missing entries make the fetch not ready.
    FromCacheOnly,
    LoadIfNotCached,
    ForceReload,
}

/// Result of a fetch that did not fail.
#[derive(Debug)]
pub enum FetchOutcome {
    Ready(BuildModel),
    /// Nothing cached for a cache-only fetch; the caller should skip this run.
    NotReady,
}

/// Source of build models.
pub trait ModelFetcher: Send + Sync {
    fn fetch(
        &self,
        roots: &[BuildRootDescriptor],
        strategy: FetchStrategy,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError>;
}

/// Path of the model export for the build rooted at `root_dir`.
pub fn model_path(root_dir: &Path) -> PathBuf {
    root_dir.join(TOOL_DIR).join(MODEL_FILE)
}

/// Reads exported models from disk, caching one tree per root directory.
#[derive(Debug, Default)]
pub struct FileModelFetcher {
    cache: Mutex<HashMap<PathBuf, ModuleNode>>,
}

impl FileModelFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the cached model of one root, e.g. after its project was removed.
    pub fn invalidate(&self, root_dir: &Path) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(root_dir);
        }
    }

    fn cached(&self, root_dir: &Path) -> Option<ModuleNode> {
        self.cache.lock().ok()?.get(root_dir).cloned()
    }

    fn store(&self, root_dir: &Path, tree: ModuleNode) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(root_dir.to_path_buf(), tree);
        }
    }
}

impl ModelFetcher for FileModelFetcher {
    fn fetch(
        &self,
        roots: &[BuildRootDescriptor],
        strategy: FetchStrategy,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError> {
        let mut trees = Vec::with_capacity(roots.len());
        for root in roots {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            let cached = match strategy {
                FetchStrategy::ForceReload => None,
                _ => self.cached(&root.root_dir),
            };
            let tree = match (cached, strategy) {
                (Some(tree), _) => tree,
                (None, FetchStrategy::FromCacheOnly) => {
                    tracing::debug!("no cached model for {}", root.root_dir.display());
                    return Ok(FetchOutcome::NotReady);
                }
                (None, _) => {
                    let tree = load_model(&root.root_dir)?;
                    self.store(&root.root_dir, tree.clone());
                    tree
                }
            };
            trees.push(tree);
        }
        Ok(FetchOutcome::Ready(BuildModel::from_trees(&trees)))
    }
}

/// Read and normalize the exported tree for one build.
///
/// Relative module directories are resolved against `root_dir`, build
/// directories against their module. The root node always takes `root_dir`
/// itself so modules match their root descriptor.
pub fn load_model(root_dir: &Path) -> Result<ModuleNode, FetchError> {
    let path = model_path(root_dir);
    if !path.exists() {
        return Err(FetchError::MissingModel { path });
    }
    let contents = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let mut tree: ModuleNode =
        serde_json::from_str(&contents).map_err(|source| FetchError::Json {
            path: path.clone(),
            source,
        })?;
    tracing::debug!("loaded build model from {}", path.display());
    tree.directory = normalize(root_dir);
    for child in &mut tree.children {
        resolve(child, &tree.directory);
    }
    if let Some(build_dir) = tree.build_dir.take() {
        tree.build_dir = Some(normalize(&tree.directory.join(build_dir)));
    }
    Ok(tree)
}

fn resolve(node: &mut ModuleNode, root_dir: &Path) {
    node.directory = normalize(&root_dir.join(&node.directory));
    if let Some(build_dir) = node.build_dir.take() {
        node.build_dir = Some(normalize(&node.directory.join(build_dir)));
    }
    for child in &mut node.children {
        resolve(child, root_dir);
    }
}

/// Lexically remove `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
