//! Workspace state and descriptor persistence.
//!
//! # Storage layout
//!
//! ```text
//! <workspace>/
//!   .trellis/
//!     workspace.yaml          (projects, configurations, settings, mode 0600)
//! <project dir>/
//!   .trellis-project.yaml     (project descriptor)
//! ```
//!
//! Every write goes through a `.tmp` sibling followed by `rename`, so a crash
//! mid-write leaves the previous file intact.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{io_err, WorkspaceError};
use crate::types::{ProjectDescriptor, WorkspaceSettings, WorkspaceState};

/// Directory holding the workspace state, relative to the workspace root.
pub const STATE_DIR: &str = ".trellis";
/// Workspace state file name inside [`STATE_DIR`].
pub const STATE_FILE: &str = "workspace.yaml";
/// Project descriptor file name inside a project directory.
pub const DESCRIPTOR_FILE: &str = ".trellis-project.yaml";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<root>/.trellis/`
///
/// Creates the directory (mode `0700`) if it does not yet exist.
pub fn state_dir_at(root: &Path) -> Result<PathBuf, WorkspaceError> {
    let dir = root.join(STATE_DIR);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

/// `<root>/.trellis/workspace.yaml` (pure, no I/O).
pub fn state_path_at(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(STATE_FILE)
}

/// `<dir>/.trellis-project.yaml` (pure, no I/O).
pub fn descriptor_path(dir: &Path) -> PathBuf {
    dir.join(DESCRIPTOR_FILE)
}

// ---------------------------------------------------------------------------
// 2. Workspace state
// ---------------------------------------------------------------------------

/// Load the workspace state from `<root>/.trellis/workspace.yaml`.
///
/// Returns `WorkspaceError::StateNotFound` if absent,
/// `WorkspaceError::Parse` (with path) if malformed YAML.
pub fn load_state_at(root: &Path) -> Result<WorkspaceState, WorkspaceError> {
    let path = state_path_at(root);
    if !path.exists() {
        return Err(WorkspaceError::StateNotFound { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| WorkspaceError::Parse { path, source: e })
}

/// Like [`load_state_at`], but an absent file yields an empty state.
pub fn load_or_default_at(root: &Path) -> Result<WorkspaceState, WorkspaceError> {
    match load_state_at(root) {
        Err(WorkspaceError::StateNotFound { .. }) => Ok(WorkspaceState::default()),
        other => other,
    }
}

/// Atomically save the workspace state, stamping `updated_at`.
pub fn save_state_at(root: &Path, state: &mut WorkspaceState) -> Result<(), WorkspaceError> {
    state_dir_at(root)?;
    state.updated_at = Utc::now();
    let yaml = serde_yaml::to_string(state)?;
    write_atomic(&state_path_at(root), &yaml, true)
}

/// Create an empty workspace at `root` with the given settings.
///
/// Idempotent: if the state file already exists, loads and returns it unchanged.
pub fn init_at(root: &Path, settings: WorkspaceSettings) -> Result<WorkspaceState, WorkspaceError> {
    if state_path_at(root).exists() {
        return load_state_at(root);
    }
    let mut state = WorkspaceState {
        settings,
        ..WorkspaceState::default()
    };
    save_state_at(root, &mut state)?;
    Ok(state)
}

// ---------------------------------------------------------------------------
// 3. Descriptors
// ---------------------------------------------------------------------------

/// Read the descriptor in `dir`, if there is one.
pub fn read_descriptor_at(dir: &Path) -> Result<Option<ProjectDescriptor>, WorkspaceError> {
    let path = descriptor_path(dir);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let mut descriptor: ProjectDescriptor = serde_yaml::from_str(&contents)
        .map_err(|e| WorkspaceError::Parse {
            path: path.clone(),
            source: e,
        })?;
    descriptor.directory = dir.to_path_buf();
    Ok(Some(descriptor))
}

/// Write `descriptor` into its directory, creating the directory if needed.
pub fn write_descriptor(descriptor: &ProjectDescriptor) -> Result<(), WorkspaceError> {
    let dir = &descriptor.directory;
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let yaml = serde_yaml::to_string(descriptor)?;
    write_atomic(&descriptor_path(dir), &yaml, false)
}

/// Remove the descriptor in `dir`. Absent descriptors are not an error.
pub fn delete_descriptor_at(dir: &Path) -> Result<(), WorkspaceError> {
    let path = descriptor_path(dir);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(&path, err)),
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn write_atomic(path: &Path, contents: &str, private: bool) -> Result<(), WorkspaceError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{file_name}.tmp"));
    std::fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    if private {
        set_file_permissions(&tmp)?;
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), WorkspaceError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), WorkspaceError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), WorkspaceError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), WorkspaceError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
