//! Domain types shared by the reconciliation engine and its collaborators.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Everything persisted is serializable via serde + serde_yaml, and the module
//! tree exported by the build tool is read through serde_json by the fetcher.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a workspace project.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectName(pub String);

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Build roots
// ---------------------------------------------------------------------------

/// Which build tool distribution to connect with.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum Distribution {
    /// Whatever the build itself pins (wrapper script).
    #[default]
    Wrapper,
    /// A locally installed distribution.
    Local(PathBuf),
    /// A distribution downloaded from a URI.
    Remote(String),
    /// A specific published version.
    Version(String),
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Wrapper => write!(f, "wrapper"),
            Distribution::Local(path) => write!(f, "local:{}", path.display()),
            Distribution::Remote(uri) => write!(f, "remote:{uri}"),
            Distribution::Version(version) => write!(f, "version:{version}"),
        }
    }
}

/// Identity of one build: its root directory plus connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildRootDescriptor {
    /// Absolute path to the root module directory.
    pub root_dir: PathBuf,
    #[serde(default)]
    pub distribution: Distribution,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_home: Option<PathBuf>,
    #[serde(default)]
    pub offline: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
}

impl BuildRootDescriptor {
    /// A descriptor with default connection parameters.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            distribution: Distribution::default(),
            user_home: None,
            offline: false,
            arguments: vec![],
        }
    }

    /// A descriptor whose connection parameters come from the workspace defaults.
    pub fn with_settings(root_dir: impl Into<PathBuf>, settings: &WorkspaceSettings) -> Self {
        Self {
            root_dir: root_dir.into(),
            distribution: settings.distribution.clone(),
            user_home: settings.user_home.clone(),
            offline: settings.offline,
            arguments: settings.arguments.clone(),
        }
    }

    /// Two descriptors denote the same build when their root directories match,
    /// regardless of connection parameters.
    pub fn same_build(&self, other: &BuildRootDescriptor) -> bool {
        self.root_dir == other.root_dir
    }
}

// ---------------------------------------------------------------------------
// Structural attributes
// ---------------------------------------------------------------------------

/// A build-step command attached to a project.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildCommand {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<String, String>,
}

/// A named link from inside a project to a location elsewhere on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkedResource {
    pub name: String,
    pub location: PathBuf,
}

/// A source directory, relative to the module directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceRoot {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

/// Language-level settings; their presence marks a module as typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSettings {
    pub source_level: String,
    pub target_level: String,
}

/// What a dependency entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Another module of a synchronized build.
    Project,
    /// A binary artifact.
    #[default]
    Library,
}

/// One model-supplied dependency entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEntry {
    #[serde(default)]
    pub kind: DependencyKind,
    pub path: PathBuf,
    #[serde(default)]
    pub exported: bool,
}

/// Structural attributes a module carries in the build model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ModuleAttributes {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub build_commands: Vec<BuildCommand>,
    #[serde(default)]
    pub linked_resources: Vec<LinkedResource>,
    #[serde(default)]
    pub source_roots: Vec<SourceRoot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<LanguageSettings>,
    #[serde(default)]
    pub dependencies: Vec<DependencyEntry>,
}

// ---------------------------------------------------------------------------
// Modules
// ---------------------------------------------------------------------------

/// One node of the module tree as exported by the build tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleNode {
    pub name: String,
    /// Logical module path, e.g. `:` for the root or `:lib:core`.
    pub path: String,
    pub directory: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_dir: Option<PathBuf>,
    #[serde(default)]
    pub attributes: ModuleAttributes,
    #[serde(default)]
    pub children: Vec<ModuleNode>,
}

/// A flattened module of a fetched build. Recreated on every fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: ProjectName,
    pub path: String,
    pub directory: PathBuf,
    /// Directory of the root module of the build this module belongs to.
    pub root_dir: PathBuf,
    pub parent: Option<PathBuf>,
    pub children: Vec<PathBuf>,
    pub build_dir: PathBuf,
    pub attributes: ModuleAttributes,
}

impl ModuleDescriptor {
    /// Whether this module was produced by the build rooted at `root`.
    pub fn belongs_to(&self, root: &BuildRootDescriptor) -> bool {
        self.root_dir == root.root_dir
    }
}

// ---------------------------------------------------------------------------
// Workspace projects
// ---------------------------------------------------------------------------

/// Mutable per-project state kept in line with the build model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProjectAttributes {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_resources: Vec<LinkedResource>,
    /// Sub-folders hidden from the project (nested modules, build output).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<PathBuf>,
    /// Project-relative folders marked as derived.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build_commands: Vec<BuildCommand>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_roots: Vec<SourceRoot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<LanguageSettings>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyEntry>,
    /// Tags contributed by the build model on the last run, so tags dropped
    /// from the model can be removed without touching user-added ones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub model_tags: Vec<String>,
}

/// A persistent local project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceProject {
    pub name: ProjectName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_open")]
    pub open: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Whether a descriptor file currently exists in the project directory.
    #[serde(skip)]
    pub has_descriptor: bool,
    #[serde(default)]
    pub attributes: ProjectAttributes,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub working_sets: BTreeSet<String>,
}

fn default_open() -> bool {
    true
}

impl WorkspaceProject {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Whether the project directory is exactly `dir`.
    pub fn is_at(&self, dir: &Path) -> bool {
        self.directory.as_deref() == Some(dir)
    }
}

/// A descriptor file found on disk, possibly not owned by any workspace project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    pub name: ProjectName,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Where the descriptor was found; not part of the file.
    #[serde(skip)]
    pub directory: PathBuf,
}

/// Persisted link from a workspace project to the build that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfiguration {
    pub root: BuildRootDescriptor,
    pub module_path: String,
}

/// Workspace-wide defaults for newly imported builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorkspaceSettings {
    #[serde(default)]
    pub distribution: Distribution,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_home: Option<PathBuf>,
    #[serde(default)]
    pub offline: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
    /// Refresh builds automatically when projects are removed.
    #[serde(default)]
    pub auto_sync: bool,
}

/// Everything the file workspace persists in `workspace.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceState {
    pub version: u32,
    #[serde(default)]
    pub settings: WorkspaceSettings,
    #[serde(default)]
    pub projects: Vec<WorkspaceProject>,
    /// Keyed by project directory so renames keep their configuration.
    #[serde(default)]
    pub configurations: BTreeMap<PathBuf, ProjectConfiguration>,
    pub updated_at: DateTime<Utc>,
}

impl Default for WorkspaceState {
    fn default() -> Self {
        Self {
            version: 1,
            settings: WorkspaceSettings::default(),
            projects: vec![],
            configurations: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(ProjectName::from("app").to_string(), "app");
    }

    #[test]
    fn same_build_ignores_connection_parameters() {
        let a = BuildRootDescriptor::new("/p");
        let mut b = BuildRootDescriptor::new("/p");
        b.offline = true;
        b.distribution = Distribution::Version("8.5".into());
        assert!(a.same_build(&b));
        assert_ne!(a, b);
        assert!(!a.same_build(&BuildRootDescriptor::new("/q")));
    }

    #[test]
    fn root_from_settings_copies_defaults() {
        let settings = WorkspaceSettings {
            offline: true,
            arguments: vec!["--info".into()],
            ..Default::default()
        };
        let root = BuildRootDescriptor::with_settings("/p", &settings);
        assert!(root.offline);
        assert_eq!(root.arguments, vec!["--info".to_string()]);
    }

    #[test]
    fn project_defaults_to_open_when_field_missing() {
        let project: WorkspaceProject = serde_yaml::from_str("name: app\n").expect("parse");
        assert!(project.open);
        assert!(project.tags.is_empty());
    }

    #[test]
    fn distribution_display() {
        assert_eq!(Distribution::Wrapper.to_string(), "wrapper");
        assert_eq!(Distribution::Version("8.5".into()).to_string(), "version:8.5");
    }

    #[test]
    fn state_serde_roundtrip() {
        let mut state = WorkspaceState::default();
        state.configurations.insert(
            PathBuf::from("/p/lib"),
            ProjectConfiguration {
                root: BuildRootDescriptor::new("/p"),
                module_path: ":lib".into(),
            },
        );
        let yaml = serde_yaml::to_string(&state).expect("serialize");
        let back: WorkspaceState = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back.configurations, state.configurations);
        assert_eq!(back.version, 1);
    }
}
