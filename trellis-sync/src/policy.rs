//! Decision policies for modules that have no workspace project yet.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use trellis_core::{ModuleDescriptor, ProjectDescriptor, Workspace, WorkspaceError, WorkspaceProject};

/// Answers the questions the engine cannot decide on its own.
pub trait NewProjectPolicy: Send + Sync {
    /// Whether a module absent from the workspace should be imported.
    fn should_import(&self, module: &ModuleDescriptor) -> bool;

    /// Whether an unmanaged descriptor already in the module directory should
    /// be discarded (`true`) or imported as-is (`false`).
    fn should_overwrite_descriptor(
        &self,
        descriptor: &ProjectDescriptor,
        module: &ModuleDescriptor,
    ) -> bool;

    /// Called once per imported project, after all model attributes were applied.
    fn after_import(
        &self,
        workspace: &mut dyn Workspace,
        project: &WorkspaceProject,
        module: &ModuleDescriptor,
    ) -> Result<(), WorkspaceError>;
}

/// Shared, cheaply clonable policy handle.
pub type SharedPolicy = Arc<dyn NewProjectPolicy>;

/// Import new modules, keeping any existing descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportAndMerge;

/// Import new modules, discarding any existing descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportAndOverwrite;

/// Never import anything that is not already in the workspace.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipNew;

impl NewProjectPolicy for ImportAndMerge {
    fn should_import(&self, _module: &ModuleDescriptor) -> bool {
        true
    }

    fn should_overwrite_descriptor(&self, _: &ProjectDescriptor, _: &ModuleDescriptor) -> bool {
        false
    }

    fn after_import(
        &self,
        _: &mut dyn Workspace,
        _: &WorkspaceProject,
        _: &ModuleDescriptor,
    ) -> Result<(), WorkspaceError> {
        Ok(())
    }
}

impl NewProjectPolicy for ImportAndOverwrite {
    fn should_import(&self, _module: &ModuleDescriptor) -> bool {
        true
    }

    fn should_overwrite_descriptor(&self, _: &ProjectDescriptor, _: &ModuleDescriptor) -> bool {
        true
    }

    fn after_import(
        &self,
        _: &mut dyn Workspace,
        _: &WorkspaceProject,
        _: &ModuleDescriptor,
    ) -> Result<(), WorkspaceError> {
        Ok(())
    }
}

impl NewProjectPolicy for SkipNew {
    fn should_import(&self, _module: &ModuleDescriptor) -> bool {
        false
    }

    fn should_overwrite_descriptor(&self, _: &ProjectDescriptor, _: &ModuleDescriptor) -> bool {
        false
    }

    fn after_import(
        &self,
        _: &mut dyn Workspace,
        _: &WorkspaceProject,
        _: &ModuleDescriptor,
    ) -> Result<(), WorkspaceError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// Forwards every decision to `inner`, then runs `hook` after each import.
pub struct Delegating<F> {
    inner: SharedPolicy,
    hook: F,
}

impl<F> Delegating<F>
where
    F: Fn(&mut dyn Workspace, &WorkspaceProject, &ModuleDescriptor) -> Result<(), WorkspaceError>
        + Send
        + Sync,
{
    pub fn new(inner: SharedPolicy, hook: F) -> Self {
        Self { inner, hook }
    }
}

impl<F> fmt::Debug for Delegating<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegating").finish_non_exhaustive()
    }
}

impl<F> NewProjectPolicy for Delegating<F>
where
    F: Fn(&mut dyn Workspace, &WorkspaceProject, &ModuleDescriptor) -> Result<(), WorkspaceError>
        + Send
        + Sync,
{
    fn should_import(&self, module: &ModuleDescriptor) -> bool {
        self.inner.should_import(module)
    }

    fn should_overwrite_descriptor(
        &self,
        descriptor: &ProjectDescriptor,
        module: &ModuleDescriptor,
    ) -> bool {
        self.inner.should_overwrite_descriptor(descriptor, module)
    }

    fn after_import(
        &self,
        workspace: &mut dyn Workspace,
        project: &WorkspaceProject,
        module: &ModuleDescriptor,
    ) -> Result<(), WorkspaceError> {
        self.inner.after_import(workspace, project, module)?;
        (self.hook)(workspace, project, module)
    }
}

/// `inner`, plus adding every imported project to `working_sets`.
pub fn with_working_sets(inner: SharedPolicy, working_sets: Vec<String>) -> SharedPolicy {
    Arc::new(Delegating::new(inner, move |workspace, project, _module| {
        workspace
            .add_to_working_sets(&project.name, &working_sets)
            .map(|_| ())
    }))
}

/// One policy for modules of the build rooted at `root_dir`, another for
/// modules pulled in from the other builds of the same run.
pub struct BuildScoped {
    root_dir: PathBuf,
    in_build: SharedPolicy,
    elsewhere: SharedPolicy,
}

impl BuildScoped {
    pub fn new(root_dir: impl Into<PathBuf>, in_build: SharedPolicy, elsewhere: SharedPolicy) -> Self {
        Self {
            root_dir: root_dir.into(),
            in_build,
            elsewhere,
        }
    }

    fn pick(&self, module: &ModuleDescriptor) -> &dyn NewProjectPolicy {
        if module.root_dir == self.root_dir {
            self.in_build.as_ref()
        } else {
            self.elsewhere.as_ref()
        }
    }
}

impl fmt::Debug for BuildScoped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildScoped")
            .field("root_dir", &self.root_dir)
            .finish_non_exhaustive()
    }
}

impl NewProjectPolicy for BuildScoped {
    fn should_import(&self, module: &ModuleDescriptor) -> bool {
        self.pick(module).should_import(module)
    }

    fn should_overwrite_descriptor(
        &self,
        descriptor: &ProjectDescriptor,
        module: &ModuleDescriptor,
    ) -> bool {
        self.pick(module).should_overwrite_descriptor(descriptor, module)
    }

    fn after_import(
        &self,
        workspace: &mut dyn Workspace,
        project: &WorkspaceProject,
        module: &ModuleDescriptor,
    ) -> Result<(), WorkspaceError> {
        self.pick(module).after_import(workspace, project, module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rstest::rstest;
    use tempfile::TempDir;
    use trellis_core::{ModuleAttributes, ProjectName, ProjectTable};

    fn module(root: &str, dir: &str) -> ModuleDescriptor {
        ModuleDescriptor {
            name: ProjectName::from("m"),
            path: ":m".into(),
            directory: PathBuf::from(dir),
            root_dir: PathBuf::from(root),
            parent: None,
            children: vec![],
            build_dir: PathBuf::from(dir).join("build"),
            attributes: ModuleAttributes::default(),
        }
    }

    fn descriptor() -> ProjectDescriptor {
        ProjectDescriptor {
            name: ProjectName::from("m"),
            tags: BTreeSet::new(),
            directory: PathBuf::from("/p/m"),
        }
    }

    #[rstest]
    #[case::merge(Arc::new(ImportAndMerge) as SharedPolicy, true, false)]
    #[case::overwrite(Arc::new(ImportAndOverwrite) as SharedPolicy, true, true)]
    #[case::skip(Arc::new(SkipNew) as SharedPolicy, false, false)]
    fn canonical_policies(
        #[case] policy: SharedPolicy,
        #[case] import: bool,
        #[case] overwrite: bool,
    ) {
        let m = module("/p", "/p/m");
        assert_eq!(policy.should_import(&m), import);
        assert_eq!(policy.should_overwrite_descriptor(&descriptor(), &m), overwrite);
    }

    #[test]
    fn build_scoped_routes_by_root() {
        let policy = BuildScoped::new("/p", Arc::new(ImportAndOverwrite), Arc::new(SkipNew));
        assert!(policy.should_import(&module("/p", "/p/m")));
        assert!(policy.should_overwrite_descriptor(&descriptor(), &module("/p", "/p/m")));
        assert!(!policy.should_import(&module("/q", "/q/m")));
    }

    #[test]
    fn delegating_runs_inner_then_hook() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let policy = Delegating::new(Arc::new(ImportAndMerge), move |_, _, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let tmp = TempDir::new().unwrap();
        let mut table = ProjectTable::default();
        let project = table
            .create_project(&"m".into(), &tmp.path().join("m"), &BTreeSet::new())
            .unwrap();
        assert!(policy.should_import(&module("/p", "/p/m")));
        policy
            .after_import(&mut table, &project, &module("/p", "/p/m"))
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn working_sets_wrapper_tags_imported_projects() {
        let tmp = TempDir::new().unwrap();
        let mut table = ProjectTable::default();
        let project = table
            .create_project(&"m".into(), &tmp.path().join("m"), &BTreeSet::new())
            .unwrap();
        let policy = with_working_sets(Arc::new(ImportAndMerge), vec!["backend".into()]);
        policy
            .after_import(&mut table, &project, &module("/p", "/p/m"))
            .unwrap();
        let project = table.find_by_name(&"m".into()).unwrap();
        assert!(project.working_sets.contains("backend"));
    }
}
