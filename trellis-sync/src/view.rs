//! Build view: a fetched build model paired with the roots that produced it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use trellis_core::{BuildRootDescriptor, ModuleDescriptor, ModuleNode, ProjectName};

/// Build output directory name used when the model does not report one.
pub const DEFAULT_BUILD_DIR: &str = "build";

/// Flatten a module tree into descriptors with explicit parent/child links.
///
/// Pre-order: every parent precedes its children. `root_dir` of each
/// descriptor is the directory of `root`.
pub fn flatten(root: &ModuleNode) -> Vec<ModuleDescriptor> {
    let mut out = Vec::new();
    let mut stack: Vec<(&ModuleNode, Option<PathBuf>)> = vec![(root, None)];
    while let Some((node, parent)) = stack.pop() {
        out.push(ModuleDescriptor {
            name: ProjectName::from(node.name.clone()),
            path: node.path.clone(),
            directory: node.directory.clone(),
            root_dir: root.directory.clone(),
            parent,
            children: node.children.iter().map(|c| c.directory.clone()).collect(),
            build_dir: node
                .build_dir
                .clone()
                .unwrap_or_else(|| node.directory.join(DEFAULT_BUILD_DIR)),
            attributes: node.attributes.clone(),
        });
        // Reverse so children come out in declaration order.
        for child in node.children.iter().rev() {
            stack.push((child, Some(node.directory.clone())));
        }
    }
    out
}

/// All modules of one fetch, at most one per directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildModel {
    modules: Vec<ModuleDescriptor>,
}

impl BuildModel {
    /// Keeps the first module seen for each directory.
    pub fn new(modules: Vec<ModuleDescriptor>) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(modules.len());
        for module in modules {
            if seen.insert(module.directory.clone()) {
                kept.push(module);
            } else {
                tracing::warn!(
                    "ignoring module '{}': directory {} already claimed",
                    module.name,
                    module.directory.display()
                );
            }
        }
        Self { modules: kept }
    }

    pub fn from_trees<'a>(roots: impl IntoIterator<Item = &'a ModuleNode>) -> Self {
        Self::new(roots.into_iter().flat_map(flatten).collect())
    }

    pub fn modules(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn find_by_dir(&self, dir: &Path) -> Option<&ModuleDescriptor> {
        self.modules.iter().find(|m| m.directory == dir)
    }

    /// Modules produced by the build rooted at `root`.
    pub fn modules_under<'a>(
        &'a self,
        root: &'a BuildRootDescriptor,
    ) -> impl Iterator<Item = &'a ModuleDescriptor> + 'a {
        self.modules.iter().filter(move |m| m.belongs_to(root))
    }
}

/// A fetched model plus the root descriptors it is being synchronized for.
#[derive(Debug, Clone)]
pub struct BuildView {
    model: BuildModel,
    roots: Vec<BuildRootDescriptor>,
}

impl BuildView {
    /// Roots denoting the same build are collapsed, first one wins.
    pub fn new(model: BuildModel, roots: impl IntoIterator<Item = BuildRootDescriptor>) -> Self {
        let mut unique: Vec<BuildRootDescriptor> = Vec::new();
        for root in roots {
            if !unique.iter().any(|r| r.same_build(&root)) {
                unique.push(root);
            }
        }
        Self {
            model,
            roots: unique,
        }
    }

    pub fn model(&self) -> &BuildModel {
        &self.model
    }

    pub fn roots(&self) -> &[BuildRootDescriptor] {
        &self.roots
    }

    pub fn has_root(&self, root: &BuildRootDescriptor) -> bool {
        self.roots.iter().any(|r| r.same_build(root))
    }

    /// The root descriptor that produced `module`, if it is being synchronized.
    pub fn root_for(&self, module: &ModuleDescriptor) -> Option<&BuildRootDescriptor> {
        self.roots.iter().find(|r| module.belongs_to(r))
    }

    /// Every module that belongs to one of the synchronized roots, parents first.
    pub fn modules(&self) -> Vec<&ModuleDescriptor> {
        self.model
            .modules()
            .iter()
            .filter(|m| self.root_for(m).is_some())
            .collect()
    }

    /// The synchronized module living in `dir`.
    pub fn module_at(&self, dir: &Path) -> Option<&ModuleDescriptor> {
        self.model
            .find_by_dir(dir)
            .filter(|m| self.root_for(m).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::ModuleAttributes;

    fn node(name: &str, dir: &str, children: Vec<ModuleNode>) -> ModuleNode {
        ModuleNode {
            name: name.to_string(),
            path: format!(":{name}"),
            directory: PathBuf::from(dir),
            build_dir: None,
            attributes: ModuleAttributes::default(),
            children,
        }
    }

    #[test]
    fn flatten_is_preorder_with_parent_links() {
        let tree = node(
            "app",
            "/p",
            vec![
                node("lib", "/p/lib", vec![node("core", "/p/lib/core", vec![])]),
                node("web", "/p/web", vec![]),
            ],
        );
        let flat = flatten(&tree);
        let names: Vec<_> = flat.iter().map(|m| m.name.0.as_str()).collect();
        assert_eq!(names, vec!["app", "lib", "core", "web"]);
        assert_eq!(flat[0].parent, None);
        assert_eq!(flat[2].parent, Some(PathBuf::from("/p/lib")));
        assert_eq!(
            flat[0].children,
            vec![PathBuf::from("/p/lib"), PathBuf::from("/p/web")]
        );
        assert!(flat.iter().all(|m| m.root_dir == PathBuf::from("/p")));
        assert_eq!(flat[3].build_dir, PathBuf::from("/p/web/build"));
    }

    #[test]
    fn model_keeps_one_module_per_directory() {
        let a = node("a", "/p", vec![]);
        let b = node("b", "/p", vec![]);
        let model = BuildModel::from_trees([&a, &b]);
        assert_eq!(model.modules().len(), 1);
        assert_eq!(model.modules()[0].name, ProjectName::from("a"));
    }

    #[test]
    fn view_only_exposes_modules_of_its_roots() {
        let p = node("app", "/p", vec![node("lib", "/p/lib", vec![])]);
        let q = node("other", "/q", vec![]);
        let model = BuildModel::from_trees([&p, &q]);
        let view = BuildView::new(
            model,
            [BuildRootDescriptor::new("/p"), BuildRootDescriptor::new("/p")],
        );
        assert_eq!(view.roots().len(), 1);
        assert_eq!(view.modules().len(), 2);
        assert!(view.module_at(Path::new("/q")).is_none());
        assert_eq!(view.model().modules_under(&view.roots()[0]).count(), 2);
    }
}
