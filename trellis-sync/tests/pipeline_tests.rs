use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rstest::rstest;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use trellis_core::{
    BuildRootDescriptor, ConfigurationStore, ConfigurationTable, ModuleAttributes, ModuleNode,
    ProjectName, ProjectTable, Workspace, MANAGED_TAG,
};
use trellis_sync::{
    fetch::model_path, known_builds, pipeline, FetchError, FetchOutcome, FetchStrategy,
    FileModelFetcher, ImportAndMerge, ModelFetcher, PipelineOutcome, SyncError, SyncReport,
    SyncScope,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn child(name: &str, dir: &str) -> ModuleNode {
    ModuleNode {
        name: name.to_string(),
        path: format!(":{name}"),
        directory: PathBuf::from(dir),
        build_dir: None,
        attributes: ModuleAttributes::default(),
        children: vec![],
    }
}

/// Write a model export for the build rooted at `root` with the given children.
fn export(root: &Path, name: &str, children: Vec<ModuleNode>) {
    let tree = ModuleNode {
        name: name.to_string(),
        path: ":".into(),
        directory: PathBuf::from("."),
        build_dir: None,
        attributes: ModuleAttributes::default(),
        children,
    };
    let path = model_path(root);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, serde_json::to_string_pretty(&tree).expect("json")).expect("write model");
}

fn import(root: &Path) -> SyncScope {
    SyncScope::ImportBuild {
        root: BuildRootDescriptor::new(root),
        policy: Arc::new(ImportAndMerge),
    }
}

fn applied(outcome: PipelineOutcome) -> SyncReport {
    match outcome {
        PipelineOutcome::Applied(report) => report,
        PipelineOutcome::Skipped { reason } => panic!("run skipped: {reason}"),
    }
}

struct Fixture {
    _tmp: TempDir,
    base: PathBuf,
    projects: ProjectTable,
    configs: ConfigurationTable,
    fetcher: FileModelFetcher,
}

impl Fixture {
    fn new() -> Self {
        init_logging();
        let tmp = TempDir::new().expect("tmp");
        let base = tmp.path().to_path_buf();
        Self {
            _tmp: tmp,
            base,
            projects: ProjectTable::default(),
            configs: ConfigurationTable::default(),
            fetcher: FileModelFetcher::new(),
        }
    }

    fn run(&mut self, scope: &SyncScope) -> Result<PipelineOutcome, SyncError> {
        pipeline::run(
            &mut self.projects,
            &mut self.configs,
            &self.fetcher,
            scope,
            &CancellationToken::new(),
        )
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

#[test]
fn fetcher_resolves_relative_directories() {
    let fx = Fixture::new();
    let p = fx.base.join("p");
    export(&p, "app", vec![child("lib", "lib"), child("web", "./modules/../web")]);

    let outcome = fx
        .fetcher
        .fetch(
            &[BuildRootDescriptor::new(&p)],
            FetchStrategy::LoadIfNotCached,
            &CancellationToken::new(),
        )
        .expect("fetch");

    let FetchOutcome::Ready(model) = outcome else {
        panic!("model not ready");
    };
    let dirs: Vec<_> = model.modules().iter().map(|m| m.directory.clone()).collect();
    assert_eq!(dirs, vec![p.clone(), p.join("lib"), p.join("web")]);
    assert!(model.modules().iter().all(|m| m.root_dir == p));
}

#[rstest]
#[case::cache_only(FetchStrategy::FromCacheOnly, 1)]
#[case::load_if_missing(FetchStrategy::LoadIfNotCached, 1)]
#[case::force(FetchStrategy::ForceReload, 2)]
fn fetch_strategies_honour_the_cache(#[case] strategy: FetchStrategy, #[case] expected: usize) {
    let fx = Fixture::new();
    let p = fx.base.join("p");
    let roots = [BuildRootDescriptor::new(&p)];
    let cancel = CancellationToken::new();
    export(&p, "app", vec![]);
    fx.fetcher
        .fetch(&roots, FetchStrategy::LoadIfNotCached, &cancel)
        .expect("prime cache");
    export(&p, "app", vec![child("lib", "lib")]);

    let outcome = fx.fetcher.fetch(&roots, strategy, &cancel).expect("fetch");

    // Cache-only and load-if-missing see the primed model; force sees the new one.
    let modules = match outcome {
        FetchOutcome::Ready(model) => model.modules().len(),
        FetchOutcome::NotReady => 0,
    };
    assert_eq!(modules, expected);
}

#[test]
fn cache_only_without_cache_is_not_ready() {
    let fx = Fixture::new();
    let p = fx.base.join("p");
    export(&p, "app", vec![]);

    let outcome = fx
        .fetcher
        .fetch(
            &[BuildRootDescriptor::new(&p)],
            FetchStrategy::FromCacheOnly,
            &CancellationToken::new(),
        )
        .expect("fetch");

    assert!(matches!(outcome, FetchOutcome::NotReady));
}

#[test]
fn missing_export_is_an_error() {
    let fx = Fixture::new();
    let err = fx
        .fetcher
        .fetch(
            &[BuildRootDescriptor::new(fx.base.join("nowhere"))],
            FetchStrategy::LoadIfNotCached,
            &CancellationToken::new(),
        )
        .unwrap_err();
    assert!(matches!(err, FetchError::MissingModel { .. }));
}

#[test]
fn cancelled_fetch_reports_cancellation() {
    let fx = Fixture::new();
    let p = fx.base.join("p");
    export(&p, "app", vec![]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = fx
        .fetcher
        .fetch(&[BuildRootDescriptor::new(&p)], FetchStrategy::ForceReload, &cancel)
        .unwrap_err();
    assert!(matches!(err, FetchError::Cancelled));
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[test]
fn import_then_refresh_is_idempotent() {
    let mut fx = Fixture::new();
    let p = fx.base.join("p");
    export(&p, "app", vec![child("lib", "lib")]);

    let report = applied(fx.run(&import(&p)).expect("import"));
    assert_eq!(report.imported().len(), 2);
    assert_eq!(known_builds(&fx.projects, &fx.configs).len(), 1);

    let report = applied(fx.run(&SyncScope::RefreshAll).expect("refresh"));
    assert!(report.is_noop());
}

#[test]
fn import_scope_only_imports_the_new_build() {
    let mut fx = Fixture::new();
    let p = fx.base.join("p");
    let q = fx.base.join("q");
    export(&q, "other", vec![]);
    applied(fx.run(&import(&q)).expect("import q"));

    // q grows a module, then p is imported: only p's modules come in.
    export(&q, "other", vec![child("extra", "extra")]);
    export(&p, "app", vec![child("lib", "lib")]);
    let report = applied(fx.run(&import(&p)).expect("import p"));

    let imported: Vec<_> = report.imported().into_iter().cloned().collect();
    assert_eq!(imported, vec![ProjectName::from("app"), ProjectName::from("lib")]);
    assert!(fx.projects.find_by_name(&"extra".into()).is_none());
    assert_eq!(known_builds(&fx.projects, &fx.configs).len(), 2);

    // A full refresh picks it up.
    let report = applied(fx.run(&SyncScope::RefreshAll).expect("refresh"));
    assert_eq!(report.imported(), vec![&ProjectName::from("extra")]);
}

#[test]
fn refresh_after_removal_uncouples_but_imports_nothing() {
    let mut fx = Fixture::new();
    let p = fx.base.join("p");
    export(&p, "app", vec![child("lib", "lib"), child("old", "old")]);
    applied(fx.run(&import(&p)).expect("import"));

    export(&p, "app", vec![child("lib", "lib"), child("new", "new")]);
    fx.fetcher.invalidate(&p);
    let report = applied(fx.run(&SyncScope::RefreshAfterRemoval).expect("refresh"));

    assert_eq!(report.uncoupled(), vec![&ProjectName::from("old")]);
    assert!(report.imported().is_empty());
    assert!(fx.projects.find_by_name(&"new".into()).is_none());
}

#[test]
fn refresh_project_touches_one_project() {
    let mut fx = Fixture::new();
    let p = fx.base.join("p");
    export(&p, "app", vec![child("lib", "lib")]);
    applied(fx.run(&import(&p)).expect("import"));

    let mut lib = child("lib", "lib");
    lib.attributes.tags = vec!["extra.tag".into()];
    export(&p, "app", vec![lib]);
    fx.fetcher.invalidate(&p);

    let scope = SyncScope::RefreshProject("lib".into());
    let report = applied(fx.run(&scope).expect("refresh"));
    assert!(!report.is_noop());
    let lib = fx.projects.find_by_name(&"lib".into()).expect("lib");
    assert!(lib.has_tag("extra.tag"));
    assert!(lib.has_tag(MANAGED_TAG));
    assert!(fx.configs.read_configuration(&lib).is_some());

    let again = applied(fx.run(&scope).expect("refresh again"));
    assert!(again.is_noop());
}

#[test]
fn nothing_to_refresh_is_skipped() {
    let mut fx = Fixture::new();
    let outcome = fx.run(&SyncScope::RefreshAll).expect("refresh");
    assert!(matches!(outcome, PipelineOutcome::Skipped { .. }));
}

#[test]
fn refresh_of_unmanaged_project_is_skipped() {
    let mut fx = Fixture::new();
    let dir = fx.base.join("loose");
    fx.projects
        .create_project(&"loose".into(), &dir, &Default::default())
        .expect("create");
    let outcome = fx
        .run(&SyncScope::RefreshProject("loose".into()))
        .expect("refresh");
    assert!(matches!(outcome, PipelineOutcome::Skipped { .. }));
}

#[test]
fn cancelled_run_is_reported_as_cancellation() {
    let mut fx = Fixture::new();
    let p = fx.base.join("p");
    export(&p, "app", vec![]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline::run(&mut fx.projects, &mut fx.configs, &fx.fetcher, &import(&p), &cancel)
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(fx.projects.projects().is_empty());
}
