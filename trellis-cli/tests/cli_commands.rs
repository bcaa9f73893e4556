use std::fs;
use std::path::PathBuf;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use trellis_core::{ModuleAttributes, ModuleNode};
use trellis_sync::fetch::model_path;

struct Env {
    _tmp: TempDir,
    workspace: PathBuf,
    build: PathBuf,
}

impl Env {
    fn new() -> Self {
        let tmp = TempDir::new().expect("tmp");
        let base = fs::canonicalize(tmp.path()).expect("canonical tmp");
        let workspace = base.join("ws");
        let build = base.join("build");
        fs::create_dir_all(&workspace).expect("create workspace dir");
        fs::create_dir_all(&build).expect("create build dir");
        Self {
            _tmp: tmp,
            workspace,
            build,
        }
    }

    fn trellis(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("trellis"));
        cmd.env("TRELLIS_WORKSPACE", &self.workspace)
            .env("RUST_LOG", "warn")
            .env("NO_COLOR", "1");
        cmd
    }

    fn export(&self, children: &[&str]) {
        let tree = ModuleNode {
            name: "app".into(),
            path: ":".into(),
            directory: PathBuf::from("."),
            build_dir: None,
            attributes: ModuleAttributes::default(),
            children: children
                .iter()
                .map(|child| ModuleNode {
                    name: child.to_string(),
                    path: format!(":{child}"),
                    directory: PathBuf::from(child),
                    build_dir: None,
                    attributes: ModuleAttributes::default(),
                    children: vec![],
                })
                .collect(),
        };
        let path = model_path(&self.build);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, serde_json::to_string_pretty(&tree).expect("json")).expect("write");
    }

    fn import(&self) {
        self.trellis()
            .args(["import"])
            .arg(&self.build)
            .assert()
            .success();
    }

    fn status_json(&self) -> serde_json::Value {
        let output = self
            .trellis()
            .args(["status", "--json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&output).expect("status json")
    }
}

fn project_names(status: &serde_json::Value) -> Vec<String> {
    status["projects"]
        .as_array()
        .expect("projects array")
        .iter()
        .map(|p| p["name"].as_str().expect("name").to_string())
        .collect()
}

#[test]
fn import_brings_in_every_module() {
    let env = Env::new();
    env.export(&["lib", "web"]);

    env.trellis()
        .args(["import"])
        .arg(&env.build)
        .assert()
        .success()
        .stdout(contains("3 imported"))
        .stdout(contains("+  lib"));

    let status = env.status_json();
    assert_eq!(project_names(&status), vec!["app", "lib", "web"]);
    assert!(status["projects"]
        .as_array()
        .expect("projects")
        .iter()
        .all(|p| p["managed"] == true));
    assert_eq!(
        status["builds"][0].as_str(),
        Some(env.build.display().to_string().as_str())
    );
    assert!(env.workspace.join(".trellis").is_dir());
}

#[test]
fn refresh_after_import_changes_nothing() {
    let env = Env::new();
    env.export(&["lib"]);
    env.import();

    env.trellis()
        .arg("refresh")
        .assert()
        .success()
        .stdout(contains("0 change(s)"));
}

#[test]
fn refresh_imports_new_modules_unless_told_not_to() {
    let env = Env::new();
    env.export(&["lib"]);
    env.import();
    env.export(&["lib", "extra"]);

    env.trellis()
        .args(["refresh", "--no-import"])
        .assert()
        .success()
        .stdout(contains("0 imported"));
    assert_eq!(project_names(&env.status_json()), vec!["app", "lib"]);

    env.trellis()
        .arg("refresh")
        .assert()
        .success()
        .stdout(contains("+  extra"));
}

#[test]
fn removed_module_is_uncoupled_on_refresh() {
    let env = Env::new();
    env.export(&["lib", "old"]);
    env.import();
    env.export(&["lib"]);

    env.trellis()
        .arg("refresh")
        .assert()
        .success()
        .stdout(contains("-  old"));

    let status = env.status_json();
    let old = status["projects"]
        .as_array()
        .expect("projects")
        .iter()
        .find(|p| p["name"] == "old")
        .expect("old stays in the workspace")
        .clone();
    assert_eq!(old["managed"], false);
    assert!(old["build"].is_null());
    assert!(env.build.join("old").is_dir());
}

#[test]
fn remove_with_refresh_keeps_the_project_out() {
    let env = Env::new();
    env.export(&["lib"]);
    env.import();

    env.trellis()
        .args(["remove", "lib", "--refresh"])
        .assert()
        .success()
        .stdout(contains("removed 'lib'"))
        .stdout(contains("refresh builds after removal"));

    assert_eq!(project_names(&env.status_json()), vec!["app"]);
    assert!(env.build.join("lib").is_dir());
}

#[test]
fn refresh_project_of_unknown_name_fails() {
    let env = Env::new();
    env.trellis()
        .args(["refresh-project", "ghost"])
        .assert()
        .failure()
        .stderr(contains("no project named 'ghost'"));
}

#[test]
fn import_of_missing_root_fails() {
    let env = Env::new();
    env.trellis()
        .args(["import"])
        .arg(env.build.join("nowhere"))
        .assert()
        .failure()
        .stderr(contains("does not exist"));
}

#[test]
fn import_without_model_export_fails() {
    let env = Env::new();
    env.trellis()
        .args(["import"])
        .arg(&env.build)
        .assert()
        .failure()
        .stderr(contains("no build model exported"));
}

#[test]
fn settings_persist_between_runs() {
    let env = Env::new();
    env.trellis()
        .args([
            "settings",
            "--distribution",
            "version:8.5",
            "--auto-sync",
            "true",
            "--arg=--info",
        ])
        .assert()
        .success()
        .stdout(contains("settings updated"));

    env.trellis()
        .arg("settings")
        .assert()
        .success()
        .stdout(contains("version:8.5"))
        .stdout(contains("--info"))
        .stdout(contains("settings updated").not());
}

#[test]
fn init_creates_state_once() {
    let env = Env::new();
    env.trellis()
        .args(["init", "--distribution", "version:8.5", "--auto-sync"])
        .assert()
        .success()
        .stdout(contains("initialized workspace"))
        .stdout(contains("version:8.5"));
    assert!(env.workspace.join(".trellis/workspace.yaml").exists());

    env.trellis()
        .args(["init", "--offline"])
        .assert()
        .success()
        .stdout(contains("already exists"))
        .stdout(contains("version:8.5"));
}

#[test]
fn unknown_distribution_is_rejected() {
    let env = Env::new();
    env.trellis()
        .args(["settings", "--distribution", "nightly"])
        .assert()
        .failure()
        .stderr(contains("unknown distribution 'nightly'"));
}

#[test]
fn empty_workspace_status_suggests_import() {
    let env = Env::new();
    env.trellis()
        .arg("status")
        .assert()
        .success()
        .stdout(contains("No projects in this workspace."));
}
