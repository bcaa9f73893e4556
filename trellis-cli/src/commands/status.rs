//! `trellis status`: workspace projects and their builds.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use trellis_core::{store, ConfigurationStore, FileWorkspace, Workspace, MANAGED_TAG};
use trellis_sync::known_builds;

use super::open_workspace;

/// Arguments for `trellis status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, workspace: &Path) -> Result<()> {
        let ws = open_workspace(workspace)?;
        let report = build_report(&ws);
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(report);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    builds: Vec<String>,
    projects: Vec<ProjectStatus>,
    last_saved: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProjectStatus {
    name: String,
    directory: Option<String>,
    open: bool,
    managed: bool,
    build: Option<String>,
    module_path: Option<String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "project")]
    name: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "module")]
    module_path: String,
    #[tabled(rename = "directory")]
    directory: String,
}

fn build_report(ws: &FileWorkspace) -> StatusReport {
    let projects = ws.projects();
    let configs = ws.configurations();
    let builds = known_builds(projects, configs)
        .into_iter()
        .map(|root| root.root_dir.display().to_string())
        .collect();

    let rows = projects
        .projects()
        .into_iter()
        .map(|project| {
            let config = configs.read_configuration(&project);
            ProjectStatus {
                name: project.name.to_string(),
                directory: project.directory.as_ref().map(|d| d.display().to_string()),
                open: project.open,
                managed: project.has_tag(MANAGED_TAG),
                build: config
                    .as_ref()
                    .map(|c| c.root.root_dir.display().to_string()),
                module_path: config.map(|c| c.module_path),
            }
        })
        .collect();

    let saved = store::state_path_at(ws.root()).exists();
    StatusReport {
        builds,
        projects: rows,
        last_saved: saved.then(|| ws.updated_at().to_rfc3339()),
    }
}

fn print_table(report: StatusReport) {
    println!(
        "Trellis v{} | {} builds | {} projects",
        env!("CARGO_PKG_VERSION"),
        report.builds.len(),
        report.projects.len(),
    );
    if let Some(saved) = &report.last_saved {
        println!("last saved {}", saved.bright_black());
    }
    if report.projects.is_empty() {
        println!("No projects in this workspace.");
        println!("Run: trellis import <build root>");
        return;
    }
    for build in &report.builds {
        println!("{} {}", "build".bold(), build);
    }

    let rows: Vec<StatusTableRow> = report
        .projects
        .into_iter()
        .map(|project| StatusTableRow {
            state: state_label(&project),
            name: project.name,
            module_path: project.module_path.unwrap_or_else(|| "-".to_string()),
            directory: project.directory.unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn state_label(project: &ProjectStatus) -> String {
    match (project.open, project.managed) {
        (false, _) => "closed".bright_black().to_string(),
        (true, true) => "managed".green().to_string(),
        (true, false) => "unmanaged".yellow().to_string(),
    }
}
