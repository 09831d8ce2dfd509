mod common;
mod package;
mod policy;
mod report;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use std::path::PathBuf;

use crate::common::config::RepoCheckConfig;
use crate::package::DuctRunner;
use crate::policy::Mode;
use crate::policy::registry::REGISTRY;
use crate::policy::run::Reconciler;
use crate::report::Reporter;
use crate::ui::prelude::*;

/// Verify and repair package repository configuration before installation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Run mode: `check` (default) or `install`
    mode: Option<String>,

    /// Activate debug mode
    #[arg(short, long)]
    debug: bool,

    /// Emit events as JSON lines
    #[arg(long)]
    json: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Configuration file (defaults to $REPOCHECK_CONFIG or /etc/repocheck/config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the registered repository policies and exit
    #[arg(long)]
    list_policies: bool,
}

fn list_policies() {
    let keys = REGISTRY.keys();

    if matches!(get_output_format(), OutputFormat::Json) {
        let policies: Vec<serde_json::Value> = keys
            .iter()
            .filter_map(|key| REGISTRY.get(key))
            .map(|entry| {
                serde_json::json!({
                    "key": entry.key,
                    "checks": entry.checks.iter().map(|c| c.id()).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::Value::Array(policies));
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Policy", "Checks"]);
    for key in keys {
        let Some(entry) = REGISTRY.get(key) else {
            continue;
        };
        let checks: Vec<String> = entry
            .checks
            .iter()
            .map(|check| {
                if check.is_gate() {
                    format!("{} (gate)", check.describe())
                } else {
                    check.describe()
                }
            })
            .collect();
        table.add_row(vec![entry.key.to_string(), checks.join("\n")]);
    }
    println!("{table}");
}

fn run(cli: &Cli) -> Result<i32> {
    if cli.list_policies {
        list_policies();
        return Ok(0);
    }

    let Some(mode) = Mode::from_arg(cli.mode.as_deref()) else {
        anyhow::bail!(
            "unknown mode '{}' (expected 'check' or 'install')",
            cli.mode.as_deref().unwrap_or_default()
        );
    };

    let config = RepoCheckConfig::load(cli.config.as_deref()).context("loading configuration")?;
    emit(
        Level::Debug,
        "repocheck.config",
        &format!("Using configuration {:?}", config),
        None,
    );

    let mut reporter = Reporter::new(config.stage.clone(), config.report_file.clone());
    let runner = DuctRunner::new(config.command_timeout());
    let outcome = Reconciler::new(&config, mode).run(Box::new(runner), &mut reporter);
    emit(
        Level::Debug,
        "repocheck.outcome",
        &outcome.to_string(),
        Some(serde_json::json!({ "failures": reporter.records().len() })),
    );
    Ok(outcome.status().exit_code())
}

fn main() {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    ui::init(format, !cli.no_color, cli.debug);
    if cli.no_color {
        colored::control::set_override(false);
    }

    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            emit(Level::Error, "repocheck.error", &format!("Error: {:#}", e), None);
            // Invalid invocation is fatal for the caller
            std::process::exit(policy::Status::FATAL.exit_code());
        }
    }
}
