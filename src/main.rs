//! `depscope`: produce a stack or component request body for one manifest.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]).
//! 2. Load config ([`depscope::load_config`]) and apply CLI overrides.
//! 3. Build the provider for the manifest ([`depscope::create`]).
//! 4. Optionally validate the lock file.
//! 5. Write the content to stdout or `--output`, and a summary line to stderr.

mod cli;

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use cli::Cli;
use depscope::provider::manifest_dir;
use depscope::{create, load_config, Content};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let manifest = cli
        .manifest
        .canonicalize()
        .unwrap_or_else(|_| cli.manifest.clone());
    let project_dir = manifest_dir(&manifest).to_path_buf();

    let mut config = load_config(&project_dir, cli.config.as_deref())?;
    if cli.match_manifest_versions {
        config.match_manifest_versions = true;
    }

    let provider = create(&manifest, &config)?;

    if let Some(dir) = &cli.validate_lock {
        provider.validate_lock_file(dir.as_deref().unwrap_or(project_dir.as_path()))?;
    }

    let kind = if cli.component { "component" } else { "stack" };
    let spinner = (!cli.quiet).then(|| spinner(&format!("{} {} analysis", provider.ecosystem(), kind)));

    let result = if cli.component {
        provider.provide_component()
    } else {
        provider.provide_stack()
    };
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }
    let content = result?;

    write_content(&content, cli.output.as_deref())?;

    if !cli.quiet {
        eprintln!(
            "  {} {} {}: {} components ({})",
            "→".cyan(),
            provider.ecosystem(),
            kind,
            component_count(&content).to_string().bold(),
            content.content_type().dimmed()
        );
    }

    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn write_content(content: &Content, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, content.buffer())
            .with_context(|| format!("writing {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(content.buffer())?;
            writeln!(stdout)?;
            Ok(())
        }
    }
}

fn component_count(content: &Content) -> usize {
    serde_json::from_slice::<serde_json::Value>(content.buffer())
        .ok()
        .and_then(|v| v.get("components").and_then(|c| c.as_array()).map(Vec::len))
        .unwrap_or(0)
}
