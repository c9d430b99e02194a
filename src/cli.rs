use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "depscope",
    about = "Build a dependency-analysis request body from a package manifest",
    version
)]
pub struct Cli {
    /// Manifest to analyse (pom.xml, build.gradle[.kts], package.json, requirements.txt, Cargo.toml)
    pub manifest: PathBuf,

    /// Component analysis: direct dependencies only (default is the full stack)
    #[arg(long)]
    pub component: bool,

    /// Check the lock file first (`--validate-lock=DIR`); defaults to the manifest's directory
    #[arg(long, value_name = "DIR", num_args = 0..=1, require_equals = true)]
    pub validate_lock: Option<Option<PathBuf>>,

    /// Config file [default: <project>/.depscope/config.toml, fallback ~/.config/depscope/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the content to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Report declared versions where the package manager resolved another one
    #[arg(long)]
    pub match_manifest_versions: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// No spinner or summary line
    #[arg(short, long)]
    pub quiet: bool,
}
