//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, ValueEnum};

/// Sonata - a build tool for modular Java projects
#[derive(Parser)]
#[command(name = "sonata")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Project root directory (defaults to the current directory)
    #[arg(short = 'C', long, value_name = "DIR", env = "SONATA_DIRECTORY")]
    pub directory: Option<PathBuf>,

    /// Actions to execute, in order
    #[arg(value_enum, value_name = "ACTION")]
    pub actions: Vec<Action>,

    #[command(flatten)]
    pub build: BuildArgs,

    /// With `clean`: also remove fetched external modules
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Resolve, compile, package, document, link and test the project
    Build,
    /// Remove build output
    Clean,
    /// Print usage
    Help,
    /// Print the version
    Version,
}

#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Project name (defaults to the root directory name)
    #[arg(long, value_name = "NAME")]
    pub project_name: Option<String>,

    /// Project version, inherited by every module
    #[arg(long, value_name = "VERSION")]
    pub project_version: Option<String>,

    /// External modules to require explicitly
    #[arg(long, value_name = "MODULE", value_delimiter = ',')]
    pub project_requires: Vec<String>,

    /// Release targeted by the main code space
    #[arg(long, value_name = "N")]
    pub main_release: Option<u32>,

    /// Only run these tools
    #[arg(long, value_name = "TOOL", value_delimiter = ',')]
    pub limit_tools: Vec<String>,

    /// Never run these tools
    #[arg(long, value_name = "TOOL", value_delimiter = ',')]
    pub skip_tools: Vec<String>,

    /// Append an argument to every call of a tool
    #[arg(long, value_name = "TOOL=ARG")]
    pub tweak: Vec<String>,

    /// Map a module to the URI of its archive
    #[arg(long, value_name = "MODULE=URI")]
    pub module_location: Vec<String>,

    /// Pin a library family, e.g. junit=5.7.1
    #[arg(long, value_name = "NAME=VERSION")]
    pub library: Vec<String>,

    /// Record failing tool runs instead of aborting
    #[arg(long)]
    pub lenient: bool,

    /// Copy source files into each module archive
    #[arg(long)]
    pub jar_with_sources: bool,

    /// Never access the network
    #[arg(long)]
    pub offline: bool,
}
