// src/cli/mod.rs
//! CLI definitions for strata
//!
//! Only argument parsing lives here; the handlers are in `commands`.
//!
//! Contexts:
//! - `template` - Create, inspect, import and apply templates
//! - `package` / `repo` / `object` - Edit the members of a template
//! - `machine` - Machine records
//! - `config` - Configuration settings

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod config;
mod machine;
mod member;
mod template;

pub use config::ConfigCommands;
pub use machine::MachineCommands;
pub use member::{ObjectCommands, PackageCommands, RepoCommands};
pub use template::{DumpFormat, TemplateCommands};

#[derive(Parser)]
#[command(name = "strata")]
#[command(version)]
#[command(about = "Compose, store and apply system templates", long_about = None)]
pub struct Cli {
    /// Configuration file to use instead of the system and user files
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Default user for identifiers without one
    #[arg(short = 'U', long, global = true, value_name = "NAME")]
    pub user: Option<String>,

    /// Template store directory
    #[arg(long, global = true, value_name = "PATH")]
    pub store: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Template management
    #[command(subcommand)]
    Template(TemplateCommands),

    /// Packages of a template
    #[command(subcommand)]
    Package(PackageCommands),

    /// Repositories of a template
    #[command(subcommand)]
    Repo(RepoCommands),

    /// Configuration objects of a template
    #[command(subcommand)]
    Object(ObjectCommands),

    /// Machine records
    #[command(subcommand)]
    Machine(MachineCommands),

    /// Configuration settings
    #[command(subcommand)]
    Config(ConfigCommands),
}
