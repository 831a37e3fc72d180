// src/cli/member.rs
//! Package, repository and object commands
//!
//! Changes are staged on the template and stored in one update.

use std::path::PathBuf;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum PackageCommands {
    /// Add packages (`name`, `~name` to exclude, `@group`, `name@1.0-1:x86_64`)
    Add {
        template: String,

        #[arg(required = true)]
        specs: Vec<String>,
    },

    /// Remove packages from the template
    Rm {
        template: String,

        #[arg(required = true)]
        specs: Vec<String>,
    },

    /// List the template's packages
    List {
        template: String,

        /// Only the template's own packages
        #[arg(long)]
        no_resolve: bool,
    },
}

#[derive(Subcommand)]
pub enum RepoCommands {
    /// Add a repository from a kickstart repo line
    ///
    /// Example: strata repo add web 'repo --name=updates --baseurl=http://...'
    Add {
        template: String,

        /// `repo --name=... --baseurl=...|--mirrorlist=...|--metalink=...`
        line: String,
    },

    /// Remove a repository by stub
    Rm { template: String, stub: String },

    /// List the template's repositories
    List {
        template: String,

        #[arg(long)]
        no_resolve: bool,
    },
}

#[derive(Subcommand)]
pub enum ObjectCommands {
    /// Add a configuration object
    Add {
        template: String,

        name: String,

        /// Read the object's data from this file
        #[arg(short, long, value_name = "FILE", conflicts_with = "data")]
        file: Option<PathBuf>,

        /// Inline data
        #[arg(long)]
        data: Option<String>,

        /// Action as "<type> <path>", e.g. "copy /etc/motd" (repeatable)
        #[arg(short, long = "action", value_name = "ACTION")]
        actions: Vec<String>,
    },

    /// Remove an object by name
    Rm { template: String, name: String },

    /// List the template's objects
    List {
        template: String,

        #[arg(long)]
        no_resolve: bool,
    },
}
