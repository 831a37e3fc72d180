// src/cli/machine.rs
//! Machine record commands

use std::path::PathBuf;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum MachineCommands {
    /// Register a machine
    Add {
        /// Machine identifier ([user:]name)
        machine: String,

        /// Template the machine follows
        #[arg(short, long)]
        template: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Change a machine's template, title or description
    Update {
        machine: String,

        /// Template the machine follows
        #[arg(short, long)]
        template: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Delete a machine record
    Rm { machine: String },

    /// Compare a machine's template with the packages on this system
    Diff { machine: String },

    /// Apply a machine's template to this system
    Sync {
        machine: String,

        /// Also remove user-installed packages the template does not list
        #[arg(long)]
        clean: bool,

        /// Show the transaction without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Directory for once-only action markers
        #[arg(long, value_name = "DIR", default_value = "/var/lib/strata/state")]
        state_dir: PathBuf,
    },

    /// List machines
    List {
        /// Only machines of this user
        #[arg(long = "owner", value_name = "USER")]
        owner: Option<String>,
    },
}
