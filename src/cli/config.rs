// src/cli/config.rs
//! Configuration commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print a setting (`section.key`)
    Get { key: String },

    /// Change a setting in the user configuration file
    Set { key: String, value: String },

    /// Remove a setting from the user configuration file
    Unset { key: String },

    /// Print every setting
    List,
}
