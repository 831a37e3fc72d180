// src/cli/template.rs
//! Template management commands

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Output formats for `template dump`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    Json,
    Yaml,
    Kickstart,
}

#[derive(Args, Debug, Clone, Default)]
#[group(multiple = false)]
pub struct FormatArgs {
    /// Kickstart file
    #[arg(long)]
    pub kickstart: bool,

    /// JSON document (default)
    #[arg(long)]
    pub json: bool,

    /// YAML document
    #[arg(long)]
    pub yaml: bool,
}

impl FormatArgs {
    pub fn format(&self) -> DumpFormat {
        if self.kickstart {
            DumpFormat::Kickstart
        } else if self.yaml {
            DumpFormat::Yaml
        } else {
            DumpFormat::Json
        }
    }
}

#[derive(Subcommand)]
pub enum TemplateCommands {
    /// Create a new template
    Add {
        /// Template identifier ([user:]name[@version])
        template: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        /// Template to include (repeatable, first listed wins)
        #[arg(short, long = "include", value_name = "TEMPLATE")]
        includes: Vec<String>,

        /// Make the template visible to other users
        #[arg(long)]
        public: bool,
    },

    /// Change a template's details
    Update {
        template: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        /// Replace the include list (repeatable)
        #[arg(short, long = "include", value_name = "TEMPLATE")]
        includes: Vec<String>,

        /// Remove every include
        #[arg(long, conflicts_with = "includes")]
        no_includes: bool,

        #[arg(long, conflicts_with = "private")]
        public: bool,

        #[arg(long)]
        private: bool,
    },

    /// Delete a template
    Rm { template: String },

    /// Copy a template's own members and includes to a new template
    Copy {
        source: String,
        destination: String,
    },

    /// List stored templates
    List {
        /// Only templates of this user
        #[arg(long = "owner", value_name = "USER")]
        owner: Option<String>,

        /// Only templates whose name contains this text
        #[arg(long)]
        name: Option<String>,

        /// Only public templates
        #[arg(long)]
        public: bool,
    },

    /// Print a template
    Dump {
        template: String,

        #[command(flatten)]
        format: FormatArgs,

        /// Print only the template's own members
        #[arg(long)]
        no_resolve: bool,
    },

    /// Compare a template with another template or the local system
    Diff {
        template: String,

        /// Other template (default: the local system)
        other: Option<String>,
    },

    /// Populate a template from a kickstart file or the local system
    Push {
        template: String,

        /// Kickstart file to import (default: the local system)
        #[arg(short, long, value_name = "FILE")]
        kickstart: Option<PathBuf>,

        /// Capture every installed package, not only user-installed ones
        #[arg(long, conflicts_with = "kickstart")]
        all: bool,

        /// Drop the template's current members first
        #[arg(long)]
        clean: bool,

        /// Print the result without storing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply a template to the local system
    Pull {
        template: String,

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

    /// Store a template document (JSON or YAML)
    Import {
        file: PathBuf,

        /// Store under this identifier instead of the document's
        #[arg(long = "as", value_name = "TEMPLATE")]
        target: Option<String>,

        /// Replace an existing template
        #[arg(long)]
        update: bool,
    },
}
