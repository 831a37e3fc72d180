// src/main.rs

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{
    Cli, Commands, ConfigCommands, MachineCommands, ObjectCommands, PackageCommands,
    RepoCommands, TemplateCommands,
};
use commands::Session;

/// `STRATA_DEBUG=1` (or `true`) turns on debug logging like `--verbose`
fn debug_from_env() -> bool {
    std::env::var("STRATA_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose || debug_from_env() {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut session = Session::open(cli.config.as_deref(), cli.user, cli.store)?;

    match cli.command {
        Commands::Template(command) => match command {
            TemplateCommands::Add {
                template,
                title,
                description,
                includes,
                public,
            } => commands::cmd_template_add(
                &session,
                &template,
                title,
                description,
                &includes,
                public,
            ),
            TemplateCommands::Update {
                template,
                title,
                description,
                includes,
                no_includes,
                public,
                private,
            } => commands::cmd_template_update(
                &session,
                &template,
                title,
                description,
                &includes,
                no_includes,
                public,
                private,
            ),
            TemplateCommands::Rm { template } => commands::cmd_template_rm(&session, &template),
            TemplateCommands::Copy {
                source,
                destination,
            } => commands::cmd_template_copy(&session, &source, &destination),
            TemplateCommands::List {
                owner,
                name,
                public,
            } => commands::cmd_template_list(&session, owner, name, public),
            TemplateCommands::Dump {
                template,
                format,
                no_resolve,
            } => commands::cmd_template_dump(&session, &template, format.format(), no_resolve),
            TemplateCommands::Diff { template, other } => {
                commands::cmd_template_diff(&session, &template, other.as_deref())
            }
            TemplateCommands::Push {
                template,
                kickstart,
                all,
                clean,
                dry_run,
            } => commands::cmd_template_push(
                &session,
                &template,
                kickstart.as_deref(),
                all,
                clean,
                dry_run,
            ),
            TemplateCommands::Pull {
                template,
                clean,
                dry_run,
                state_dir,
            } => commands::cmd_template_pull(&session, &template, clean, dry_run, &state_dir),
            TemplateCommands::Import {
                file,
                target,
                update,
            } => commands::cmd_template_import(&session, &file, target.as_deref(), update),
        },

        Commands::Package(command) => match command {
            PackageCommands::Add { template, specs } => {
                commands::cmd_package_add(&session, &template, &specs)
            }
            PackageCommands::Rm { template, specs } => {
                commands::cmd_package_rm(&session, &template, &specs)
            }
            PackageCommands::List {
                template,
                no_resolve,
            } => commands::cmd_package_list(&session, &template, no_resolve),
        },

        Commands::Repo(command) => match command {
            RepoCommands::Add { template, line } => {
                commands::cmd_repo_add(&session, &template, &line)
            }
            RepoCommands::Rm { template, stub } => commands::cmd_repo_rm(&session, &template, &stub),
            RepoCommands::List {
                template,
                no_resolve,
            } => commands::cmd_repo_list(&session, &template, no_resolve),
        },

        Commands::Object(command) => match command {
            ObjectCommands::Add {
                template,
                name,
                file,
                data,
                actions,
            } => commands::cmd_object_add(
                &session,
                &template,
                &name,
                file.as_deref(),
                data.as_deref(),
                &actions,
            ),
            ObjectCommands::Rm { template, name } => {
                commands::cmd_object_rm(&session, &template, &name)
            }
            ObjectCommands::List {
                template,
                no_resolve,
            } => commands::cmd_object_list(&session, &template, no_resolve),
        },

        Commands::Machine(command) => match command {
            MachineCommands::Add {
                machine,
                template,
                title,
                description,
            } => commands::cmd_machine_add(
                &session,
                &machine,
                template.as_deref(),
                title,
                description,
            ),
            MachineCommands::Update {
                machine,
                template,
                title,
                description,
            } => commands::cmd_machine_update(
                &session,
                &machine,
                template.as_deref(),
                title,
                description,
            ),
            MachineCommands::Rm { machine } => commands::cmd_machine_rm(&session, &machine),
            MachineCommands::Diff { machine } => commands::cmd_machine_diff(&session, &machine),
            MachineCommands::Sync {
                machine,
                clean,
                dry_run,
                state_dir,
            } => commands::cmd_machine_sync(&session, &machine, clean, dry_run, &state_dir),
            MachineCommands::List { owner } => {
                commands::cmd_machine_list(&session, owner.as_deref())
            }
        },

        Commands::Config(command) => match command {
            ConfigCommands::Get { key } => commands::cmd_config_get(&session, &key),
            ConfigCommands::Set { key, value } => {
                commands::cmd_config_set(&mut session, &key, &value)
            }
            ConfigCommands::Unset { key } => commands::cmd_config_unset(&mut session, &key),
            ConfigCommands::List => commands::cmd_config_list(&session),
        },
    }
}
