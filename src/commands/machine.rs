// src/commands/machine.rs
//! Machine record commands

use std::path::Path;

use anyhow::{Result, bail};
use strata::{ApplyOptions, DnfCli, Machine, Template, TemplateService};

use super::Session;
use super::template::{apply, require_root};

pub fn cmd_machine_add(
    session: &Session,
    machine: &str,
    template: Option<&str>,
    title: Option<String>,
    description: Option<String>,
) -> Result<()> {
    let mut service = session.service();
    let mut record = Machine::parse(machine, session.user())?;
    if let Some(template) = template {
        record.set_template(template)?;
        let unv = session.unv(record.template.as_deref().unwrap_or(template))?;
        service.get_template(&unv)?;
    }
    record.title = title;
    record.description = description;

    let created = service.create_machine(&record)?;
    println!("Registered machine {}", created.unv().unwrap_or_default());
    Ok(())
}

/// Retarget a machine or change its title and description
pub fn cmd_machine_update(
    session: &Session,
    machine: &str,
    template: Option<&str>,
    title: Option<String>,
    description: Option<String>,
) -> Result<()> {
    if template.is_none() && title.is_none() && description.is_none() {
        bail!("Nothing to update; give --template, --title or --description");
    }

    let mut service = session.service();
    let mut record = service.get_machine(&session.unv(machine)?)?;
    if let Some(template) = template {
        record.set_template(template)?;
        let unv = session.unv(record.template.as_deref().unwrap_or(template))?;
        service.get_template(&unv)?;
    }
    if title.is_some() {
        record.title = title;
    }
    if description.is_some() {
        record.description = description;
    }

    let updated = service.update_machine(&record)?;
    println!(
        "Updated machine {} ({})",
        updated.unv().unwrap_or_default(),
        updated.template.as_deref().unwrap_or("no template")
    );
    Ok(())
}

/// Packages the machine's template lists but this system lacks, and the
/// other way round
pub fn cmd_machine_diff(session: &Session, machine: &str) -> Result<()> {
    let service = session.service();
    let record = service.get_machine(&session.unv(machine)?)?;
    let template = record.fetch_template(&service)?;

    let mut pm = DnfCli::open()?;
    let system = Template::from_system(&mut pm, false)?;
    let (missing, extra) = template.package_diff(&system.packages_all());

    println!("In template not on system:");
    for package in missing.sorted_by_key(|p| p.name().to_string()) {
        println!("  - {}", package.name());
    }
    println!();
    println!("On system not in template:");
    for package in extra.sorted_by_key(|p| p.name().to_string()) {
        println!("  + {}", package.name());
    }
    Ok(())
}

/// Bring this system in line with the machine's template
pub fn cmd_machine_sync(
    session: &Session,
    machine: &str,
    clean: bool,
    dry_run: bool,
    state_dir: &Path,
) -> Result<()> {
    require_root(dry_run)?;
    let service = session.service();
    let record = service.get_machine(&session.unv(machine)?)?;
    let template = record.fetch_template(&service)?;
    apply(&template, ApplyOptions { clean, dry_run }, state_dir)
}

pub fn cmd_machine_rm(session: &Session, machine: &str) -> Result<()> {
    let mut service = session.service();
    let unv = session.unv(machine)?;
    service.delete_machine(&unv)?;
    println!("Removed machine {}", unv);
    Ok(())
}

pub fn cmd_machine_list(session: &Session, owner: Option<&str>) -> Result<()> {
    let service = session.service();
    let machines = service.list_machines(owner)?;
    if machines.is_empty() {
        println!("No machines found");
        return Ok(());
    }
    for machine in machines {
        println!(
            "  {:<32} {}",
            machine.unv().unwrap_or_default(),
            machine.template.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
