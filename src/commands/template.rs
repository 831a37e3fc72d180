// src/commands/template.rs
//! Template management commands

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use strata::kickstart::Kickstart;
use strata::{
    ApplyOptions, DnfCli, Error, LocalRunner, PackageManager, Template, TemplateQuery,
    TemplateService,
};
use tracing::{info, warn};

use super::Session;
use crate::cli::DumpFormat;

fn label(template: &Template) -> String {
    template.unv().unwrap_or_else(|| "(unnamed)".to_string())
}

/// Create a new template
pub fn cmd_template_add(
    session: &Session,
    template: &str,
    title: Option<String>,
    description: Option<String>,
    includes: &[String],
    public: bool,
) -> Result<()> {
    let mut service = session.service();
    let mut new = Template::parse(template, session.user())?;
    new.set_title(title);
    new.set_description(description);
    new.set_public(public);
    new.set_includes(includes);
    new.resolve_includes(&service)
        .context("Unable to resolve the template's includes")?;

    let created = service.create_template(&new)?;
    println!("Created template {}", label(&created));
    Ok(())
}

/// Change a template's details
#[allow(clippy::too_many_arguments)]
pub fn cmd_template_update(
    session: &Session,
    template: &str,
    title: Option<String>,
    description: Option<String>,
    includes: &[String],
    no_includes: bool,
    public: bool,
    private: bool,
) -> Result<()> {
    let mut service = session.service();
    let mut current = session.load_template(&service, template, false)?;

    if title.is_some() {
        current.set_title(title);
    }
    if description.is_some() {
        current.set_description(description);
    }
    if no_includes {
        current.set_includes(std::iter::empty::<String>());
    } else if !includes.is_empty() {
        current.set_includes(includes);
        current
            .resolve_includes(&service)
            .context("Unable to resolve the template's includes")?;
    }
    if public {
        current.set_public(true);
    } else if private {
        current.set_public(false);
    }

    let updated = service.update_template(&current)?;
    println!("Updated template {}", label(&updated));
    Ok(())
}

/// Delete a template
pub fn cmd_template_rm(session: &Session, template: &str) -> Result<()> {
    let mut service = session.service();
    let unv = session.unv(template)?;
    service.delete_template(&unv)?;
    println!("Removed template {}", unv);
    Ok(())
}

/// Copy a template's own members, includes and details to a new template
pub fn cmd_template_copy(session: &Session, source: &str, destination: &str) -> Result<()> {
    let mut service = session.service();
    let original = session.load_template(&service, source, false)?;

    let mut copy = Template::parse(destination, session.user())?;
    copy.union(&original);
    for (key, value) in original.meta() {
        if key != "public" {
            copy.meta_mut().insert(key.clone(), value.clone());
        }
    }
    copy.set_includes(original.includes());

    let created = service.create_template(&copy)?;
    println!("Copied {} to {}", label(&original), label(&created));
    Ok(())
}

/// List stored templates
pub fn cmd_template_list(
    session: &Session,
    owner: Option<String>,
    name: Option<String>,
    public: bool,
) -> Result<()> {
    let service = session.service();
    let query = TemplateQuery {
        user: owner,
        name,
        public_only: public,
    };
    let templates = service.list_templates(&query)?;

    if templates.is_empty() {
        println!("No templates found");
        return Ok(());
    }
    for summary in templates {
        let marker = if summary.public { "[public]" } else { "" };
        println!(
            "  {:<32} {:<8} {}",
            summary.unv,
            marker,
            summary.title.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// Print a template as JSON, YAML or kickstart
pub fn cmd_template_dump(
    session: &Session,
    template: &str,
    format: DumpFormat,
    no_resolve: bool,
) -> Result<()> {
    let service = session.service();
    let resolved = !no_resolve;
    let loaded = session.load_template(&service, template, resolved)?;

    let text = match format {
        DumpFormat::Json => loaded.to_json(resolved)? + "\n",
        DumpFormat::Yaml => loaded.to_yaml(resolved)?,
        DumpFormat::Kickstart => loaded.to_kickstart(resolved),
    };
    print!("{}", text);
    Ok(())
}

/// Compare a template with another template or the local system
pub fn cmd_template_diff(session: &Session, template: &str, other: Option<&str>) -> Result<()> {
    let service = session.service();
    let left = session.load_template(&service, template, true)?;
    let right = match other {
        Some(other) => session.load_template(&service, other, true)?,
        None => {
            let mut pm = DnfCli::open()?;
            Template::from_system(&mut pm, false)?
        }
    };

    println!("--- {}", label(&left));
    println!("+++ {}", label(&right));

    let (ours, theirs) = left.repo_diff(&right.repos_all());
    if !ours.is_empty() || !theirs.is_empty() {
        println!("Repositories:");
        for repo in ours.sorted_by_key(|r| r.stub.clone()) {
            println!("  - {}", repo);
        }
        for repo in theirs.sorted_by_key(|r| r.stub.clone()) {
            println!("  + {}", repo);
        }
    }

    let (ours, theirs) = left.package_diff(&right.packages_all());
    if !ours.is_empty() || !theirs.is_empty() {
        println!("Packages:");
        for package in ours.sorted_by_key(|p| p.name().to_string()) {
            println!("  - {}", package);
        }
        for package in theirs.sorted_by_key(|p| p.name().to_string()) {
            println!("  + {}", package);
        }
    }
    Ok(())
}

/// Populate a template from a kickstart file or the local system
///
/// The template is created when it does not exist yet.
pub fn cmd_template_push(
    session: &Session,
    template: &str,
    kickstart: Option<&Path>,
    all: bool,
    clean: bool,
    dry_run: bool,
) -> Result<()> {
    let mut service = session.service();
    let unv = session.unv(template)?;
    let (mut target, exists) = match service.get_template(&unv) {
        Ok(found) => (found, true),
        Err(Error::NotFoundError(_)) => (Template::parse(template, session.user())?, false),
        Err(e) => return Err(e.into()),
    };

    if clean {
        target.clear();
    }

    match kickstart {
        Some(path) => {
            info!("Importing kickstart {}", path.display());
            let ks = Kickstart::from_file(path)?;
            target.import_kickstart(&ks)?;
        }
        None => {
            let mut pm = DnfCli::open()?;
            let system = Template::from_system(&mut pm, all)?;
            pm.close()?;
            target.union(&system);
        }
    }

    if dry_run {
        print!("{}", target.to_json(false)? + "\n");
        return Ok(());
    }

    let stored = if exists {
        service.update_template(&target)?
    } else {
        service.create_template(&target)?
    };
    println!(
        "Stored template {} ({} packages, {} repos, {} objects)",
        label(&stored),
        stored.packages().len(),
        stored.repos().len(),
        stored.objects().len()
    );
    Ok(())
}

/// Apply a template to the local system
pub fn cmd_template_pull(
    session: &Session,
    template: &str,
    clean: bool,
    dry_run: bool,
    state_dir: &Path,
) -> Result<()> {
    require_root(dry_run)?;
    let service = session.service();
    let loaded = session.load_template(&service, template, true)?;
    apply(&loaded, ApplyOptions { clean, dry_run }, state_dir)
}

pub(super) fn require_root(dry_run: bool) -> Result<()> {
    if !dry_run && !nix::unistd::geteuid().is_root() {
        bail!("Applying a template requires root privileges (try --dry-run)");
    }
    Ok(())
}

/// Apply a resolved template to this machine and report what changed
pub(super) fn apply(loaded: &Template, options: ApplyOptions, state_dir: &Path) -> Result<()> {
    let mut pm = DnfCli::open()?;
    let mut runner = LocalRunner::new(Some(state_dir.to_path_buf()));
    let tx = loaded.apply_to_system(&mut pm, &mut runner, options)?;

    for warning in &tx.warnings {
        warn!("{}", warning);
    }
    if tx.is_empty() {
        println!("System already matches {}", label(loaded));
        return Ok(());
    }
    for action in &tx.actions {
        println!("  {}", action.description());
    }
    if options.dry_run {
        println!("Would apply: {}", tx.summary());
    } else {
        println!("Applied: {}", tx.summary());
    }
    Ok(())
}

/// Store a template document read from a JSON or YAML file
pub fn cmd_template_import(
    session: &Session,
    file: &Path,
    target: Option<&str>,
    update: bool,
) -> Result<()> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut imported = match file.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Template::from_yaml(&text)?,
        _ => Template::from_json(&text)?,
    };

    match target {
        Some(target) => {
            let unv = session.unv(target)?;
            imported.set_user(unv.user);
            imported.set_name(Some(unv.name));
            imported.set_version(unv.version);
            imported.set_uuid(None);
        }
        None if imported.user().is_none() => {
            imported.set_user(session.user().map(str::to_string));
        }
        None => {}
    }

    let mut service = session.service();
    let stored = if update {
        service.update_template(&imported)?
    } else {
        service.create_template(&imported)?
    };
    println!("Imported template {}", label(&stored));
    Ok(())
}
