// src/commands/member.rs
//! Package, repository and object commands

use std::path::Path;

use anyhow::{Result, anyhow, bail};
use serde_json::Value;
use strata::{Object, ObjectAction, Package, Repository, Template, TemplateService};
use tracing::warn;

use super::Session;

fn store(session: &Session, template: Template) -> Result<()> {
    let mut service = session.service();
    let updated = service.update_template(&template)?;
    println!(
        "{}: {} packages, {} repos, {} objects",
        updated.unv().unwrap_or_default(),
        updated.packages().len(),
        updated.repos().len(),
        updated.objects().len()
    );
    Ok(())
}

fn load(session: &Session, template: &str, resolve: bool) -> Result<Template> {
    let service = session.service();
    session.load_template(&service, template, resolve)
}

/// Add packages, or change the flags of ones already listed
pub fn cmd_package_add(session: &Session, template: &str, specs: &[String]) -> Result<()> {
    let mut target = load(session, template, false)?;
    for spec in specs {
        let package = Package::parse(spec)?;
        if !target.add_package(package.clone()) {
            target.update_package(package);
        }
    }
    store(session, target)
}

pub fn cmd_package_rm(session: &Session, template: &str, specs: &[String]) -> Result<()> {
    let mut target = load(session, template, false)?;
    for spec in specs {
        let package = Package::parse(spec)?;
        if !target.remove_package(&package) {
            warn!("Package {} is not part of {}", spec, template);
        }
    }
    store(session, target)
}

pub fn cmd_package_list(session: &Session, template: &str, no_resolve: bool) -> Result<()> {
    let loaded = load(session, template, !no_resolve)?;
    let packages = if no_resolve {
        loaded.packages()
    } else {
        loaded.packages_all()
    };
    for package in packages.sorted_by_key(|p| p.name().to_string()) {
        println!("{}", package);
    }
    Ok(())
}

/// Add a repository, replacing one with the same stub
pub fn cmd_repo_add(session: &Session, template: &str, line: &str) -> Result<()> {
    let mut target = load(session, template, false)?;
    let repo = Repository::parse_kickstart_line(line)?;
    if !target.add_repo(repo.clone()) {
        target.update_repo(repo);
    }
    store(session, target)
}

pub fn cmd_repo_rm(session: &Session, template: &str, stub: &str) -> Result<()> {
    let mut target = load(session, template, false)?;
    let repo = target
        .find_repo(stub)
        .ok_or_else(|| anyhow!("Repository {} is not part of {}", stub, template))?;
    target.remove_repo(&repo);
    store(session, target)
}

pub fn cmd_repo_list(session: &Session, template: &str, no_resolve: bool) -> Result<()> {
    let loaded = load(session, template, !no_resolve)?;
    let repos = if no_resolve {
        loaded.repos()
    } else {
        loaded.repos_all()
    };
    for repo in repos.sorted_by_key(|r| r.stub.clone()) {
        println!("{}", repo.to_kickstart_line());
    }
    Ok(())
}

/// Add an object from a file or inline data
pub fn cmd_object_add(
    session: &Session,
    template: &str,
    name: &str,
    file: Option<&Path>,
    data: Option<&str>,
    actions: &[String],
) -> Result<()> {
    let actions = actions
        .iter()
        .map(|a| {
            ObjectAction::from_value(&Value::String(a.clone()))
                .ok_or_else(|| anyhow!("Invalid action '{}', expected \"<type> <path>\"", a))
        })
        .collect::<Result<Vec<_>>>()?;

    let object = match (file, data) {
        (Some(path), _) => Object::from_file(name, path, actions)?,
        (None, Some(data)) => Object::from_data(name, data, actions)?,
        (None, None) => bail!("An object needs --file or --data"),
    };

    let mut target = load(session, template, false)?;
    if let Some(existing) = target.objects().iter().find(|o| o.name() == name).cloned() {
        target.remove_object(&existing);
    }
    target.add_object(object);
    store(session, target)
}

pub fn cmd_object_rm(session: &Session, template: &str, name: &str) -> Result<()> {
    let mut target = load(session, template, false)?;
    let object = target
        .objects()
        .iter()
        .find(|o| o.name() == name)
        .cloned()
        .ok_or_else(|| anyhow!("Object {} is not part of {}", name, template))?;
    target.remove_object(&object);
    store(session, target)
}

pub fn cmd_object_list(session: &Session, template: &str, no_resolve: bool) -> Result<()> {
    let loaded = load(session, template, !no_resolve)?;
    let objects = if no_resolve {
        loaded.objects()
    } else {
        loaded.objects_all()
    };
    for object in &objects {
        let actions: Vec<String> = object
            .actions()
            .iter()
            .map(|a| match a.path() {
                Some(path) => format!("{} {}", a.kind, path),
                None => a.kind.to_string(),
            })
            .collect();
        println!("{}  [{}]", object, actions.join(", "));
    }
    Ok(())
}
