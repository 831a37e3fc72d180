// src/template/kickstart.rs

//! Kickstart import and export for templates
//!
//! Import turns `repo` commands into repositories, every other command and
//! script into kickstart objects, and the `%packages` section into
//! packages. Header options of `%packages` and the `#platform=` comment are
//! kept in `meta.kickstart` so export can write them back.

use std::path::Path;

use serde_json::{json, Map, Value};
use tracing::{debug, error, info};

use super::Template;
use crate::error::{Error, Result};
use crate::kickstart::{is_repeatable, Kickstart, PackagesOptions};
use crate::object::Object;
use crate::package::{Action, Package};
use crate::repository::Repository;

const META_KEY: &str = "kickstart";

impl Template {
    /// Import a kickstart file
    ///
    /// Read and parse failures are logged and leave the template untouched;
    /// returns whether the import happened.
    pub fn from_kickstart_file(&mut self, path: &Path) -> bool {
        let result = Kickstart::from_file(path).and_then(|ks| self.import_kickstart(&ks));
        match result {
            Ok(()) => {
                info!("Imported kickstart {}", path.display());
                true
            }
            Err(e) => {
                error!("Unable to import kickstart {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Stage the contents of a parsed kickstart; all or nothing
    pub fn import_kickstart(&mut self, ks: &Kickstart) -> Result<()> {
        let mut staged = self.clone();
        staged.stage_kickstart(ks)?;
        *self = staged;
        Ok(())
    }

    fn stage_kickstart(&mut self, ks: &Kickstart) -> Result<()> {
        let mut meta = Map::new();
        if let Some(platform) = &ks.platform {
            meta.insert("platform".to_string(), Value::String(platform.clone()));
        }

        for command in &ks.commands {
            if command.name == "repo" {
                self.add_repo(Repository::parse_kickstart_line(&command.text)?);
            } else {
                self.add_object(Object::from_kickstart_command(command)?);
            }
        }

        let mut scripts: Vec<_> = ks.scripts.iter().collect();
        scripts.sort_by_key(|s| s.line_no);
        for script in scripts {
            self.add_object(Object::from_kickstart_script(script)?);
        }

        if let Some(packages) = &ks.packages {
            meta.insert("packages".to_string(), options_to_value(&packages.options));
            for entry in &packages.included {
                self.add_package(package_entry(entry, Action::INCLUDE)?);
            }
            for entry in &packages.excluded {
                self.add_package(package_entry(entry, Action::EXCLUDE)?);
            }
        }

        debug!(
            "Staged kickstart: {} packages, {} repos, {} objects",
            self.delta.packages.len(),
            self.delta.repos.len(),
            self.delta.objects.len()
        );
        self.meta.insert(META_KEY.to_string(), Value::Object(meta));
        Ok(())
    }

    /// Render as a kickstart file; `resolved` includes the included layer
    pub fn to_kickstart(&self, resolved: bool) -> String {
        let (packages, repos, objects) = if resolved {
            (self.packages_all(), self.repos_all(), self.objects_all())
        } else {
            (self.packages(), self.repos(), self.objects())
        };
        let ks_meta = self.meta.get(META_KEY).and_then(Value::as_object);

        let mut out = String::new();
        out.push_str(&format!(
            "# Strata generated template - {}\n",
            self.name().unwrap_or_default()
        ));
        out.push_str(&format!("# UUID: {}\n", self.uuid().unwrap_or_default()));
        out.push_str(&format!("# Author: {}\n", self.user().unwrap_or_default()));
        out.push_str(&format!("# Title: {}\n", self.title().unwrap_or_default()));
        out.push_str("# Description:\n");
        for line in self.description().unwrap_or_default().lines() {
            out.push_str(&format!("# {}\n", line));
        }
        if let Some(platform) = ks_meta.and_then(|m| m.get("platform")).and_then(Value::as_str) {
            out.push_str(&format!("#platform={}\n", platform));
        }
        out.push('\n');

        let repo_lines: Vec<String> = repos
            .iter()
            .filter(|r| r.included())
            .map(Repository::to_kickstart_line)
            .collect();
        if !repo_lines.is_empty() {
            out.push_str(&repo_lines.join("\n"));
            out.push_str("\n\n");
        }

        // First occurrence of a command wins unless it may repeat
        let mut commands: Vec<(String, Vec<&Object>)> = Vec::new();
        for object in objects.iter().filter(|o| o.is_kickstart_command()) {
            let Some(name) = object.kickstart_command() else {
                continue;
            };
            match commands.iter_mut().find(|(n, _)| *n == name) {
                Some((_, members)) if is_repeatable(&name) => members.push(object),
                Some(_) => debug!("Skipping repeated kickstart command '{}'", name),
                None => commands.push((name, vec![object])),
            }
        }
        commands.sort_by_key(|(_, members)| members[0].kickstart_priority());
        if !commands.is_empty() {
            for object in commands.iter().flat_map(|(_, members)| members) {
                if let Some(text) = object.to_kickstart_text() {
                    out.push_str(&text);
                    out.push('\n');
                }
            }
            out.push('\n');
        }

        let mut scripts: Vec<&Object> = objects.iter().filter(|o| o.is_kickstart_script()).collect();
        scripts.sort_by_key(|o| o.line_no().unwrap_or(i64::MAX));
        for object in scripts {
            if let Some(text) = object.to_kickstart_text() {
                out.push_str(&text);
                out.push_str("\n\n");
            }
        }

        let mut included: Vec<String> = packages
            .iter()
            .filter(|p| p.included())
            .map(package_line)
            .collect();
        let mut excluded: Vec<String> = packages
            .iter()
            .filter(|p| p.excluded() && !p.included())
            .map(package_line)
            .collect();
        included.sort();
        excluded.sort();

        out.push_str("%packages");
        out.push_str(&packages_header(ks_meta.and_then(|m| m.get("packages"))));
        out.push('\n');
        for line in included.iter().chain(excluded.iter()) {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("%end\n");
        out
    }
}

/// Package from a `%packages` entry such as `vim`, `-httpd` (already
/// stripped) or `@core --nodefaults`
fn package_entry(entry: &str, action: Action) -> Result<Package> {
    let (spec, flags) = match entry.find(" --") {
        Some(i) => (entry[..i].trim(), &entry[i..]),
        None => (entry.trim(), ""),
    };
    if spec.is_empty() {
        return Err(Error::InvalidPackageSpec(format!("empty %packages entry '{}'", entry)));
    }

    let package = Package::parse(spec)?;
    let mut action = action;
    if package.is_group() {
        action.insert(Action::GROUP);
        for flag in flags.split_whitespace() {
            match flag {
                "--nodefaults" => action.insert(Action::GROUP_NODEFAULTS),
                "--optional" => action.insert(Action::GROUP_OPTIONAL),
                other => debug!("Ignoring group option '{}' on {}", other, spec),
            }
        }
    }
    Ok(package.with_action(action))
}

fn package_line(package: &Package) -> String {
    let mut line = package.to_kickstart();
    if package.is_group() && package.included() {
        if package.action().contains(Action::GROUP_NODEFAULTS) {
            line.push_str(" --nodefaults");
        }
        if package.action().contains(Action::GROUP_OPTIONAL) {
            line.push_str(" --optional");
        }
    }
    line
}

fn options_to_value(options: &PackagesOptions) -> Value {
    let install_langs = match options.install_langs.as_deref() {
        None => Value::Null,
        Some("") => Value::Bool(true),
        Some(langs) => Value::String(langs.to_string()),
    };
    json!({
        "default": options.default,
        "exclude_docs": options.exclude_docs,
        "no_base": options.no_base,
        "no_core": options.no_core,
        "handle_missing": options.handle_missing,
        "install_langs": install_langs,
        "multi_lib": options.multi_lib,
    })
}

fn packages_header(options: Option<&Value>) -> String {
    let Some(options) = options.and_then(Value::as_object) else {
        return String::new();
    };
    let flag = |key: &str| options.get(key).and_then(Value::as_bool).unwrap_or(false);

    let mut header = String::new();
    for (key, option) in [
        ("default", "--default"),
        ("exclude_docs", "--excludedocs"),
        ("no_base", "--nobase"),
        ("no_core", "--nocore"),
        ("handle_missing", "--ignoremissing"),
    ] {
        if flag(key) {
            header.push(' ');
            header.push_str(option);
        }
    }
    match options.get("install_langs") {
        Some(Value::String(langs)) => header.push_str(&format!(" --instLangs={}", langs)),
        Some(Value::Bool(true)) => header.push_str(" --installlangs"),
        _ => {}
    }
    if flag("multi_lib") {
        header.push_str(" --multilib");
    }
    header
}
