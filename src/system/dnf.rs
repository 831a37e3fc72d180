// src/system/dnf.rs

//! rpm/dnf command-line backend
//!
//! Queries go through `rpm -qa` and `dnf repoquery`/`repoinfo`; changes go
//! through `dnf -y`. Template repositories are written to a private
//! `reposdir` so the machine's own `/etc/yum.repos.d` is left alone.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::{NativePackage, NativeRepo, PackageManager, SystemTransaction};
use crate::error::{Error, Result};
use crate::repository::Repository;

const RPM_QUERYFORMAT: &str = "%{NAME}\t%{EPOCHNUM}\t%{VERSION}\t%{RELEASE}\t%{ARCH}\n";
const DNF_QUERYFORMAT: &str = "%{name}\t%{epoch}\t%{version}\t%{release}\t%{arch}\n";

/// [`PackageManager`] backed by the `rpm` and `dnf` binaries
#[derive(Debug)]
pub struct DnfCli {
    rpm: PathBuf,
    dnf: PathBuf,
    reposdir: Option<TempDir>,
}

impl DnfCli {
    /// Locate `rpm` and `dnf` (or `dnf5`) on `PATH`
    pub fn open() -> Result<Self> {
        let rpm = which::which("rpm").map_err(|e| {
            Error::PackageManagerError(format!("rpm not found in PATH: {}", e))
        })?;
        let dnf = which::which("dnf")
            .or_else(|_| which::which("dnf5"))
            .map_err(|e| Error::PackageManagerError(format!("dnf not found in PATH: {}", e)))?;
        debug!("Using {} and {}", rpm.display(), dnf.display());
        Ok(Self {
            rpm,
            dnf,
            reposdir: None,
        })
    }

    fn dnf_command(&self) -> Command {
        let mut cmd = Command::new(&self.dnf);
        if let Some(dir) = &self.reposdir {
            cmd.arg(format!("--setopt=reposdir={}", dir.path().display()));
        }
        cmd
    }

    fn run(mut cmd: Command, what: &str) -> Result<String> {
        debug!("Running {:?}", cmd);
        let output = cmd
            .output()
            .map_err(|e| Error::PackageManagerError(format!("Failed to run {}: {}", what, e)))?;

        if !output.status.success() {
            return Err(Error::PackageManagerError(format!(
                "{} failed: {}",
                what,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_transaction_step(&self, args: &[&str], specs: &[&str], what: &str) -> Result<()> {
        if specs.is_empty() {
            return Ok(());
        }
        let mut cmd = self.dnf_command();
        cmd.arg("-y").args(args).args(specs);
        info!("{}: {}", what, specs.join(" "));
        Self::run(cmd, what).map(|_| ())
    }
}

impl PackageManager for DnfCli {
    fn installed(&mut self) -> Result<Vec<NativePackage>> {
        let mut cmd = Command::new(&self.rpm);
        cmd.args(["-qa", "--queryformat", RPM_QUERYFORMAT]);
        let packages = parse_package_lines(&Self::run(cmd, "rpm -qa")?);
        debug!("Found {} installed packages", packages.len());
        Ok(packages)
    }

    fn user_installed(&mut self) -> Result<Vec<NativePackage>> {
        let mut cmd = self.dnf_command();
        cmd.args(["-q", "repoquery", "--userinstalled", "--queryformat", DNF_QUERYFORMAT]);
        Ok(parse_package_lines(&Self::run(cmd, "dnf repoquery")?))
    }

    fn installed_groups(&mut self) -> Result<Vec<String>> {
        let mut cmd = self.dnf_command();
        cmd.args(["-q", "group", "list", "--installed", "--ids"]);
        Ok(parse_group_ids(&Self::run(cmd, "dnf group list")?))
    }

    fn enabled_repos(&mut self) -> Result<Vec<NativeRepo>> {
        let mut cmd = self.dnf_command();
        cmd.args(["-q", "repoinfo", "--enabled"]);
        Ok(parse_repoinfo(&Self::run(cmd, "dnf repoinfo")?))
    }

    fn configure_repos(&mut self, repos: &[Repository]) -> Result<()> {
        let dir = TempDir::new()?;
        let config: String = repos
            .iter()
            .filter(|r| r.included())
            .map(|r| r.to_repo_config(&r.stub))
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(dir.path().join("strata.repo"), config)?;
        debug!("Wrote {} repositories to {}", repos.len(), dir.path().display());
        self.reposdir = Some(dir);
        Ok(())
    }

    fn use_system_repos(&mut self) -> Result<()> {
        self.reposdir = None;
        Ok(())
    }

    fn execute(&mut self, transaction: &SystemTransaction) -> Result<()> {
        if transaction.is_empty() {
            info!("Nothing to do");
            return Ok(());
        }

        self.run_transaction_step(&["remove"], &transaction.remove_specs(), "dnf remove")?;
        self.run_transaction_step(&["group", "remove"], &transaction.group_removes(), "dnf group remove")?;

        let mut installs: Vec<String> = transaction
            .install_specs()
            .into_iter()
            .map(str::to_string)
            .collect();
        installs.extend(
            transaction
                .group_installs()
                .into_iter()
                .map(|a| format!("@{}", a.package())),
        );
        let installs: Vec<&str> = installs.iter().map(String::as_str).collect();
        self.run_transaction_step(&["install"], &installs, "dnf install")
    }

    fn close(&mut self) -> Result<()> {
        if let Some(dir) = self.reposdir.take() {
            if let Err(e) = dir.close() {
                warn!("Failed to remove temporary reposdir: {}", e);
            }
        }
        Ok(())
    }
}

fn none_if_unset(value: &str) -> Option<String> {
    match value.trim() {
        "" | "(none)" => None,
        v => Some(v.to_string()),
    }
}

/// Parse `name\tepoch\tversion\trelease\tarch` lines
fn parse_package_lines(output: &str) -> Vec<NativePackage> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 5 {
                if !line.trim().is_empty() {
                    warn!("Unexpected package line: {}", line);
                }
                return None;
            }
            // gpg-pubkey and friends carry no arch
            let arch = none_if_unset(parts[4]);
            Some(NativePackage {
                name: parts[0].trim().to_string(),
                epoch: none_if_unset(parts[1]).filter(|e| e != "0"),
                version: parts[2].trim().to_string(),
                release: parts[3].trim().to_string(),
                arch,
            })
        })
        .collect()
}

/// Pull group display names and ids out of `dnf group list --ids`
///
/// Lines look like `   Development Tools (development-tools)`; both the
/// name and the id are returned.
fn parse_group_ids(output: &str) -> Vec<String> {
    let mut groups = Vec::new();
    for line in output.lines().map(str::trim) {
        let Some(open) = line.rfind('(') else {
            continue;
        };
        if !line.ends_with(')') {
            continue;
        }
        let id = line[open + 1..line.len() - 1].trim();
        if id.is_empty() {
            continue;
        }
        let name = line[..open].trim();
        if !name.is_empty() && name != id {
            groups.push(name.to_string());
        }
        groups.push(id.to_string());
    }
    groups
}

fn split_urls(value: &str) -> Vec<String> {
    value
        .split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `dnf repoinfo` output into repository records
///
/// Each block starts at `Repo-id`; other keys are `Repo-name`,
/// `Repo-baseurl`, `Repo-mirrors` and `Repo-metalink`.
fn parse_repoinfo(output: &str) -> Vec<NativeRepo> {
    let mut repos: Vec<NativeRepo> = Vec::new();

    for line in output.lines() {
        let Some((key, value)) = line.split_once(" : ") else {
            continue;
        };
        let (key, value) = (key.trim().to_ascii_lowercase(), value.trim());

        if key == "repo-id" {
            repos.push(NativeRepo {
                id: value.to_string(),
                enabled: true,
                ..NativeRepo::default()
            });
            continue;
        }
        let Some(repo) = repos.last_mut() else {
            continue;
        };
        match key.as_str() {
            "repo-name" => repo.name = Some(value.to_string()),
            "repo-baseurl" => repo.baseurl = split_urls(value),
            "repo-mirrors" => repo.mirrorlist = none_if_unset(value),
            "repo-metalink" => repo.metalink = value.split_whitespace().next().and_then(none_if_unset),
            "repo-status" => repo.enabled = value.eq_ignore_ascii_case("enabled"),
            "repo-exclude" => repo.exclude = split_urls(value),
            "repo-include" => repo.include = split_urls(value),
            _ => {}
        }
    }

    repos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_lines() {
        let output = "bash\t0\t5.2.26\t3.fc40\tx86_64\n\
                      gpg-pubkey\t0\ta15b79cc\t63d04c2c\t(none)\n\
                      shim-x64\t1\t15.8\t3\tx86_64\n\
                      garbage\n";
        let packages = parse_package_lines(output);

        assert_eq!(packages.len(), 3);
        assert_eq!(packages[0].nevra(), "bash-5.2.26-3.fc40.x86_64");
        assert_eq!(packages[1].arch, None);
        assert_eq!(packages[2].epoch.as_deref(), Some("1"));
    }

    #[test]
    fn test_parse_group_ids() {
        let output = "Installed Groups:\n   Core (core)\n   Development Tools (development-tools)\n";
        assert_eq!(
            parse_group_ids(output),
            vec!["Core", "core", "Development Tools", "development-tools"]
        );
    }

    #[test]
    fn test_parse_repoinfo() {
        let output = "\
Repo-id            : fedora
Repo-name          : Fedora 40 - x86_64
Repo-status        : enabled
Repo-metalink      : https://mirrors.fedoraproject.org/metalink?repo=fedora-40 (expires in 2 days)
Repo-pkgs          : 74,881

Repo-id            : local
Repo-name          : Local
Repo-baseurl       : file:///srv/repo, http://mirror/repo
";
        let repos = parse_repoinfo(output);

        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].id, "fedora");
        assert_eq!(repos[0].name.as_deref(), Some("Fedora 40 - x86_64"));
        assert_eq!(
            repos[0].metalink.as_deref(),
            Some("https://mirrors.fedoraproject.org/metalink?repo=fedora-40")
        );
        assert_eq!(repos[1].baseurl, vec!["file:///srv/repo", "http://mirror/repo"]);
        assert!(repos[1].enabled);
    }
}
