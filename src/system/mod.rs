// src/system/mod.rs

//! Native package manager boundary
//!
//! Templates never talk to rpm or dnf directly. Everything that needs the
//! real machine goes through a [`PackageManager`], which is opened by the
//! caller, handed the repositories to use, asked for the installed state,
//! and finally told to run a [`SystemTransaction`]:
//!
//! ```text
//! open -> configure_repos | use_system_repos -> snapshot -> execute -> close
//! ```
//!
//! [`DnfCli`] is the command-line backend used by the binary; tests use
//! in-memory doubles.

mod dnf;
mod transaction;

pub use dnf::DnfCli;
pub use transaction::{
    compute_transaction, ApplyOptions, SystemTransaction, TransactionAction,
};

use std::collections::HashSet;

use crate::error::Result;
use crate::repository::Repository;

/// An installed package as reported by the package manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativePackage {
    pub name: String,
    pub epoch: Option<String>,
    pub version: String,
    pub release: String,
    pub arch: Option<String>,
}

impl NativePackage {
    /// `name-[epoch:]version-release[.arch]`
    pub fn nevra(&self) -> String {
        let mut s = self.name.clone();
        s.push('-');
        if let Some(epoch) = self.epoch.as_deref().filter(|e| *e != "0" && !e.is_empty()) {
            s.push_str(epoch);
            s.push(':');
        }
        s.push_str(&self.version);
        s.push('-');
        s.push_str(&self.release);
        if let Some(arch) = &self.arch {
            s.push('.');
            s.push_str(arch);
        }
        s
    }

    /// `[epoch:]version-release`
    pub fn evr(&self) -> String {
        match self.epoch.as_deref().filter(|e| *e != "0" && !e.is_empty()) {
            Some(epoch) => format!("{}:{}-{}", epoch, self.version, self.release),
            None => format!("{}-{}", self.version, self.release),
        }
    }
}

/// A configured repository as reported by the package manager
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeRepo {
    pub id: String,
    pub name: Option<String>,
    pub baseurl: Vec<String>,
    pub mirrorlist: Option<String>,
    pub metalink: Option<String>,
    pub enabled: bool,
    pub gpgcheck: Option<bool>,
    pub gpgkey: Vec<String>,
    pub cost: Option<i64>,
    pub priority: Option<i64>,
    pub exclude: Vec<String>,
    pub include: Vec<String>,
}

/// Snapshot of what is installed on the machine
#[derive(Debug, Clone, Default)]
pub struct SystemState {
    /// Every installed package
    pub installed: Vec<NativePackage>,

    /// Names of packages installed on request rather than as dependencies
    pub user_installed: HashSet<String>,

    /// Installed package groups, keyed by [`group_key`]
    pub groups: HashSet<String>,
}

/// Normalized form of a group id or display name
///
/// `Development Tools`, `development_tools` and `development-tools` all map
/// to `development-tools`, so a template group written either way matches
/// what the package manager reports.
pub fn group_key(group: &str) -> String {
    group
        .trim()
        .trim_start_matches(['@', '^'])
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

impl SystemState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query the package manager for the current state
    pub fn capture(pm: &mut dyn PackageManager) -> Result<Self> {
        let installed = pm.installed()?;
        let user_installed = pm
            .user_installed()?
            .into_iter()
            .map(|p| p.name)
            .collect();
        let groups = pm
            .installed_groups()?
            .into_iter()
            .map(|g| group_key(&g))
            .collect();
        Ok(Self {
            installed,
            user_installed,
            groups,
        })
    }

    /// Installed packages with this name, optionally restricted to an arch
    pub fn matching<'a>(
        &'a self,
        name: &'a str,
        arch: Option<&'a str>,
    ) -> impl Iterator<Item = &'a NativePackage> + 'a {
        self.installed.iter().filter(move |p| {
            p.name == name
                && match (arch, p.arch.as_deref()) {
                    (Some(want), Some(have)) => want == have,
                    _ => true,
                }
        })
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.iter().any(|p| p.name == name)
    }

    pub fn is_user_installed(&self, name: &str) -> bool {
        self.user_installed.contains(name)
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains(&group_key(group))
    }

    pub fn package_count(&self) -> usize {
        self.installed.len()
    }
}

/// The native package manager collaborator
///
/// Errors from any method abort the current operation; nothing is retried.
pub trait PackageManager {
    /// Every installed package
    fn installed(&mut self) -> Result<Vec<NativePackage>>;

    /// Packages installed on request rather than pulled in as dependencies
    fn user_installed(&mut self) -> Result<Vec<NativePackage>>;

    /// Installed group ids
    fn installed_groups(&mut self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Repositories currently enabled on the machine
    fn enabled_repos(&mut self) -> Result<Vec<NativeRepo>>;

    /// Use exactly these repositories for the following transaction
    fn configure_repos(&mut self, repos: &[Repository]) -> Result<()>;

    /// Use the machine's own repository configuration
    fn use_system_repos(&mut self) -> Result<()>;

    /// Install and remove what the transaction lists
    fn execute(&mut self, transaction: &SystemTransaction) -> Result<()>;

    /// Release anything held since `configure_repos`
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native(name: &str, epoch: Option<&str>, arch: Option<&str>) -> NativePackage {
        NativePackage {
            name: name.to_string(),
            epoch: epoch.map(str::to_string),
            version: "1.0".to_string(),
            release: "2.fc40".to_string(),
            arch: arch.map(str::to_string),
        }
    }

    #[test]
    fn test_nevra_drops_zero_epoch() {
        assert_eq!(native("foo", Some("0"), Some("x86_64")).nevra(), "foo-1.0-2.fc40.x86_64");
        assert_eq!(native("foo", Some("3"), None).nevra(), "foo-3:1.0-2.fc40");
        assert_eq!(native("foo", None, None).evr(), "1.0-2.fc40");
    }

    #[test]
    fn test_state_matching_by_arch() {
        let state = SystemState {
            installed: vec![
                native("glibc", None, Some("x86_64")),
                native("glibc", None, Some("i686")),
                native("bash", None, Some("x86_64")),
            ],
            ..SystemState::new()
        };

        assert_eq!(state.matching("glibc", None).count(), 2);
        assert_eq!(state.matching("glibc", Some("i686")).count(), 1);
        assert_eq!(state.matching("glibc", Some("aarch64")).count(), 0);
        assert!(state.is_installed("bash"));
        assert!(!state.is_installed("zsh"));
    }

    #[test]
    fn test_group_lookup_ignores_case_and_spelling() {
        let mut state = SystemState::new();
        state.groups.insert("development-tools".to_string());
        assert!(state.has_group("Development-Tools"));
        assert!(state.has_group("Development Tools"));
        assert!(state.has_group("^development_tools"));
        assert!(!state.has_group("core"));

        assert_eq!(group_key("  Web  Server "), "web-server");
        assert_eq!(group_key("@core"), "core");
    }
}
