// src/system/transaction.rs

//! Transaction computation between a template and the installed system
//!
//! Turns a flattened package set and a [`SystemState`] snapshot into the
//! list of installs and removals the package manager has to perform.
//! Nothing here touches the machine.

use std::collections::HashSet;

use super::SystemState;
use crate::package::Action;
use crate::set::PackageSet;

/// One step needed to bring the system in line with a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionAction {
    /// Install a package by specifier
    Install {
        package: String,
        /// Requested `[epoch:]version-release`, if the template pins one
        evr: Option<String>,
    },

    /// Remove an installed package
    Remove {
        package: String,
        /// Installed `name-[epoch:]version-release[.arch]`
        nevra: String,
        /// Removed because the template does not mention it
        unlisted: bool,
    },

    /// Install a package group
    InstallGroup {
        group: String,
        nodefaults: bool,
        optional: bool,
    },

    /// Remove an installed package group
    RemoveGroup { group: String },
}

impl TransactionAction {
    /// Package or group name this action affects
    pub fn package(&self) -> &str {
        match self {
            TransactionAction::Install { package, .. } => package,
            TransactionAction::Remove { package, .. } => package,
            TransactionAction::InstallGroup { group, .. } => group,
            TransactionAction::RemoveGroup { group } => group,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(
            self,
            TransactionAction::InstallGroup { .. } | TransactionAction::RemoveGroup { .. }
        )
    }

    pub fn is_install(&self) -> bool {
        matches!(
            self,
            TransactionAction::Install { .. } | TransactionAction::InstallGroup { .. }
        )
    }

    /// Get a human-readable description
    pub fn description(&self) -> String {
        match self {
            TransactionAction::Install { package, evr } => match evr {
                Some(evr) => format!("Install {} ({})", package, evr),
                None => format!("Install {}", package),
            },
            TransactionAction::Remove {
                nevra, unlisted, ..
            } => {
                if *unlisted {
                    format!("Remove {} [not in template]", nevra)
                } else {
                    format!("Remove {}", nevra)
                }
            }
            TransactionAction::InstallGroup {
                group,
                nodefaults,
                optional,
            } => {
                let mut desc = format!("Install group @{}", group);
                if *nodefaults {
                    desc.push_str(" [nodefaults]");
                }
                if *optional {
                    desc.push_str(" [optional]");
                }
                desc
            }
            TransactionAction::RemoveGroup { group } => format!("Remove group @{}", group),
        }
    }
}

/// Options for `Template::apply_to_system`
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Also remove user-installed packages the template does not mention
    pub clean: bool,

    /// Compute and report the transaction without executing it
    pub dry_run: bool,
}

/// The install/remove set for one template application
#[derive(Debug, Clone, Default)]
pub struct SystemTransaction {
    pub actions: Vec<TransactionAction>,

    /// Notes produced while computing (skipped entries and the like)
    pub warnings: Vec<String>,
}

impl SystemTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if no changes are needed
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Package specifiers to install
    pub fn install_specs(&self) -> Vec<&str> {
        self.actions
            .iter()
            .filter_map(|a| match a {
                TransactionAction::Install { package, .. } => Some(package.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Installed NEVRAs to remove
    pub fn remove_specs(&self) -> Vec<&str> {
        self.actions
            .iter()
            .filter_map(|a| match a {
                TransactionAction::Remove { nevra, .. } => Some(nevra.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn group_installs(&self) -> Vec<&TransactionAction> {
        self.actions
            .iter()
            .filter(|a| matches!(a, TransactionAction::InstallGroup { .. }))
            .collect()
    }

    pub fn group_removes(&self) -> Vec<&str> {
        self.actions
            .iter()
            .filter_map(|a| match a {
                TransactionAction::RemoveGroup { group } => Some(group.as_str()),
                _ => None,
            })
            .collect()
    }

    /// One-line count summary
    pub fn summary(&self) -> String {
        let installs = self.actions.iter().filter(|a| a.is_install()).count();
        format!(
            "{} to install, {} to remove",
            installs,
            self.actions.len() - installs
        )
    }

    fn add_action(&mut self, action: TransactionAction) {
        if !self.actions.contains(&action) {
            self.actions.push(action);
        }
    }

    fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }
}

/// Compute the transaction that applies `packages` to `state`
///
/// Ignored packages are skipped. A package carrying both INCLUDE and
/// EXCLUDE is treated as included.
pub fn compute_transaction(
    packages: &PackageSet,
    state: &SystemState,
    clean: bool,
) -> SystemTransaction {
    let mut tx = SystemTransaction::new();

    for package in packages {
        if package.ignored() {
            tx.add_warning(format!("Skipping ignored package {}", package.name()));
            continue;
        }

        if package.is_group() {
            let group = package.group_name();
            let id = group.trim_start_matches('^');
            let action = package.action();
            if package.included() {
                if !state.has_group(id) {
                    tx.add_action(TransactionAction::InstallGroup {
                        group: group.to_string(),
                        nodefaults: action.contains(Action::GROUP_NODEFAULTS),
                        optional: action.contains(Action::GROUP_OPTIONAL),
                    });
                }
            } else if package.excluded() && state.has_group(id) {
                tx.add_action(TransactionAction::RemoveGroup {
                    group: id.to_string(),
                });
            }
            continue;
        }

        let mut installed = state.matching(package.name(), package.arch()).peekable();
        if package.included() {
            let satisfied = match package.evr() {
                Some(evr) => installed.any(|n| n.evr() == evr),
                None => installed.peek().is_some(),
            };
            if !satisfied {
                tx.add_action(TransactionAction::Install {
                    package: package.to_spec(),
                    evr: package.evr(),
                });
            }
        } else if package.excluded() {
            for native in installed {
                tx.add_action(TransactionAction::Remove {
                    package: native.name.clone(),
                    nevra: native.nevra(),
                    unlisted: false,
                });
            }
        }
    }

    if clean {
        let named: HashSet<&str> = packages.iter().map(|p| p.name()).collect();
        for native in &state.installed {
            // Dependencies are left to the package manager's autoremove
            if named.contains(native.name.as_str()) || !state.is_user_installed(&native.name) {
                continue;
            }
            tx.add_action(TransactionAction::Remove {
                package: native.name.clone(),
                nevra: native.nevra(),
                unlisted: true,
            });
        }
    }

    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Package;
    use crate::system::NativePackage;

    fn native(name: &str, version: &str) -> NativePackage {
        NativePackage {
            name: name.to_string(),
            epoch: None,
            version: version.to_string(),
            release: "1".to_string(),
            arch: Some("x86_64".to_string()),
        }
    }

    fn state() -> SystemState {
        let mut state = SystemState {
            installed: vec![native("bash", "5.2"), native("httpd", "2.4"), native("vim", "9.1")],
            ..SystemState::new()
        };
        state.user_installed.insert("httpd".to_string());
        state.user_installed.insert("vim".to_string());
        state.groups.insert("core".to_string());
        state
    }

    fn set(specs: &[&str]) -> PackageSet {
        specs.iter().map(|s| Package::parse(s).unwrap()).collect()
    }

    #[test]
    fn test_install_missing_and_remove_excluded() {
        let tx = compute_transaction(&set(&["nginx", "bash", "~httpd"]), &state(), false);

        assert_eq!(tx.install_specs(), vec!["nginx"]);
        assert_eq!(tx.remove_specs(), vec!["httpd-2.4-1.x86_64"]);
        assert_eq!(tx.summary(), "1 to install, 1 to remove");
    }

    #[test]
    fn test_versioned_install_when_evr_differs() {
        let tx = compute_transaction(&set(&["bash@5.3-1", "vim@9.1-1"]), &state(), false);
        assert_eq!(tx.install_specs(), vec!["bash-5.3-1"]);
    }

    #[test]
    fn test_ignored_is_skipped() {
        let tx = compute_transaction(&set(&["!httpd", "!nginx"]), &state(), false);
        assert!(tx.is_empty());
        assert_eq!(tx.warnings.len(), 2);
    }

    #[test]
    fn test_include_beats_exclude() {
        let both = Package::parse("nginx")
            .unwrap()
            .with_action(Action::INCLUDE | Action::EXCLUDE);
        let packages: PackageSet = std::iter::once(both).collect();

        let tx = compute_transaction(&packages, &state(), false);
        assert_eq!(tx.install_specs(), vec!["nginx"]);
        assert!(tx.remove_specs().is_empty());
    }

    #[test]
    fn test_groups() {
        let nodefaults = Package::parse("@development-tools")
            .unwrap()
            .with_action(Action::INCLUDE | Action::GROUP | Action::GROUP_NODEFAULTS);
        let mut packages = set(&["@core", "~@core"]);
        packages.add(nodefaults);

        let tx = compute_transaction(&packages, &state(), false);
        assert_eq!(
            tx.actions,
            vec![TransactionAction::InstallGroup {
                group: "development-tools".to_string(),
                nodefaults: true,
                optional: false,
            }]
        );

        let tx = compute_transaction(&set(&["~@core"]), &state(), false);
        assert_eq!(tx.group_removes(), vec!["core"]);
    }

    #[test]
    fn test_groups_match_by_display_name() {
        let mut state = state();
        state.groups.insert(crate::system::group_key("development-tools"));

        let tx = compute_transaction(&set(&["~@Development Tools"]), &state, false);
        assert_eq!(tx.group_removes(), vec!["Development Tools"]);

        let tx = compute_transaction(&set(&["@Development Tools"]), &state, false);
        assert!(tx.is_empty());

        let tx = compute_transaction(&set(&["@Web Server"]), &state, false);
        assert_eq!(tx.group_installs().len(), 1);
    }

    #[test]
    fn test_clean_removes_unlisted_user_packages() {
        let tx = compute_transaction(&set(&["vim"]), &state(), true);

        // bash is a dependency, vim is listed
        assert_eq!(tx.remove_specs(), vec!["httpd-2.4-1.x86_64"]);
        assert!(tx.actions[0].description().contains("not in template"));
    }
}
