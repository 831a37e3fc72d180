// src/template/system.rs

//! Templates against the local machine

use tracing::{info, warn};

use super::Template;
use crate::error::Result;
use crate::object::ActionRunner;
use crate::package::Package;
use crate::repository::Repository;
use crate::system::{
    compute_transaction, ApplyOptions, PackageManager, SystemState, SystemTransaction,
};

impl Template {
    /// Describe the machine as a `local:system` template
    ///
    /// Lists user-installed packages, or every installed package with
    /// `all`, without version information, plus the enabled repositories.
    pub fn from_system(pm: &mut dyn PackageManager, all: bool) -> Result<Template> {
        let mut template = Template::parse("local:system", None)?;
        template.set_title(Some("Local system".to_string()));

        let installed = if all {
            pm.installed()?
        } else {
            pm.user_installed()?
        };
        for native in &installed {
            template.own.packages.add(Package::from_native(native, false)?);
        }
        for native in pm.enabled_repos()? {
            template.own.repos.add(Repository::from_native(&native)?);
        }

        info!(
            "Captured system: {} packages, {} repos",
            template.own.packages.len(),
            template.own.repos.len()
        );
        Ok(template)
    }

    /// Work out what `apply_to_system` would install and remove
    pub fn prepare_system_transaction(
        &self,
        pm: &mut dyn PackageManager,
        clean: bool,
    ) -> Result<SystemTransaction> {
        let state = SystemState::capture(pm)?;
        Ok(compute_transaction(&self.packages_all(), &state, clean))
    }

    /// Bring the machine in line with the flattened template
    ///
    /// Template repositories replace the system ones when there are any.
    /// Object actions run after the package transaction. With `dry_run`
    /// only the transaction is computed.
    pub fn apply_to_system(
        &self,
        pm: &mut dyn PackageManager,
        runner: &mut dyn ActionRunner,
        options: ApplyOptions,
    ) -> Result<SystemTransaction> {
        let repos: Vec<Repository> = self
            .repos_all()
            .into_iter()
            .filter(|r| r.included())
            .collect();
        if repos.is_empty() {
            pm.use_system_repos()?;
        } else {
            pm.configure_repos(&repos)?;
        }

        let result = self.run_transaction(pm, runner, options);
        let closed = pm.close();
        let tx = result?;
        closed?;
        Ok(tx)
    }

    fn run_transaction(
        &self,
        pm: &mut dyn PackageManager,
        runner: &mut dyn ActionRunner,
        options: ApplyOptions,
    ) -> Result<SystemTransaction> {
        let tx = self.prepare_system_transaction(pm, options.clean)?;
        for warning in &tx.warnings {
            warn!("{}", warning);
        }
        for action in &tx.actions {
            info!("{}", action.description());
        }
        if options.dry_run {
            info!("Dry run: {}", tx.summary());
            return Ok(tx);
        }

        pm.execute(&tx)?;

        let mut applied = 0;
        for object in &self.objects_all() {
            applied += object.apply_actions(runner)?;
        }
        info!("Applied {}; {} object actions", tx.summary(), applied);
        Ok(tx)
    }
}
