// src/commands/mod.rs
//! Command handlers for the strata CLI

use std::path::{Path, PathBuf};

use anyhow::Result;
use strata::{Config, DirectoryService, Template, TemplateService, Unv};
use tracing::debug;

mod config;
mod machine;
mod member;
mod template;

pub use config::{cmd_config_get, cmd_config_list, cmd_config_set, cmd_config_unset};
pub use machine::{
    cmd_machine_add, cmd_machine_diff, cmd_machine_list, cmd_machine_rm, cmd_machine_sync,
    cmd_machine_update,
};
pub use member::{
    cmd_object_add, cmd_object_list, cmd_object_rm, cmd_package_add, cmd_package_list,
    cmd_package_rm, cmd_repo_add, cmd_repo_list, cmd_repo_rm,
};
pub use template::{
    cmd_template_add, cmd_template_copy, cmd_template_diff, cmd_template_dump,
    cmd_template_import, cmd_template_list, cmd_template_pull, cmd_template_push,
    cmd_template_rm, cmd_template_update,
};

/// Settings shared by every command
pub struct Session {
    config: Config,
    user: Option<String>,
    store: PathBuf,
}

impl Session {
    /// Load the configuration; command-line values win over configured ones
    pub fn open(config: Option<&Path>, user: Option<String>, store: Option<PathBuf>) -> Result<Self> {
        let config = Config::load(config)?;
        let user = user.or_else(|| config.default_user());
        let store = store.unwrap_or_else(|| config.store_root());
        debug!(
            "Session: user={} store={}",
            user.as_deref().unwrap_or("-"),
            store.display()
        );
        Ok(Self {
            config,
            user,
            store,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn service(&self) -> DirectoryService {
        DirectoryService::new(self.store.clone())
    }

    /// Parse an identifier, filling in the session user
    pub fn unv(&self, text: &str) -> Result<Unv> {
        Ok(Unv::parse_qualified(text, self.user())?)
    }

    /// Fetch a stored template, optionally with its includes flattened
    pub fn load_template(
        &self,
        service: &dyn TemplateService,
        text: &str,
        resolve: bool,
    ) -> Result<Template> {
        let unv = self.unv(text)?;
        let mut template = service.get_template(&unv)?;
        if resolve {
            template.resolve_includes(service)?;
        }
        Ok(template)
    }
}
