// src/commands/config.rs
//! Configuration commands

use anyhow::{Result, anyhow, bail};

use super::Session;

/// Split `section.key`
fn split_key(key: &str) -> Result<(&str, &str)> {
    key.split_once('.')
        .filter(|(section, name)| !section.is_empty() && !name.is_empty())
        .ok_or_else(|| anyhow!("Invalid setting '{}', expected section.key", key))
}

pub fn cmd_config_get(session: &Session, key: &str) -> Result<()> {
    let (section, name) = split_key(key)?;
    match session.config().get(section, name) {
        Some(value) => {
            println!("{}", value);
            Ok(())
        }
        None => bail!("{} is not set", key),
    }
}

pub fn cmd_config_set(session: &mut Session, key: &str, value: &str) -> Result<()> {
    let (section, name) = split_key(key)?;
    let config = session.config_mut();
    config.set(section, name, value);
    config.save()?;
    Ok(())
}

pub fn cmd_config_unset(session: &mut Session, key: &str) -> Result<()> {
    let (section, name) = split_key(key)?;
    let config = session.config_mut();
    if !config.unset(section, name) {
        bail!("{} is not set in {}", key, config_path(config));
    }
    config.save()?;
    Ok(())
}

pub fn cmd_config_list(session: &Session) -> Result<()> {
    for (key, value) in session.config().entries() {
        println!("{} = {}", key, value);
    }
    Ok(())
}

fn config_path(config: &strata::Config) -> String {
    config
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "the user configuration".to_string())
}
