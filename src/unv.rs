// src/unv.rs

//! Template and machine identifiers
//!
//! Templates and machines are addressed with a short `[user:]name[@version]`
//! form, referred to as a UNV:
//!
//! - `alice:base` - template `base` owned by `alice`
//! - `alice:base@2` - version `2` of the same template
//! - `base` - template `base` owned by the contextual default user
//!
//! Each component is a run of word characters, dots and hyphens. A trailing
//! `@` with nothing after it means "no version". An explicitly empty user
//! (`:base`) is rejected; omit the user entirely to use the default.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A parsed `[user:]name[@version]` identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Unv {
    pub user: Option<String>,
    pub name: String,
    pub version: Option<String>,
}

fn is_component_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '-'
}

fn validate_component(text: &str, part: &str, original: &str) -> Result<()> {
    if !text.chars().all(is_component_char) {
        return Err(Error::InvalidIdentifier(format!(
            "{} '{}' in '{}' contains invalid characters",
            part, text, original
        )));
    }
    Ok(())
}

impl Unv {
    pub fn new(user: Option<&str>, name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            user: user.map(str::to_string),
            name: name.into(),
            version: version.map(str::to_string),
        }
    }

    /// Parse `[user:]name[@version]`
    ///
    /// The user is left unset when omitted; see [`Unv::parse_with_default`].
    pub fn parse(text: &str) -> Result<Self> {
        let original = text;
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidIdentifier(format!(
                "empty identifier '{}'",
                original
            )));
        }

        let (user, rest) = match text.split_once(':') {
            Some((user, rest)) => {
                if user.is_empty() {
                    return Err(Error::InvalidIdentifier(format!(
                        "empty user in '{}'",
                        original
                    )));
                }
                validate_component(user, "user", original)?;
                (Some(user.to_string()), rest)
            }
            None => (None, text),
        };

        if rest.contains(':') {
            return Err(Error::InvalidIdentifier(format!(
                "unexpected ':' in '{}'",
                original
            )));
        }

        let (name, version) = match rest.split_once('@') {
            Some((name, version)) => (name, version),
            None => (rest, ""),
        };

        if name.is_empty() {
            return Err(Error::InvalidIdentifier(format!(
                "missing name in '{}'",
                original
            )));
        }
        validate_component(name, "name", original)?;
        validate_component(version, "version", original)?;

        Ok(Self {
            user,
            name: name.to_string(),
            version: if version.is_empty() {
                None
            } else {
                Some(version.to_string())
            },
        })
    }

    /// Parse and fill in the user from `default_user` when omitted
    pub fn parse_with_default(text: &str, default_user: Option<&str>) -> Result<Self> {
        let mut unv = Self::parse(text)?;
        if unv.user.is_none() {
            unv.user = default_user.filter(|u| !u.is_empty()).map(str::to_string);
        }
        Ok(unv)
    }

    /// Parse and require a user, explicit or defaulted
    pub fn parse_qualified(text: &str, default_user: Option<&str>) -> Result<Self> {
        let unv = Self::parse_with_default(text, default_user)?;
        if unv.user.is_none() {
            return Err(Error::InvalidIdentifier(format!(
                "no user given for '{}' and no default user available",
                text.trim()
            )));
        }
        Ok(unv)
    }

    /// Canonical `user:name[@version]` string, if the user is known
    pub fn canonical(&self) -> Option<String> {
        self.user.as_ref().map(|_| self.to_string())
    }
}

impl fmt::Display for Unv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{}:", user)?;
        }
        write!(f, "{}", self.name)?;
        if let Some(version) = &self.version {
            write!(f, "@{}", version)?;
        }
        Ok(())
    }
}

impl FromStr for Unv {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
