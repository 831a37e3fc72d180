// src/package.rs

//! Package specifiers
//!
//! A [`Package`] names an installable unit (or a package group) together with
//! an optional epoch/version/release, an optional architecture, and an
//! [`Action`] bitmask describing what a template wants done with it.
//!
//! # Compact form
//!
//! ```text
//! [+~!]name[[#epoch]@version-release][:arch]
//! [+~!]@group name
//! ```
//!
//! - `nginx` - include nginx, any version, any arch
//! - `~sendmail` - exclude sendmail
//! - `!kernel` - ignore kernel when reconciling the system
//! - `bash#1@5.2.26-3:x86_64` - fully qualified
//! - `@Development Tools` - a package group
//!
//! Version and release always travel together. An epoch is only valid in
//! front of a version-release pair.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::opt_string_or_number;
use crate::error::{Error, Result};
use crate::system::NativePackage;

static PACKAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+~!])?([^#@:\s]+)(?:(?:#(\d+))?@([^\s\-:@#]+)-([^:\s\-]+))?(?::(\w+))?$")
        .unwrap()
});

static GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+~!])?(@\^?[\w .\-]+)$").unwrap());

/// Action bitmask carried by packages and repositories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(u32);

impl Action {
    pub const NONE: Action = Action(0);
    pub const INCLUDE: Action = Action(0x01);
    pub const EXCLUDE: Action = Action(0x02);
    pub const IGNORE: Action = Action(0x04);
    pub const GROUP: Action = Action(0x10);
    pub const GROUP_NODEFAULTS: Action = Action(0x20);
    pub const GROUP_OPTIONAL: Action = Action(0x40);
    pub const PIN: Action = Action(0x80);

    pub const fn from_bits(bits: u32) -> Self {
        Action(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set
    pub const fn contains(self, other: Action) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn insert(&mut self, other: Action) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Action) {
        self.0 &= !other.0;
    }

    /// Map a compact-form prefix character to its action
    fn from_prefix(prefix: Option<&str>) -> Self {
        match prefix {
            Some("~") => Action::EXCLUDE,
            Some("!") => Action::IGNORE,
            _ => Action::INCLUDE,
        }
    }
}

impl Default for Action {
    fn default() -> Self {
        Action::INCLUDE
    }
}

impl BitOr for Action {
    type Output = Action;

    fn bitor(self, rhs: Action) -> Action {
        Action(self.0 | rhs.0)
    }
}

/// Wire encoding of a package (`n,e,v,r,a,z`); absent fields are omitted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageDoc {
    pub n: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_string_or_number")]
    pub e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_string_or_number")]
    pub v: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_string_or_number")]
    pub r: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<Action>,
}

/// A single installable unit or package group
///
/// Equality is loose on architecture: a package without an arch matches
/// every arch of the same name, while two different concrete archs never
/// match. This makes `==` non-transitive, which is why [`Package`] is not
/// `Eq` or `Hash`.
#[derive(Debug, Clone)]
pub struct Package {
    name: String,
    epoch: Option<String>,
    version: Option<String>,
    release: Option<String>,
    arch: Option<String>,
    action: Action,
}

impl Package {
    /// An arch-less, version-less package with the default action
    pub fn named(name: impl Into<String>) -> Result<Self> {
        Self::build(name.into(), None, None, None, None, None)
    }

    /// Parse the compact `[+~!]name[[#epoch]@version-release][:arch]` form
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();

        if let Some(caps) = GROUP_RE.captures(spec) {
            let action = Action::from_prefix(caps.get(1).map(|m| m.as_str()));
            return Self::build(caps[2].trim_end().to_string(), None, None, None, None, Some(action));
        }

        let caps = PACKAGE_RE
            .captures(spec)
            .ok_or_else(|| Error::InvalidPackageSpec(format!("unable to parse '{}'", spec)))?;

        let action = Action::from_prefix(caps.get(1).map(|m| m.as_str()));
        let text = |i: usize| caps.get(i).map(|m| m.as_str().to_string());

        Self::build(caps[2].to_string(), text(3), text(4), text(5), text(6), Some(action))
    }

    /// Build from the wire document form
    pub fn from_document(doc: &PackageDoc) -> Result<Self> {
        Self::build(
            doc.n.clone(),
            doc.e.clone(),
            doc.v.clone(),
            doc.r.clone(),
            doc.a.clone(),
            doc.z,
        )
    }

    /// Build from an installed-package record; `evr = false` drops
    /// epoch/version/release so only name and arch remain
    pub fn from_native(native: &NativePackage, evr: bool) -> Result<Self> {
        if evr {
            let epoch = native.epoch.clone().filter(|e| e != "0" && !e.is_empty());
            Self::build(
                native.name.clone(),
                epoch,
                Some(native.version.clone()),
                Some(native.release.clone()),
                native.arch.clone(),
                None,
            )
        } else {
            Self::build(native.name.clone(), None, None, None, native.arch.clone(), None)
        }
    }

    fn build(
        name: String,
        epoch: Option<String>,
        version: Option<String>,
        release: Option<String>,
        arch: Option<String>,
        action: Option<Action>,
    ) -> Result<Self> {
        let blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let (epoch, version, release, arch) = (blank(epoch), blank(version), blank(release), blank(arch));

        if name.trim().is_empty() {
            return Err(Error::InvalidPackageSpec("package name is empty".to_string()));
        }
        if version.is_some() != release.is_some() {
            return Err(Error::InvalidPackageSpec(format!(
                "'{}': version and release must be given together",
                name
            )));
        }
        if let Some(epoch) = &epoch {
            if version.is_none() {
                return Err(Error::InvalidPackageSpec(format!(
                    "'{}': epoch given without version and release",
                    name
                )));
            }
            if !epoch.chars().all(|c| c.is_ascii_digit()) {
                return Err(Error::InvalidPackageSpec(format!(
                    "'{}': epoch '{}' is not numeric",
                    name, epoch
                )));
            }
        }

        let mut action = action.unwrap_or_default();
        if name.starts_with('@') {
            action.insert(Action::GROUP);
        }

        Ok(Self {
            name,
            epoch,
            version,
            release,
            arch,
            action,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn epoch(&self) -> Option<&str> {
        self.epoch.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn release(&self) -> Option<&str> {
        self.release.as_deref()
    }

    pub fn arch(&self) -> Option<&str> {
        self.arch.as_deref()
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn set_action(&mut self, action: Action) {
        self.action = action;
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn included(&self) -> bool {
        self.action.contains(Action::INCLUDE)
    }

    pub fn excluded(&self) -> bool {
        self.action.contains(Action::EXCLUDE)
    }

    pub fn ignored(&self) -> bool {
        self.action.contains(Action::IGNORE)
    }

    pub fn pinned(&self) -> bool {
        self.action.contains(Action::PIN)
    }

    pub fn is_group(&self) -> bool {
        self.action.contains(Action::GROUP) || self.name.starts_with('@')
    }

    /// Group name without the leading `@`
    pub fn group_name(&self) -> &str {
        self.name.trim_start_matches('@')
    }

    /// `[epoch:]version-release`, if versioned
    pub fn evr(&self) -> Option<String> {
        let (version, release) = (self.version.as_ref()?, self.release.as_ref()?);
        Some(match &self.epoch {
            Some(epoch) => format!("{}:{}-{}", epoch, version, release),
            None => format!("{}-{}", version, release),
        })
    }

    /// Package-manager specifier: `name[-[epoch:]version-release][.arch]`
    pub fn to_spec(&self) -> String {
        let mut spec = self.name.clone();
        if let Some(evr) = self.evr() {
            spec.push('-');
            spec.push_str(&evr);
        }
        if let Some(arch) = &self.arch {
            spec.push('.');
            spec.push_str(arch);
        }
        spec
    }

    /// Line for a kickstart `%packages` section; exclusions get a leading `-`
    pub fn to_kickstart(&self) -> String {
        if !self.included() && self.excluded() {
            format!("-{}", self.to_spec())
        } else {
            self.to_spec()
        }
    }

    pub fn to_document(&self) -> PackageDoc {
        PackageDoc {
            n: self.name.clone(),
            e: self.epoch.clone(),
            v: self.version.clone(),
            r: self.release.clone(),
            a: self.arch.clone(),
            z: Some(self.action),
        }
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        if self.name != other.name {
            return false;
        }
        match (&self.arch, &other.arch) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.excluded() && !self.included() {
            write!(f, "~")?;
        } else if self.ignored() && !self.included() {
            write!(f, "!")?;
        }
        write!(f, "{}", self.name)?;
        if let (Some(version), Some(release)) = (&self.version, &self.release) {
            if let Some(epoch) = &self.epoch {
                write!(f, "#{}", epoch)?;
            }
            write!(f, "@{}-{}", version, release)?;
        }
        if let Some(arch) = &self.arch {
            write!(f, ":{}", arch)?;
        }
        Ok(())
    }
}

impl FromStr for Package {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(spec: &str) -> Package {
        Package::parse(spec).unwrap()
    }

    #[test]
    fn test_parse_valid_specs() {
        for spec in ["abc-xyz", "lemon3.3", "pie++", "bar#13@1.2-3", "foo@1.0-1:x86_64"] {
            assert!(Package::parse(spec).is_ok(), "expected '{}' to parse", spec);
        }

        let p = pkg("bar#13@1.2-3:i686");
        assert_eq!(p.name(), "bar");
        assert_eq!(p.epoch(), Some("13"));
        assert_eq!(p.version(), Some("1.2"));
        assert_eq!(p.release(), Some("3"));
        assert_eq!(p.arch(), Some("i686"));
        assert!(p.included());
    }

    #[test]
    fn test_parse_invalid_specs() {
        for spec in [
            "bar@1",
            "bar@1-",
            "bar@-2",
            "bar@1.2-3-2",
            "bar:",
            "bar#1",
            "bar#@1.2-4",
            "bar#1:i586",
            "bar#a@1.2-4",
            "bar#1.1@1.2-3",
            "",
            "two words",
        ] {
            assert!(
                matches!(Package::parse(spec), Err(Error::InvalidPackageSpec(_))),
                "expected '{}' to be rejected",
                spec
            );
        }
    }

    #[test]
    fn test_prefix_actions() {
        assert!(pkg("+foo").included());
        assert!(pkg("~foo").excluded());
        assert!(!pkg("~foo").included());
        assert!(pkg("!foo").ignored());
        assert!(!pkg("!foo").included());
    }

    #[test]
    fn test_groups() {
        let g = pkg("@Development Tools");
        assert!(g.is_group());
        assert!(g.action().contains(Action::GROUP));
        assert_eq!(g.name(), "@Development Tools");
        assert_eq!(g.group_name(), "Development Tools");

        let g = pkg("~@core");
        assert!(g.is_group());
        assert!(g.excluded());
    }

    #[test]
    fn test_arch_wildcard_equality() {
        let p = pkg("foo");
        let p2 = pkg("foo:x86_64");
        let p3 = pkg("foo:i386");
        assert_eq!(p, p2);
        assert_eq!(p, p3);
        assert_ne!(p2, p3);
        assert_ne!(p, pkg("bar"));
    }

    #[test]
    fn test_to_spec() {
        let spec = pkg("foo@1.0-1:x86_64").to_spec();
        assert_eq!(spec, "foo-1.0-1.x86_64");
        assert!(spec.contains("foo") && spec.contains("1.0-1") && spec.ends_with(".x86_64"));

        assert_eq!(pkg("bar#2@3.1-4").to_spec(), "bar-2:3.1-4");
        assert_eq!(pkg("baz").to_spec(), "baz");
    }

    #[test]
    fn test_to_kickstart() {
        assert_eq!(pkg("nginx").to_kickstart(), "nginx");
        assert_eq!(pkg("~apache").to_kickstart(), "-apache");
        assert_eq!(pkg("~@core").to_kickstart(), "-@core");
    }

    #[test]
    fn test_display_reparses() {
        for spec in ["~bar#13@1.2-3:x86_64", "!kernel", "nginx", "@Web Server"] {
            let p = pkg(spec);
            let again = pkg(&p.to_string());
            assert_eq!(p.to_string(), again.to_string());
            assert_eq!(p.action(), again.action());
        }
    }

    #[test]
    fn test_document_round_trip() {
        let doc: PackageDoc = serde_json::from_str(r#"{"n":"foo","e":1,"v":"2","r":"3","a":"noarch"}"#).unwrap();
        let p = Package::from_document(&doc).unwrap();
        assert_eq!(p.epoch(), Some("1"));
        assert!(p.included());

        let json = serde_json::to_value(p.to_document()).unwrap();
        assert_eq!(json["n"], "foo");
        assert_eq!(json["e"], "1");
        assert_eq!(json["z"], 1);

        let bare = serde_json::to_value(pkg("bar").to_document()).unwrap();
        assert!(bare.get("v").is_none());
        assert!(bare.get("a").is_none());
    }

    #[test]
    fn test_document_pairing_enforced() {
        let doc = PackageDoc {
            n: "foo".to_string(),
            v: Some("1".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Package::from_document(&doc),
            Err(Error::InvalidPackageSpec(_))
        ));
    }

    #[test]
    fn test_from_native_strips_evr() {
        let native = NativePackage {
            name: "vim".to_string(),
            epoch: Some("2".to_string()),
            version: "9.1".to_string(),
            release: "1.fc40".to_string(),
            arch: Some("x86_64".to_string()),
        };
        let full = Package::from_native(&native, true).unwrap();
        assert_eq!(full.to_spec(), "vim-2:9.1-1.fc40.x86_64");

        let bare = Package::from_native(&native, false).unwrap();
        assert_eq!(bare.to_spec(), "vim.x86_64");
    }
}
