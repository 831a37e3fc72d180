// src/repository.rs

//! Package repositories
//!
//! A [`Repository`] describes one package source a template wants enabled
//! (or, with the EXCLUDE action, disabled). Repositories are identified by
//! their stub alone; every other field is descriptive.
//!
//! Repositories arrive in three shapes: a kickstart `repo` command line, the
//! compact wire document, or a record read back from the native package
//! manager. They leave as a kickstart line, a wire document, or a dnf
//! `.repo` section.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::{
    opt_bool_lenient, opt_number_or_string, opt_string_or_list, opt_string_or_number, split_list,
};
use crate::error::{Error, Result};
use crate::package::Action;
use crate::system::NativeRepo;

/// Wire encoding of a repository; absent fields are omitted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_string_or_list")]
    pub bu: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ma: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_bool_lenient")]
    pub e: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_bool_lenient")]
    pub gc: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_string_or_list")]
    pub gk: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_string_or_number")]
    pub me: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_number_or_string")]
    pub c: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_number_or_string")]
    pub p: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_bool_lenient")]
    pub i: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_string_or_list")]
    pub xp: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_string_or_list")]
    pub ip: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub px: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_bool_lenient")]
    pub ig: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_bool_lenient")]
    pub nv: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<Action>,
}

/// Derive a stub from a display name
///
/// Lowercases, turns whitespace into hyphens, and collapses hyphen runs:
/// `"Korora 23 - Updates"` becomes `"korora-23-updates"`.
pub fn derive_stub(name: &str) -> String {
    let mut stub = String::with_capacity(name.len());
    for c in name.trim().chars() {
        let c = if c.is_whitespace() { '-' } else { c.to_ascii_lowercase() };
        if c == '-' && stub.ends_with('-') {
            continue;
        }
        stub.push(c);
    }
    stub
}

/// Double-quote a kickstart option value when it would not survive
/// tokenizing as-is
fn quote_value(value: &str) -> String {
    if value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\'))
    {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// A package repository
#[derive(Debug, Clone, Default)]
pub struct Repository {
    pub stub: String,
    pub name: Option<String>,
    pub baseurl: Option<Vec<String>>,
    pub mirrorlist: Option<String>,
    pub metalink: Option<String>,
    pub gpgkey: Option<Vec<String>>,
    pub gpgcheck: Option<bool>,
    pub enabled: Option<bool>,
    pub cost: Option<i64>,
    pub priority: Option<i64>,
    pub meta_expired: Option<String>,
    pub exclude_packages: Option<Vec<String>>,
    pub include_packages: Option<Vec<String>>,
    pub proxy: Option<String>,
    pub ignoregroups: Option<bool>,
    pub noverifyssl: Option<bool>,
    pub install: Option<bool>,
    pub action: Action,
}

impl Repository {
    /// A repository with only a stub, typically a reference to an existing one
    pub fn with_stub(stub: impl Into<String>) -> Result<Self> {
        let stub = stub.into();
        if stub.trim().is_empty() {
            return Err(Error::InvalidRepoSpec("repository stub is empty".to_string()));
        }
        Ok(Self {
            stub,
            ..Default::default()
        })
    }

    /// A named repository whose stub is derived from the name
    pub fn with_name(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let mut repo = Self::with_stub(derive_stub(&name))?;
        repo.name = Some(name);
        Ok(repo)
    }

    /// Parse a kickstart `repo --name=... [options]` line, or a bare
    /// `[~]name` reference to a repository by stub
    pub fn parse_kickstart_line(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(Error::InvalidRepoSpec("empty repository line".to_string()));
        }

        let is_command = line == "repo"
            || line
                .strip_prefix("repo")
                .is_some_and(|rest| rest.starts_with(char::is_whitespace));

        if !is_command {
            return Self::parse_reference(line);
        }

        let tokens = shell_words::split(line)
            .map_err(|e| Error::InvalidRepoSpec(format!("unable to tokenize '{}': {}", line, e)))?;

        let mut repo = Self::default();
        for token in tokens.iter().skip(1) {
            repo.apply_option(token)?;
        }

        let name = repo
            .name
            .clone()
            .ok_or_else(|| Error::InvalidRepoSpec(format!("missing --name in '{}'", line)))?;
        repo.stub = derive_stub(&name);
        if repo.stub.is_empty() {
            return Err(Error::InvalidRepoSpec(format!("empty --name in '{}'", line)));
        }

        repo.validate()?;
        Ok(repo)
    }

    fn parse_reference(text: &str) -> Result<Self> {
        let (action, name) = match text.strip_prefix('~') {
            Some(rest) => (Action::EXCLUDE, rest.trim()),
            None => (Action::INCLUDE, text),
        };
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(Error::InvalidRepoSpec(format!(
                "'{}' is neither a repo command nor a repository name",
                text
            )));
        }
        let mut repo = Self::with_stub(derive_stub(name))?;
        repo.action = action;
        Ok(repo)
    }

    fn apply_option(&mut self, token: &str) -> Result<()> {
        let option = token.strip_prefix("--").ok_or_else(|| {
            Error::InvalidRepoSpec(format!("unexpected argument '{}'", token))
        })?;
        let (key, value) = match option.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (option, None),
        };

        let required = |value: Option<&str>| -> Result<String> {
            value
                .map(str::to_string)
                .ok_or_else(|| Error::InvalidRepoSpec(format!("--{} requires a value", key)))
        };
        let flag = |value: Option<&str>| -> Result<bool> {
            match value {
                None => Ok(true),
                Some(v) => Err(Error::InvalidRepoSpec(format!(
                    "--{} does not take a value (got '{}')",
                    key, v
                ))),
            }
        };

        match key {
            "name" => self.name = Some(required(value)?),
            "baseurl" => self.baseurl = Some(split_list(&required(value)?)),
            "mirrorlist" => self.mirrorlist = Some(required(value)?),
            "metalink" => self.metalink = Some(required(value)?),
            "cost" => {
                let raw = required(value)?;
                let cost = raw.trim().parse().map_err(|_| {
                    Error::InvalidRepoSpec(format!("--cost expects an integer, got '{}'", raw))
                })?;
                self.cost = Some(cost);
            }
            "excludepkgs" => self.exclude_packages = Some(split_list(&required(value)?)),
            "includepkgs" => self.include_packages = Some(split_list(&required(value)?)),
            "proxy" => self.proxy = Some(required(value)?),
            "ignoregroups" => {
                let raw = required(value)?;
                self.ignoregroups = Some(match raw.to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" | "on" => true,
                    "false" | "0" | "no" | "off" => false,
                    _ => {
                        return Err(Error::InvalidRepoSpec(format!(
                            "--ignoregroups expects true or false, got '{}'",
                            raw
                        )));
                    }
                });
            }
            "noverifyssl" => self.noverifyssl = Some(flag(value)?),
            "install" => self.install = Some(flag(value)?),
            other => {
                return Err(Error::InvalidRepoSpec(format!(
                    "unsupported repo option '--{}'",
                    other
                )));
            }
        }
        Ok(())
    }

    /// Reject conflicting sources
    pub fn validate(&self) -> Result<()> {
        let sources = [
            self.baseurl.as_ref().is_some_and(|b| !b.is_empty()),
            self.mirrorlist.is_some(),
            self.metalink.is_some(),
        ];
        if sources.iter().filter(|s| **s).count() > 1 {
            return Err(Error::InvalidRepoSpec(format!(
                "repository '{}' may only use one of baseurl, mirrorlist or metalink",
                self.stub
            )));
        }
        Ok(())
    }

    /// Build from the wire document form
    pub fn from_document(doc: &RepoDoc) -> Result<Self> {
        let stub = match (&doc.s, &doc.n) {
            (Some(stub), _) if !stub.trim().is_empty() => stub.clone(),
            (_, Some(name)) => derive_stub(name),
            _ => {
                return Err(Error::InvalidRepoSpec(
                    "repository document has neither stub nor name".to_string(),
                ));
            }
        };

        let repo = Self {
            stub,
            name: doc.n.clone(),
            baseurl: doc.bu.clone(),
            mirrorlist: doc.ml.clone(),
            metalink: doc.ma.clone(),
            gpgkey: doc.gk.clone(),
            gpgcheck: doc.gc,
            enabled: doc.e,
            cost: doc.c,
            priority: doc.p,
            meta_expired: doc.me.clone(),
            exclude_packages: doc.xp.clone(),
            include_packages: doc.ip.clone(),
            proxy: doc.px.clone(),
            ignoregroups: doc.ig,
            noverifyssl: doc.nv,
            install: doc.i,
            action: doc.z.unwrap_or_default(),
        };
        repo.validate()?;
        Ok(repo)
    }

    /// Build from a repository record reported by the package manager
    pub fn from_native(native: &NativeRepo) -> Result<Self> {
        let mut repo = Self::with_stub(native.id.clone())?;
        let non_empty = |v: &Vec<String>| (!v.is_empty()).then(|| v.clone());

        repo.name = native.name.clone();
        repo.baseurl = non_empty(&native.baseurl);
        repo.mirrorlist = native.mirrorlist.clone();
        repo.metalink = native.metalink.clone();
        repo.gpgkey = non_empty(&native.gpgkey);
        repo.gpgcheck = native.gpgcheck;
        repo.enabled = Some(native.enabled);
        repo.cost = native.cost;
        repo.priority = native.priority;
        repo.exclude_packages = non_empty(&native.exclude);
        repo.include_packages = non_empty(&native.include);

        // A mirrored repo can report both; the mirror source is authoritative.
        if repo.metalink.is_some() {
            repo.mirrorlist = None;
            repo.baseurl = None;
        } else if repo.mirrorlist.is_some() {
            repo.baseurl = None;
        }
        Ok(repo)
    }

    pub fn included(&self) -> bool {
        self.action.contains(Action::INCLUDE)
    }

    pub fn excluded(&self) -> bool {
        self.action.contains(Action::EXCLUDE)
    }

    /// Display name, falling back to the stub
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.stub)
    }

    /// Render as a kickstart `repo` command
    ///
    /// Options come out in a fixed order: name, source, cost, excludepkgs,
    /// includepkgs, proxy, ignoregroups, noverifyssl, install.
    pub fn to_kickstart_line(&self) -> String {
        let name = self.display_name().replace('\\', "\\\\").replace('"', "\\\"");
        let mut line = format!("repo --name=\"{}\"", name);

        let mut push = |option: &str, value: &str| {
            line.push_str(&format!(" --{}={}", option, quote_value(value)));
        };

        if let Some(baseurl) = self.baseurl.as_ref().filter(|b| !b.is_empty()) {
            push("baseurl", &baseurl.join(","));
        } else if let Some(mirrorlist) = &self.mirrorlist {
            push("mirrorlist", mirrorlist);
        } else if let Some(metalink) = &self.metalink {
            push("metalink", metalink);
        }
        if let Some(cost) = self.cost {
            push("cost", &cost.to_string());
        }
        if let Some(exclude) = self.exclude_packages.as_ref().filter(|v| !v.is_empty()) {
            push("excludepkgs", &exclude.join(","));
        }
        if let Some(include) = self.include_packages.as_ref().filter(|v| !v.is_empty()) {
            push("includepkgs", &include.join(","));
        }
        if let Some(proxy) = &self.proxy {
            push("proxy", proxy);
        }
        if self.ignoregroups == Some(true) {
            push("ignoregroups", "true");
        }
        if self.noverifyssl == Some(true) {
            line.push_str(" --noverifyssl");
        }
        if self.install == Some(true) {
            line.push_str(" --install");
        }
        line
    }

    pub fn to_document(&self) -> RepoDoc {
        RepoDoc {
            s: Some(self.stub.clone()),
            n: self.name.clone(),
            bu: self.baseurl.clone(),
            ml: self.mirrorlist.clone(),
            ma: self.metalink.clone(),
            e: self.enabled,
            gc: self.gpgcheck,
            gk: self.gpgkey.clone(),
            me: self.meta_expired.clone(),
            c: self.cost,
            p: self.priority,
            i: self.install,
            xp: self.exclude_packages.clone(),
            ip: self.include_packages.clone(),
            px: self.proxy.clone(),
            ig: self.ignoregroups,
            nv: self.noverifyssl,
            z: Some(self.action),
        }
    }

    /// Render a dnf `.repo` section under the given section id
    pub fn to_repo_config(&self, section: &str) -> String {
        let mut out = format!("[{}]\nname={}\n", section, self.display_name());
        let bool_str = |b: bool| if b { "1" } else { "0" };

        if let Some(baseurl) = self.baseurl.as_ref().filter(|b| !b.is_empty()) {
            out.push_str(&format!("baseurl={}\n", baseurl.join(" ")));
        }
        if let Some(mirrorlist) = &self.mirrorlist {
            out.push_str(&format!("mirrorlist={}\n", mirrorlist));
        }
        if let Some(metalink) = &self.metalink {
            out.push_str(&format!("metalink={}\n", metalink));
        }
        let enabled = self.enabled.unwrap_or(true) && !self.excluded();
        out.push_str(&format!("enabled={}\n", bool_str(enabled)));
        if let Some(gpgcheck) = self.gpgcheck {
            out.push_str(&format!("gpgcheck={}\n", bool_str(gpgcheck)));
        }
        if let Some(gpgkey) = self.gpgkey.as_ref().filter(|k| !k.is_empty()) {
            out.push_str(&format!("gpgkey={}\n", gpgkey.join(" ")));
        }
        if let Some(cost) = self.cost {
            out.push_str(&format!("cost={}\n", cost));
        }
        if let Some(priority) = self.priority {
            out.push_str(&format!("priority={}\n", priority));
        }
        if let Some(expire) = &self.meta_expired {
            out.push_str(&format!("metadata_expire={}\n", expire));
        }
        if let Some(exclude) = self.exclude_packages.as_ref().filter(|v| !v.is_empty()) {
            out.push_str(&format!("excludepkgs={}\n", exclude.join(",")));
        }
        if let Some(include) = self.include_packages.as_ref().filter(|v| !v.is_empty()) {
            out.push_str(&format!("includepkgs={}\n", include.join(",")));
        }
        if let Some(proxy) = &self.proxy {
            out.push_str(&format!("proxy={}\n", proxy));
        }
        if self.noverifyssl == Some(true) {
            out.push_str("sslverify=0\n");
        }
        out
    }
}

impl PartialEq for Repository {
    fn eq(&self, other: &Self) -> bool {
        self.stub == other.stub
    }
}

impl Eq for Repository {}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.excluded() && !self.included() {
            write!(f, "~")?;
        }
        write!(f, "{}", self.stub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ks(line: &str) -> Repository {
        Repository::parse_kickstart_line(line).unwrap()
    }

    #[test]
    fn test_derive_stub() {
        assert_eq!(derive_stub("Korora 23 - i386 - Updates"), "korora-23-i386-updates");
        assert_eq!(derive_stub("updates"), "updates");
        assert_eq!(derive_stub("  Fedora  Everything "), "fedora-everything");
    }

    #[test]
    fn test_parse_quoted_name() {
        let r = ks(r#"repo --name="Korora 23 - i386 - Updates" --baseurl=http://a/x,http://b/x"#);
        assert_eq!(r.name.as_deref(), Some("Korora 23 - i386 - Updates"));
        assert_eq!(r.stub, "korora-23-i386-updates");
        assert_eq!(r.baseurl.as_ref().unwrap().len(), 2);
        assert!(r.included());
    }

    #[test]
    fn test_parse_all_options() {
        let r = ks(concat!(
            "repo --name=updates --mirrorlist=http://m/list --cost=\"100\" ",
            "--excludepkgs=kernel,grub2, --includepkgs=foo --proxy=http://proxy:3128 ",
            "--ignoregroups=true --noverifyssl --install"
        ));
        assert_eq!(r.mirrorlist.as_deref(), Some("http://m/list"));
        assert_eq!(r.cost, Some(100));
        assert_eq!(r.exclude_packages.as_ref().unwrap(), &vec!["kernel", "grub2"]);
        assert_eq!(r.include_packages.as_ref().unwrap(), &vec!["foo"]);
        assert_eq!(r.proxy.as_deref(), Some("http://proxy:3128"));
        assert_eq!(r.ignoregroups, Some(true));
        assert_eq!(r.noverifyssl, Some(true));
        assert_eq!(r.install, Some(true));
    }

    #[test]
    fn test_parse_rejections() {
        for line in [
            "repo --baseurl=U1 --mirrorlist=U2",
            "repo --name=x --baseurl=U1 --mirrorlist=U2",
            "repo --name=x --metalink=M --baseurl=U1",
            "repo --name=x --ignoregroups",
            "repo --name=x --ignoregroups=maybe",
            "repo --name=x --cost=cheap",
            "repo --name=x --bogus=1",
            "repo --name=x --install=yes",
            "repo --baseurl=http://a",
            "repo --name=\"unterminated",
            "two words",
            "",
        ] {
            assert!(
                matches!(Repository::parse_kickstart_line(line), Err(Error::InvalidRepoSpec(_))),
                "expected '{}' to be rejected",
                line
            );
        }
    }

    #[test]
    fn test_bare_reference() {
        let r = ks("updates");
        assert_eq!(r.stub, "updates");
        assert!(r.name.is_none());
        assert!(r.included());

        let r = ks("~updates-testing");
        assert_eq!(r.stub, "updates-testing");
        assert!(r.excluded());
    }

    #[test]
    fn test_kickstart_round_trip() {
        let mut r = Repository::with_name("My Repo").unwrap();
        r.baseurl = Some(vec!["http://a/x?arch=1&b=2".to_string(), "http://b/x".to_string()]);
        r.cost = Some(50);
        r.exclude_packages = Some(vec!["a".to_string(), "b".to_string()]);
        r.proxy = Some("http://proxy:8080".to_string());
        r.install = Some(true);

        let line = r.to_kickstart_line();
        assert!(line.starts_with("repo --name=\"My Repo\" --baseurl="));

        let again = ks(&line);
        assert_eq!(again, r);
        assert_eq!(again.name, r.name);
        assert_eq!(again.baseurl, r.baseurl);
        assert_eq!(again.cost, r.cost);
        assert_eq!(again.exclude_packages, r.exclude_packages);
        assert_eq!(again.proxy, r.proxy);
        assert_eq!(again.install, r.install);
        assert_eq!(again.to_kickstart_line(), line);
    }

    #[test]
    fn test_option_order() {
        let r = ks("repo --install --noverifyssl --ignoregroups=true --proxy=p --includepkgs=i --excludepkgs=x --cost=1 --baseurl=u --name=n");
        assert_eq!(
            r.to_kickstart_line(),
            "repo --name=\"n\" --baseurl=u --cost=1 --excludepkgs=x --includepkgs=i --proxy=p --ignoregroups=true --noverifyssl --install"
        );
    }

    #[test]
    fn test_equality_by_stub() {
        let a = ks("repo --name=updates --baseurl=U1");
        let b = ks("repo --name=updates --mirrorlist=U2");
        assert_eq!(a, b);
        assert_ne!(a, ks("repo --name=other --baseurl=U1"));
    }

    #[test]
    fn test_document_round_trip() {
        let json = r#"{"s":"fedora","n":"Fedora","bu":"http://a,http://b","e":1,"gc":"true","c":"10","xp":["x"],"z":1}"#;
        let doc: RepoDoc = serde_json::from_str(json).unwrap();
        let r = Repository::from_document(&doc).unwrap();
        assert_eq!(r.stub, "fedora");
        assert_eq!(r.baseurl.as_ref().unwrap().len(), 2);
        assert_eq!(r.enabled, Some(true));
        assert_eq!(r.gpgcheck, Some(true));
        assert_eq!(r.cost, Some(10));

        let out = serde_json::to_value(r.to_document()).unwrap();
        assert_eq!(out["s"], "fedora");
        assert_eq!(out["c"], 10);
        assert!(out.get("ml").is_none());
    }

    #[test]
    fn test_document_without_stub_derives_it() {
        let doc = RepoDoc {
            n: Some("Extra Stuff".to_string()),
            ..Default::default()
        };
        assert_eq!(Repository::from_document(&doc).unwrap().stub, "extra-stuff");
        assert!(Repository::from_document(&RepoDoc::default()).is_err());
    }

    #[test]
    fn test_repo_config() {
        let r = ks("repo --name=\"Updates\" --baseurl=http://a --noverifyssl --excludepkgs=k");
        let cfg = r.to_repo_config("strata_updates");
        assert!(cfg.starts_with("[strata_updates]\nname=Updates\n"));
        assert!(cfg.contains("baseurl=http://a\n"));
        assert!(cfg.contains("enabled=1\n"));
        assert!(cfg.contains("excludepkgs=k\n"));
        assert!(cfg.contains("sslverify=0\n"));
    }

    #[test]
    fn test_from_native_prefers_mirror_source() {
        let native = NativeRepo {
            id: "fedora".to_string(),
            name: Some("Fedora 40".to_string()),
            baseurl: vec!["http://a".to_string()],
            metalink: Some("http://meta".to_string()),
            enabled: true,
            ..Default::default()
        };
        let r = Repository::from_native(&native).unwrap();
        assert!(r.baseurl.is_none());
        assert_eq!(r.metalink.as_deref(), Some("http://meta"));
        assert!(r.validate().is_ok());
    }
}
