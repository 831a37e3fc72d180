// src/kickstart.rs

//! Minimal kickstart reader
//!
//! Splits a kickstart file into the three things templates care about:
//!
//! - commands, each with its write priority and original line
//! - script sections (`%pre`, `%pre-install`, `%post`, `%traceback`)
//! - the `%packages` section and its header options
//!
//! Command arguments are kept verbatim. Interpreting them (beyond `repo`,
//! which the template turns into repositories) is left to the installer.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Commands that may legitimately appear more than once
const REPEATABLE_COMMANDS: &[&str] = &[
    "btrfs", "fcoe", "group", "iscsi", "logvol", "network", "part", "partition", "raid",
    "repo", "sshkey", "user", "volgroup", "zfcp",
];

/// Write priority of a command; lower values are written first
pub fn write_priority(command: &str) -> i64 {
    match command {
        "bootloader" => 10,
        "autopart" | "reqpart" => 100,
        "zerombr" => 110,
        "clearpart" => 120,
        "part" | "partition" => 130,
        "raid" => 131,
        "volgroup" => 132,
        "logvol" => 133,
        "btrfs" => 134,
        _ => 0,
    }
}

pub fn is_repeatable(command: &str) -> bool {
    REPEATABLE_COMMANDS.contains(&command)
}

/// Script section type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    Pre,
    PreInstall,
    Post,
    Traceback,
}

impl ScriptKind {
    /// Section header without the leading `%`
    pub fn section(&self) -> &'static str {
        match self {
            ScriptKind::Pre => "pre",
            ScriptKind::PreInstall => "pre-install",
            ScriptKind::Post => "post",
            ScriptKind::Traceback => "traceback",
        }
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.section())
    }
}

impl FromStr for ScriptKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim_start_matches('%') {
            "pre" => Ok(ScriptKind::Pre),
            "pre-install" => Ok(ScriptKind::PreInstall),
            "post" => Ok(ScriptKind::Post),
            "traceback" => Ok(ScriptKind::Traceback),
            _ => Err(format!("Invalid script section: {}", s)),
        }
    }
}

/// A single kickstart command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KsCommand {
    /// Command keyword (`part`, `keyboard`, ...)
    pub name: String,
    /// Whole command line, trimmed
    pub text: String,
    pub priority: i64,
    pub line_no: usize,
}

/// A script section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KsScript {
    pub kind: ScriptKind,
    pub body: String,
    pub interp: Option<String>,
    pub in_chroot: bool,
    pub error_on_fail: bool,
    pub log: Option<String>,
    /// Line of the section header (1-based)
    pub line_no: usize,
}

impl KsScript {
    /// Render the section back to kickstart text, including `%end`
    pub fn render(&self) -> String {
        let mut out = self.kind.to_string();
        if let Some(interp) = self.interp.as_deref().filter(|i| *i != "/bin/sh") {
            out.push_str(&format!(" --interpreter={}", interp));
        }
        if !self.in_chroot && self.kind == ScriptKind::Post {
            out.push_str(" --nochroot");
        }
        if self.error_on_fail {
            out.push_str(" --erroronfail");
        }
        if let Some(log) = &self.log {
            out.push_str(&format!(" --log={}", log));
        }
        out.push('\n');
        out.push_str(&self.body);
        if !self.body.is_empty() && !self.body.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("%end");
        out
    }
}

/// `%packages` header options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackagesOptions {
    pub default: bool,
    pub exclude_docs: bool,
    pub no_base: bool,
    pub no_core: bool,
    pub handle_missing: bool,
    pub install_langs: Option<String>,
    pub multi_lib: bool,
}

/// The `%packages` section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KsPackages {
    pub options: PackagesOptions,
    /// Package and `@group` entries without a leading `-`
    pub included: Vec<String>,
    /// Entries that had a leading `-`, with it stripped
    pub excluded: Vec<String>,
}

/// A parsed kickstart file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Kickstart {
    pub platform: Option<String>,
    pub commands: Vec<KsCommand>,
    pub scripts: Vec<KsScript>,
    pub packages: Option<KsPackages>,
}

enum Section {
    Script(KsScript),
    Packages(KsPackages),
    Skipped(String),
}

impl Kickstart {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read kickstart '{}': {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut ks = Kickstart::default();
        let mut section: Option<(Section, usize)> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();

            if let Some((current, start)) = section.take() {
                if line == "%end" {
                    ks.close_section(current);
                    continue;
                }
                section = Some((Self::section_line(current, raw, line), start));
                continue;
            }

            if line.is_empty() {
                continue;
            }
            if let Some(platform) = line.strip_prefix("#platform=") {
                ks.platform = Some(platform.trim().to_string());
                continue;
            }
            if line.starts_with('#') {
                continue;
            }

            if let Some(header) = line.strip_prefix('%') {
                section = Some((Self::open_section(header, line_no)?, line_no));
                continue;
            }

            let name = line.split_whitespace().next().unwrap_or_default().to_string();
            ks.commands.push(KsCommand {
                priority: write_priority(&name),
                name,
                text: line.to_string(),
                line_no,
            });
        }

        if let Some((current, start)) = section {
            let header = match &current {
                Section::Script(s) => s.kind.to_string(),
                Section::Packages(_) => "%packages".to_string(),
                Section::Skipped(name) => format!("%{}", name),
            };
            return Err(Error::ParseError(format!(
                "section {} opened on line {} has no %end",
                header, start
            )));
        }

        debug!(
            "Parsed kickstart: {} commands, {} scripts, packages section: {}",
            ks.commands.len(),
            ks.scripts.len(),
            ks.packages.is_some()
        );
        Ok(ks)
    }

    fn open_section(header: &str, line_no: usize) -> Result<Section> {
        let tokens = shell_words::split(header).map_err(|e| {
            Error::ParseError(format!("line {}: unable to tokenize section header: {}", line_no, e))
        })?;
        let Some((name, options)) = tokens.split_first() else {
            return Err(Error::ParseError(format!("line {}: empty section header", line_no)));
        };

        if name == "packages" {
            return Ok(Section::Packages(KsPackages {
                options: parse_packages_options(options),
                ..Default::default()
            }));
        }

        if let Ok(kind) = name.parse::<ScriptKind>() {
            let mut script = KsScript {
                kind,
                body: String::new(),
                interp: None,
                in_chroot: true,
                error_on_fail: false,
                log: None,
                line_no,
            };
            let mut iter = options.iter();
            while let Some(option) = iter.next() {
                let (key, inline) = match option.split_once('=') {
                    Some((k, v)) => (k, Some(v.to_string())),
                    None => (option.as_str(), None),
                };
                let mut value = || inline.clone().or_else(|| iter.next().cloned());
                match key {
                    "--interpreter" => script.interp = value(),
                    "--log" | "--logfile" => script.log = value(),
                    "--nochroot" => script.in_chroot = false,
                    "--erroronfail" => script.error_on_fail = true,
                    other => warn!("line {}: ignoring unknown script option '{}'", line_no, other),
                }
            }
            return Ok(Section::Script(script));
        }

        if name == "include" || name == "ksappend" {
            return Err(Error::ParseError(format!(
                "line {}: %{} is not supported",
                line_no, name
            )));
        }

        warn!("line {}: skipping unsupported section %{}", line_no, name);
        Ok(Section::Skipped(name.to_string()))
    }

    fn section_line(section: Section, raw: &str, line: &str) -> Section {
        match section {
            Section::Script(mut script) => {
                script.body.push_str(raw);
                script.body.push('\n');
                Section::Script(script)
            }
            Section::Packages(mut packages) => {
                if !line.is_empty() && !line.starts_with('#') {
                    match line.strip_prefix('-') {
                        Some(rest) => packages.excluded.push(rest.trim().to_string()),
                        None => packages.included.push(line.to_string()),
                    }
                }
                Section::Packages(packages)
            }
            skipped @ Section::Skipped(_) => skipped,
        }
    }

    fn close_section(&mut self, section: Section) {
        match section {
            Section::Script(script) => self.scripts.push(script),
            Section::Packages(packages) => {
                if self.packages.is_some() {
                    warn!("multiple %packages sections; keeping the last one");
                }
                self.packages = Some(packages);
            }
            Section::Skipped(_) => {}
        }
    }
}

fn parse_packages_options(options: &[String]) -> PackagesOptions {
    let mut parsed = PackagesOptions::default();
    for option in options {
        let (key, value) = match option.split_once('=') {
            Some((k, v)) => (k, Some(v)),
            None => (option.as_str(), None),
        };
        match key {
            "--default" => parsed.default = true,
            "--excludedocs" => parsed.exclude_docs = true,
            "--nobase" => parsed.no_base = true,
            "--nocore" => parsed.no_core = true,
            "--ignoremissing" => parsed.handle_missing = true,
            "--multilib" => parsed.multi_lib = true,
            "--instLangs" | "--inst-langs" | "--installlangs" => {
                parsed.install_langs = Some(value.unwrap_or_default().to_string());
            }
            other => debug!("ignoring %packages option '{}'", other),
        }
    }
    parsed
}
