// src/object/mod.rs

//! Template objects
//!
//! An [`Object`] is a file or script carried by a template, together with the
//! ordered lifecycle actions to perform with it. Content is either inline
//! (`source = "raw"`, with `data`) or external (`source` names a location).
//!
//! Two families of actions exist:
//!
//! - local actions (`copy`, `extract`, `execute` and their `-once` forms),
//!   applied through an [`ActionRunner`] when a template is applied to a
//!   machine
//! - kickstart hooks (`ks-pre`, `ks-pre-install`, `ks-post`, `ks-traceback`,
//!   `ks-command`), which are only rendered into kickstart output
//!
//! Unknown action types are dropped while the object is built.

mod apply;

pub use apply::{ActionRunner, LocalRunner};

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use tracing::debug;

use crate::error::{Error, Result};
use crate::hash::{sha256, short_digest, verify_sha256};
use crate::kickstart::{KsCommand, KsScript, ScriptKind};

/// Action vocabulary understood by objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumIter, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ActionKind {
    Copy,
    CopyOnce,
    Extract,
    ExtractOnce,
    Execute,
    ExecuteOnce,
    KsPre,
    KsPreInstall,
    KsPost,
    KsTraceback,
    KsCommand,
}

impl ActionKind {
    /// Only applied the first time on a given machine
    pub fn is_once(&self) -> bool {
        matches!(
            self,
            ActionKind::CopyOnce | ActionKind::ExtractOnce | ActionKind::ExecuteOnce
        )
    }

    /// Rendered into kickstart output instead of being applied locally
    pub fn is_kickstart(&self) -> bool {
        self.script_kind().is_some() || *self == ActionKind::KsCommand
    }

    /// The kickstart script section this hook renders as
    pub fn script_kind(&self) -> Option<ScriptKind> {
        match self {
            ActionKind::KsPre => Some(ScriptKind::Pre),
            ActionKind::KsPreInstall => Some(ScriptKind::PreInstall),
            ActionKind::KsPost => Some(ScriptKind::Post),
            ActionKind::KsTraceback => Some(ScriptKind::Traceback),
            _ => None,
        }
    }

    pub fn from_script_kind(kind: ScriptKind) -> Self {
        match kind {
            ScriptKind::Pre => ActionKind::KsPre,
            ScriptKind::PreInstall => ActionKind::KsPreInstall,
            ScriptKind::Post => ActionKind::KsPost,
            ScriptKind::Traceback => ActionKind::KsTraceback,
        }
    }
}

/// One action with its free-form parameters (`path`, `priority`, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectAction {
    pub kind: ActionKind,
    pub params: BTreeMap<String, Value>,
}

impl ObjectAction {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Parse either `"type path"` or `{"type": ..., ...}`; `None` when the
    /// entry is malformed or names an unknown type
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => {
                let mut parts = text.split_whitespace();
                let (kind, path) = (parts.next()?, parts.next()?);
                if parts.next().is_some() {
                    return None;
                }
                let kind = kind.parse().ok()?;
                Some(Self::new(kind).with_param("path", path))
            }
            Value::Object(map) => {
                let kind = map.get("type")?.as_str()?.parse().ok()?;
                let params = map
                    .iter()
                    .filter(|(k, _)| k.as_str() != "type")
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Some(Self { kind, params })
            }
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("type".to_string(), Value::String(self.kind.to_string()));
        for (k, v) in &self.params {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn int_param(&self, key: &str) -> Option<i64> {
        match self.params.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn bool_param(&self, key: &str) -> Option<bool> {
        match self.params.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            Value::String(s) => match s.as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Target path for copy/extract actions
    pub fn path(&self) -> Option<&str> {
        self.str_param("path")
    }
}

/// Where an object's content lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectSource {
    /// Inline in `data`
    Raw,
    /// A local path or URL
    External(String),
}

impl ObjectSource {
    pub fn as_str(&self) -> &str {
        match self {
            ObjectSource::Raw => "raw",
            ObjectSource::External(location) => location,
        }
    }

    fn parse(text: &str) -> Self {
        if text == "raw" {
            ObjectSource::Raw
        } else {
            ObjectSource::External(text.to_string())
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChecksumDoc {
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Wire encoding of an object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectDoc {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ChecksumDoc>,
    #[serde(default)]
    pub actions: Vec<Value>,
}

/// A file or script artifact with lifecycle actions
#[derive(Debug, Clone)]
pub struct Object {
    name: String,
    source: Option<ObjectSource>,
    data: Option<String>,
    checksum: Option<String>,
    actions: Vec<ObjectAction>,
}

impl Object {
    /// Build and validate an object
    ///
    /// A supplied checksum must match the inline data. When the source is
    /// raw (or unset) and there is no data, a checksum cannot be verified
    /// and the object is rejected. Inline data without a checksum gets one
    /// computed.
    pub fn new(
        name: Option<String>,
        source: Option<ObjectSource>,
        data: Option<String>,
        checksum: Option<String>,
        actions: Vec<ObjectAction>,
    ) -> Result<Self> {
        let checksum = checksum
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty());
        let inline = matches!(source, None | Some(ObjectSource::Raw));

        let checksum = match (checksum, &data) {
            (Some(expected), Some(data)) if inline => {
                verify_sha256(data.as_bytes(), &expected)
                    .map_err(|e| Error::InvalidObject(e.to_string()))?;
                Some(expected)
            }
            (Some(_), None) if inline => {
                return Err(Error::InvalidObject(
                    "checksum defined without data".to_string(),
                ));
            }
            (Some(expected), _) => Some(expected),
            (None, Some(data)) if inline => Some(sha256(data.as_bytes())),
            (None, _) => None,
        };

        let name = match name.filter(|n| !n.trim().is_empty()) {
            Some(name) => name,
            None => match &checksum {
                Some(xsum) => format!("object-{}", short_digest(xsum)),
                None => {
                    return Err(Error::InvalidObject(
                        "object has neither a name nor content".to_string(),
                    ));
                }
            },
        };

        Ok(Self {
            name,
            source,
            data,
            checksum,
            actions,
        })
    }

    /// Inline object built from a string
    pub fn from_data(name: impl Into<String>, data: impl Into<String>, actions: Vec<ObjectAction>) -> Result<Self> {
        Self::new(Some(name.into()), Some(ObjectSource::Raw), Some(data.into()), None, actions)
    }

    /// Inline object whose data is read from a local file
    pub fn from_file(name: impl Into<String>, path: &Path, actions: Vec<ObjectAction>) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidObject(format!("unable to read data file '{}': {}", path.display(), e))
        })?;
        Self::from_data(name, data, actions)
    }

    /// Build from the wire document form; unknown actions are dropped
    pub fn from_document(doc: &ObjectDoc) -> Result<Self> {
        let actions = doc
            .actions
            .iter()
            .filter_map(|value| {
                let action = ObjectAction::from_value(value);
                if action.is_none() {
                    debug!("dropping unrecognised object action: {}", value);
                }
                action
            })
            .collect();

        Self::new(
            doc.name.clone(),
            doc.source.as_deref().map(ObjectSource::parse),
            doc.data.clone(),
            doc.checksum.as_ref().and_then(|c| c.sha256.clone()),
            actions,
        )
    }

    /// Object holding one kickstart command line
    pub fn from_kickstart_command(command: &KsCommand) -> Result<Self> {
        let xsum = sha256(command.text.as_bytes());
        let action = ObjectAction::new(ActionKind::KsCommand)
            .with_param("priority", command.priority)
            .with_param("command", command.name.clone())
            .with_param("line_no", command.line_no as u64);

        Self::new(
            Some(format!("ks-command-{}", short_digest(&xsum))),
            Some(ObjectSource::Raw),
            Some(command.text.clone()),
            Some(xsum),
            vec![action],
        )
    }

    /// Object holding one kickstart script section
    pub fn from_kickstart_script(script: &KsScript) -> Result<Self> {
        let xsum = sha256(script.body.as_bytes());
        let mut action = ObjectAction::new(ActionKind::from_script_kind(script.kind))
            .with_param("in_chroot", script.in_chroot)
            .with_param("line_no", script.line_no as u64)
            .with_param("error_on_fail", script.error_on_fail);
        if let Some(interp) = &script.interp {
            action = action.with_param("interp", interp.clone());
        }
        if let Some(log) = &script.log {
            action = action.with_param("log", log.clone());
        }

        Self::new(
            Some(format!("ks-script-{}", short_digest(&xsum))),
            Some(ObjectSource::Raw),
            Some(script.body.clone()),
            Some(xsum),
            vec![action],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Option<&ObjectSource> {
        self.source.as_ref()
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    pub fn actions(&self) -> &[ObjectAction] {
        &self.actions
    }

    /// Has a checksum and content that can be obtained
    pub fn is_complete(&self) -> bool {
        self.checksum.is_some()
            && (self.data.is_some() || matches!(self.source, Some(ObjectSource::External(_))))
    }

    /// The single kickstart action of a kickstart-origin object
    fn kickstart_action(&self) -> Option<&ObjectAction> {
        match self.actions.as_slice() {
            [action] if action.kind.is_kickstart() => Some(action),
            _ => None,
        }
    }

    pub fn is_kickstart_command(&self) -> bool {
        self.kickstart_action()
            .is_some_and(|a| a.kind == ActionKind::KsCommand)
    }

    pub fn is_kickstart_script(&self) -> bool {
        self.kickstart_action()
            .is_some_and(|a| a.kind.script_kind().is_some())
    }

    /// Command keyword of a kickstart command object
    pub fn kickstart_command(&self) -> Option<String> {
        let action = self.kickstart_action()?;
        if action.kind != ActionKind::KsCommand {
            return None;
        }
        action
            .str_param("command")
            .map(str::to_string)
            .or_else(|| {
                self.data
                    .as_deref()
                    .and_then(|d| d.split_whitespace().next())
                    .map(str::to_string)
            })
    }

    pub fn kickstart_priority(&self) -> i64 {
        self.kickstart_action()
            .and_then(|a| a.int_param("priority"))
            .unwrap_or(0)
    }

    /// Original line number, used to keep kickstart-origin objects in
    /// source order
    pub fn line_no(&self) -> Option<i64> {
        self.kickstart_action().and_then(|a| a.int_param("line_no"))
    }

    /// Render for kickstart output; `None` for objects that are not
    /// kickstart commands or scripts
    pub fn to_kickstart_text(&self) -> Option<String> {
        let action = self.kickstart_action()?;
        let data = self.data.as_deref().unwrap_or_default();

        match action.kind.script_kind() {
            None => Some(data.trim().to_string()),
            Some(kind) => {
                let script = KsScript {
                    kind,
                    body: data.to_string(),
                    interp: action.str_param("interp").map(str::to_string),
                    in_chroot: action.bool_param("in_chroot").unwrap_or(true),
                    error_on_fail: action.bool_param("error_on_fail").unwrap_or(false),
                    log: action.str_param("log").map(str::to_string),
                    line_no: 0,
                };
                Some(script.render())
            }
        }
    }

    pub fn to_document(&self) -> ObjectDoc {
        ObjectDoc {
            name: Some(self.name.clone()),
            source: self.source.as_ref().map(|s| s.as_str().to_string()),
            data: self.data.clone(),
            checksum: Some(ChecksumDoc {
                sha256: self.checksum.clone(),
            }),
            actions: self.actions.iter().map(ObjectAction::to_value).collect(),
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        match (&self.checksum, &other.checksum) {
            (Some(a), Some(b)) => a == b,
            _ => self.name == other.name,
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(xsum) = &self.checksum {
            write!(f, " ({})", short_digest(xsum))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
    const XYZ: &str = "3608bca1e44ea6c4d268eb6db02260269892c0b42b86bbf1e77a6fa16c3c9282";

    fn doc(value: Value) -> ObjectDoc {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_action_kind_strings() {
        assert_eq!(ActionKind::CopyOnce.to_string(), "copy-once");
        assert_eq!("ks-pre-install".parse::<ActionKind>().unwrap(), ActionKind::KsPreInstall);
        assert!("bogus".parse::<ActionKind>().is_err());
        assert!(ActionKind::ExecuteOnce.is_once());
        assert!(ActionKind::KsCommand.is_kickstart());
        assert!(!ActionKind::Copy.is_kickstart());
    }

    #[test]
    fn test_checksum_validation() {
        let ok = Object::from_document(&doc(json!({
            "name": "abc", "source": "raw", "data": "abc", "checksum": {"sha256": ABC}
        })));
        assert!(ok.is_ok());

        let mismatch = Object::from_document(&doc(json!({
            "name": "abc", "source": "raw", "data": "abc", "checksum": {"sha256": XYZ}
        })));
        assert!(matches!(mismatch, Err(Error::InvalidObject(_))));

        let missing = Object::from_document(&doc(json!({
            "name": "abc", "source": "raw", "checksum": {"sha256": ABC}
        })));
        assert!(matches!(missing, Err(Error::InvalidObject(_))));

        let external = Object::from_document(&doc(json!({
            "name": "blob", "source": "https://example.com/blob", "checksum": {"sha256": ABC}
        })));
        assert!(external.unwrap().is_complete());
    }

    #[test]
    fn test_checksum_computed_for_inline_data() {
        let o = Object::from_data("abc", "abc", vec![]).unwrap();
        assert_eq!(o.checksum(), Some(ABC));
    }

    #[test]
    fn test_actions_filtered() {
        let o = Object::from_document(&doc(json!({
            "name": "motd",
            "data": "hello",
            "actions": [
                "copy /etc/motd",
                "explode /etc/motd",
                "copy",
                {"type": "execute-once", "interp": "/bin/bash"},
                {"type": "nope"},
                {"path": "/tmp/x"},
                42
            ]
        })))
        .unwrap();

        let kinds: Vec<_> = o.actions().iter().map(|a| a.kind).collect();
        assert_eq!(kinds, [ActionKind::Copy, ActionKind::ExecuteOnce]);
        assert_eq!(o.actions()[0].path(), Some("/etc/motd"));
        assert_eq!(o.actions()[1].str_param("interp"), Some("/bin/bash"));
    }

    #[test]
    fn test_equality() {
        let a = Object::from_data("one", "abc", vec![]).unwrap();
        let b = Object::from_data("two", "abc", vec![]).unwrap();
        let c = Object::from_data("one", "xyz", vec![]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let named = Object::new(Some("one".to_string()), None, None, None, vec![]).unwrap();
        assert_eq!(named, a);
    }

    #[test]
    fn test_kickstart_command_object() {
        let cmd = KsCommand {
            name: "part".to_string(),
            text: "part / --size 4096".to_string(),
            priority: 130,
            line_no: 7,
        };
        let o = Object::from_kickstart_command(&cmd).unwrap();
        assert!(o.name().starts_with("ks-command-"));
        assert_eq!(o.name().len(), "ks-command-".len() + 7);
        assert!(o.is_kickstart_command());
        assert!(!o.is_kickstart_script());
        assert_eq!(o.kickstart_command().as_deref(), Some("part"));
        assert_eq!(o.kickstart_priority(), 130);
        assert_eq!(o.line_no(), Some(7));
        assert_eq!(o.to_kickstart_text().unwrap(), "part / --size 4096");
    }

    #[test]
    fn test_kickstart_script_object() {
        let script = KsScript {
            kind: ScriptKind::Post,
            body: "echo hi\n".to_string(),
            interp: Some("/bin/bash".to_string()),
            in_chroot: true,
            error_on_fail: false,
            log: None,
            line_no: 12,
        };
        let o = Object::from_kickstart_script(&script).unwrap();
        assert!(o.name().starts_with("ks-script-"));
        assert!(o.is_kickstart_script());
        assert_eq!(o.actions()[0].kind, ActionKind::KsPost);
        assert_eq!(o.line_no(), Some(12));
        assert_eq!(
            o.to_kickstart_text().unwrap(),
            "%post --interpreter=/bin/bash\necho hi\n%end"
        );
    }

    #[test]
    fn test_document_round_trip() {
        let o = Object::from_data("motd", "hello", vec![
            ObjectAction::new(ActionKind::Copy).with_param("path", "/etc/motd"),
        ])
        .unwrap();
        let value = serde_json::to_value(o.to_document()).unwrap();
        assert_eq!(value["source"], "raw");
        assert_eq!(value["actions"][0]["type"], "copy");
        assert_eq!(value["actions"][0]["path"], "/etc/motd");

        let back = Object::from_document(&serde_json::from_value(value).unwrap()).unwrap();
        assert_eq!(back, o);
        assert_eq!(back.actions(), o.actions());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motd");
        std::fs::write(&path, "abc").unwrap();
        let o = Object::from_file("motd", &path, vec![]).unwrap();
        assert_eq!(o.checksum(), Some(ABC));

        let missing = Object::from_file("gone", &dir.path().join("gone"), vec![]);
        assert!(matches!(missing, Err(Error::InvalidObject(_))));
    }
}
