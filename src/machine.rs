// src/machine.rs

//! Machine records
//!
//! A machine is a named host owned by a user and tied to the template it
//! was built from. Only the record is kept here; stores, archives and
//! history entries are carried as opaque documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{null_as_default, opt_string_or_number};
use crate::error::Result;
use crate::unv::Unv;

/// Wire form of a machine; same identity keys as a template document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineDoc {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stub: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "username")]
    pub user: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub version: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stores: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub archives: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub history: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Machine {
    pub uuid: Option<String>,
    pub user: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Identifier of the template this machine follows
    pub template: Option<String>,
    pub stores: Vec<Value>,
    pub archives: Vec<Value>,
    pub history: Vec<Value>,
    pub meta: Map<String, Value>,
}

impl Machine {
    /// A new machine named by `[user:]name[@version]`
    pub fn parse(unv: &str, default_user: Option<&str>) -> Result<Self> {
        let unv = Unv::parse_qualified(unv, default_user)?;
        Ok(Self {
            user: unv.user,
            name: Some(unv.name),
            version: unv.version,
            ..Self::default()
        })
    }

    pub fn unv(&self) -> Option<String> {
        let (user, name) = (self.user.as_deref()?, self.name.as_deref()?);
        Some(Unv::new(Some(user), name, self.version.as_deref()).to_string())
    }

    /// Point the machine at a template, normalizing the identifier with the
    /// machine's user as default
    pub fn set_template(&mut self, template: &str) -> Result<()> {
        let unv = Unv::parse_qualified(template, self.user.as_deref())?;
        self.template = Some(unv.to_string());
        Ok(())
    }

    pub fn from_document(doc: &MachineDoc) -> Self {
        let (name, title) = match &doc.stub {
            Some(stub) => (Some(stub.clone()), doc.title.clone().or_else(|| doc.name.clone())),
            None => (doc.name.clone(), doc.title.clone()),
        };
        Self {
            uuid: doc.uuid.clone(),
            user: doc.user.clone().filter(|u| !u.is_empty()),
            name: name.filter(|n| !n.is_empty()),
            version: doc.version.clone(),
            title,
            description: doc.description.clone(),
            template: doc.template.clone(),
            stores: doc.stores.clone(),
            archives: doc.archives.clone(),
            history: doc.history.clone(),
            meta: doc.meta.clone(),
        }
    }

    pub fn to_document(&self) -> MachineDoc {
        MachineDoc {
            uuid: self.uuid.clone(),
            stub: None,
            name: self.name.clone(),
            user: self.user.clone(),
            version: self.version.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            template: self.template.clone(),
            stores: self.stores.clone(),
            archives: self.archives.clone(),
            history: self.history.clone(),
            meta: self.meta.clone(),
        }
    }
}
