// src/template/document.rs

//! Template wire documents
//!
//! The stored and transferred form of a template. On input `stub` wins over
//! `name` and `username` is accepted for `user`; on output the stub is
//! written as `name`. Packages are sorted by name and repositories by stub,
//! objects keep their order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Template;
use crate::document::{null_as_default, opt_string_or_list, opt_string_or_number};
use crate::error::Result;
use crate::object::{Object, ObjectDoc};
use crate::package::{Package, PackageDoc};
use crate::repository::{RepoDoc, Repository};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateDoc {
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
    #[serde(default, deserialize_with = "opt_string_or_list")]
    pub includes: Option<Vec<String>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub packages: Vec<PackageDoc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub repos: Vec<RepoDoc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stores: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub objects: Vec<ObjectDoc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: Map<String, Value>,
}

impl Template {
    /// Hydrate from a document into the own layer
    ///
    /// Includes are recorded but not fetched; see
    /// [`Template::resolve_includes`].
    pub fn from_document(doc: &TemplateDoc) -> Result<Self> {
        let mut template = Template::new();
        template.uuid = doc.uuid.clone();
        template.set_user(doc.user.clone());
        match &doc.stub {
            Some(stub) => {
                template.set_name(Some(stub.clone()));
                template.title = doc.title.clone().or_else(|| doc.name.clone());
            }
            None => {
                template.set_name(doc.name.clone());
                template.title = doc.title.clone();
            }
        }
        template.set_version(doc.version.clone());
        template.description = doc.description.clone();
        template.stores = doc.stores.clone();
        template.meta = doc.meta.clone();

        for package in &doc.packages {
            template.own.packages.add(Package::from_document(package)?);
        }
        for repo in &doc.repos {
            template.own.repos.add(Repository::from_document(repo)?);
        }
        for object in &doc.objects {
            template.own.objects.add(Object::from_document(object)?);
        }
        if let Some(includes) = &doc.includes {
            template.set_includes(includes);
        }
        Ok(template)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_document(&serde_json::from_str(text)?)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Self::from_document(&serde_yaml::from_str(text)?)
    }

    /// Document for this template; `resolved` folds in the included layer
    pub fn to_document(&self, resolved: bool) -> TemplateDoc {
        let (packages, repos, objects) = if resolved {
            (self.packages_all(), self.repos_all(), self.objects_all())
        } else {
            (self.packages(), self.repos(), self.objects())
        };

        TemplateDoc {
            uuid: self.uuid.clone(),
            stub: None,
            name: self.name.clone(),
            user: self.user.clone(),
            version: self.version.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            includes: Some(self.includes.clone()),
            packages: packages
                .sorted_by_key(|p| p.name().to_string())
                .iter()
                .map(Package::to_document)
                .collect(),
            repos: repos
                .sorted_by_key(|r| r.stub.clone())
                .iter()
                .map(Repository::to_document)
                .collect(),
            stores: self.stores.clone(),
            objects: objects.iter().map(Object::to_document).collect(),
            meta: self.meta.clone(),
        }
    }

    pub fn to_json(&self, resolved: bool) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_document(resolved))?)
    }

    pub fn to_yaml(&self, resolved: bool) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_document(resolved))?)
    }
}
