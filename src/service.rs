// src/service.rs

//! Template and machine storage
//!
//! [`TemplateService`] is what the rest of the crate talks to. Both
//! backends store plain JSON documents keyed by user and name:
//!
//! - [`DirectoryService`]: `<root>/templates/<user>/<name>.json` and
//!   `<root>/machines/<user>/<name>.json`
//! - [`MemoryService`]: an in-process map, for tests and embedding
//!
//! Include resolution lives here as well, since fetching included
//! templates is the only part of flattening that needs storage.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::machine::{Machine, MachineDoc};
use crate::template::{Include, Template, TemplateDoc};
use crate::unv::Unv;

/// Deepest include chain followed before giving up
pub const MAX_INCLUDE_DEPTH: usize = 16;

/// Filter for [`TemplateService::list_templates`]
#[derive(Debug, Clone, Default)]
pub struct TemplateQuery {
    pub user: Option<String>,
    /// Substring of the template name
    pub name: Option<String>,
    pub public_only: bool,
}

/// One row of a template listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSummary {
    pub unv: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub public: bool,
}

/// Storage for templates and machines
pub trait TemplateService {
    fn get_template(&self, unv: &Unv) -> Result<Template>;

    /// Store a new template; fails if one with the same user and name exists
    fn create_template(&mut self, template: &Template) -> Result<Template>;

    /// Replace a stored template's own membership with `own ∪ delta`
    fn update_template(&mut self, template: &Template) -> Result<Template>;

    fn delete_template(&mut self, unv: &Unv) -> Result<()>;

    fn list_templates(&self, query: &TemplateQuery) -> Result<Vec<TemplateSummary>>;

    fn get_machine(&self, unv: &Unv) -> Result<Machine>;

    fn create_machine(&mut self, machine: &Machine) -> Result<Machine>;

    fn update_machine(&mut self, machine: &Machine) -> Result<Machine>;

    fn delete_machine(&mut self, unv: &Unv) -> Result<()>;

    fn list_machines(&self, user: Option<&str>) -> Result<Vec<Machine>>;
}

/// Document collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    Templates,
    Machines,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Templates => "templates",
            Collection::Machines => "machines",
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Collection::Templates => "template",
            Collection::Machines => "machine",
        }
    }
}

/// Raw keyed document storage underneath a [`TemplateService`]
pub trait DocumentStore {
    fn read(&self, collection: Collection, user: &str, name: &str) -> Result<Option<Value>>;

    fn write(&mut self, collection: Collection, user: &str, name: &str, doc: &Value) -> Result<()>;

    /// Returns whether a document was removed
    fn remove(&mut self, collection: Collection, user: &str, name: &str) -> Result<bool>;

    fn list(&self, collection: Collection) -> Result<Vec<Value>>;
}

fn identity<'a>(collection: Collection, unv: &'a Unv) -> Result<(&'a str, &'a str)> {
    let user = unv.user.as_deref().ok_or_else(|| {
        Error::InvalidIdentifier(format!("{} '{}' has no user", collection.kind(), unv))
    })?;
    Ok((user, unv.name.as_str()))
}

fn document_identity(collection: Collection, user: Option<&str>, name: Option<&str>) -> Result<Unv> {
    match (user, name) {
        (Some(user), Some(name)) => Ok(Unv::new(Some(user), name, None)),
        _ => Err(Error::InvalidIdentifier(format!(
            "{} needs a user and a name to be stored",
            collection.kind()
        ))),
    }
}

fn check_version(collection: Collection, unv: &Unv, stored: Option<&str>) -> Result<()> {
    match &unv.version {
        Some(wanted) if Some(wanted.as_str()) != stored => Err(Error::NotFoundError(format!(
            "{} '{}' (stored version: {})",
            collection.kind(),
            unv,
            stored.unwrap_or("none")
        ))),
        _ => Ok(()),
    }
}

fn not_found(collection: Collection, unv: &Unv) -> Error {
    Error::NotFoundError(format!("{} '{}'", collection.kind(), unv))
}

impl<S: DocumentStore> TemplateService for S {
    fn get_template(&self, unv: &Unv) -> Result<Template> {
        let (user, name) = identity(Collection::Templates, unv)?;
        let value = self
            .read(Collection::Templates, user, name)?
            .ok_or_else(|| not_found(Collection::Templates, unv))?;
        let doc: TemplateDoc = serde_json::from_value(value)?;
        check_version(Collection::Templates, unv, doc.version.as_deref())?;
        Template::from_document(&doc)
    }

    fn create_template(&mut self, template: &Template) -> Result<Template> {
        let unv = document_identity(Collection::Templates, template.user(), template.name())?;
        let (user, name) = identity(Collection::Templates, &unv)?;
        if self.read(Collection::Templates, user, name)?.is_some() {
            return Err(Error::ConflictError(format!("template '{}' already exists", unv)));
        }

        let mut doc = template.to_document(false);
        if doc.uuid.is_none() {
            doc.uuid = Some(uuid::Uuid::new_v4().to_string());
        }
        self.write(Collection::Templates, user, name, &serde_json::to_value(&doc)?)?;
        info!("Created template {}", unv);
        Template::from_document(&doc)
    }

    fn update_template(&mut self, template: &Template) -> Result<Template> {
        let unv = document_identity(Collection::Templates, template.user(), template.name())?;
        let (user, name) = identity(Collection::Templates, &unv)?;
        let stored: TemplateDoc = match self.read(Collection::Templates, user, name)? {
            Some(value) => serde_json::from_value(value)?,
            None => return Err(not_found(Collection::Templates, &unv)),
        };

        let mut doc = template.to_document(false);
        if doc.uuid.is_none() {
            doc.uuid = stored.uuid;
        }
        self.write(Collection::Templates, user, name, &serde_json::to_value(&doc)?)?;
        info!("Updated template {}", unv);
        Template::from_document(&doc)
    }

    fn delete_template(&mut self, unv: &Unv) -> Result<()> {
        let (user, name) = identity(Collection::Templates, unv)?;
        if !self.remove(Collection::Templates, user, name)? {
            return Err(not_found(Collection::Templates, unv));
        }
        info!("Deleted template {}", unv);
        Ok(())
    }

    fn list_templates(&self, query: &TemplateQuery) -> Result<Vec<TemplateSummary>> {
        let mut summaries = Vec::new();
        for value in self.list(Collection::Templates)? {
            let template = match serde_json::from_value::<TemplateDoc>(value)
                .map_err(Error::from)
                .and_then(|doc| Template::from_document(&doc))
            {
                Ok(template) => template,
                Err(e) => {
                    warn!("Skipping unreadable template document: {}", e);
                    continue;
                }
            };

            if query.user.as_deref().is_some_and(|u| template.user() != Some(u)) {
                continue;
            }
            if query
                .name
                .as_deref()
                .is_some_and(|n| !template.name().unwrap_or_default().contains(n))
            {
                continue;
            }
            if query.public_only && !template.public() {
                continue;
            }
            let Some(unv) = template.unv() else {
                continue;
            };
            summaries.push(TemplateSummary {
                unv,
                title: template.title().map(str::to_string),
                description: template.description().map(str::to_string),
                public: template.public(),
            });
        }
        summaries.sort_by(|a, b| a.unv.cmp(&b.unv));
        Ok(summaries)
    }

    fn get_machine(&self, unv: &Unv) -> Result<Machine> {
        let (user, name) = identity(Collection::Machines, unv)?;
        let value = self
            .read(Collection::Machines, user, name)?
            .ok_or_else(|| not_found(Collection::Machines, unv))?;
        let doc: MachineDoc = serde_json::from_value(value)?;
        check_version(Collection::Machines, unv, doc.version.as_deref())?;
        Ok(Machine::from_document(&doc))
    }

    fn create_machine(&mut self, machine: &Machine) -> Result<Machine> {
        let unv = document_identity(
            Collection::Machines,
            machine.user.as_deref(),
            machine.name.as_deref(),
        )?;
        let (user, name) = identity(Collection::Machines, &unv)?;
        if self.read(Collection::Machines, user, name)?.is_some() {
            return Err(Error::ConflictError(format!("machine '{}' already exists", unv)));
        }

        let mut doc = machine.to_document();
        if doc.uuid.is_none() {
            doc.uuid = Some(uuid::Uuid::new_v4().to_string());
        }
        self.write(Collection::Machines, user, name, &serde_json::to_value(&doc)?)?;
        info!("Created machine {}", unv);
        Ok(Machine::from_document(&doc))
    }

    fn update_machine(&mut self, machine: &Machine) -> Result<Machine> {
        let unv = document_identity(
            Collection::Machines,
            machine.user.as_deref(),
            machine.name.as_deref(),
        )?;
        let (user, name) = identity(Collection::Machines, &unv)?;
        let stored: MachineDoc = match self.read(Collection::Machines, user, name)? {
            Some(value) => serde_json::from_value(value)?,
            None => return Err(not_found(Collection::Machines, &unv)),
        };

        let mut doc = machine.to_document();
        if doc.uuid.is_none() {
            doc.uuid = stored.uuid;
        }
        self.write(Collection::Machines, user, name, &serde_json::to_value(&doc)?)?;
        Ok(Machine::from_document(&doc))
    }

    fn delete_machine(&mut self, unv: &Unv) -> Result<()> {
        let (user, name) = identity(Collection::Machines, unv)?;
        if !self.remove(Collection::Machines, user, name)? {
            return Err(not_found(Collection::Machines, unv));
        }
        info!("Deleted machine {}", unv);
        Ok(())
    }

    fn list_machines(&self, user: Option<&str>) -> Result<Vec<Machine>> {
        let mut machines: Vec<Machine> = self
            .list(Collection::Machines)?
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<MachineDoc>(value) {
                Ok(doc) => Some(Machine::from_document(&doc)),
                Err(e) => {
                    warn!("Skipping unreadable machine document: {}", e);
                    None
                }
            })
            .filter(|m| user.is_none() || m.user.as_deref() == user)
            .collect();
        machines.sort_by_key(|m| m.unv());
        Ok(machines)
    }
}

/// JSON documents in a directory tree
#[derive(Debug, Clone)]
pub struct DirectoryService {
    root: PathBuf,
}

impl DirectoryService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, collection: Collection, user: &str, name: &str) -> Result<PathBuf> {
        for part in [user, name] {
            if part.is_empty() || part.starts_with('.') || part.contains(['/', '\\']) {
                return Err(Error::InvalidIdentifier(format!(
                    "'{}' cannot be used as a storage key",
                    part
                )));
            }
        }
        Ok(self
            .root
            .join(collection.as_str())
            .join(user)
            .join(format!("{}.json", name)))
    }
}

impl DocumentStore for DirectoryService {
    fn read(&self, collection: Collection, user: &str, name: &str) -> Result<Option<Value>> {
        let path = self.path(collection, user, name)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::IoError(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn write(&mut self, collection: Collection, user: &str, name: &str, doc: &Value) -> Result<()> {
        let path = self.path(collection, user, name)?;
        let dir = path
            .parent()
            .ok_or_else(|| Error::IoError(format!("{} has no parent directory", path.display())))?;
        fs::create_dir_all(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(serde_json::to_string_pretty(doc)?.as_bytes())?;
        file.write_all(b"\n")?;
        file.persist(&path).map_err(|e| {
            Error::IoError(format!("Failed to write {}: {}", path.display(), e))
        })?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    fn remove(&mut self, collection: Collection, user: &str, name: &str) -> Result<bool> {
        let path = self.path(collection, user, name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::IoError(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn list(&self, collection: Collection) -> Result<Vec<Value>> {
        let base = self.root.join(collection.as_str());
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let mut docs = Vec::new();
        for user_dir in fs::read_dir(&base)? {
            let user_dir = user_dir?.path();
            if !user_dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&user_dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match fs::read_to_string(&path)
                    .map_err(Error::from)
                    .and_then(|text| Ok(serde_json::from_str::<Value>(&text)?))
                {
                    Ok(doc) => docs.push(doc),
                    Err(e) => warn!("Skipping {}: {}", path.display(), e),
                }
            }
        }
        Ok(docs)
    }
}

/// Documents held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryService {
    docs: BTreeMap<(Collection, String, String), Value>,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryService {
    fn read(&self, collection: Collection, user: &str, name: &str) -> Result<Option<Value>> {
        Ok(self
            .docs
            .get(&(collection, user.to_string(), name.to_string()))
            .cloned())
    }

    fn write(&mut self, collection: Collection, user: &str, name: &str, doc: &Value) -> Result<()> {
        self.docs
            .insert((collection, user.to_string(), name.to_string()), doc.clone());
        Ok(())
    }

    fn remove(&mut self, collection: Collection, user: &str, name: &str) -> Result<bool> {
        Ok(self
            .docs
            .remove(&(collection, user.to_string(), name.to_string()))
            .is_some())
    }

    fn list(&self, collection: Collection) -> Result<Vec<Value>> {
        Ok(self
            .docs
            .iter()
            .filter(|((c, _, _), _)| *c == collection)
            .map(|(_, doc)| doc.clone())
            .collect())
    }
}

impl Template {
    /// Fetch every include (and theirs, recursively) and flatten them
    ///
    /// Fails on a missing include, an include cycle, or a chain deeper
    /// than [`MAX_INCLUDE_DEPTH`]. A template included along several
    /// paths is fetched once.
    pub fn resolve_includes(&mut self, service: &dyn TemplateService) -> Result<()> {
        let mut resolver = IncludeResolver {
            service,
            cache: HashMap::new(),
            stack: self.unv().into_iter().collect(),
        };
        let includes = resolver.fetch_all(self.includes(), self.user())?;
        self.set_includes(includes);
        Ok(())
    }
}

impl Machine {
    /// Fetch the template this machine follows, includes flattened
    ///
    /// A machine with no template recorded is a `NotFoundError`.
    pub fn fetch_template(&self, service: &dyn TemplateService) -> Result<Template> {
        let label = self.unv().unwrap_or_else(|| "(unnamed)".to_string());
        let text = self.template.as_deref().ok_or_else(|| {
            Error::NotFoundError(format!("machine '{}' has no template", label))
        })?;
        let unv = Unv::parse_qualified(text, self.user.as_deref())?;
        let mut template = service.get_template(&unv)?;
        template.resolve_includes(service)?;
        Ok(template)
    }
}

struct IncludeResolver<'a> {
    service: &'a dyn TemplateService,
    cache: HashMap<String, Arc<Template>>,
    /// Templates currently being resolved, outermost first
    stack: Vec<String>,
}

impl IncludeResolver<'_> {
    fn fetch_all(&mut self, includes: &[String], user: Option<&str>) -> Result<Vec<Include>> {
        includes
            .iter()
            .map(|include| self.fetch(include, user))
            .collect()
    }

    fn fetch(&mut self, include: &str, user: Option<&str>) -> Result<Include> {
        let unv = Unv::parse_qualified(include, user)?;
        let key = unv.to_string();

        if self.stack.contains(&key) {
            return Err(Error::ConflictError(format!(
                "Circular include detected: {} -> {}",
                self.stack.join(" -> "),
                key
            )));
        }
        if self.stack.len() > MAX_INCLUDE_DEPTH {
            return Err(Error::ConflictError(format!(
                "Include chain deeper than {} at {}",
                MAX_INCLUDE_DEPTH, key
            )));
        }
        if let Some(template) = self.cache.get(&key) {
            return Ok(Include::Template {
                unv: Some(key),
                template: Arc::clone(template),
            });
        }

        debug!("Fetching include {}", key);
        let mut template = self.service.get_template(&unv)?;
        let nested_includes = template.includes().to_vec();
        let nested_user = template.user().map(str::to_string);

        self.stack.push(key.clone());
        let nested = self.fetch_all(&nested_includes, nested_user.as_deref());
        self.stack.pop();
        template.set_includes(nested?);

        let template = Arc::new(template);
        self.cache.insert(key.clone(), Arc::clone(&template));
        Ok(Include::Template {
            unv: Some(key),
            template,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Package;

    fn template(unv: &str, includes: &[&str], packages: &[&str]) -> Template {
        let mut t = Template::parse(unv, None).unwrap();
        t.set_includes(includes.iter().copied());
        for spec in packages {
            t.add_package(Package::parse(spec).unwrap());
        }
        t
    }

    #[test]
    fn test_create_get_update_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = DirectoryService::new(dir.path());

        let created = service
            .create_template(&template("alice:web", &[], &["nginx"]))
            .unwrap();
        assert!(created.uuid().is_some());
        assert!(created.delta().is_empty());
        assert_eq!(created.own().packages.len(), 1);
        assert!(dir.path().join("templates/alice/web.json").is_file());

        let err = service
            .create_template(&template("alice:web", &[], &[]))
            .unwrap_err();
        assert!(matches!(err, Error::ConflictError(_)));

        let mut fetched = service.get_template(&Unv::parse("alice:web").unwrap()).unwrap();
        fetched.add_package(Package::parse("vim").unwrap());
        let updated = service.update_template(&fetched).unwrap();
        assert_eq!(updated.uuid(), created.uuid());
        assert_eq!(updated.own().packages.len(), 2);

        service.delete_template(&Unv::parse("alice:web").unwrap()).unwrap();
        let err = service
            .get_template(&Unv::parse("alice:web").unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::NotFoundError(_)));
    }

    #[test]
    fn test_version_must_match() {
        let mut service = MemoryService::new();
        service
            .create_template(&template("alice:web@2", &[], &[]))
            .unwrap();

        assert!(service.get_template(&Unv::parse("alice:web@2").unwrap()).is_ok());
        assert!(service.get_template(&Unv::parse("alice:web").unwrap()).is_ok());
        assert!(service.get_template(&Unv::parse("alice:web@3").unwrap()).is_err());
    }

    #[test]
    fn test_storage_keys_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let service = DirectoryService::new(dir.path());
        let err = service
            .get_template(&Unv::parse("alice:..").unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
    }

    #[test]
    fn test_list_templates() {
        let mut service = MemoryService::new();
        let mut public = template("alice:web", &[], &[]);
        public.set_public(true);
        service.create_template(&public).unwrap();
        service.create_template(&template("alice:db", &[], &[])).unwrap();
        service.create_template(&template("bob:web", &[], &[])).unwrap();

        let all = service.list_templates(&TemplateQuery::default()).unwrap();
        let unvs: Vec<&str> = all.iter().map(|s| s.unv.as_str()).collect();
        assert_eq!(unvs, vec!["alice:db", "alice:web", "bob:web"]);

        let query = TemplateQuery {
            user: Some("alice".to_string()),
            public_only: true,
            ..TemplateQuery::default()
        };
        let public = service.list_templates(&query).unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].unv, "alice:web");

        let query = TemplateQuery {
            name: Some("we".to_string()),
            ..TemplateQuery::default()
        };
        assert_eq!(service.list_templates(&query).unwrap().len(), 2);
    }

    #[test]
    fn test_resolve_includes_recursively() {
        let mut service = MemoryService::new();
        service.create_template(&template("alice:base", &[], &["bash"])).unwrap();
        service
            .create_template(&template("alice:mid", &["base"], &["vim"]))
            .unwrap();
        service
            .create_template(&template("bob:extra", &["alice:base"], &["~vim"]))
            .unwrap();

        let mut top = template("alice:top", &["mid", "bob:extra"], &["nginx"]);
        top.resolve_includes(&service).unwrap();

        assert!(top.is_resolved());
        let all = top.packages_all();
        assert_eq!(all.len(), 3);
        // mid is listed first, so its vim wins over extra's exclusion
        assert!(all.get(&Package::parse("vim").unwrap()).unwrap().included());
    }

    #[test]
    fn test_resolve_detects_cycles() {
        let mut service = MemoryService::new();
        service.create_template(&template("alice:a", &["b"], &[])).unwrap();
        service.create_template(&template("alice:b", &["a"], &[])).unwrap();

        let mut top = template("alice:top", &["a"], &[]);
        let err = top.resolve_includes(&service).unwrap_err();
        assert!(matches!(err, Error::ConflictError(_)));
        assert!(top.packages_all().is_empty());

        let mut selfish = template("alice:a", &["a"], &[]);
        assert!(selfish.resolve_includes(&service).is_err());
    }

    #[test]
    fn test_resolve_missing_include_fails() {
        let service = MemoryService::new();
        let mut top = template("alice:top", &["nowhere"], &[]);
        assert!(matches!(
            top.resolve_includes(&service),
            Err(Error::NotFoundError(_))
        ));
    }

    #[test]
    fn test_machines() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = DirectoryService::new(dir.path());
        let mut machine = Machine::parse("alice:web01", None).unwrap();
        machine.set_template("web").unwrap();

        let created = service.create_machine(&machine).unwrap();
        assert!(created.uuid.is_some());
        assert_eq!(created.template.as_deref(), Some("alice:web"));

        service.create_machine(&Machine::parse("bob:db01", None).unwrap()).unwrap();
        assert_eq!(service.list_machines(Some("alice")).unwrap().len(), 1);
        assert_eq!(service.list_machines(None).unwrap().len(), 2);

        service.delete_machine(&Unv::parse("alice:web01").unwrap()).unwrap();
        assert!(service.delete_machine(&Unv::parse("alice:web01").unwrap()).is_err());
    }

    #[test]
    fn test_machine_template_is_resolved() {
        let mut service = MemoryService::new();
        service.create_template(&template("alice:base", &[], &["bash"])).unwrap();
        service.create_template(&template("alice:web", &["base"], &["nginx"])).unwrap();

        let mut machine = Machine::parse("alice:web01", None).unwrap();
        assert!(matches!(
            machine.fetch_template(&service),
            Err(Error::NotFoundError(_))
        ));

        machine.set_template("web").unwrap();
        let fetched = machine.fetch_template(&service).unwrap();
        assert!(fetched.is_resolved());
        assert_eq!(fetched.packages_all().len(), 2);

        machine.set_template("bob:web").unwrap();
        assert!(machine.fetch_template(&service).is_err());
    }
}
