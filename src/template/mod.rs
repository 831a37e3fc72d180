// src/template/mod.rs

//! Templates
//!
//! A template is a named, user-owned bundle of packages, repositories and
//! objects. Its membership lives in three layers:
//!
//! - **own**: what the template itself declares, as last loaded
//! - **delta**: additions staged locally and not yet stored
//! - **included**: the flattened membership of every included template
//!
//! `packages()` and friends give `own ∪ delta`; the `_all` variants add the
//! included layer and are what gets rendered or applied to a machine.
//!
//! Included templates are copied into the included layer when
//! [`Template::set_includes`] runs. Changing an included template afterwards
//! does not change the includer until its includes are set again.

mod document;
mod kickstart;
mod system;

pub use document::TemplateDoc;

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::Result;
use crate::object::Object;
use crate::package::Package;
use crate::repository::Repository;
use crate::set::{AnyEntity, Entity, EntitySet, ObjectSet, PackageSet, RepoSet};
use crate::unv::Unv;

/// One membership layer of a template
#[derive(Debug, Clone, Default)]
pub struct Layer {
    pub packages: PackageSet,
    pub repos: RepoSet,
    pub objects: ObjectSet,
}

impl Layer {
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.repos.is_empty() && self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.packages.clear();
        self.repos.clear();
        self.objects.clear();
    }
}

/// An entry handed to [`Template::set_includes`]
#[derive(Debug, Clone)]
pub enum Include {
    /// `[user:]name[@version]`; the includer's user is the default
    Unv(String),

    /// An already fetched template, recorded under `unv`
    Template {
        unv: Option<String>,
        template: Arc<Template>,
    },
}

impl Include {
    /// A fetched template recorded under the identifier it was fetched by
    pub fn resolved(unv: impl Into<String>, template: Template) -> Self {
        Include::Template {
            unv: Some(unv.into()),
            template: Arc::new(template),
        }
    }
}

impl From<&str> for Include {
    fn from(unv: &str) -> Self {
        Include::Unv(unv.to_string())
    }
}

impl From<String> for Include {
    fn from(unv: String) -> Self {
        Include::Unv(unv)
    }
}

impl From<&String> for Include {
    fn from(unv: &String) -> Self {
        Include::Unv(unv.clone())
    }
}

impl From<Template> for Include {
    fn from(template: Template) -> Self {
        Include::from(Arc::new(template))
    }
}

impl From<Arc<Template>> for Include {
    fn from(template: Arc<Template>) -> Self {
        Include::Template {
            unv: template.unv(),
            template,
        }
    }
}

#[derive(Debug, Clone)]
struct ResolvedInclude {
    unv: Option<String>,
    template: Arc<Template>,
}

/// A package/repository/object bundle
#[derive(Debug, Clone, Default)]
pub struct Template {
    uuid: Option<String>,
    user: Option<String>,
    name: Option<String>,
    version: Option<String>,
    title: Option<String>,
    description: Option<String>,
    includes: Vec<String>,
    resolved: Vec<ResolvedInclude>,
    stores: Vec<Value>,
    meta: Map<String, Value>,
    own: Layer,
    included: Layer,
    delta: Layer,
}

impl Template {
    /// An empty, unnamed template
    pub fn new() -> Self {
        Self::default()
    }

    /// A new template named by `[user:]name[@version]`
    ///
    /// Fails when neither the string nor `default_user` gives a user.
    pub fn parse(unv: &str, default_user: Option<&str>) -> Result<Self> {
        let unv = Unv::parse_qualified(unv, default_user)?;
        Ok(Self {
            user: unv.user,
            name: Some(unv.name),
            version: unv.version,
            ..Self::default()
        })
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn set_uuid(&mut self, uuid: Option<String>) {
        self.uuid = uuid;
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn set_user(&mut self, user: Option<String>) {
        self.user = user.filter(|u| !u.is_empty());
    }

    /// Short name, also called the stub
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name.filter(|n| !n.is_empty());
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn set_version(&mut self, version: Option<String>) {
        self.version = version.filter(|v| !v.is_empty());
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn set_title(&mut self, title: Option<String>) {
        self.title = title;
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    /// Canonical `user:name[@version]`, once both user and name are known
    pub fn unv(&self) -> Option<String> {
        let (user, name) = (self.user.as_deref()?, self.name.as_deref()?);
        Some(Unv::new(Some(user), name, self.version.as_deref()).to_string())
    }

    pub fn public(&self) -> bool {
        self.meta
            .get("public")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn set_public(&mut self, public: bool) {
        self.meta.insert("public".to_string(), Value::Bool(public));
    }

    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.meta
    }

    pub fn stores(&self) -> &[Value] {
        &self.stores
    }

    pub fn set_stores(&mut self, stores: Vec<Value>) {
        self.stores = stores;
    }

    /// Canonical identifiers of included templates, in priority order
    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    /// Included templates currently flattened into the included layer
    pub fn resolved_includes(&self) -> impl Iterator<Item = &Template> {
        self.resolved.iter().map(|r| r.template.as_ref())
    }

    /// Whether every include has been fetched and flattened
    pub fn is_resolved(&self) -> bool {
        self.includes.iter().all(|unv| {
            self.resolved
                .iter()
                .any(|r| r.unv.as_deref() == Some(unv.as_str()))
        })
    }

    /// Replace the include list and re-flatten the included layer
    ///
    /// Strings are normalized with this template's user as the default;
    /// malformed ones are dropped with a warning. Templates passed directly
    /// are flattened. A string naming a template that was flattened before
    /// keeps using that copy.
    pub fn set_includes<I, T>(&mut self, includes: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<Include>,
    {
        let previous = std::mem::take(&mut self.resolved);
        let mut names: Vec<String> = Vec::new();
        let mut resolved: Vec<ResolvedInclude> = Vec::new();

        for include in includes {
            match include.into() {
                Include::Unv(text) => {
                    let unv = match Unv::parse_qualified(&text, self.user.as_deref()) {
                        Ok(unv) => unv.to_string(),
                        Err(e) => {
                            warn!("Dropping include '{}': {}", text, e);
                            continue;
                        }
                    };
                    if names.contains(&unv) {
                        continue;
                    }
                    if let Some(cached) = previous.iter().find(|r| r.unv.as_ref() == Some(&unv)) {
                        resolved.push(cached.clone());
                    }
                    names.push(unv);
                }
                Include::Template { unv, template } => {
                    if let Some(unv) = &unv {
                        if names.contains(unv) {
                            continue;
                        }
                        names.push(unv.clone());
                    }
                    resolved.push(ResolvedInclude { unv, template });
                }
            }
        }

        self.includes = names;
        self.resolved = resolved;
        self.flatten();
    }

    /// Rebuild the included layer from the resolved includes
    ///
    /// Packages and repositories are merged last-to-first so the first
    /// listed include wins a conflict. Objects keep include order.
    fn flatten(&mut self) {
        let mut included = Layer::default();

        for include in self.resolved.iter().rev() {
            for package in include.template.packages_all() {
                included.packages.merge(package);
            }
            for repo in include.template.repos_all() {
                included.repos.merge(repo);
            }
        }
        for include in &self.resolved {
            included.objects.update([&include.template.objects_all()]);
        }

        debug!(
            "Flattened {} includes: {} packages, {} repos, {} objects",
            self.resolved.len(),
            included.packages.len(),
            included.repos.len(),
            included.objects.len()
        );
        self.included = included;
    }

    /// Persisted membership
    pub fn own(&self) -> &Layer {
        &self.own
    }

    /// Flattened membership of included templates
    pub fn included(&self) -> &Layer {
        &self.included
    }

    /// Locally staged additions
    pub fn delta(&self) -> &Layer {
        &self.delta
    }

    pub fn packages(&self) -> PackageSet {
        self.own.packages.union([&self.delta.packages])
    }

    pub fn packages_all(&self) -> PackageSet {
        self.own
            .packages
            .union([&self.delta.packages, &self.included.packages])
    }

    pub fn repos(&self) -> RepoSet {
        self.own.repos.union([&self.delta.repos])
    }

    pub fn repos_all(&self) -> RepoSet {
        self.own.repos.union([&self.delta.repos, &self.included.repos])
    }

    pub fn objects(&self) -> ObjectSet {
        self.own.objects.union([&self.delta.objects])
    }

    pub fn objects_all(&self) -> ObjectSet {
        self.own
            .objects
            .union([&self.delta.objects, &self.included.objects])
    }

    /// Stage a package unless already present; returns whether it was added
    pub fn add_package(&mut self, package: Package) -> bool {
        stage(&self.own.packages, &mut self.delta.packages, package)
    }

    pub fn add_repo(&mut self, repo: Repository) -> bool {
        stage(&self.own.repos, &mut self.delta.repos, repo)
    }

    pub fn add_object(&mut self, object: Object) -> bool {
        stage(&self.own.objects, &mut self.delta.objects, object)
    }

    /// Stage an entity of any kind
    pub fn add(&mut self, entity: AnyEntity) -> bool {
        match entity {
            AnyEntity::Package(p) => self.add_package(p),
            AnyEntity::Repository(r) => self.add_repo(r),
            AnyEntity::Object(o) => self.add_object(o),
        }
    }

    /// Drop a staged addition, or else the persisted member
    pub fn remove_package(&mut self, package: &Package) -> bool {
        unstage(&mut self.own.packages, &mut self.delta.packages, package)
    }

    pub fn remove_repo(&mut self, repo: &Repository) -> bool {
        unstage(&mut self.own.repos, &mut self.delta.repos, repo)
    }

    pub fn remove_object(&mut self, object: &Object) -> bool {
        unstage(&mut self.own.objects, &mut self.delta.objects, object)
    }

    pub fn remove(&mut self, entity: &AnyEntity) -> bool {
        match entity {
            AnyEntity::Package(p) => self.remove_package(p),
            AnyEntity::Repository(r) => self.remove_repo(r),
            AnyEntity::Object(o) => self.remove_object(o),
        }
    }

    /// Overwrite a present member with fresh fields, keeping its position
    ///
    /// A package without an arch matching one that has an arch only
    /// changes the action of the listed package.
    pub fn update_package(&mut self, package: Package) -> bool {
        let current = self.packages();
        let package = match current.get(&package) {
            Some(existing) if existing.refines(&package) => {
                existing.clone().with_action(package.action())
            }
            _ => package,
        };
        refresh(&mut self.own.packages, &mut self.delta.packages, package)
    }

    pub fn update_repo(&mut self, repo: Repository) -> bool {
        refresh(&mut self.own.repos, &mut self.delta.repos, repo)
    }

    pub fn update_object(&mut self, object: Object) -> bool {
        refresh(&mut self.own.objects, &mut self.delta.objects, object)
    }

    /// Drop includes, every layer and the imported kickstart settings
    pub fn clear(&mut self) {
        self.includes.clear();
        self.resolved.clear();
        self.own.clear();
        self.included.clear();
        self.delta.clear();
        self.meta.remove("kickstart");
    }

    /// Packages of this template (not its includes) with this name
    pub fn find_package(&self, name: &str) -> Vec<Package> {
        self.packages()
            .into_iter()
            .filter(|p| p.name() == name)
            .collect()
    }

    pub fn find_repo(&self, stub: &str) -> Option<Repository> {
        self.repos().into_iter().find(|r| r.stub == stub)
    }

    /// Packages only in this template, and packages only in `other`
    pub fn package_diff(&self, other: &PackageSet) -> (PackageSet, PackageSet) {
        self.packages_all().difference(other)
    }

    pub fn repo_diff(&self, other: &RepoSet) -> (RepoSet, RepoSet) {
        self.repos_all().difference(other)
    }

    /// Fold another template's own and staged members into this one
    ///
    /// Unset name, user, title and description are taken from `other`.
    pub fn union(&mut self, other: &Template) {
        self.own.packages.update([&other.packages()]);
        self.own.repos.update([&other.repos()]);
        self.own.objects.update([&other.objects()]);

        if self.name.is_none() {
            self.name = other.name.clone();
        }
        if self.user.is_none() {
            self.user = other.user.clone();
        }
        if self.title.is_none() {
            self.title = other.title.clone();
        }
        if self.description.is_none() {
            self.description = other.description.clone();
        }
    }
}

fn stage<T: Entity>(own: &EntitySet<T>, delta: &mut EntitySet<T>, item: T) -> bool {
    if own.contains(&item) || delta.contains(&item) {
        return false;
    }
    delta.add(item)
}

fn unstage<T: Entity>(own: &mut EntitySet<T>, delta: &mut EntitySet<T>, item: &T) -> bool {
    delta.discard(item) || own.discard(item)
}

fn refresh<T: Entity>(own: &mut EntitySet<T>, delta: &mut EntitySet<T>, item: T) -> bool {
    if delta.contains(&item) {
        return delta.replace(item);
    }
    own.replace(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Action;

    fn pkg(spec: &str) -> Package {
        Package::parse(spec).unwrap()
    }

    fn named(unv: &str, specs: &[&str]) -> Template {
        let mut t = Template::parse(unv, None).unwrap();
        for spec in specs {
            t.add_package(pkg(spec));
        }
        t
    }

    fn names(set: &PackageSet) -> Vec<String> {
        set.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_parse_requires_user() {
        let t = Template::parse("alice:base@2", None).unwrap();
        assert_eq!(t.user(), Some("alice"));
        assert_eq!(t.name(), Some("base"));
        assert_eq!(t.version(), Some("2"));
        assert_eq!(t.unv().as_deref(), Some("alice:base@2"));

        assert!(Template::parse("base", None).is_err());
        assert_eq!(
            Template::parse("base", Some("bob")).unwrap().unv().as_deref(),
            Some("bob:base")
        );
        assert_eq!(Template::new().unv(), None);
    }

    #[test]
    fn test_add_stages_into_delta_once() {
        let mut t = named("alice:base", &[]);
        assert!(t.add_package(pkg("nginx")));
        assert!(!t.add_package(pkg("nginx")));
        assert!(!t.add_package(pkg("nginx:x86_64")));
        assert_eq!(t.delta().packages.len(), 1);
        assert!(t.own().packages.is_empty());
    }

    #[test]
    fn test_remove_prefers_delta_then_own() {
        let mut t = named("alice:base", &[]);
        t.own.packages.add(pkg("vim"));
        t.add_package(pkg("nginx"));

        assert!(t.remove_package(&pkg("nginx")));
        assert!(t.delta().packages.is_empty());
        assert!(t.remove_package(&pkg("vim")));
        assert!(t.own().packages.is_empty());
        assert!(!t.remove_package(&pkg("vim")));
    }

    #[test]
    fn test_update_refreshes_in_place() {
        let mut t = named("alice:base", &[]);
        t.own.packages.add(pkg("a"));
        t.own.packages.add(pkg("b"));
        t.own.packages.add(pkg("c"));

        assert!(t.update_package(pkg("~b")));
        assert_eq!(names(&t.packages()), vec!["a", "~b", "c"]);
        assert!(!t.update_package(pkg("d")));
    }

    #[test]
    fn test_update_keeps_listed_arch() {
        let mut t = named("alice:base", &[]);
        t.own.packages.add(pkg("vim:x86_64"));

        assert!(t.update_package(pkg("~vim")));
        let vim = &t.find_package("vim")[0];
        assert_eq!(vim.arch(), Some("x86_64"));
        assert!(vim.excluded());
        assert_eq!(t.packages().len(), 1);
    }

    #[test]
    fn test_first_include_wins() {
        let a = named("alice:a", &["~foo", "only-a"]);
        let b = named("alice:b", &["foo", "only-b"]);
        let mut t = named("alice:top", &[]);
        t.set_includes([a, b]);

        assert_eq!(t.includes(), ["alice:a", "alice:b"]);
        let all = t.packages_all();
        let foo = all.get(&pkg("foo")).unwrap();
        assert!(foo.excluded());
        assert!(!foo.included());
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_nested_includes_are_flattened() {
        let base = named("alice:base", &["bash"]);
        let mut mid = named("alice:mid", &["vim"]);
        mid.set_includes([base]);
        let mut top = named("alice:top", &["nginx"]);
        top.set_includes([mid]);

        assert_eq!(names(&top.packages()), vec!["nginx"]);
        assert_eq!(names(&top.packages_all()), vec!["nginx", "vim", "bash"]);
    }

    #[test]
    fn test_include_strings_are_normalized() {
        let mut t = named("alice:top", &[]);
        t.set_includes(["base", "bob:extra@3", "bad:name:x", "base"]);
        assert_eq!(t.includes(), ["alice:base", "bob:extra@3"]);
        assert!(!t.is_resolved());
    }

    #[test]
    fn test_strings_reuse_flattened_copies() {
        let mut t = named("alice:top", &[]);
        t.set_includes([named("alice:base", &["bash"])]);
        assert!(t.is_resolved());

        t.set_includes(["base"]);
        assert!(t.is_resolved());
        assert_eq!(names(&t.packages_all()), vec!["bash"]);

        t.set_includes(Vec::<Include>::new());
        assert!(t.packages_all().is_empty());
    }

    #[test]
    fn test_included_copy_is_detached() {
        let mut base = named("alice:base", &["bash"]);
        let mut t = named("alice:top", &[]);
        t.set_includes([base.clone()]);

        base.add_package(pkg("zsh"));
        assert_eq!(t.packages_all().len(), 1);
    }

    #[test]
    fn test_clear_empties_everything() {
        let mut t = named("alice:top", &["nginx"]);
        t.own.repos.add(Repository::with_stub("updates").unwrap());
        t.set_includes([named("alice:base", &["bash"])]);
        t.meta_mut()
            .insert("kickstart".to_string(), serde_json::json!({"platform": "x86"}));
        t.set_public(true);

        t.clear();
        assert!(t.packages_all().is_empty());
        assert!(t.repos_all().is_empty());
        assert!(t.objects_all().is_empty());
        assert!(t.includes().is_empty());
        assert!(!t.meta().contains_key("kickstart"));
        assert!(t.public());
    }

    #[test]
    fn test_package_diff() {
        let t = named("alice:top", &["nginx", "vim"]);
        let installed: PackageSet = [pkg("vim"), pkg("bash")].into_iter().collect();

        let (missing, extra) = t.package_diff(&installed);
        assert_eq!(names(&missing), vec!["nginx"]);
        assert_eq!(names(&extra), vec!["bash"]);
    }

    #[test]
    fn test_union_fills_identity() {
        let mut t = Template::new();
        let mut other = named("alice:other", &["nginx"]);
        other.set_title(Some("Other".to_string()));
        t.union(&other);

        assert_eq!(t.unv().as_deref(), Some("alice:other"));
        assert_eq!(t.title(), Some("Other"));
        assert_eq!(names(&t.own().packages), vec!["nginx"]);
    }

    #[test]
    fn test_find_package_and_repo() {
        let mut t = named("alice:top", &["kernel:x86_64", "vim"]);
        t.add_repo(Repository::with_stub("updates").unwrap());

        let kernels = t.find_package("kernel");
        assert_eq!(kernels.len(), 1);
        assert_eq!(kernels[0].arch(), Some("x86_64"));
        assert!(t.find_repo("updates").is_some());
        assert!(t.find_repo("fedora").is_none());
    }

    #[test]
    fn test_add_any_entity() {
        let mut t = named("alice:top", &[]);
        assert!(t.add(AnyEntity::Package(pkg("nginx"))));
        assert!(t.remove(&AnyEntity::Package(pkg("nginx").with_action(Action::EXCLUDE))));
        assert!(t.packages().is_empty());
    }
}
