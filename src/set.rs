// src/set.rs

//! Ordered, deduplicating entity collections
//!
//! [`EntitySet`] keeps members in insertion order and uses each entity's own
//! identity rule instead of hashing, because package identity (arch-less
//! matches any arch) is not transitive.
//!
//! Adding an item that matches an existing member is a no-op, unless the new
//! item is a refinement of it (a package gaining a concrete arch). In that
//! case it takes over the existing slot. [`EntitySet::replace`] and
//! [`EntitySet::merge`] overwrite explicitly, again in place.

use std::fmt;

use crate::error::{Error, Result};
use crate::object::Object;
use crate::package::Package;
use crate::repository::Repository;

/// Identity rules for set members
pub trait Entity: Clone + fmt::Debug {
    /// Human-readable kind, used in error messages
    const KIND: &'static str;

    /// Whether two values denote the same member
    fn same_entity(&self, other: &Self) -> bool;

    /// Whether `self` should replace an existing member it matches
    fn refines(&self, _existing: &Self) -> bool {
        false
    }
}

impl Entity for Package {
    const KIND: &'static str = "package";

    fn same_entity(&self, other: &Self) -> bool {
        self == other
    }

    fn refines(&self, existing: &Self) -> bool {
        self.arch().is_some() && existing.arch().is_none()
    }
}

impl Entity for Repository {
    const KIND: &'static str = "repository";

    fn same_entity(&self, other: &Self) -> bool {
        self == other
    }
}

impl Entity for Object {
    const KIND: &'static str = "object";

    fn same_entity(&self, other: &Self) -> bool {
        self == other
    }
}

/// Any entity, for callers that only know the kind at runtime
#[derive(Debug, Clone)]
pub enum AnyEntity {
    Package(Package),
    Repository(Repository),
    Object(Object),
}

impl AnyEntity {
    pub fn kind(&self) -> &'static str {
        match self {
            AnyEntity::Package(_) => Package::KIND,
            AnyEntity::Repository(_) => Repository::KIND,
            AnyEntity::Object(_) => Object::KIND,
        }
    }
}

macro_rules! any_entity_conversions {
    ($($variant:ident => $ty:ty),* $(,)?) => {$(
        impl From<$ty> for AnyEntity {
            fn from(value: $ty) -> Self {
                AnyEntity::$variant(value)
            }
        }

        impl TryFrom<AnyEntity> for $ty {
            type Error = Error;

            fn try_from(value: AnyEntity) -> Result<Self> {
                match value {
                    AnyEntity::$variant(inner) => Ok(inner),
                    other => Err(Error::type_mismatch(<$ty as Entity>::KIND, other.kind())),
                }
            }
        }
    )*};
}

any_entity_conversions!(Package => Package, Repository => Repository, Object => Object);

/// Insertion-ordered set of entities
#[derive(Debug, Clone)]
pub struct EntitySet<T> {
    items: Vec<T>,
}

pub type PackageSet = EntitySet<Package>;
pub type RepoSet = EntitySet<Repository>;
pub type ObjectSet = EntitySet<Object>;

impl<T> Default for EntitySet<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Entity> EntitySet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    fn position(&self, item: &T) -> Option<usize> {
        self.items.iter().position(|x| x.same_entity(item))
    }

    pub fn contains(&self, item: &T) -> bool {
        self.position(item).is_some()
    }

    /// The member matching `item`, if any
    pub fn get(&self, item: &T) -> Option<&T> {
        self.position(item).map(|i| &self.items[i])
    }

    pub fn find<P>(&self, mut predicate: P) -> Option<&T>
    where
        P: FnMut(&T) -> bool,
    {
        self.items.iter().find(|x| predicate(x))
    }

    /// Add `item`; returns whether the set changed
    pub fn add(&mut self, item: T) -> bool {
        match self.position(&item) {
            None => {
                self.items.push(item);
                true
            }
            Some(i) if item.refines(&self.items[i]) => {
                self.items[i] = item;
                true
            }
            Some(_) => false,
        }
    }

    /// Add a runtime-typed entity, failing if it is of another kind
    pub fn add_any(&mut self, entity: AnyEntity) -> Result<bool>
    where
        T: TryFrom<AnyEntity, Error = Error>,
    {
        Ok(self.add(T::try_from(entity)?))
    }

    /// Remove the first matching member; returns whether one was removed
    pub fn discard(&mut self, item: &T) -> bool {
        match self.position(item) {
            Some(i) => {
                self.items.remove(i);
                true
            }
            None => false,
        }
    }

    /// Overwrite the matching member in place; returns false if absent
    pub fn replace(&mut self, item: T) -> bool {
        match self.position(&item) {
            Some(i) => {
                self.items[i] = item;
                true
            }
            None => false,
        }
    }

    /// Overwrite the matching member in place, or append
    pub fn merge(&mut self, item: T) {
        if !self.replace(item.clone()) {
            self.items.push(item);
        }
    }

    /// A new set with every member of `self`, then of each other set in
    /// order, added with [`EntitySet::add`]
    pub fn union<'a, I>(&self, others: I) -> Self
    where
        I: IntoIterator<Item = &'a EntitySet<T>>,
        T: 'a,
    {
        let mut out = self.clone();
        out.update(others);
        out
    }

    /// Add every member of the other sets to `self`
    pub fn update<'a, I>(&mut self, others: I)
    where
        I: IntoIterator<Item = &'a EntitySet<T>>,
        T: 'a,
    {
        for other in others {
            for item in other {
                self.add(item.clone());
            }
        }
    }

    /// Members only in `self`, and members only in `other`
    pub fn difference(&self, other: &EntitySet<T>) -> (Self, Self) {
        let only_self = self
            .items
            .iter()
            .filter(|x| !other.contains(x))
            .cloned()
            .collect();
        let only_other = other
            .items
            .iter()
            .filter(|x| !self.contains(x))
            .cloned()
            .collect();
        (only_self, only_other)
    }

    /// Members cloned and sorted by `key`; stable for equal keys
    pub fn sorted_by_key<K, F>(&self, key: F) -> Vec<T>
    where
        K: Ord,
        F: FnMut(&T) -> K,
    {
        let mut items = self.items.clone();
        items.sort_by_key(key);
        items
    }
}

impl<T: Entity> FromIterator<T> for EntitySet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        for item in iter {
            set.add(item);
        }
        set
    }
}

impl<T: Entity> Extend<T> for EntitySet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.add(item);
        }
    }
}

impl<'a, T> IntoIterator for &'a EntitySet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T> IntoIterator for EntitySet<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(spec: &str) -> Package {
        Package::parse(spec).unwrap()
    }

    fn names(set: &PackageSet) -> Vec<String> {
        set.iter().map(|p| p.to_spec()).collect()
    }

    #[test]
    fn test_arch_refinement_replaces_in_place() {
        let mut set = PackageSet::new();
        set.add(pkg("first"));
        set.add(pkg("foo"));
        set.add(pkg("last"));

        assert!(set.add(pkg("foo:x86_64")));
        assert_eq!(set.len(), 3);
        assert_eq!(names(&set), ["first", "foo.x86_64", "last"]);

        // a less specific add is a no-op
        assert!(!set.add(pkg("~foo")));
        assert_eq!(names(&set), ["first", "foo.x86_64", "last"]);

        // a different concrete arch is a distinct member
        assert!(set.add(pkg("foo:i686")));
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_add_different_name_grows() {
        let mut set: PackageSet = [pkg("foo")].into_iter().collect();
        set.add(pkg("foo:x86_64"));
        assert_eq!(set.len(), 1);
        set.add(pkg("bar"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_discard_is_idempotent() {
        let mut set: PackageSet = [pkg("a"), pkg("b")].into_iter().collect();
        assert!(set.discard(&pkg("a")));
        assert!(!set.discard(&pkg("a")));
        assert_eq!(names(&set), ["b"]);
    }

    #[test]
    fn test_replace_and_merge_keep_position() {
        let mut set: PackageSet = [pkg("a"), pkg("b"), pkg("c")].into_iter().collect();
        assert!(set.replace(pkg("~b")));
        assert!(set.iter().nth(1).unwrap().excluded());
        assert!(!set.replace(pkg("zzz")));

        set.merge(pkg("~a"));
        set.merge(pkg("d"));
        assert_eq!(names(&set), ["a", "b", "c", "d"]);
        assert!(set.iter().next().unwrap().excluded());
    }

    #[test]
    fn test_union_order_and_first_wins() {
        let a: PackageSet = [pkg("x"), pkg("~y")].into_iter().collect();
        let b: PackageSet = [pkg("y"), pkg("z")].into_iter().collect();
        let u = a.union([&b]);
        assert_eq!(names(&u), ["x", "y", "z"]);
        assert!(u.get(&pkg("y")).unwrap().excluded());

        // union leaves the inputs alone
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_update_in_place() {
        let mut a: PackageSet = [pkg("x")].into_iter().collect();
        let b: PackageSet = [pkg("y")].into_iter().collect();
        let c: PackageSet = [pkg("z"), pkg("x")].into_iter().collect();
        a.update([&b, &c]);
        assert_eq!(names(&a), ["x", "y", "z"]);
    }

    #[test]
    fn test_difference_partitions() {
        let a: PackageSet = [pkg("x"), pkg("y"), pkg("common")].into_iter().collect();
        let b: PackageSet = [pkg("common"), pkg("z")].into_iter().collect();
        let (only_a, only_b) = a.difference(&b);
        assert_eq!(names(&only_a), ["x", "y"]);
        assert_eq!(names(&only_b), ["z"]);

        // only_a + intersection rebuilds a, only_b + intersection rebuilds b
        let common: PackageSet = a.iter().filter(|p| b.contains(p)).cloned().collect();
        for p in &a {
            assert!(only_a.contains(p) ^ common.contains(p));
        }
        for p in &b {
            assert!(only_b.contains(p) ^ common.contains(p));
        }
        for p in &only_a {
            assert!(!only_b.contains(p));
        }
    }

    #[test]
    fn test_repo_set_first_wins() {
        let mut repos = RepoSet::new();
        let first = Repository::parse_kickstart_line("repo --name=updates --baseurl=U1").unwrap();
        let second = Repository::parse_kickstart_line("repo --name=updates --baseurl=U2").unwrap();
        assert!(repos.add(first));
        assert!(!repos.add(second));
        assert_eq!(repos.iter().next().unwrap().baseurl.as_ref().unwrap()[0], "U1");
    }

    #[test]
    fn test_add_any_type_mismatch() {
        let mut packages = PackageSet::new();
        assert!(packages.add_any(AnyEntity::from(pkg("vim"))).unwrap());

        let repo = Repository::with_stub("updates").unwrap();
        let err = packages.add_any(repo.into()).unwrap_err();
        match err {
            Error::TypeMismatch { expected, found } => {
                assert_eq!(expected, "package");
                assert_eq!(found, "repository");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
