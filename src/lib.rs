// src/lib.rs

//! Strata system templates
//!
//! A template describes a machine as three kinds of members: packages,
//! repositories and configuration objects. Templates include other
//! templates, and each member lives in one of three layers:
//!
//! - own: stored with the template itself
//! - included: flattened from the template's includes
//! - delta: staged changes that have not been stored yet
//!
//! Templates round-trip through JSON/YAML documents and kickstart files,
//! can be captured from the running system and applied back to it.

pub mod config;
pub(crate) mod document;
mod error;
pub mod hash;
pub mod kickstart;
pub mod machine;
pub mod object;
pub mod package;
pub mod repository;
pub mod service;
pub mod set;
pub mod system;
pub mod template;
pub mod unv;

pub use config::Config;
pub use error::{Error, Result};
pub use machine::{Machine, MachineDoc};
pub use object::{ActionKind, ActionRunner, LocalRunner, Object, ObjectAction, ObjectDoc};
pub use package::{Action, Package, PackageDoc};
pub use repository::{RepoDoc, Repository};
pub use service::{
    DirectoryService, DocumentStore, MemoryService, TemplateQuery, TemplateService,
    TemplateSummary,
};
pub use set::{AnyEntity, Entity, EntitySet, ObjectSet, PackageSet, RepoSet};
pub use system::{
    ApplyOptions, DnfCli, NativePackage, NativeRepo, PackageManager, SystemState,
    SystemTransaction, TransactionAction,
};
pub use template::{Include, Layer, Template, TemplateDoc};
pub use unv::Unv;
