// src/error.rs

//! Error types for strata
//!
//! The first five variants are the validation errors raised when an entity
//! is constructed from user input. The rest are boundary failures coming from
//! files, the template service, or the native package manager.

use thiserror::Error;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed `[user:]name[@version]` string
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Malformed package string or broken epoch/version/release pairing
    #[error("invalid package spec: {0}")]
    InvalidPackageSpec(String),

    /// Malformed kickstart repo line or conflicting repository sources
    #[error("invalid repository spec: {0}")]
    InvalidRepoSpec(String),

    /// Checksum mismatch or unreadable object data
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// An entity of the wrong kind was handed to a typed operation
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("not found: {0}")]
    NotFoundError(String),

    #[error("conflict: {0}")]
    ConflictError(String),

    /// Template service request failed
    #[error("service error: {0}")]
    ServiceError(String),

    /// Native package manager failed or is unavailable
    #[error("package manager error: {0}")]
    PackageManagerError(String),

    /// An object action could not be applied
    #[error("action failed: {0}")]
    ActionError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Build a [`Error::TypeMismatch`] from the expected and found kinds
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}
