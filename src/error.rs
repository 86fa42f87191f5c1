use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryBuildError),

    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Wrong type for key '{key}': must be {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("Environment variable error: {0}")]
    EnvVar(String),
}

/// One plugin candidate that could not be registered. Instantiation
/// failures are recovered locally (skip and log); duplicate names and
/// malformed plugin configuration fail the whole registry build.
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("failed to instantiate plugin '{name}': {reason}")]
    Instantiation { name: String, reason: String },

    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    #[error("invalid configuration for plugin '{name}': {source}")]
    Config {
        name: String,
        #[source]
        source: ConfigError,
    },
}

#[derive(Error, Debug)]
#[error("plugin registry build failed: {}", join_errors(.errors))]
pub struct RegistryBuildError {
    pub errors: Vec<RegistrationError>,
}

fn join_errors(errors: &[RegistrationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
#[error("{kind} '{name}' is not registered")]
pub struct NotFoundError {
    pub kind: &'static str,
    pub name: String,
}

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("content of {requested} bytes exceeds the buffer budget of {capacity} bytes")]
    Overflow { requested: usize, capacity: usize },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database '{0}' does not exist")]
    DatabaseNotFound(String),

    #[error("collection '{0}' does not exist")]
    CollectionNotFound(String),

    #[error("document '{0}' does not exist")]
    DocumentNotFound(String),

    #[error("write conflict: {0}")]
    WriteConflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl warp::reject::Reject for GatewayError {}
