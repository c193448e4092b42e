//! CV-002: Error taxonomy for compilation, binding, execution and orchestration.
//!
//! Validation problems are not errors in this sense: they are collected as
//! strings and handed back to the caller inside `CallOutcome::Errors`.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration problems. Raised before anything executes.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown renderer '{0}'")]
    UnknownRenderer(String),

    #[error("invalid top file location '{0}'")]
    InvalidTopLocation(String),

    #[error("coordinator configuration unavailable: {0}")]
    MissingMasterConfig(String),

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// A rendered document does not have the shape the compiler expects.
#[derive(Debug, Error)]
#[error("{path}: {message}")]
pub struct CompileError {
    /// Dotted location of the offending node (e.g. `/etc/foo.file[1]`).
    pub path: String,
    pub message: String,
}

impl CompileError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A renderer could not turn its input into a document.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot render {path}: {message}")]
    Syntax { path: PathBuf, message: String },
}

/// A chunk cannot be turned into a positional call.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("chunk is missing the \"{0}\" field")]
    MissingField(&'static str),

    #[error("state {0} is not registered")]
    UnknownAction(String),

    #[error("missing parameter {param} for state {full}")]
    MissingParameter { full: String, param: String },
}

/// Fatal conditions inside one execution pass.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("state {tag} faulted: {message}")]
    ActionFault { tag: String, message: String },

    #[error("cyclic requisite: {required_by} requires {tag}, which is still being resolved")]
    CyclicDependency { tag: String, required_by: String },

    #[error("invalid require in {tag}: {message}")]
    InvalidRequire { tag: String, message: String },

    #[error("requisites of {0} could not be resolved")]
    Unresolved(String),
}

/// File transport failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid locator '{0}'")]
    InvalidLocator(String),

    #[error("unknown environment '{0}'")]
    UnknownEnvironment(String),

    #[error("cannot cache {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Umbrella error for the `State` and `HighState` entry points.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
