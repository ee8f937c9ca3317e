//! Infrastructure template utilities
//!
//! This crate turns the on-disk inputs of a deployment into the structured
//! documents the resource manager expects: a Bicep template compiled to ARM
//! JSON through the `az bicep` tool, and a parameters file flattened into a
//! name to value mapping.

pub mod bicep;
pub mod parameters;

use std::path::PathBuf;
use thiserror::Error;

pub use bicep::{BicepCompiler, TemplateCompiler};
pub use parameters::{load_parameters, parse_parameters, ParameterValues};

/// Errors related to template compilation and parameter loading
#[derive(Error, Debug)]
pub enum TemplateError {
    /// The build tool ran and reported failure; carries its stderr verbatim
    #[error("Bicep compilation failed: {stderr}")]
    CompilationFailed { stderr: String },

    /// The build tool could not be started at all
    #[error("Template build tool '{program}' could not be started: {reason}")]
    ToolUnavailable { program: String, reason: String },

    /// Compiled output (or a JSON template) was not a JSON object
    #[error("Invalid template {}: {reason}", .path.display())]
    InvalidTemplate { path: PathBuf, reason: String },

    /// The parameters document does not follow `{"parameters": {...}}`
    #[error("Invalid parameters file {}: {reason}", .path.display())]
    InvalidParameters { path: PathBuf, reason: String },

    /// A parameter entry has no `value` field
    #[error("Parameter '{name}' has no 'value' field")]
    MissingParameterValue { name: String },

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type TemplateResult<T> = Result<T, TemplateError>;
