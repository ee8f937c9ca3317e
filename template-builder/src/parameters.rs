//! Deployment parameters files.
//!
//! A parameters file has the shape
//! `{"parameters": {"name": {"value": ...}, ...}}`; everything else at the top
//! level (`$schema`, `contentVersion`) is ignored.

use crate::{TemplateError, TemplateResult};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Flat parameter name to value mapping
pub type ParameterValues = BTreeMap<String, serde_json::Value>;

/// Read and flatten a parameters file
pub async fn load_parameters(path: &Path) -> TemplateResult<ParameterValues> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let document: serde_json::Value =
        serde_json::from_str(&contents).map_err(|e| TemplateError::InvalidParameters {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let values = parse_parameters(&document).map_err(|err| match err {
        TemplateError::InvalidParameters { reason, .. } => TemplateError::InvalidParameters {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    })?;

    debug!("Loaded {} parameters from {}", values.len(), path.display());
    Ok(values)
}

/// Extract the `value` of every entry under `parameters`
pub fn parse_parameters(document: &serde_json::Value) -> TemplateResult<ParameterValues> {
    let entries = document
        .get("parameters")
        .and_then(serde_json::Value::as_object)
        .ok_or_else(|| TemplateError::InvalidParameters {
            path: Default::default(),
            reason: "missing 'parameters' object".to_string(),
        })?;

    entries
        .iter()
        .map(|(name, entry)| {
            entry
                .get("value")
                .cloned()
                .map(|value| (name.clone(), value))
                .ok_or_else(|| TemplateError::MissingParameterValue { name: name.clone() })
        })
        .collect()
}
