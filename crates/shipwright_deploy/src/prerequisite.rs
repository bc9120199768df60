//! Prerequisite deployment phase.
//!
//! Back-end components (contracts, functions) under the prerequisite
//! directory are deployed before the application. Their outputs, such as
//! addresses or endpoints, are merged into a JSON file inside the file set so
//! the application build can reference them.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use shipwright_core::FileSet;

use crate::error::{DeployError, DeployResult};

/// Deploys prerequisite components and returns their outputs.
#[async_trait]
pub trait PrerequisiteDeployer: Send + Sync {
    /// Deploy `files` (only the prerequisite subset) for a project.
    ///
    /// Returns a JSON object of outputs. Errors carry the failure log.
    async fn deploy(&self, project_id: &str, files: &FileSet) -> DeployResult<Value>;
}

/// Files that belong to the prerequisite phase.
pub fn prerequisite_files(files: &FileSet, dir: &str) -> FileSet {
    if dir.trim().is_empty() {
        return FileSet::new();
    }
    files.under(dir)
}

/// Merge prerequisite outputs into the JSON file at `path`.
///
/// Top-level keys from `outputs` overwrite existing ones; a missing or
/// non-object file is replaced.
pub fn inject_outputs(files: &FileSet, path: &str, outputs: &Value) -> DeployResult<FileSet> {
    let Value::Object(new_entries) = outputs else {
        return Err(DeployError::Prerequisite(format!(
            "outputs must be a JSON object, got {}",
            outputs
        )));
    };

    let mut merged = match files.get(path).map(|text| serde_json::from_str::<Value>(text)) {
        Some(Ok(Value::Object(existing))) => existing,
        Some(_) => {
            debug!("Replacing unreadable injection file {}", path);
            Map::new()
        }
        None => Map::new(),
    };
    for (key, value) in new_entries {
        merged.insert(key.clone(), value.clone());
    }

    let mut text = serde_json::to_string_pretty(&Value::Object(merged))?;
    text.push('\n');
    Ok(files.clone().with_file(path, text))
}
