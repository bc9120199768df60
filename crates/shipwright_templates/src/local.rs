//! Template source reading from a local templates directory.
//!
//! Each template is a subdirectory of the root named by its id.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{TemplateError, TemplateResult};
use crate::source::TemplateSource;
use crate::tree::TemplateEntry;

/// Directories never copied from a template checkout.
const SKIP_DIRS: &[&str] = &[".git", "node_modules"];

/// Local directory template source.
#[derive(Debug, Clone)]
pub struct LocalTemplateSource {
    root: PathBuf,
}

impl LocalTemplateSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Ids of all templates under the root.
    pub fn list(&self) -> TemplateResult<Vec<String>> {
        if !self.root.exists() {
            warn!("Templates directory does not exist: {:?}", self.root);
            return Ok(Vec::new());
        }
        let mut ids: Vec<String> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn read_dir(&self, template_root: &Path, dir: &Path) -> TemplateResult<Vec<TemplateEntry>> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| TemplateError::Fetch(e.to_string()))?;
            let name = entry.file_name().to_string_lossy();
            let relative = entry
                .path()
                .strip_prefix(template_root)
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .map_err(|e| TemplateError::Fetch(e.to_string()))?;

            if entry.file_type().is_dir() {
                if SKIP_DIRS.iter().any(|d| *d == name) {
                    continue;
                }
                let children = self.read_dir(template_root, entry.path())?;
                entries.push(TemplateEntry::dir(relative, children));
            } else if entry.file_type().is_file() {
                match fs::read_to_string(entry.path()) {
                    Ok(content) => entries.push(TemplateEntry::file(relative, content)),
                    Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                        debug!("Skipping non-text template file {}", relative);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl TemplateSource for LocalTemplateSource {
    fn name(&self) -> &str {
        "local"
    }

    async fn fetch_tree(&self, template_id: &str) -> TemplateResult<Vec<TemplateEntry>> {
        let dir = self.root.join(template_id);
        if template_id.contains("..") || !dir.is_dir() {
            return Err(TemplateError::NotFound(template_id.to_string()));
        }
        self.read_dir(&dir, &dir)
    }

    async fn download(&self, url: &str) -> TemplateResult<String> {
        Err(TemplateError::Fetch(format!(
            "Local templates carry inline content; cannot download {}",
            url
        )))
    }
}
