//! # shipwright_templates
//!
//! Template sources that seed the file set of a new project.
//!
//! A source returns a nested directory listing; [`fetch_template`] flattens it
//! into a [`shipwright_core::FileSet`], downloading referenced files and
//! applying the optional `template.yaml` manifest.

pub mod error;
pub mod http;
pub mod local;
pub mod manifest;
pub mod source;
pub mod tree;

use std::sync::Arc;

use shipwright_core::TemplatesConfig;

pub use error::{TemplateError, TemplateResult};
pub use http::HttpTemplateSource;
pub use local::LocalTemplateSource;
pub use manifest::TemplateManifest;
pub use source::{fetch_template, StaticTemplateSource, TemplateBundle, TemplateSource};
pub use tree::{EntryKind, TemplateEntry};

/// Create the template source selected by configuration.
///
/// A local root wins over an HTTP base URL when both are set.
pub fn create_source(config: &TemplatesConfig) -> TemplateResult<Arc<dyn TemplateSource>> {
    if let Some(root) = &config.root {
        return Ok(Arc::new(LocalTemplateSource::new(root.clone())));
    }
    if let Some(base_url) = &config.base_url {
        return Ok(Arc::new(HttpTemplateSource::new(base_url.clone())?));
    }
    Err(TemplateError::Fetch(
        "No template source configured (set templates.root or templates.base_url)".to_string(),
    ))
}
