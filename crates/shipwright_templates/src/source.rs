//! Template sources and flattening into a project file set.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use shipwright_core::{normalize_path, FileSet};

use crate::error::{TemplateError, TemplateResult};
use crate::manifest::{is_ignored, TemplateManifest, MANIFEST_FILES};
use crate::tree::TemplateEntry;

/// Something that can list a template's directory tree.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// Source name for logs.
    fn name(&self) -> &str;

    /// Fetch the nested listing of a template.
    async fn fetch_tree(&self, template_id: &str) -> TemplateResult<Vec<TemplateEntry>>;

    /// Download a file referenced by `download_url`.
    async fn download(&self, url: &str) -> TemplateResult<String>;
}

/// A fetched template ready to seed a project.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateBundle {
    pub manifest: TemplateManifest,
    pub files: FileSet,
}

/// Fetch a template and flatten it into a [`FileSet`].
///
/// The manifest file is consumed (not copied) and its ignore globs filter
/// the remaining files.
pub async fn fetch_template(
    source: &dyn TemplateSource,
    template_id: &str,
) -> TemplateResult<TemplateBundle> {
    info!("Fetching template {} from {}", template_id, source.name());
    let tree = source.fetch_tree(template_id).await?;

    let mut files = FileSet::new();
    for entry in TemplateEntry::flatten(&tree) {
        let content = match (&entry.content, &entry.download_url) {
            (Some(content), _) => content.clone(),
            (None, Some(url)) => source.download(url).await?,
            (None, None) => {
                return Err(TemplateError::Fetch(format!(
                    "Entry {} has neither content nor download_url",
                    entry.path
                )))
            }
        };
        files.insert(&entry.path, content);
    }

    let manifest = match MANIFEST_FILES.iter().find_map(|name| files.remove(name)) {
        Some(text) => TemplateManifest::from_yaml(template_id, &text)?,
        None => TemplateManifest::bare(template_id),
    };
    for name in MANIFEST_FILES {
        files.remove(name);
    }

    let patterns = manifest.ignore_patterns()?;
    let files: FileSet = files
        .iter()
        .filter(|(path, _)| !is_ignored(&patterns, path))
        .collect();
    if files.is_empty() {
        return Err(TemplateError::Empty(template_id.to_string()));
    }

    debug!("Template {} seeded {} file(s)", template_id, files.len());
    Ok(TemplateBundle { manifest, files })
}

/// In-memory template source, used in tests and for built-in templates.
#[derive(Clone, Default)]
pub struct StaticTemplateSource {
    templates: Arc<RwLock<HashMap<String, Vec<TemplateEntry>>>>,
    downloads: Arc<RwLock<HashMap<String, String>>>,
}

impl StaticTemplateSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template built from flat `(path, content)` pairs.
    pub fn with_files<I, P, C>(self, template_id: &str, files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<String>,
    {
        let entries = files
            .into_iter()
            .map(|(path, content)| TemplateEntry::file(normalize_path(path.as_ref()), content))
            .collect();
        self.with_tree(template_id, entries)
    }

    pub fn with_tree(self, template_id: &str, tree: Vec<TemplateEntry>) -> Self {
        self.templates.write().insert(template_id.to_string(), tree);
        self
    }

    pub fn with_download(self, url: &str, content: impl Into<String>) -> Self {
        self.downloads.write().insert(url.to_string(), content.into());
        self
    }
}

#[async_trait]
impl TemplateSource for StaticTemplateSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_tree(&self, template_id: &str) -> TemplateResult<Vec<TemplateEntry>> {
        self.templates
            .read()
            .get(template_id)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound(template_id.to_string()))
    }

    async fn download(&self, url: &str) -> TemplateResult<String> {
        self.downloads
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| TemplateError::Fetch(format!("No content at {}", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_applies_manifest() {
        let source = StaticTemplateSource::new().with_files(
            "nextjs",
            vec![
                ("template.yaml", "id: nextjs\nname: Next\nbuild: next build\nignore: ['docs']\n"),
                ("package.json", "{}"),
                ("docs/intro.md", "# Intro"),
                ("./src/app/page.tsx", "export default function Page() {}"),
            ],
        );
        let bundle = fetch_template(&source, "nextjs").await.unwrap();
        assert_eq!(bundle.manifest.build.as_deref(), Some("next build"));
        assert_eq!(
            bundle.files.paths().collect::<Vec<_>>(),
            vec!["package.json", "src/app/page.tsx"]
        );
    }

    #[tokio::test]
    async fn test_downloads_remote_files() {
        let source = StaticTemplateSource::new()
            .with_tree(
                "vite",
                vec![TemplateEntry::dir(
                    "src",
                    vec![TemplateEntry::remote_file("src/main.ts", "https://cdn/main.ts")],
                )],
            )
            .with_download("https://cdn/main.ts", "console.log(1);");
        let bundle = fetch_template(&source, "vite").await.unwrap();
        assert_eq!(bundle.manifest, TemplateManifest::bare("vite"));
        assert_eq!(bundle.files.get("src/main.ts"), Some("console.log(1);"));
    }

    #[tokio::test]
    async fn test_missing_and_empty_templates() {
        let source = StaticTemplateSource::new()
            .with_files("empty", vec![("template.yml", "id: empty\nname: E\n")]);
        assert!(matches!(
            fetch_template(&source, "nope").await,
            Err(TemplateError::NotFound(_))
        ));
        assert!(matches!(
            fetch_template(&source, "empty").await,
            Err(TemplateError::Empty(_))
        ));
    }
}
