//! Template manifest definitions.
//!
//! A template may carry a `template.yaml` at its root describing how the
//! seeded project is built and which files should not be copied.

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{TemplateError, TemplateResult};

/// Manifest file names, in lookup order.
pub const MANIFEST_FILES: &[&str] = &["template.yaml", "template.yml"];

/// Template manifest loaded from `template.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateManifest {
    /// Unique template identifier (e.g., "nextjs")
    pub id: String,
    /// Human-readable name
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Build command overriding the configured default
    #[serde(default)]
    pub build: Option<String>,
    /// Install command run before the build
    #[serde(default)]
    pub install: Option<String>,
    /// Glob patterns for files that are not copied into the project
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl TemplateManifest {
    /// Minimal manifest for templates that ship without one.
    pub fn bare(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            build: None,
            install: None,
            ignore: Vec::new(),
        }
    }

    /// Parse and validate a manifest.
    pub fn from_yaml(template: &str, text: &str) -> TemplateResult<Self> {
        let manifest: Self = serde_yaml::from_str(text)?;
        if manifest.id.trim().is_empty() {
            return Err(TemplateError::InvalidManifest {
                template: template.to_string(),
                message: "id must not be empty".to_string(),
            });
        }
        manifest.ignore_patterns()?;
        Ok(manifest)
    }

    /// Compile the ignore globs.
    pub fn ignore_patterns(&self) -> TemplateResult<Vec<Pattern>> {
        self.ignore
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| TemplateError::InvalidPattern {
                    pattern: p.clone(),
                    message: e.to_string(),
                })
            })
            .collect()
    }
}

/// Whether `path` matches any pattern, either fully or by a leading directory.
pub fn is_ignored(patterns: &[Pattern], path: &str) -> bool {
    patterns.iter().any(|pattern| {
        pattern.matches(path)
            || path
                .match_indices('/')
                .any(|(idx, _)| pattern.matches(&path[..idx]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest() {
        let yaml = r#"
id: nextjs
name: Next.js App
build: npm run build
install: npm ci
ignore:
  - "*.md"
  - ".github"
"#;
        let manifest = TemplateManifest::from_yaml("nextjs", yaml).unwrap();
        assert_eq!(manifest.id, "nextjs");
        assert_eq!(manifest.build.as_deref(), Some("npm run build"));
        assert_eq!(manifest.install.as_deref(), Some("npm ci"));

        let patterns = manifest.ignore_patterns().unwrap();
        assert!(is_ignored(&patterns, "README.md"));
        assert!(is_ignored(&patterns, ".github/workflows/ci.yml"));
        assert!(!is_ignored(&patterns, "src/app/page.tsx"));
    }

    #[test]
    fn test_invalid_manifest() {
        assert!(matches!(
            TemplateManifest::from_yaml("x", "id: ''\nname: X\n"),
            Err(TemplateError::InvalidManifest { .. })
        ));
        assert!(matches!(
            TemplateManifest::from_yaml("x", "id: x\nname: X\nignore: ['[']\n"),
            Err(TemplateError::InvalidPattern { .. })
        ));
        assert!(TemplateManifest::from_yaml("x", "name: [").is_err());
    }
}
