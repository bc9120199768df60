//! Nested directory listing returned by template sources.

use serde::{Deserialize, Serialize};

/// Entry type in a template listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// One node of a template directory tree.
///
/// Files carry either inline `content` or a `download_url` to fetch it from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateEntry {
    /// Path relative to the template root
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TemplateEntry>,
}

impl TemplateEntry {
    pub fn file(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            content: Some(content.into()),
            download_url: None,
            children: Vec::new(),
        }
    }

    pub fn remote_file(path: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            content: None,
            download_url: Some(url.into()),
            children: Vec::new(),
        }
    }

    pub fn dir(path: impl Into<String>, children: Vec<TemplateEntry>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Dir,
            content: None,
            download_url: None,
            children,
        }
    }

    /// All file entries in depth-first order.
    pub fn flatten(entries: &[TemplateEntry]) -> Vec<&TemplateEntry> {
        let mut files = Vec::new();
        let mut stack: Vec<&TemplateEntry> = entries.iter().rev().collect();
        while let Some(entry) = stack.pop() {
            match entry.kind {
                EntryKind::File => files.push(entry),
                EntryKind::Dir => stack.extend(entry.children.iter().rev()),
            }
        }
        files
    }
}
