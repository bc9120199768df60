//! Complete project file snapshots.
//!
//! A [`FileSet`] is always a whole project, never a partial diff. Keys are
//! normalized relative paths (`/` separators, no leading `./`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Normalize a relative file path.
///
/// Converts `\` to `/`, strips leading `./` and `/` segments and collapses
/// repeated separators.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.trim().replace('\\', "/");
    while normalized.contains("//") {
        normalized = normalized.replace("//", "/");
    }
    loop {
        if let Some(rest) = normalized.strip_prefix("./") {
            normalized = rest.to_string();
        } else if let Some(rest) = normalized.strip_prefix('/') {
            normalized = rest.to_string();
        } else {
            break;
        }
    }
    normalized
}

/// Ordered mapping of relative filename to full text content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileSet {
    files: BTreeMap<String, String>,
}

impl FileSet {
    /// Create an empty file set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a file. Returns the previous content, if any.
    pub fn insert(&mut self, path: impl AsRef<str>, content: impl Into<String>) -> Option<String> {
        self.files.insert(normalize_path(path.as_ref()), content.into())
    }

    /// Builder-style insert.
    pub fn with_file(mut self, path: impl AsRef<str>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(&normalize_path(path)).map(|s| s.as_str())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(&normalize_path(path))
    }

    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.files.remove(&normalize_path(path))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate over `(path, content)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(|k| k.as_str())
    }

    /// Overlay `other` on top of this set; files in `other` win.
    pub fn merge(&mut self, other: &FileSet) {
        for (path, content) in other.iter() {
            self.files.insert(path.to_string(), content.to_string());
        }
    }

    /// Files whose path starts with the given directory prefix.
    pub fn under(&self, dir: &str) -> FileSet {
        let prefix = normalize_path(dir);
        let prefix = prefix.trim_end_matches('/');
        self.files
            .iter()
            .filter(|(path, _)| {
                path.as_str() == prefix || path.starts_with(&format!("{}/", prefix))
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Total size of all file contents in bytes.
    pub fn total_bytes(&self) -> usize {
        self.files.values().map(|c| c.len()).sum()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.files
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for FileSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = FileSet::new();
        for (path, content) in iter {
            set.insert(path, content);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./src/app.ts"), "src/app.ts");
        assert_eq!(normalize_path("src\\components\\Nav.tsx"), "src/components/Nav.tsx");
        assert_eq!(normalize_path("/src//lib/util.ts"), "src/lib/util.ts");
        assert_eq!(normalize_path("././index.html"), "index.html");
    }

    #[test]
    fn test_insert_normalizes_keys() {
        let mut files = FileSet::new();
        files.insert("./src/main.ts", "a");
        assert!(files.contains("src/main.ts"));
        assert_eq!(files.get("./src/main.ts"), Some("a"));
    }

    #[test]
    fn test_under_prefix() {
        let files = FileSet::new()
            .with_file("contracts/Token.sol", "x")
            .with_file("contracts-old/Legacy.sol", "y")
            .with_file("src/index.ts", "z");
        let contracts = files.under("contracts/");
        assert_eq!(contracts.len(), 1);
        assert!(contracts.contains("contracts/Token.sol"));
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let files = FileSet::new().with_file("a.txt", "hello");
        let json = serde_json::to_string(&files).unwrap();
        assert_eq!(json, r#"{"a.txt":"hello"}"#);
    }
}
