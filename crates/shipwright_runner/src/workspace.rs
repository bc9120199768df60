//! Ephemeral scratch workspace for local builds.
//!
//! The workspace is rewritten from the in-memory [`FileSet`] before every
//! build; it is never read back as a source of truth. Dependency directories
//! listed in `preserve` (by default `node_modules`) survive rewrites so the
//! install step stays cheap.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

use shipwright_core::FileSet;

use crate::error::{RunnerError, RunnerResult};

/// Directories kept between rewrites.
pub const DEFAULT_PRESERVE: &[&str] = &["node_modules"];

/// A temporary directory holding one project snapshot.
#[derive(Debug)]
pub struct ScratchWorkspace {
    dir: TempDir,
    preserve: Vec<String>,
}

impl ScratchWorkspace {
    pub fn new() -> RunnerResult<Self> {
        let dir = tempfile::Builder::new().prefix("shipwright-").tempdir()?;
        debug!("Created scratch workspace at {:?}", dir.path());
        Ok(Self {
            dir,
            preserve: DEFAULT_PRESERVE.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replace the preserved directory list.
    pub fn preserve(mut self, dirs: Vec<String>) -> Self {
        self.preserve = dirs;
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Wipe the workspace (except preserved dirs) and write the file set.
    ///
    /// All paths are validated before anything is touched.
    pub fn write_files(&self, files: &FileSet) -> RunnerResult<()> {
        let targets = files
            .iter()
            .map(|(path, content)| Ok((resolve_within(self.path(), path)?, content)))
            .collect::<RunnerResult<Vec<_>>>()?;

        self.wipe()?;
        for (target, content) in targets {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, content)?;
        }
        debug!("Wrote {} file(s) to {:?}", files.len(), self.path());
        Ok(())
    }

    /// Relative paths of all regular files, excluding preserved dirs.
    pub fn list_files(&self) -> Vec<String> {
        list_relative_files(self.path(), &self.preserve)
    }

    fn wipe(&self) -> RunnerResult<()> {
        for entry in fs::read_dir(self.path())? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if self.preserve.contains(&name) {
                continue;
            }
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// Resolve a relative path under `root`, rejecting absolute paths and `..`.
pub fn resolve_within(root: &Path, relative: &str) -> RunnerResult<PathBuf> {
    let candidate = Path::new(relative);
    if relative.is_empty() || candidate.is_absolute() {
        return Err(RunnerError::UnsafePath(relative.to_string()));
    }
    let mut resolved = root.to_path_buf();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => return Err(RunnerError::UnsafePath(relative.to_string())),
        }
    }
    Ok(resolved)
}

/// Relative `/`-separated paths of all files under `root`, skipping `skip_dirs`.
pub fn list_relative_files(root: &Path, skip_dirs: &[String]) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() == 1
                && e.file_type().is_dir()
                && skip_dirs.iter().any(|d| e.file_name().to_string_lossy() == d.as_str()))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_rewrite() {
        let ws = ScratchWorkspace::new().unwrap();
        let first = FileSet::new()
            .with_file("package.json", "{}")
            .with_file("src/old.ts", "old");
        ws.write_files(&first).unwrap();
        assert_eq!(ws.list_files(), vec!["package.json", "src/old.ts"]);

        fs::create_dir_all(ws.path().join("node_modules/react")).unwrap();
        fs::write(ws.path().join("node_modules/react/index.js"), "x").unwrap();

        let second = FileSet::new()
            .with_file("package.json", "{\"v\":2}")
            .with_file("src/new.ts", "new");
        ws.write_files(&second).unwrap();
        assert_eq!(ws.list_files(), vec!["package.json", "src/new.ts"]);
        assert!(ws.path().join("node_modules/react/index.js").exists());
        assert_eq!(
            fs::read_to_string(ws.path().join("package.json")).unwrap(),
            "{\"v\":2}"
        );
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let root = Path::new("/tmp/ws");
        assert!(resolve_within(root, "../etc/passwd").is_err());
        assert!(resolve_within(root, "src/../../x").is_err());
        assert!(resolve_within(root, "/etc/passwd").is_err());
        assert!(resolve_within(root, "").is_err());
        assert_eq!(
            resolve_within(root, "./src/a.ts").unwrap(),
            PathBuf::from("/tmp/ws/src/a.ts")
        );
    }

    #[test]
    fn test_unsafe_file_set_leaves_workspace_untouched() {
        let ws = ScratchWorkspace::new().unwrap();
        ws.write_files(&FileSet::new().with_file("a.txt", "a")).unwrap();

        let mut bad = FileSet::new().with_file("b.txt", "b");
        bad.insert("x/../../escape.txt", "nope");
        assert!(matches!(
            ws.write_files(&bad),
            Err(RunnerError::UnsafePath(_))
        ));
        assert_eq!(ws.list_files(), vec!["a.txt"]);
    }
}
