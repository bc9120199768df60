//! File-backed persistence.
//!
//! Layout under the data directory:
//!
//! ```text
//! <data_dir>/
//! ├── jobs/<jobId>.json                  # GenerationJob
//! └── projects/<projectId>/
//!     ├── files.json                     # FileSet snapshot
//!     └── deployments.jsonl              # DeploymentRecord log (append-only)
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use shipwright_core::store::apply_status_update;
use shipwright_core::{
    CoreError, CoreResult, DeploymentRecord, FileSet, GenerationJob, JobStatus, JobStore,
    ProjectStore, StoreConfig,
};

/// JSON file store for jobs, projects and deployments.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles on job files
    lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.data_dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist a job, replacing any existing one with the same id.
    pub fn insert_job(&self, job: &GenerationJob) -> CoreResult<()> {
        let _guard = self.lock.lock();
        let path = self.job_path(&job.id)?;
        write_json(&path, job)
    }

    /// All deployment records of a project, oldest first.
    pub fn deployments(&self, project_id: &str) -> CoreResult<Vec<DeploymentRecord>> {
        let path = self.project_dir(project_id)?.join("deployments.jsonl");
        if !path.exists() {
            return Ok(Vec::new());
        }
        fs::read_to_string(&path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(CoreError::from))
            .collect()
    }

    fn job_path(&self, job_id: &str) -> CoreResult<PathBuf> {
        Ok(self.root.join("jobs").join(format!("{}.json", safe_id(job_id)?)))
    }

    fn project_dir(&self, project_id: &str) -> CoreResult<PathBuf> {
        Ok(self.root.join("projects").join(safe_id(project_id)?))
    }

    fn read_job(&self, job_id: &str) -> CoreResult<GenerationJob> {
        let path = self.job_path(job_id)?;
        if !path.exists() {
            return Err(CoreError::JobNotFound(job_id.to_string()));
        }
        Ok(serde_json::from_str(&fs::read_to_string(&path)?)?)
    }
}

/// Reject ids that would escape the data directory.
fn safe_id(id: &str) -> CoreResult<&str> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !id.starts_with('.');
    if valid {
        Ok(id)
    } else {
        Err(CoreError::InvalidPath(id.to_string()))
    }
}

/// Write JSON through a temporary file so readers never see partial content.
fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    debug!("Wrote {:?}", path);
    Ok(())
}

#[async_trait]
impl JobStore for FileStore {
    async fn get_job(&self, job_id: &str) -> CoreResult<GenerationJob> {
        self.read_job(job_id)
    }

    async fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<serde_json::Value>,
        error: Option<serde_json::Value>,
    ) -> CoreResult<GenerationJob> {
        let _guard = self.lock.lock();
        let mut job = self.read_job(job_id)?;
        apply_status_update(&mut job, status, result, error)?;
        write_json(&self.job_path(job_id)?, &job)?;
        Ok(job)
    }
}

#[async_trait]
impl ProjectStore for FileStore {
    async fn load_project_files(&self, project_id: &str) -> CoreResult<Option<FileSet>> {
        let path = self.project_dir(project_id)?.join("files.json");
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&fs::read_to_string(&path)?)?))
    }

    async fn save_project_files(&self, project_id: &str, files: &FileSet) -> CoreResult<()> {
        write_json(&self.project_dir(project_id)?.join("files.json"), files)
    }

    async fn save_deployment(&self, record: &DeploymentRecord) -> CoreResult<()> {
        let dir = self.project_dir(&record.project_id)?;
        fs::create_dir_all(&dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("deployments.jsonl"))?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_core::JobKind;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_job_round_trip_and_transitions() {
        let temp = tempdir().unwrap();
        let store = FileStore::new(temp.path());
        store
            .insert_job(&GenerationJob::new("job-1", "u1", JobKind::Initial, "a blog"))
            .unwrap();

        let job = store
            .update_job_status("job-1", JobStatus::Processing, None, None)
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Processing);

        let reloaded = FileStore::new(temp.path()).get_job("job-1").await.unwrap();
        assert_eq!(reloaded.status, JobStatus::Processing);
        assert_eq!(reloaded.prompt, "a blog");

        assert!(store
            .update_job_status("job-1", JobStatus::Pending, None, None)
            .await
            .is_err());
        assert!(matches!(
            store.get_job("missing").await,
            Err(CoreError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_project_files_and_deployments() {
        let temp = tempdir().unwrap();
        let store = FileStore::new(temp.path());
        assert_eq!(store.load_project_files("p1").await.unwrap(), None);

        let files = FileSet::new().with_file("src/main.ts", "console.log(1);\n");
        store.save_project_files("p1", &files).await.unwrap();
        assert_eq!(store.load_project_files("p1").await.unwrap(), Some(files));

        store
            .save_deployment(&DeploymentRecord::new("p1", "d1", "https://a.dev", 1))
            .await
            .unwrap();
        store
            .save_deployment(&DeploymentRecord::new("p1", "d2", "https://b.dev", 2))
            .await
            .unwrap();
        let records = store.deployments("p1").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].url, "https://b.dev");
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let temp = tempdir().unwrap();
        let store = FileStore::new(temp.path());
        assert!(matches!(
            store.load_project_files("../etc").await,
            Err(CoreError::InvalidPath(_))
        ));
        assert!(store.get_job("a/b").await.is_err());
    }
}
