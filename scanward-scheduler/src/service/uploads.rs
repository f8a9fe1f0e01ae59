//! Upload storage
//!
//! Files uploaded for a job live in `<root>/<job id>/<file name>` until the
//! job is removed by auto cleanup.

use scanward_client::UploadedFile;
use scanward_core::domain::job::Job;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    #[error("Upload I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn job_dir(&self, job_id: Uuid) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    pub async fn store(
        &self,
        job_id: Uuid,
        file_name: &str,
        data: &[u8],
    ) -> Result<UploadedFile, UploadError> {
        validate_file_name(file_name)?;

        let dir = self.job_dir(job_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(file_name);
        tokio::fs::write(&path, data).await?;

        tracing::debug!(job_id = %job_id, file_name, bytes = data.len(), "Upload stored");

        Ok(UploadedFile {
            name: file_name.to_string(),
            path,
        })
    }

    /// Files recorded for the job
    pub fn files_for(&self, job: &Job) -> Vec<UploadedFile> {
        let dir = self.job_dir(job.id);
        job.uploads
            .iter()
            .map(|name| UploadedFile {
                name: name.clone(),
                path: dir.join(name),
            })
            .collect()
    }

    pub async fn remove_job(&self, job_id: Uuid) -> Result<(), UploadError> {
        match tokio::fs::remove_dir_all(self.job_dir(job_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn validate_file_name(file_name: &str) -> Result<(), UploadError> {
    let invalid = file_name.trim().is_empty()
        || file_name.contains('/')
        || file_name.contains('\\')
        || file_name.contains("..");

    if invalid {
        return Err(UploadError::InvalidFileName(file_name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanward_core::domain::job::JobConfiguration;

    #[tokio::test]
    async fn test_store_and_list_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        let mut job = Job::new("alpha", "alice", JobConfiguration::default());

        let stored = store.store(job.id, "sources.zip", b"zipdata").await.unwrap();
        job.uploads.push(stored.name.clone());

        assert_eq!(store.files_for(&job), vec![stored.clone()]);
        assert_eq!(tokio::fs::read(&stored.path).await.unwrap(), b"zipdata");
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());

        for name in ["../etc/passwd", "a/b", "a\\b", "  "] {
            let result = store.store(Uuid::new_v4(), name, b"x").await;
            assert!(matches!(result, Err(UploadError::InvalidFileName(_))), "{name}");
        }
    }

    #[tokio::test]
    async fn test_remove_missing_job_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        let job_id = Uuid::new_v4();

        store.remove_job(job_id).await.unwrap();
        store.store(job_id, "a.txt", b"a").await.unwrap();
        store.remove_job(job_id).await.unwrap();

        assert!(!dir.path().join(job_id.to_string()).exists());
    }
}
