use std::path::{Path, PathBuf};

use uuid::Uuid;

const SCRATCH_DIR: &str = "scratch";

/// Local artifact area rooted at the configured media directory.
///
/// Every job owns `<root>/<job-id>/`; final artifacts live directly in it and
/// intermediate files under `<root>/<job-id>/scratch/`. Artifacts are
/// referenced by keys relative to the root (`<job-id>/video.mp4`).
#[derive(Debug, Clone)]
pub struct ArtifactStorage {
    root: PathBuf,
}

impl ArtifactStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if missing.
    pub async fn init(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::Io(self.root.clone(), e))
    }

    pub fn job_dir(&self, job_id: Uuid) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    pub fn scratch_dir(&self, job_id: Uuid) -> PathBuf {
        self.job_dir(job_id).join(SCRATCH_DIR)
    }

    /// Path of a final artifact for a job.
    pub fn artifact_path(&self, job_id: Uuid, name: &str) -> PathBuf {
        self.job_dir(job_id).join(name)
    }

    /// Path of an intermediate file for a job.
    pub fn scratch_path(&self, job_id: Uuid, name: &str) -> PathBuf {
        self.scratch_dir(job_id).join(name)
    }

    /// Ensure both the job and scratch directories exist.
    pub async fn prepare_job(&self, job_id: Uuid) -> Result<(), StorageError> {
        let dir = self.scratch_dir(job_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::Io(dir, e))
    }

    /// Key for a path inside the root; `None` for paths outside it.
    pub fn key_for(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.root)
            .ok()
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
    }

    pub fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Key for an existing, non-empty file inside the root.
    pub async fn existing_key(&self, path: &Path) -> Result<String, StorageError> {
        let key = self
            .key_for(path)
            .ok_or_else(|| StorageError::OutsideRoot(path.to_path_buf()))?;
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(key),
            Ok(_) => Err(StorageError::Empty(path.to_path_buf())),
            Err(e) => Err(StorageError::Io(path.to_path_buf(), e)),
        }
    }

    /// Remove a job's intermediate files. Missing directories are fine.
    pub async fn purge_scratch(&self, job_id: Uuid) -> Result<(), StorageError> {
        remove_dir_if_present(&self.scratch_dir(job_id)).await
    }

    /// Remove everything a job produced.
    pub async fn delete_job(&self, job_id: Uuid) -> Result<(), StorageError> {
        remove_dir_if_present(&self.job_dir(job_id)).await
    }
}

async fn remove_dir_if_present(dir: &Path) -> Result<(), StorageError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::Io(dir.to_path_buf(), e)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("{0} is empty")]
    Empty(PathBuf),

    #[error("{0} is outside the media directory")]
    OutsideRoot(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keys_are_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ArtifactStorage::new(dir.path());
        let id = Uuid::new_v4();

        let path = storage.artifact_path(id, "video.mp4");
        assert_eq!(storage.key_for(&path), Some(format!("{id}/video.mp4")));
        assert_eq!(storage.resolve(&format!("{id}/video.mp4")), path);
        assert_eq!(storage.key_for(Path::new("/elsewhere/x.mp4")), None);
    }

    #[tokio::test]
    async fn existing_key_requires_non_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ArtifactStorage::new(dir.path());
        let id = Uuid::new_v4();
        storage.prepare_job(id).await.unwrap();

        let path = storage.artifact_path(id, "narration.wav");
        assert!(storage.existing_key(&path).await.is_err());

        tokio::fs::write(&path, b"").await.unwrap();
        assert!(matches!(storage.existing_key(&path).await, Err(StorageError::Empty(_))));

        tokio::fs::write(&path, b"RIFF").await.unwrap();
        assert_eq!(storage.existing_key(&path).await.unwrap(), format!("{id}/narration.wav"));
    }

    #[tokio::test]
    async fn purge_keeps_final_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ArtifactStorage::new(dir.path());
        let id = Uuid::new_v4();
        storage.prepare_job(id).await.unwrap();

        tokio::fs::write(storage.scratch_path(id, "concat.mp4"), b"x").await.unwrap();
        tokio::fs::write(storage.artifact_path(id, "video.mp4"), b"x").await.unwrap();

        storage.purge_scratch(id).await.unwrap();
        assert!(!storage.scratch_dir(id).exists());
        assert!(storage.artifact_path(id, "video.mp4").exists());

        storage.delete_job(id).await.unwrap();
        assert!(!storage.job_dir(id).exists());
        // Idempotent.
        storage.delete_job(id).await.unwrap();
    }
}
