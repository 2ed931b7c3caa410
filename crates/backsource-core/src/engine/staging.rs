//! Temp-file staging for materialized fetches
//!
//! The staged file lives in the same directory as the final destination so
//! that promotion is a same-filesystem atomic rename. Names carry the session
//! signature plus a random suffix, keeping concurrent fetches for different
//! tasks from colliding.

use crate::error::FetchError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

pub struct StagedTempFile {
    path: PathBuf,
    file: File,
}

/// Pick a unique temp path colocated with `destination`.
///
/// The name carries the session signature plus a random suffix, so
/// concurrent fetches never collide and the result can never equal the
/// destination itself.
pub fn staged_path(destination: &Path, session_sign: &str) -> PathBuf {
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    dir.join(format!(
        "backsource.{}.{}",
        session_sign,
        Uuid::new_v4().simple()
    ))
}

impl StagedTempFile {
    /// Create a uniquely named temp file next to `destination`.
    pub async fn create(destination: &Path, session_sign: &str) -> Result<Self, FetchError> {
        Self::create_at(staged_path(destination, session_sign)).await
    }

    /// Create the staged file at an already-chosen path.
    pub async fn create_at(path: PathBuf) -> Result<Self, FetchError> {
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .await?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a fully-read buffer to the staged file.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), FetchError> {
        Ok(self.file.write_all(data).await?)
    }

    /// Flush, sync and atomically rename onto `destination`, replacing any
    /// existing file. Consumes the staged file; afterwards the temp path no
    /// longer exists on disk.
    pub async fn promote(self, destination: &Path) -> Result<(), FetchError> {
        let Self { path, mut file } = self;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&path, destination).await?;
        Ok(())
    }
}

/// Delete a staged temp file, ignoring the not-found case.
///
/// Returns whether a file was actually removed; unexpected failures surface
/// to the caller, which reports them as diagnostics only.
pub async fn remove_staged(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn staged_path_differs_from_destination() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("artifact.bin");

        let staged = StagedTempFile::create(&destination, "sign-1").await.unwrap();
        assert_ne!(staged.path(), destination);
        assert_eq!(staged.path().parent(), destination.parent());
        let name = staged.path().file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("backsource.sign-1."));
    }

    #[tokio::test]
    async fn concurrent_sessions_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("artifact.bin");

        let a = StagedTempFile::create(&destination, "sign-1").await.unwrap();
        let b = StagedTempFile::create(&destination, "sign-1").await.unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn promote_moves_bytes_and_clears_temp() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("artifact.bin");

        let mut staged = StagedTempFile::create(&destination, "s").await.unwrap();
        staged.write_all(b"contents").await.unwrap();
        let temp_path = staged.path().to_path_buf();
        staged.promote(&destination).await.unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"contents");
        assert!(!temp_path.exists());
    }

    #[tokio::test]
    async fn promote_replaces_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("artifact.bin");
        std::fs::write(&destination, b"old").unwrap();

        let mut staged = StagedTempFile::create(&destination, "s").await.unwrap();
        staged.write_all(b"new").await.unwrap();
        staged.promote(&destination).await.unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"new");
    }

    #[tokio::test]
    async fn remove_staged_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("artifact.bin");

        let staged = StagedTempFile::create(&destination, "s").await.unwrap();
        let path = staged.path().to_path_buf();
        drop(staged);

        assert!(remove_staged(&path).await.unwrap());
        assert!(!remove_staged(&path).await.unwrap());
    }
}
