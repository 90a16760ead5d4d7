//! Job-scoped scratch storage.
//!
//! Every file a job creates lives under one [`WorkDir`] and carries the job
//! id in its name, so concurrent jobs sharing a root never collide.

use std::path::{Path, PathBuf};

use reelsmith_common::error::ReelResult;

/// Root directory for intermediates and local outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root if needed.
    pub async fn ensure(&self) -> ReelResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Downloaded background. `extension` should follow the source.
    pub fn background_path(&self, job_id: &str, extension: &str) -> PathBuf {
        self.root.join(format!("temp_bg_{job_id}.{extension}"))
    }

    pub fn audio_path(&self, job_id: &str, extension: &str) -> PathBuf {
        self.root.join(format!("temp_audio_{job_id}.{extension}"))
    }

    /// Glyph image for the emoji at `element_index` in the scene.
    pub fn glyph_path(&self, job_id: &str, element_index: usize) -> PathBuf {
        self.root.join(format!("emoji_{job_id}_{element_index}.png"))
    }

    pub fn output_path(&self, job_id: &str) -> PathBuf {
        self.root.join(format!("final_{job_id}.mp4"))
    }

    /// Output file name, also used as the remote object name.
    pub fn output_file_name(job_id: &str) -> String {
        format!("final_{job_id}.mp4")
    }
}

/// Intermediates registered by a job.
///
/// [`ScratchFiles::cleanup`] removes them; dropping the guard without
/// cleaning up removes them too, so an early return or panic never leaks
/// files. Removal errors are never escalated.
#[derive(Debug, Default)]
pub struct ScratchFiles {
    job_id: String,
    paths: Vec<PathBuf>,
}

impl ScratchFiles {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            paths: vec![],
        }
    }

    /// Track a path for removal. Registering before the file exists is fine.
    pub fn register(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Stop tracking `path`; it survives cleanup.
    pub fn keep(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Remove every registered file. Returns how many were actually deleted.
    pub async fn cleanup(&mut self) -> usize {
        let mut removed = 0;
        for path in self.paths.drain(..) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(job_id = %self.job_id, path = %path.display(), "Scratch file already gone");
                }
                Err(e) => {
                    tracing::warn!(job_id = %self.job_id, path = %path.display(), error = %e, "Failed to remove scratch file");
                }
            }
        }
        tracing::debug!(job_id = %self.job_id, removed, "Scratch cleanup finished");
        removed
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch file on drop");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_namespaced_by_job() {
        let work = WorkDir::new("/scratch");
        assert_eq!(
            work.background_path("abc", "mp4"),
            PathBuf::from("/scratch/temp_bg_abc.mp4")
        );
        assert_eq!(
            work.audio_path("abc", "mp3"),
            PathBuf::from("/scratch/temp_audio_abc.mp3")
        );
        assert_eq!(
            work.glyph_path("abc", 2),
            PathBuf::from("/scratch/emoji_abc_2.png")
        );
        assert_eq!(
            work.output_path("abc"),
            PathBuf::from("/scratch/final_abc.mp4")
        );
        assert_ne!(work.output_path("abc"), work.output_path("abd"));
    }

    #[tokio::test]
    async fn test_cleanup_swallows_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.bin");
        std::fs::write(&present, b"x").unwrap();

        let mut scratch = ScratchFiles::new("job");
        scratch.register(&present);
        scratch.register(dir.path().join("never-created.bin"));
        scratch.register(&present);
        assert_eq!(scratch.paths().len(), 2);

        assert_eq!(scratch.cleanup().await, 1);
        assert!(!present.exists());
        assert!(scratch.paths().is_empty());
    }

    #[tokio::test]
    async fn test_kept_paths_survive_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("final_job.mp4");
        std::fs::write(&output, b"mp4").unwrap();

        let mut scratch = ScratchFiles::new("job");
        scratch.register(&output);
        scratch.keep(&output);
        assert_eq!(scratch.cleanup().await, 0);
        assert!(output.exists());
    }

    #[test]
    fn test_drop_removes_registered_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leftover.png");
        std::fs::write(&path, b"png").unwrap();

        {
            let mut scratch = ScratchFiles::new("job");
            scratch.register(&path);
        }

        assert!(!path.exists());
    }
}
