//! Per-job scratch directories.
//!
//! A [`Workspace`] owns a temporary directory under the configured scratch
//! root. Fetched assets, rendered clips, padded audio and the subtitle file
//! all live there, and the whole tree is removed when the workspace drops,
//! whether the job succeeded, failed, or unwound.

use std::fmt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Directory name prefix shared by every job workspace.
const JOB_DIR_PREFIX: &str = "job-";

/// Scratch directory exclusively owned by one render job.
#[derive(Debug)]
pub struct Workspace {
    temp_dir: TempDir,
}

impl Workspace {
    /// Create a fresh workspace for `job_id` under `root`.
    pub fn for_job(root: &Path, job_id: impl fmt::Display) -> sr_core::Result<Self> {
        std::fs::create_dir_all(root)?;
        let temp_dir = tempfile::Builder::new()
            .prefix(&format!("{JOB_DIR_PREFIX}{job_id}-"))
            .tempdir_in(root)
            .map_err(|e| {
                sr_core::Error::pipeline(
                    "workspace",
                    format!("failed to create scratch dir under {}: {e}", root.display()),
                )
            })?;

        Ok(Self { temp_dir })
    }

    /// Path to the workspace directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path for a named file inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Path for a per-scene artifact, e.g. `scene-003-clip.mp4`.
    pub fn scene_file(&self, index: usize, role: &str, ext: &str) -> PathBuf {
        self.file(&format!("scene-{index:03}-{role}.{ext}"))
    }

    /// Remove job directories left under `root` by a process that died.
    ///
    /// Only call this before any job of the current process has started.
    pub fn sweep_stale(root: &Path) -> sr_core::Result<usize> {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let is_job_dir = entry.file_type()?.is_dir()
                && entry.file_name().to_string_lossy().starts_with(JOB_DIR_PREFIX);
            if !is_job_dir {
                continue;
            }
            match std::fs::remove_dir_all(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    "Failed to remove stale scratch dir {}: {e}",
                    entry.path().display()
                ),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn workspace_lives_under_root_with_job_prefix() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::for_job(root.path(), "abc").unwrap();
        assert!(ws.path().starts_with(root.path()));
        let name = ws.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("job-abc-"), "unexpected dir name {name}");
    }

    #[test]
    fn scene_file_naming() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::for_job(root.path(), "abc").unwrap();
        let clip = ws.scene_file(7, "clip", "mp4");
        assert!(clip.starts_with(ws.path()));
        assert_eq!(clip.file_name().unwrap(), "scene-007-clip.mp4");
    }

    #[test]
    fn drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::for_job(root.path(), "abc").unwrap();
        fs::write(ws.file("captions.ass"), b"[Script Info]").unwrap();
        let path = ws.path().to_path_buf();
        drop(ws);
        assert!(!path.exists());
    }

    #[test]
    fn creates_missing_root() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("nested").join("scratch");
        let ws = Workspace::for_job(&root, "abc").unwrap();
        assert!(ws.path().exists());
    }

    #[test]
    fn sweep_removes_only_job_dirs() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("job-dead-1234")).unwrap();
        fs::write(root.path().join("job-dead-1234").join("clip.mp4"), b"x").unwrap();
        fs::create_dir(root.path().join("keep-me")).unwrap();
        fs::write(root.path().join("job-file.txt"), b"not a dir").unwrap();

        let removed = Workspace::sweep_stale(root.path()).unwrap();
        assert_eq!(removed, 1);
        assert!(!root.path().join("job-dead-1234").exists());
        assert!(root.path().join("keep-me").exists());
        assert!(root.path().join("job-file.txt").exists());
    }

    #[test]
    fn sweep_missing_root_is_noop() {
        let removed = Workspace::sweep_stale(Path::new("/nonexistent/storyreel-scratch")).unwrap();
        assert_eq!(removed, 0);
    }
}
