//! Content store and artifact store boundaries.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use sr_core::config::StorageConfig;
use sr_core::{Error, Result, Story, StoryId};
use sr_db::pool::{get_conn, DbPool};

/// Read-only access to stories and their scenes.
#[async_trait]
pub trait SceneStore: Send + Sync {
    async fn load_story(&self, id: StoryId) -> Result<Option<Story>>;
}

/// [`SceneStore`] over the local database.
pub struct DbSceneStore {
    db: DbPool,
}

impl DbSceneStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SceneStore for DbSceneStore {
    async fn load_story(&self, id: StoryId) -> Result<Option<Story>> {
        let conn = get_conn(&self.db)?;
        sr_db::queries::stories::load_story(&conn, id)
    }
}

/// Durable storage for finished videos.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store the file at `source` under `key`, returning its public URL.
    async fn put(&self, key: &str, source: &Path) -> Result<String>;

    /// Remove the object at `key`. Removing a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Stable key for a job's video.
pub fn video_key(story_id: StoryId, job_id: sr_core::JobId) -> String {
    format!("stories/{story_id}/{job_id}.mp4")
}

/// [`ArtifactStore`] over a local directory, served under `public_base_url`.
pub struct LocalArtifactStore {
    root: PathBuf,
    base_url: String,
}

impl LocalArtifactStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.output_dir.clone(),
            base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::Validation(format!("invalid artifact key '{key}'")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, key: &str, source: &Path) -> Result<String> {
        let dest = self.path_for(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Copy to a sibling and rename so readers never see a partial file.
        let partial = dest.with_extension("part");
        tokio::fs::copy(source, &partial).await?;
        tokio::fs::File::open(&partial).await?.sync_all().await?;
        tokio::fs::rename(&partial, &dest).await?;

        tracing::info!(key, "stored artifact {:?}", dest);
        Ok(format!("{}/{key}", self.base_url))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> LocalArtifactStore {
        LocalArtifactStore::new(&StorageConfig {
            output_dir: dir.to_path_buf(),
            public_base_url: "/media/".into(),
        })
    }

    #[tokio::test]
    async fn put_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("final.mp4");
        std::fs::write(&src, b"video").unwrap();
        let store = store(&dir.path().join("media"));

        let url = store.put("stories/s/j.mp4", &src).await.unwrap();
        assert_eq!(url, "/media/stories/s/j.mp4");
        let stored = store.root().join("stories/s/j.mp4");
        assert_eq!(std::fs::read(&stored).unwrap(), b"video");
        assert!(!store.root().join("stories/s/j.part").exists());

        store.delete("stories/s/j.mp4").await.unwrap();
        assert!(!stored.exists());
        // idempotent
        store.delete("stories/s/j.mp4").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        for key in ["../x.mp4", "/etc/passwd", "", "./a.mp4", "a/../../b"] {
            assert!(store.delete(key).await.is_err(), "{key} should be rejected");
        }
    }

    #[test]
    fn key_layout() {
        let story = StoryId::new();
        let job = sr_core::JobId::new();
        assert_eq!(video_key(story, job), format!("stories/{story}/{job}.mp4"));
    }
}
