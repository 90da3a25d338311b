use std::path::{Path, PathBuf};

use anyhow::Context;
use uuid::Uuid;

use crate::{naming::StoreName, transfer::Fetcher};

/// Local storage root plus the means to pull files into it. Injected into
/// every executor.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    fetcher: Fetcher,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            fetcher: Fetcher::new(),
        }
    }

    /// Fresh `mapreduce.<uuid>` directory under `base`, or the system temp
    /// directory.
    pub async fn scratch(base: Option<&Path>) -> anyhow::Result<Self> {
        let mut root = base.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
        root.push(format!("mapreduce.{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("creating scratch directory {}", root.display()))?;
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &StoreName) -> PathBuf {
        self.root.join(name.to_string())
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub async fn cleanup(self) -> anyhow::Result<()> {
        tokio::fs::remove_dir_all(&self.root)
            .await
            .with_context(|| format!("removing {}", self.root.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scratch_is_unique_and_removable() {
        let base = tempfile::tempdir().unwrap();
        let a = Workspace::scratch(Some(base.path())).await.unwrap();
        let b = Workspace::scratch(Some(base.path())).await.unwrap();
        assert_ne!(a.root(), b.root());
        assert!(a.root().is_dir());
        assert!(a
            .root()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("mapreduce."));

        let root = a.root().to_path_buf();
        a.cleanup().await.unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn test_path() {
        let ws = Workspace::new("/tmp/job");
        assert_eq!(
            ws.path(&StoreName::ReduceOutput(2)),
            PathBuf::from("/tmp/job/reduce_2_output.db")
        );
    }
}
