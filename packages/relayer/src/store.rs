//! Instance snapshots on disk, one JSON file per chain

use eyre::{Result, WrapErr};
use std::path::{Path, PathBuf};

use token_bridge::ChainId;

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Open (and create if needed) a snapshot directory
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .wrap_err_with(|| format!("Failed to create state dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, chain_id: &ChainId) -> PathBuf {
        self.dir.join(format!("chain-{}.json", chain_id.to_u32()))
    }

    /// Write a snapshot, replacing the previous one only once fully written
    pub async fn save(&self, chain_id: &ChainId, snapshot: &str) -> Result<()> {
        let path = self.path_for(chain_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, snapshot)
            .await
            .wrap_err_with(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .wrap_err_with(|| format!("Failed to move snapshot into {}", path.display()))?;
        tracing::debug!(chain_id = %chain_id, path = %path.display(), "Snapshot saved");
        Ok(())
    }

    /// The stored snapshot for a chain, if any
    pub async fn load(&self, chain_id: &ChainId) -> Result<Option<String>> {
        let path = self.path_for(chain_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).wrap_err_with(|| format!("Failed to read {}", path.display())),
        }
    }
}
