use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Mission, MissionStatus};
use crate::error::{HelmsmanError, Result};

/// Staging suffix for documents mid-write. Anything still carrying it at
/// startup is an interrupted write and gets swept.
const PARTIAL_EXT: &str = "partial";

/// Durable mission documents, one YAML file per mission id.
///
/// Writes stage into a `.partial` sibling, fsync, then rename into place,
/// so a crash leaves either the previous document or a sweepable partial,
/// never a torn file.
pub struct MissionStore {
    missions_dir: PathBuf,
}

impl MissionStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            missions_dir: data_dir.join("missions"),
        }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.missions_dir).await?;
        self.sweep_partial_writes().await;
        Ok(())
    }

    /// Fresh mission id: date-stamped with a random suffix, unique without
    /// scanning the directory.
    pub fn next_id(&self) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("m-{}-{}", Utc::now().format("%Y%m%d"), &suffix[..6])
    }

    pub async fn save(&self, mission: &Mission) -> Result<()> {
        let path = self.document_path(&mission.id);
        let staging = path.with_extension(PARTIAL_EXT);
        let body = serde_yaml_bw::to_string(mission)?;

        let mut file = fs::File::create(&staging).await?;
        file.write_all(body.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&staging, &path).await?;
        debug!(mission_id = %mission.id, "Mission document persisted");
        Ok(())
    }

    pub async fn load(&self, mission_id: &str) -> Result<Mission> {
        match self.read_document(&self.document_path(mission_id)).await {
            Err(HelmsmanError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Err(HelmsmanError::MissionNotFound(mission_id.to_string()))
            }
            other => other,
        }
    }

    /// All missions, newest first. Unreadable documents are logged and
    /// skipped rather than failing the whole listing.
    pub async fn list(&self) -> Result<Vec<Mission>> {
        let mut missions = Vec::new();

        let mut entries = match fs::read_dir(&self.missions_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(missions),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "yaml") {
                continue;
            }
            match self.read_document(&path).await {
                Ok(mission) => missions.push(mission),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "Skipping unreadable mission document"
                ),
            }
        }

        missions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(missions)
    }

    pub async fn list_by_status(&self, status: MissionStatus) -> Result<Vec<Mission>> {
        let missions = self.list().await?;
        Ok(missions
            .into_iter()
            .filter(|m| m.status == status)
            .collect())
    }

    async fn read_document(&self, path: &Path) -> Result<Mission> {
        let body = fs::read_to_string(path).await?;
        Ok(serde_yaml_bw::from_str(&body)?)
    }

    async fn sweep_partial_writes(&self) {
        let Ok(mut entries) = fs::read_dir(&self.missions_dir).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == PARTIAL_EXT) {
                debug!(path = %path.display(), "Sweeping interrupted write");
                let _ = fs::remove_file(&path).await;
            }
        }
    }

    fn document_path(&self, mission_id: &str) -> PathBuf {
        self.missions_dir.join(format!("{}.yaml", mission_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mission::MissionNode;
    use tempfile::TempDir;

    async fn store_in(dir: &TempDir) -> MissionStore {
        let store = MissionStore::new(dir.path());
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        let mut mission = Mission::new("m-20260829-abc123", "title", "goal");
        mission
            .dag
            .add_node(MissionNode::new("a", "search", "root", "find docs"));

        store.save(&mission).await.unwrap();
        let loaded = store.load("m-20260829-abc123").await.unwrap();

        assert_eq!(loaded.id, "m-20260829-abc123");
        assert_eq!(loaded.dag.len(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_mission() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        let err = store.load("m-404").await.unwrap_err();
        assert!(matches!(err, HelmsmanError::MissionNotFound(_)));
    }

    #[tokio::test]
    async fn test_next_id_is_prefixed_and_unique() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        let a = store.next_id();
        let b = store.next_id();
        assert!(a.starts_with("m-"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_list_skips_unreadable_documents() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        store.save(&Mission::new("m-good", "t", "g")).await.unwrap();
        tokio::fs::write(
            dir.path().join("missions").join("m-bad.yaml"),
            "{{{ not yaml",
        )
        .await
        .unwrap();

        let missions = store.list().await.unwrap();
        assert_eq!(missions.len(), 1);
        assert_eq!(missions[0].id, "m-good");
    }

    #[tokio::test]
    async fn test_init_sweeps_interrupted_writes() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        store.save(&Mission::new("m-kept", "t", "g")).await.unwrap();

        let partial = dir.path().join("missions").join("m-torn.partial");
        tokio::fs::write(&partial, "half a document").await.unwrap();

        store.init().await.unwrap();
        assert!(!partial.exists());
        assert!(store.load("m-kept").await.is_ok());
    }
}
