//! JSON file storage implementation.
//!
//! Layout under the root directory:
//!
//! ```text
//! graphs/<graph_id>.json
//! instances/<instance_id>.json
//! pairs/<learner_hex>__<graph_id>.json   -> {"instance_id": ...}
//! ```
//!
//! Every file is written in full to a temporary sibling first, so a reader
//! sees either the old or the new document, never a partial one. Updates
//! rename the sibling into place. Graph and pair files must not exist yet:
//! they are hard-linked into place, which fails if the target exists and so
//! makes graph ids and learner x graph pairs unique even between processes. The version check in
//! [`Storage::update_instance`] is read-then-write and relies on the caller
//! serializing writers of one instance.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use pathwise_core::{Graph, GraphId, InstanceFilter, InstanceId, LearnerId, LearnerInstance};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use super::trait_::check_version;
use super::{Result, Storage, StorageError};

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct PairMarker {
    instance_id: InstanceId,
}

impl JsonStorage {
    /// Create storage, creating the directory layout if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("graphs")).await?;
        fs::create_dir_all(root.join("instances")).await?;
        fs::create_dir_all(root.join("pairs")).await?;

        Ok(Self { root })
    }

    fn graph_path(&self, id: GraphId) -> PathBuf {
        self.root.join("graphs").join(format!("{}.json", id))
    }
    fn instance_path(&self, id: InstanceId) -> PathBuf {
        self.root.join("instances").join(format!("{}.json", id))
    }
    fn pair_path(&self, learner_id: &LearnerId, graph_id: GraphId) -> PathBuf {
        // learner ids come from outside; hex keeps them filesystem-safe
        let learner: String = learner_id
            .as_str()
            .bytes()
            .map(|b| format!("{:02x}", b))
            .collect();
        self.root
            .join("pairs")
            .join(format!("{}__{}.json", learner, graph_id))
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn save_graph(&self, graph: &Graph) -> Result<()> {
        let path = self.graph_path(graph.id);
        let json = serde_json::to_string_pretty(graph)?;
        publish_new(&path, json.as_bytes())
            .await
            .map_err(|e| exists_as_duplicate(e, format!("graph {}", graph.id)))?;
        debug!(graph = %graph.id, "saved graph");
        Ok(())
    }

    async fn load_graph(&self, id: GraphId) -> Result<Option<Graph>> {
        read_json(&self.graph_path(id)).await
    }

    async fn list_graphs(&self) -> Result<Vec<Graph>> {
        list_dir(&self.root.join("graphs")).await
    }

    async fn insert_instance(&self, instance: &LearnerInstance) -> Result<()> {
        let pair = self.pair_path(&instance.learner_id, instance.graph_id);
        let marker = serde_json::to_string(&PairMarker {
            instance_id: instance.id,
        })?;
        publish_new(&pair, marker.as_bytes()).await.map_err(|e| {
            exists_as_duplicate(
                e,
                format!(
                    "instance for learner {} on graph {}",
                    instance.learner_id, instance.graph_id
                ),
            )
        })?;

        let json = serde_json::to_string_pretty(instance)?;
        if let Err(e) = write_atomic(&self.instance_path(instance.id), json.as_bytes()).await {
            // undo the claim so the learner can retry
            if let Err(cleanup) = remove_if_exists(&pair).await {
                warn!(
                    pair = %pair.display(),
                    error = %cleanup,
                    "stale pair marker left behind; learner cannot re-attach until it is removed"
                );
            }
            return Err(e.into());
        }
        debug!(instance = %instance.id, "inserted instance");
        Ok(())
    }

    async fn load_instance(&self, id: InstanceId) -> Result<Option<LearnerInstance>> {
        read_json(&self.instance_path(id)).await
    }

    async fn find_instance(
        &self,
        learner_id: &LearnerId,
        graph_id: GraphId,
    ) -> Result<Option<LearnerInstance>> {
        let marker: Option<PairMarker> = read_json(&self.pair_path(learner_id, graph_id)).await?;
        match marker {
            Some(marker) => self.load_instance(marker.instance_id).await,
            None => Ok(None),
        }
    }

    async fn update_instance(&self, instance: &LearnerInstance) -> Result<()> {
        let path = self.instance_path(instance.id);
        let stored: LearnerInstance = read_json(&path)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("instance {}", instance.id)))?;
        check_version(stored.version, instance)?;

        let json = serde_json::to_string_pretty(instance)?;
        write_atomic(&path, json.as_bytes()).await?;
        Ok(())
    }

    async fn delete_instance(&self, id: InstanceId) -> Result<bool> {
        let path = self.instance_path(id);
        let Some(stored) = read_json::<LearnerInstance>(&path).await? else {
            return Ok(false);
        };

        remove_if_exists(&path).await?;
        remove_if_exists(&self.pair_path(&stored.learner_id, stored.graph_id)).await?;
        debug!(instance = %id, "deleted instance");
        Ok(true)
    }

    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<LearnerInstance>> {
        let all = list_dir(&self.root.join("instances")).await?;
        Ok(all
            .into_iter()
            .filter(|i: &LearnerInstance| filter.matches(i))
            .collect())
    }
}

fn exists_as_duplicate(e: std::io::Error, what: String) -> StorageError {
    if e.kind() == std::io::ErrorKind::AlreadyExists {
        StorageError::Duplicate(what)
    } else {
        StorageError::Io(e)
    }
}

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Unique sibling name; ends in `.tmp` so listings skip it.
fn temp_sibling(path: &Path) -> PathBuf {
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    path.with_extension(format!("json.{}-{}.tmp", std::process::id(), seq))
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// Publish a file that must not exist yet. Fails with `AlreadyExists` if it
/// does; the target is never visible half-written.
async fn publish_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = temp_sibling(path);
    let result = match write_synced(&tmp, bytes).await {
        Ok(()) => fs::hard_link(&tmp, path).await,
        Err(e) => Err(e),
    };
    discard(&tmp).await;
    result
}

/// Replace a file by writing a temporary sibling and renaming it.
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = temp_sibling(path);
    let result = match write_synced(&tmp, bytes).await {
        Ok(()) => fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if result.is_err() {
        discard(&tmp).await;
    }
    result
}

async fn discard(tmp: &Path) {
    if let Err(e) = remove_if_exists(tmp).await {
        warn!(path = %tmp.display(), error = %e, "could not remove temporary file");
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    fs::remove_file(path).await.or_else(|e| {
        if e.kind() == std::io::ErrorKind::NotFound { Ok(()) } else { Err(e) }
    })?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json(&path).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable file"),
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_graph, sample_instance};
    use pathwise_core::MilestoneStatus;

    #[tokio::test]
    async fn test_graph_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let graph = sample_graph();

        storage.save_graph(&graph).await.unwrap();
        assert_eq!(storage.load_graph(graph.id).await.unwrap(), Some(graph.clone()));
        assert!(matches!(
            storage.save_graph(&graph).await,
            Err(StorageError::Duplicate(_))
        ));
        assert_eq!(storage.list_graphs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_instance_lifecycle_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let graph = sample_graph();
        let mut instance = sample_instance(&graph, "learner/with:odd chars");

        storage.insert_instance(&instance).await.unwrap();
        assert!(matches!(
            storage.insert_instance(&sample_instance(&graph, "learner/with:odd chars")).await,
            Err(StorageError::Duplicate(_))
        ));

        instance.version = 1;
        instance.node_states.get_mut("a").unwrap().status = MilestoneStatus::Completed;
        storage.update_instance(&instance).await.unwrap();

        // reopen to make sure nothing lived only in memory
        let reopened = JsonStorage::new(dir.path()).await.unwrap();
        let loaded = reopened
            .find_instance(&instance.learner_id, graph.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, instance);

        assert!(reopened.delete_instance(instance.id).await.unwrap());
        assert!(reopened.load_instance(instance.id).await.unwrap().is_none());
        assert!(reopened
            .find_instance(&instance.learner_id, graph.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_stale_update_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let graph = sample_graph();
        let mut instance = sample_instance(&graph, "u1");
        storage.insert_instance(&instance).await.unwrap();

        instance.version = 2;
        assert!(matches!(
            storage.update_instance(&instance).await,
            Err(StorageError::Conflict { found: 0, .. })
        ));
    }

    fn graph_dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir.join("graphs"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_graph_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let graph = sample_graph();

        storage.save_graph(&graph).await.unwrap();
        assert!(storage.save_graph(&graph).await.is_err());
        assert_eq!(graph_dir_entries(dir.path()), vec![format!("{}.json", graph.id)]);
    }

    #[tokio::test]
    async fn test_leftover_temp_file_does_not_block_save() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let graph = sample_graph();

        // a crashed writer's partial document
        let stale = dir.path().join("graphs").join(format!("{}.json.1-0.tmp", graph.id));
        fs::write(&stale, b"{\"id\": ").await.unwrap();

        assert!(storage.load_graph(graph.id).await.unwrap().is_none());
        assert!(storage.list_graphs().await.unwrap().is_empty());
        storage.save_graph(&graph).await.unwrap();
        assert_eq!(storage.load_graph(graph.id).await.unwrap(), Some(graph));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_graph_saves_and_reads() {
        let dir = tempfile::tempdir().unwrap();
        let storage = std::sync::Arc::new(JsonStorage::new(dir.path()).await.unwrap());
        let mut graph = sample_graph();
        // big enough that a write is not a single syscall's worth
        graph.meta.description = "x".repeat(256 * 1024);

        let mut saves = Vec::new();
        let mut loads = Vec::new();
        for _ in 0..8 {
            let (writer, copy) = (storage.clone(), graph.clone());
            saves.push(tokio::spawn(async move { writer.save_graph(&copy).await }));
            let (reader, id) = (storage.clone(), graph.id);
            loads.push(tokio::spawn(async move { reader.load_graph(id).await }));
        }

        let mut stored = 0;
        for save in saves {
            match save.await.unwrap() {
                Ok(()) => stored += 1,
                Err(StorageError::Duplicate(_)) => {}
                Err(e) => panic!("unexpected save error: {e}"),
            }
        }
        assert_eq!(stored, 1);

        for load in loads {
            // absent or complete, never torn
            if let Some(loaded) = load.await.unwrap().unwrap() {
                assert_eq!(loaded, graph);
            }
        }
        assert_eq!(graph_dir_entries(dir.path()), vec![format!("{}.json", graph.id)]);
    }

    #[tokio::test]
    async fn test_failed_insert_releases_pair() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let graph = sample_graph();
        let instance = sample_instance(&graph, "u1");

        // a directory in the way makes the instance write fail
        let blocker = dir.path().join("instances").join(format!("{}.json", instance.id));
        fs::create_dir(&blocker).await.unwrap();
        assert!(matches!(
            storage.insert_instance(&instance).await,
            Err(StorageError::Io(_))
        ));
        assert!(storage
            .find_instance(&instance.learner_id, graph.id)
            .await
            .unwrap()
            .is_none());

        fs::remove_dir(&blocker).await.unwrap();
        storage.insert_instance(&instance).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let graph = sample_graph();
        storage.insert_instance(&sample_instance(&graph, "u1")).await.unwrap();
        fs::write(dir.path().join("instances").join("notes.txt"), b"hi")
            .await
            .unwrap();
        fs::write(dir.path().join("instances").join("broken.json"), b"{")
            .await
            .unwrap();

        let listed = storage.list_instances(&InstanceFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}
