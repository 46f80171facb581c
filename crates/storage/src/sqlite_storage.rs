//! SQLite storage backend.
//!
//! Graphs and instances are stored as JSON documents next to the columns
//! needed for lookups. Pair uniqueness is a table constraint and the version
//! check is part of the `UPDATE`, so both hold across processes.

use async_trait::async_trait;
use pathwise_core::{Graph, GraphId, InstanceFilter, InstanceId, LearnerId, LearnerInstance};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

use super::trait_::{Result, Storage, StorageError};

/// SQLite storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
    /// Database connection pool
    pool: sqlx::SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a database, e.g. `sqlite://pathwise.db`.
    pub async fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create an in-memory database for testing.
    ///
    /// Capped at one connection: every `:memory:` connection is its own
    /// database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS graphs (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS instances (
                id TEXT PRIMARY KEY,
                learner_id TEXT NOT NULL,
                graph_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                lifecycle TEXT NOT NULL,
                data TEXT NOT NULL,
                UNIQUE (learner_id, graph_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_instances_learner ON instances(learner_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn decode<T: serde::de::DeserializeOwned>(row: &sqlx::sqlite::SqliteRow) -> Result<T> {
        let data: String = row.try_get("data")?;
        Ok(serde_json::from_str(&data)?)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_graph(&self, graph: &Graph) -> Result<()> {
        let data = serde_json::to_string(graph)?;

        sqlx::query("INSERT INTO graphs (id, data, created_at) VALUES (?, ?, ?)")
            .bind(graph.id.to_string())
            .bind(data)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StorageError::Duplicate(format!("graph {}", graph.id))
                } else {
                    e.into()
                }
            })?;

        Ok(())
    }

    async fn load_graph(&self, id: GraphId) -> Result<Option<Graph>> {
        let row = sqlx::query("SELECT data FROM graphs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn list_graphs(&self) -> Result<Vec<Graph>> {
        let rows = sqlx::query("SELECT data FROM graphs ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::decode).collect()
    }

    async fn insert_instance(&self, instance: &LearnerInstance) -> Result<()> {
        let data = serde_json::to_string(instance)?;

        sqlx::query(
            "INSERT INTO instances (id, learner_id, graph_id, version, lifecycle, data)
            VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(instance.id.to_string())
        .bind(instance.learner_id.as_str())
        .bind(instance.graph_id.to_string())
        .bind(instance.version as i64)
        .bind(instance.lifecycle.as_str())
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::Duplicate(format!(
                    "instance for learner {} on graph {}",
                    instance.learner_id, instance.graph_id
                ))
            } else {
                e.into()
            }
        })?;

        Ok(())
    }

    async fn load_instance(&self, id: InstanceId) -> Result<Option<LearnerInstance>> {
        let row = sqlx::query("SELECT data FROM instances WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn find_instance(
        &self,
        learner_id: &LearnerId,
        graph_id: GraphId,
    ) -> Result<Option<LearnerInstance>> {
        let row = sqlx::query("SELECT data FROM instances WHERE learner_id = ? AND graph_id = ?")
            .bind(learner_id.as_str())
            .bind(graph_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn update_instance(&self, instance: &LearnerInstance) -> Result<()> {
        let data = serde_json::to_string(instance)?;
        let expected = instance.version.saturating_sub(1);

        let result = sqlx::query(
            "UPDATE instances SET version = ?, lifecycle = ?, data = ?
            WHERE id = ? AND version = ?",
        )
        .bind(instance.version as i64)
        .bind(instance.lifecycle.as_str())
        .bind(data)
        .bind(instance.id.to_string())
        .bind(expected as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Nothing matched: either gone or someone else wrote first.
        let row = sqlx::query("SELECT version FROM instances WHERE id = ?")
            .bind(instance.id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let found: i64 = row.try_get("version")?;
                Err(StorageError::Conflict {
                    id: instance.id,
                    expected,
                    found: found as u64,
                })
            }
            None => Err(StorageError::NotFound(format!("instance {}", instance.id))),
        }
    }

    async fn delete_instance(&self, id: InstanceId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM instances WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<LearnerInstance>> {
        let rows = match &filter.learner_id {
            Some(learner) => {
                sqlx::query("SELECT data FROM instances WHERE learner_id = ?")
                    .bind(learner.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT data FROM instances")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let instances = rows
            .iter()
            .map(Self::decode)
            .collect::<Result<Vec<LearnerInstance>>>()?;
        Ok(instances.into_iter().filter(|i| filter.matches(i)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_graph, sample_instance};

    #[tokio::test]
    async fn test_graph_operations() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let graph = sample_graph();

        storage.save_graph(&graph).await.unwrap();
        let loaded = storage.load_graph(graph.id).await.unwrap().unwrap();
        assert_eq!(loaded, graph);
        assert!(matches!(
            storage.save_graph(&graph).await,
            Err(StorageError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_instance_operations() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let graph = sample_graph();
        let mut instance = sample_instance(&graph, "u1");

        storage.insert_instance(&instance).await.unwrap();
        assert!(matches!(
            storage.insert_instance(&sample_instance(&graph, "u1")).await,
            Err(StorageError::Duplicate(_))
        ));

        instance.version = 1;
        storage.update_instance(&instance).await.unwrap();
        assert!(matches!(
            storage.update_instance(&instance).await,
            Err(StorageError::Conflict { expected: 0, found: 1, .. })
        ));

        let found = storage
            .find_instance(&instance.learner_id, graph.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.version, 1);

        let listed = storage
            .list_instances(&InstanceFilter::learner(LearnerId::from("u1")))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        assert!(storage.delete_instance(instance.id).await.unwrap());
        assert!(!storage.delete_instance(instance.id).await.unwrap());
    }
}
