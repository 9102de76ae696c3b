use std::collections::HashMap;
use std::path::Path;

use parking_lot::{Mutex, RwLock};
use rusqlite::Connection;
use tracing::debug;

use super::{HypergraphNode, Layer};
use crate::error::{HelmsmanError, Result};

/// Storage contract for the hypergraph. Implementations are chosen
/// explicitly at construction time; the store never probes the environment
/// to decide where data lives.
pub trait KnowledgeBackend: Send + Sync {
    fn get(&self, layer: Layer, key: &str) -> Result<Option<HypergraphNode>>;
    fn put(&self, layer: Layer, key: &str, node: &HypergraphNode) -> Result<()>;
    fn scan(&self) -> Result<Vec<(Layer, String, HypergraphNode)>>;
}

/// Process-local backend over a plain map.
#[derive(Default)]
pub struct MemoryBackend {
    nodes: RwLock<HashMap<(Layer, String), HypergraphNode>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KnowledgeBackend for MemoryBackend {
    fn get(&self, layer: Layer, key: &str) -> Result<Option<HypergraphNode>> {
        Ok(self.nodes.read().get(&(layer, key.to_string())).cloned())
    }

    fn put(&self, layer: Layer, key: &str, node: &HypergraphNode) -> Result<()> {
        self.nodes
            .write()
            .insert((layer, key.to_string()), node.clone());
        Ok(())
    }

    fn scan(&self) -> Result<Vec<(Layer, String, HypergraphNode)>> {
        Ok(self
            .nodes
            .read()
            .iter()
            .map(|((layer, key), node)| (*layer, key.clone(), node.clone()))
            .collect())
    }
}

/// External graph store adapter over SQLite, mirroring the `(layer, key)`
/// scheme as node properties.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS knowledge_nodes (
                layer INTEGER NOT NULL,
                key   TEXT NOT NULL,
                attrs TEXT NOT NULL,
                PRIMARY KEY (layer, key)
            );",
        )?;
        debug!(path = %path.display(), "Knowledge SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS knowledge_nodes (
                layer INTEGER NOT NULL,
                key   TEXT NOT NULL,
                attrs TEXT NOT NULL,
                PRIMARY KEY (layer, key)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KnowledgeBackend for SqliteBackend {
    fn get(&self, layer: Layer, key: &str) -> Result<Option<HypergraphNode>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT attrs FROM knowledge_nodes WHERE layer = ?1 AND key = ?2")?;
        let mut rows = stmt.query((layer.index(), key))?;

        match rows.next()? {
            Some(row) => {
                let attrs: String = row.get(0)?;
                let node = serde_json::from_str(&attrs)?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    fn put(&self, layer: Layer, key: &str, node: &HypergraphNode) -> Result<()> {
        let attrs = serde_json::to_string(node)?;
        self.conn.lock().execute(
            "INSERT INTO knowledge_nodes (layer, key, attrs) VALUES (?1, ?2, ?3)
             ON CONFLICT(layer, key) DO UPDATE SET attrs = excluded.attrs",
            (layer.index(), key, attrs),
        )?;
        Ok(())
    }

    fn scan(&self) -> Result<Vec<(Layer, String, HypergraphNode)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT layer, key, attrs FROM knowledge_nodes")?;
        let mut rows = stmt.query(())?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let layer_idx: u8 = row.get(0)?;
            let key: String = row.get(1)?;
            let attrs: String = row.get(2)?;

            let layer = Layer::from_index(layer_idx).ok_or_else(|| {
                HelmsmanError::Knowledge(format!("invalid layer index in store: {}", layer_idx))
            })?;
            out.push((layer, key, serde_json::from_str(&attrs)?));
        }
        Ok(out)
    }
}
