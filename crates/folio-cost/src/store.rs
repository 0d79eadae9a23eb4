//! Ledger storage backends
//!
//! - `JsonFileStore`: `costs.json` and `budgets.json` in a data directory
//! - `MemoryLedgerStore`: in-process only, for tests and dry runs

use crate::error::{Error, Result};
use crate::ledger::{Budgets, CostLedger};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Default data directory, relative to the home directory
const DEFAULT_COSTS_DIR: &str = ".folio/costs";

/// Ledger file name
pub const LEDGER_FILE: &str = "costs.json";

/// Budget file name
pub const BUDGETS_FILE: &str = "budgets.json";

/// Persistence for ledgers and budgets
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the ledger, or an empty one if nothing was saved yet
    async fn load_ledger(&self) -> Result<CostLedger>;

    /// Replace the stored ledger
    async fn save_ledger(&self, ledger: &CostLedger) -> Result<()>;

    /// Load budgets, or no ceilings if nothing was saved yet
    async fn load_budgets(&self) -> Result<Budgets>;

    /// Replace the stored budgets
    async fn save_budgets(&self, budgets: &Budgets) -> Result<()>;
}

/// JSON files on disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    /// Store under `~/.folio/costs/`
    #[must_use]
    pub fn new() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(DEFAULT_COSTS_DIR))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_COSTS_DIR));
        Self { data_dir }
    }

    /// Store under a custom directory
    #[must_use]
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            data_dir: path.as_ref().to_path_buf(),
        }
    }

    /// Data directory
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    async fn read_json<T: serde::de::DeserializeOwned + Default>(&self, file: &str) -> Result<T> {
        let path = self.data_dir.join(file);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                Error::Storage(format!("failed to parse {:?}: {}", path, e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?path, "No stored file yet, using defaults");
                Ok(T::default())
            }
            Err(e) => Err(Error::Storage(format!("failed to read {:?}: {}", path, e))),
        }
    }

    async fn write_json<T: serde::Serialize>(&self, file: &str, value: &T) -> Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await.map_err(|e| {
            Error::Storage(format!(
                "failed to create data directory {:?}: {}",
                self.data_dir, e
            ))
        })?;

        let path = self.data_dir.join(file);
        let tmp = self.data_dir.join(format!("{file}.tmp"));
        let content = serde_json::to_string_pretty(value)?;

        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| Error::Storage(format!("failed to write {:?}: {}", tmp, e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Storage(format!("failed to replace {:?}: {}", path, e)))?;

        debug!(path = ?path, "Saved");
        Ok(())
    }
}

impl Default for JsonFileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for JsonFileStore {
    async fn load_ledger(&self) -> Result<CostLedger> {
        let ledger: CostLedger = self.read_json(LEDGER_FILE).await?;
        info!(
            sessions = ledger.sessions.len(),
            total = ledger.total,
            "Loaded cost ledger"
        );
        Ok(ledger)
    }

    async fn save_ledger(&self, ledger: &CostLedger) -> Result<()> {
        self.write_json(LEDGER_FILE, ledger).await
    }

    async fn load_budgets(&self) -> Result<Budgets> {
        self.read_json(BUDGETS_FILE).await
    }

    async fn save_budgets(&self, budgets: &Budgets) -> Result<()> {
        self.write_json(BUDGETS_FILE, budgets).await
    }
}

/// In-memory store (tests, dry runs)
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    ledger: RwLock<CostLedger>,
    budgets: RwLock<Budgets>,
}

impl MemoryLedgerStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a ledger and budgets
    #[must_use]
    pub fn seeded(ledger: CostLedger, budgets: Budgets) -> Self {
        Self {
            ledger: RwLock::new(ledger),
            budgets: RwLock::new(budgets),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load_ledger(&self) -> Result<CostLedger> {
        Ok(self.ledger.read().await.clone())
    }

    async fn save_ledger(&self, ledger: &CostLedger) -> Result<()> {
        *self.ledger.write().await = ledger.clone();
        Ok(())
    }

    async fn load_budgets(&self) -> Result<Budgets> {
        Ok(*self.budgets.read().await)
    }

    async fn save_budgets(&self, budgets: &Budgets) -> Result<()> {
        *self.budgets.write().await = *budgets;
        Ok(())
    }
}
