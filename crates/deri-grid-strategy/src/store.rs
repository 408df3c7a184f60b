/*
[INPUT]:  In-memory ladders and the order log path.
[OUTPUT]: Durable JSON snapshots, restored ladders.
[POS]:    Persistence layer - single snapshot file, rewritten whole.
[UPDATE]: When the snapshot format or load/save semantics change.
*/

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::ladder::{GridOrder, Ladder, LadderPair};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("order log is corrupt: {path}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("order log is invalid: {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("order log serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk shape of the order log.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    buy: Vec<GridOrder>,
    #[serde(default)]
    sell: Vec<GridOrder>,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
}

/// Durable snapshot of both ladders, one JSON file rewritten whole.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous snapshot intact. A file that exists
/// but cannot be parsed is a fatal condition: it may describe live orders
/// the engine would otherwise lose track of.
#[derive(Debug, Clone)]
pub struct OrderStore {
    path: PathBuf,
}

impl OrderStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted ladders.
    ///
    /// A missing file is the first-run case: an empty snapshot is written as
    /// a placeholder and empty ladders are returned. A present-but-unreadable
    /// file returns `Corrupt` or `Invalid` and must stop the engine.
    pub async fn load(&self) -> Result<LadderPair, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "order log not found, starting empty");
                let empty = LadderPair::default();
                self.save(&empty).await?;
                return Ok(empty);
            }
            Err(err) => return Err(err.into()),
        };

        let snapshot: Snapshot =
            serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        let mut pair = LadderPair::default();
        pair.buy = Ladder::from_orders(snapshot.buy).map_err(|err| StoreError::Invalid {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;
        pair.sell = Ladder::from_orders(snapshot.sell).map_err(|err| StoreError::Invalid {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;

        self.check_cross_side_ids(&pair)?;

        info!(
            path = %self.path.display(),
            buy_orders = pair.buy.len(),
            sell_orders = pair.sell.len(),
            "order log loaded"
        );
        Ok(pair)
    }

    /// Persist both ladders atomically.
    pub async fn save(&self, ladders: &LadderPair) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            buy: ladders.buy.orders_sorted(),
            sell: ladders.sell.orders_sorted(),
            saved_at: Some(Utc::now()),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json.as_bytes()).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    fn check_cross_side_ids(&self, pair: &LadderPair) -> Result<(), StoreError> {
        let buy_ids: HashSet<String> = pair.buy.order_ids().into_iter().collect();
        for id in pair.sell.order_ids() {
            if buy_ids.contains(&id) {
                return Err(StoreError::Invalid {
                    path: self.path.clone(),
                    reason: format!("order_id appears on both sides: {id}"),
                });
            }
        }
        Ok(())
    }
}
