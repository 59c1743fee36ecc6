//! Record store and event sink collaborators
//!
//! Both are fire-and-forget from the engine's perspective: persistence
//! failures are logged and never propagated into the trading loop.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::metrics::SessionMetrics;
use crate::session::{Session, SessionEvent, TradeRecord};

/// External persistence for trade and session records
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn append_trade(&self, record: &TradeRecord) -> Result<()>;
    async fn update_session_metrics(&self, session: &Session) -> Result<()>;
}

/// External notification sink for session and trade events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: SessionEvent);
}

/// In-memory store, the default for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryStore {
    trades: RwLock<Vec<TradeRecord>>,
    sessions: RwLock<HashMap<Uuid, SessionMetrics>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn trade_count(&self) -> usize {
        self.trades.read().await.len()
    }

    pub async fn trades_for(&self, session_id: Uuid, limit: usize) -> Vec<TradeRecord> {
        let trades = self.trades.read().await;
        trades
            .iter()
            .filter(|t| t.session_id == session_id)
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn metrics_for(&self, session_id: Uuid) -> Option<SessionMetrics> {
        self.sessions.read().await.get(&session_id).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn append_trade(&self, record: &TradeRecord) -> Result<()> {
        self.trades.write().await.push(record.clone());
        Ok(())
    }

    async fn update_session_metrics(&self, session: &Session) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.id, session.metrics.clone());
        Ok(())
    }
}

/// Append-only JSONL trade log plus per-session snapshot files
pub struct JsonlStore {
    dir: PathBuf,
}

impl JsonlStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn trades_path(&self) -> PathBuf {
        self.dir.join("trades.jsonl")
    }

    fn session_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.session.json"))
    }
}

#[async_trait]
impl RecordStore for JsonlStore {
    async fn append_trade(&self, record: &TradeRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.trades_path())
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }

    async fn update_session_metrics(&self, session: &Session) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;

        let data = serde_json::to_string_pretty(session)?;
        tokio::fs::write(self.session_path(session.id), data)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }
}

/// Event sink that logs through tracing
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn emit(&self, event: SessionEvent) {
        match &event {
            SessionEvent::SessionStarted {
                session_id,
                wallet_count,
                starting_capital,
            } => info!(
                session = %session_id,
                wallets = wallet_count,
                capital = starting_capital,
                "session started"
            ),
            SessionEvent::NewTrade { session_id, trade } => info!(
                session = %session_id,
                side = %trade.side,
                sol = trade.sol_amount,
                success = trade.success,
                "trade"
            ),
            SessionEvent::SessionStopped {
                session_id,
                status,
                reason,
                total_volume,
            } => info!(
                session = %session_id,
                status = ?status,
                reason = ?reason,
                volume = total_volume,
                "session stopped"
            ),
        }
    }
}

/// Sink that drops everything
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, _event: SessionEvent) {}
}

/// Persist a trade off the hot path. Errors are logged, never propagated.
pub fn spawn_append_trade(store: std::sync::Arc<dyn RecordStore>, record: TradeRecord) {
    tokio::spawn(async move {
        if let Err(e) = store.append_trade(&record).await {
            error!(trade = %record.id, "trade persistence failed: {e}");
        }
    });
}

/// Persist a session snapshot off the hot path.
pub fn spawn_update_session(store: std::sync::Arc<dyn RecordStore>, session: Session) {
    tokio::spawn(async move {
        if let Err(e) = store.update_session_metrics(&session).await {
            error!(session = %session.id, "session persistence failed: {e}");
        }
    });
}
