//! The volume engine
//!
//! Owns every session: provisioning, the background scheduler task, and the
//! control surface (pause, resume, stop, status, trade history). Sessions
//! are independent; each gets its own wallet pool, rng stream, and lock.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::backend::{build_backend, SettlementBackend};
use crate::config::{Config, SessionConfig};
use crate::error::{Error, Result};
use crate::executor::TradeExecutor;
use crate::policy::DecisionPolicy;
use crate::pricing::Side;
use crate::rng::TradeRng;
use crate::session::{
    SchedulerContext, Session, SessionCommand, SessionEvent, SessionScheduler, SessionStatus,
    StopReason, TradeRecord,
};
use crate::store::{EventSink, JsonlStore, LogSink, MemoryStore, RecordStore};
use crate::wallet::{FundingAccount, WalletPool};

/// Control handle for one live session
struct SessionHandle {
    state: Arc<Mutex<SchedulerContext>>,
    commands: mpsc::Sender<SessionCommand>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

pub struct VolumeEngine {
    config: Config,
    backend: Arc<dyn SettlementBackend>,
    store: Arc<dyn RecordStore>,
    events: Arc<dyn EventSink>,
    sessions: DashMap<Uuid, Arc<SessionHandle>>,
}

impl VolumeEngine {
    pub fn new(config: Config) -> Result<Self> {
        let backend = build_backend(&config.backend)?;
        let store: Arc<dyn RecordStore> = match &config.store.path {
            Some(dir) => Arc::new(JsonlStore::new(dir.clone())),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self {
            config,
            backend,
            store,
            events: Arc::new(LogSink),
            sessions: DashMap::new(),
        })
    }

    /// Replace the event sink; chained at construction.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    fn funding_account(&self) -> Result<FundingAccount> {
        match &self.config.funding.keypair_path {
            Some(path) => FundingAccount::from_file(path, self.config.funding.balance_sol),
            None => Ok(FundingAccount::new(self.config.funding.balance_sol)),
        }
    }

    /// Create a session and start provisioning in the background.
    ///
    /// Returns as soon as the session is registered; it stays
    /// `initializing` until the wallet pool is funded, then moves to
    /// `running`. A funding failure parks it in `failed` without trading.
    pub async fn start_session(&self, cfg: SessionConfig) -> Result<Uuid> {
        let cfg = cfg.sanitized()?;
        let funding = self.funding_account()?;

        let required = cfg.starting_capital;
        if funding.balance_sol < required {
            return Err(Error::InsufficientFunding {
                available: funding.balance_sol,
                required,
            });
        }

        let start_price = self
            .backend
            .quote(Side::Buy, cfg.min_trade_size, cfg.slippage_bps)
            .await
            .map(|q| q.price)
            .unwrap_or(0.0);

        let session = Session::new(cfg.clone(), funding.pubkey().to_string(), start_price);
        let id = session.id;
        let pool = WalletPool::create(cfg.wallet_count, cfg.funding_batch_size);

        let state = Arc::new(Mutex::new(SchedulerContext {
            session,
            pool,
            funding,
            recent_trades: VecDeque::new(),
        }));

        let (commands_tx, commands_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let scheduler = SessionScheduler::new(
            state.clone(),
            cfg.clone(),
            TradeExecutor::new(self.backend.clone(), cfg.slippage_bps, cfg.max_trade_size),
            DecisionPolicy::new(cfg.buy_ratio, cfg.min_trade_size, cfg.max_trade_size),
            TradeRng::new(self.config.rng_seed),
            self.store.clone(),
            self.events.clone(),
            cancel.clone(),
            commands_rx,
        );

        let wallet_count = cfg.wallet_count;
        let task = tokio::spawn(Self::provision_and_run(
            id,
            cfg,
            state.clone(),
            self.backend.clone(),
            self.store.clone(),
            self.events.clone(),
            scheduler,
        ));

        self.sessions.insert(
            id,
            Arc::new(SessionHandle {
                state,
                commands: commands_tx,
                cancel,
                task: Mutex::new(Some(task)),
            }),
        );

        info!(session = %id, wallets = wallet_count, "session created");
        Ok(id)
    }

    /// Fund the pool, optionally seed it with tokens, then hand off to the
    /// trade loop. Provisioning failures terminate the session as `failed`.
    async fn provision_and_run(
        id: Uuid,
        cfg: SessionConfig,
        state: Arc<Mutex<SchedulerContext>>,
        backend: Arc<dyn SettlementBackend>,
        store: Arc<dyn RecordStore>,
        events: Arc<dyn EventSink>,
        scheduler: SessionScheduler,
    ) {
        let per_wallet = cfg.starting_capital / cfg.wallet_count as f64;

        let provisioned: Result<()> = async {
            let mut guard = state.lock().await;
            let st = &mut *guard;
            let SchedulerContext { pool, funding, .. } = st;

            let funded = pool.fund_all(backend.as_ref(), funding, per_wallet).await?;
            if funded == 0 {
                return Err(Error::SettlementFailed(
                    "no wallet could be funded".into(),
                ));
            }
            if cfg.seed_asset_amount > 0.0 {
                pool.distribute_asset(backend.as_ref(), funding, cfg.seed_asset_amount)
                    .await?;
            }

            // Capital baselines from what actually landed in the pool.
            let landed = pool.total_sol();
            st.session.capital.starting = landed;
            st.session.capital.current = landed;
            Ok(())
        }
        .await;

        if let Err(e) = provisioned {
            error!(session = %id, "provisioning failed: {e}");
            let final_session = {
                let mut st = state.lock().await;
                st.session.status = SessionStatus::Failed;
                st.session.stop_reason = Some(StopReason::ProvisioningFailed);
                st.session.end_time = Some(chrono::Utc::now());
                st.session.clone()
            };
            if let Err(e) = store.update_session_metrics(&final_session).await {
                error!(session = %id, "failed-session persistence failed: {e}");
            }
            events
                .emit(SessionEvent::SessionStopped {
                    session_id: id,
                    status: SessionStatus::Failed,
                    reason: Some(StopReason::ProvisioningFailed),
                    total_volume: 0.0,
                })
                .await;
            return;
        }

        scheduler.run().await;
    }

    fn handle(&self, id: Uuid) -> Result<Arc<SessionHandle>> {
        self.sessions
            .get(&id)
            .map(|h| h.value().clone())
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    async fn send_command(&self, id: Uuid, command: SessionCommand) -> Result<()> {
        let handle = self.handle(id)?;
        {
            let st = handle.state.lock().await;
            if st.session.status.is_terminal() {
                return Err(Error::SessionState(format!(
                    "session {id} already {:?}",
                    st.session.status
                )));
            }
        }
        handle
            .commands
            .send(command)
            .await
            .map_err(|_| Error::SessionState(format!("session {id} no longer accepts commands")))
    }

    pub async fn pause_session(&self, id: Uuid) -> Result<()> {
        self.send_command(id, SessionCommand::Pause).await
    }

    pub async fn resume_session(&self, id: Uuid) -> Result<()> {
        self.send_command(id, SessionCommand::Resume).await
    }

    /// Request a graceful stop. In-flight settlements are applied before
    /// the session reaches its terminal state.
    pub async fn stop_session(&self, id: Uuid) -> Result<()> {
        let handle = self.handle(id)?;
        if handle.commands.send(SessionCommand::Stop).await.is_err() {
            // Loop already exited; make sure cancellation is flagged anyway.
            handle.cancel.cancel();
        }
        Ok(())
    }

    /// Snapshot of one session's full state
    pub async fn status(&self, id: Uuid) -> Result<Session> {
        let handle = self.handle(id)?;
        let st = handle.state.lock().await;
        Ok(st.session.clone())
    }

    pub async fn list_sessions(&self) -> Vec<Session> {
        // Collect handles first; shard guards must not be held across awaits.
        let handles: Vec<Arc<SessionHandle>> =
            self.sessions.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            let st = handle.state.lock().await;
            out.push(st.session.clone());
        }
        out
    }

    /// Most recent trades for a session, newest first
    pub async fn trades(&self, id: Uuid, limit: usize) -> Result<Vec<TradeRecord>> {
        let handle = self.handle(id)?;
        let st = handle.state.lock().await;
        Ok(st
            .recent_trades
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    /// Block until the session's background task exits. Returns the final
    /// session snapshot.
    pub async fn wait(&self, id: Uuid) -> Result<Session> {
        let handle = self.handle(id)?;
        let task = handle.task.lock().await.take();
        if let Some(task) = task {
            task.await
                .map_err(|e| Error::Internal(format!("session task panicked: {e}")))?;
        }
        let st = handle.state.lock().await;
        Ok(st.session.clone())
    }

    /// Stop every live session and wait for the tasks to drain.
    pub async fn shutdown(&self) {
        let ids: Vec<Uuid> = self.sessions.iter().map(|e| *e.key()).collect();
        for id in &ids {
            if let Ok(handle) = self.handle(*id) {
                handle.cancel.cancel();
            }
        }
        for id in ids {
            let _ = self.wait(id).await;
        }
        info!("engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendKind, StoreConfig};

    fn engine() -> VolumeEngine {
        let config = Config {
            store: StoreConfig { path: None },
            rng_seed: Some(7),
            ..Config::default()
        };
        VolumeEngine::new(config).unwrap()
    }

    fn quick_session() -> SessionConfig {
        SessionConfig {
            wallet_count: 4,
            trades_per_minute: 600,
            parallel_trades: 5,
            starting_capital: 0.4,
            target_volume: 0.01,
            max_loss_percent: 100.0,
            min_trade_size: 0.001,
            max_trade_size: 0.01,
            duration_minutes: 60,
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_session_runs_to_volume_target() {
        let engine = engine();
        let id = engine.start_session(quick_session()).await.unwrap();

        let session = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            engine.wait(id),
        )
        .await
        .expect("session did not finish in time")
        .unwrap();

        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.stop_reason, Some(StopReason::TargetVolume));
        assert!(session.metrics.total_volume >= 0.01);
        assert!(session.metrics.successful_trades > 0);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let engine = engine();
        let ghost = Uuid::new_v4();

        assert!(matches!(
            engine.status(ghost).await,
            Err(Error::SessionNotFound(_))
        ));
        assert!(matches!(
            engine.pause_session(ghost).await,
            Err(Error::SessionNotFound(_))
        ));
        assert!(matches!(
            engine.stop_session(ghost).await,
            Err(Error::SessionNotFound(_))
        ));
        assert!(matches!(
            engine.trades(ghost, 10).await,
            Err(Error::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_session_is_graceful() {
        let engine = engine();
        let cfg = SessionConfig {
            target_volume: 1_000.0,
            ..quick_session()
        };
        let id = engine.start_session(cfg).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        engine.stop_session(id).await.unwrap();

        let session = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            engine.wait(id),
        )
        .await
        .expect("session did not stop in time")
        .unwrap();

        assert_eq!(session.status, SessionStatus::Stopped);
        assert_eq!(session.stop_reason, Some(StopReason::Manual));
        assert!(session.end_time.is_some());
    }

    #[tokio::test]
    async fn test_commands_rejected_after_terminal_state() {
        let engine = engine();
        let id = engine.start_session(quick_session()).await.unwrap();
        engine.wait(id).await.unwrap();

        assert!(matches!(
            engine.pause_session(id).await,
            Err(Error::SessionState(_))
        ));
        assert!(matches!(
            engine.resume_session(id).await,
            Err(Error::SessionState(_))
        ));
    }

    #[tokio::test]
    async fn test_list_and_trade_history() {
        let engine = engine();
        let id = engine.start_session(quick_session()).await.unwrap();
        engine.wait(id).await.unwrap();

        let sessions = engine.list_sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, id);

        let trades = engine.trades(id, 3).await.unwrap();
        assert!(trades.len() <= 3);
        assert!(!trades.is_empty());
        // Newest first.
        for pair in trades.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_insufficient_funding_rejected_at_start() {
        let config = Config {
            funding: crate::config::FundingConfig {
                keypair_path: None,
                balance_sol: 0.01,
            },
            ..Config::default()
        };
        let engine = VolumeEngine::new(config).unwrap();

        let err = engine.start_session(quick_session()).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientFunding { .. }));
        assert!(engine.list_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_transfer_backend_loss_threshold() {
        let config = Config {
            backend: crate::config::BackendConfig {
                kind: BackendKind::Transfer,
                ..Default::default()
            },
            rng_seed: Some(11),
            ..Config::default()
        };
        let engine = VolumeEngine::new(config).unwrap();

        let cfg = SessionConfig {
            wallet_count: 1,
            starting_capital: 0.0001,
            max_loss_percent: 1.0,
            min_trade_size: 0.00001,
            max_trade_size: 0.00005,
            trades_per_minute: 600,
            parallel_trades: 1,
            target_volume: 1_000.0,
            ..SessionConfig::default()
        };
        let id = engine.start_session(cfg).await.unwrap();

        let session = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            engine.wait(id),
        )
        .await
        .expect("session did not stop in time")
        .unwrap();

        assert_eq!(session.status, SessionStatus::Stopped);
        assert_eq!(session.stop_reason, Some(StopReason::LossThreshold));
    }
}
