//! The session trade loop
//!
//! One scheduler owns one session for its whole lifetime. Each tick draws
//! up to `parallel_trades` decisions, settles them concurrently (settlement
//! is the slow, backend-bound step), then applies every balance mutation
//! serially under the session lock so no settled trade is lost or
//! double-counted. Stop conditions are evaluated only between batches, so a
//! batch may slightly overshoot a target before the loop halts.

use chrono::Utc;
use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::Error;
use crate::executor::{TradeExecutor, TradeOutcome};
use crate::policy::{DecisionPolicy, TradeDecision};
use crate::pricing::Side;
use crate::rng::TradeRng;
use crate::session::types::{Session, SessionEvent, SessionStatus, StopReason, TradeRecord};
use crate::store::{spawn_append_trade, spawn_update_session, EventSink, RecordStore};
use crate::wallet::actor::ASSET_DUST;
use crate::wallet::{FundingAccount, WalletPool};

/// Sessions stop as capital-exhausted below this absolute floor
pub const CAPITAL_FLOOR_SOL: f64 = 0.000_01;

/// Recent trades kept in memory per session for `trades(limit)` queries
const RECENT_TRADES_CAP: usize = 1024;

/// Control commands accepted by a running scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Pause,
    Resume,
    Stop,
}

/// Everything a session owns, guarded by the per-session lock.
pub struct SchedulerContext {
    pub session: Session,
    pub pool: WalletPool,
    pub funding: FundingAccount,
    pub recent_trades: VecDeque<TradeRecord>,
}

pub struct SessionScheduler {
    state: Arc<Mutex<SchedulerContext>>,
    config: SessionConfig,
    executor: TradeExecutor,
    policy: DecisionPolicy,
    rng: TradeRng,
    store: Arc<dyn RecordStore>,
    events: Arc<dyn EventSink>,
    cancel: CancellationToken,
    commands: mpsc::Receiver<SessionCommand>,
}

impl SessionScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<Mutex<SchedulerContext>>,
        config: SessionConfig,
        executor: TradeExecutor,
        policy: DecisionPolicy,
        rng: TradeRng,
        store: Arc<dyn RecordStore>,
        events: Arc<dyn EventSink>,
        cancel: CancellationToken,
        commands: mpsc::Receiver<SessionCommand>,
    ) -> Self {
        Self {
            state,
            config,
            executor,
            policy,
            rng,
            store,
            events,
            cancel,
            commands,
        }
    }

    /// Drive the session to a terminal state. Consumes the scheduler.
    pub async fn run(mut self) {
        let (session_id, wallet_count, starting_capital) = {
            let mut st = self.state.lock().await;
            let now = Utc::now();
            st.session.status = SessionStatus::Running;
            st.session.start_time = now;
            st.session.scheduled_end =
                now + chrono::Duration::minutes(self.config.duration_minutes as i64);
            (
                st.session.id,
                st.pool.len(),
                st.session.capital.starting,
            )
        };

        self.events
            .emit(SessionEvent::SessionStarted {
                session_id,
                wallet_count,
                starting_capital,
            })
            .await;
        info!(session = %session_id, "trade loop started");

        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break StopReason::Manual,
                cmd = self.commands.recv() => match cmd {
                    Some(SessionCommand::Pause) => {
                        if let Some(reason) = self.paused_wait().await {
                            break reason;
                        }
                        interval.reset();
                    }
                    Some(SessionCommand::Resume) => {} // already running
                    Some(SessionCommand::Stop) | None => break StopReason::Manual,
                },
                _ = interval.tick() => {
                    self.run_batch().await;
                    if let Some(reason) = self.check_stop().await {
                        break reason;
                    }
                }
            }
        };

        self.finish(session_id, reason).await;
    }

    /// Park the loop until resume or stop. Resuming pushes the scheduled
    /// end back by exactly the paused duration, preserving the intended
    /// active time.
    async fn paused_wait(&mut self) -> Option<StopReason> {
        let paused_at = Utc::now();
        {
            let mut st = self.state.lock().await;
            st.session.status = SessionStatus::Paused;
            info!(session = %st.session.id, "session paused");
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Some(StopReason::Manual),
                cmd = self.commands.recv() => match cmd {
                    Some(SessionCommand::Resume) => {
                        let paused_for = Utc::now() - paused_at;
                        let mut st = self.state.lock().await;
                        st.session.scheduled_end += paused_for;
                        st.session.status = SessionStatus::Running;
                        info!(
                            session = %st.session.id,
                            paused_ms = paused_for.num_milliseconds(),
                            "session resumed"
                        );
                        return None;
                    }
                    Some(SessionCommand::Pause) => {} // already paused
                    Some(SessionCommand::Stop) | None => return Some(StopReason::Manual),
                },
            }
        }
    }

    /// One tick: decide, settle concurrently, apply serially.
    async fn run_batch(&mut self) {
        // Phase 1: draw decisions against a consistent snapshot.
        let decisions: Vec<(TradeDecision, Pubkey)> = {
            let st = self.state.lock().await;
            let snapshot = st.pool.snapshot();
            (0..self.config.parallel_trades)
                .filter_map(|_| {
                    self.policy
                        .decide(&snapshot, &mut self.rng)
                        .map(|d| {
                            let pubkey = snapshot[d.wallet_index].pubkey;
                            (d, pubkey)
                        })
                })
                .collect()
        };
        if decisions.is_empty() {
            return;
        }

        // Phase 2: settlement runs concurrently, without the lock.
        let results = join_all(
            decisions
                .iter()
                .map(|(decision, pubkey)| self.executor.execute(pubkey, decision)),
        )
        .await;

        // Phase 3: mutations serialize through the session lock.
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        let fee = self.executor.flat_fee_sol();

        for ((decision, pubkey), result) in decisions.into_iter().zip(results) {
            let record = match result {
                Ok(outcome) => Self::apply_outcome(st, fee, &decision, pubkey, outcome),
                Err(e) => {
                    st.session.metrics.record_failure();
                    Self::failed_record(&st.session, &decision, pubkey, &e)
                }
            };

            st.recent_trades.push_back(record.clone());
            if st.recent_trades.len() > RECENT_TRADES_CAP {
                st.recent_trades.pop_front();
            }

            spawn_append_trade(self.store.clone(), record.clone());
            self.events
                .emit(SessionEvent::NewTrade {
                    session_id: st.session.id,
                    trade: record,
                })
                .await;
        }

        let current = st.pool.total_sol();
        st.session.capital.update(current);
        let starting = st.session.capital.starting;
        st.session.metrics.update_from_capital(starting);
        let cycles = st.pool.cycles();
        st.session.metrics.set_cycles(cycles);

        spawn_update_session(self.store.clone(), st.session.clone());
    }

    /// Apply one settled trade to wallet and session state. Collisions
    /// within a batch are resolved here: if the wallet can no longer cover
    /// the settlement, the trade is downgraded to a failure and no balance
    /// moves.
    fn apply_outcome(
        st: &mut SchedulerContext,
        fee: f64,
        decision: &TradeDecision,
        pubkey: Pubkey,
        outcome: TradeOutcome,
    ) -> TradeRecord {
        let SchedulerContext { session, pool, .. } = st;
        let settlement = &outcome.settlement;

        let wallet = match pool.get_mut(decision.wallet_index) {
            Some(w) => w,
            None => {
                session.metrics.record_failure();
                return Self::failed_record(
                    session,
                    decision,
                    pubkey,
                    &Error::Internal("wallet index out of range".into()),
                );
            }
        };

        let new_sol = wallet.sol_balance + settlement.sol_delta - fee;
        let new_asset = wallet.asset_balance + settlement.token_delta;
        if new_sol < 0.0 || new_asset < -ASSET_DUST {
            session.metrics.record_failure();
            return Self::failed_record(
                session,
                decision,
                pubkey,
                &Error::SettlementFailed("balance cannot cover settlement".into()),
            );
        }

        wallet.sol_balance = new_sol;
        wallet.asset_balance = new_asset.max(0.0);
        match outcome.side {
            Side::Buy => wallet.total_buys += 1,
            Side::Sell => wallet.total_sells += 1,
        }
        wallet.last_trade_time = Some(Utc::now());

        session.capital.spent_on_fees += fee;
        session.metrics.record_success(
            outcome.side,
            settlement.sol_volume,
            settlement.price,
            settlement.price_impact_pct.abs(),
        );

        TradeRecord {
            id: Uuid::new_v4(),
            session_id: session.id,
            wallet: pubkey.to_string(),
            side: outcome.side,
            sol_amount: settlement.sol_volume,
            token_amount: settlement.token_delta.abs(),
            price: settlement.price,
            price_impact_pct: settlement.price_impact_pct,
            slippage_bps: outcome.effective_slippage_bps,
            settlement_ref: Some(settlement.reference.clone()),
            success: true,
            error: None,
            timestamp: Utc::now(),
        }
    }

    fn failed_record(
        session: &Session,
        decision: &TradeDecision,
        pubkey: Pubkey,
        error: &Error,
    ) -> TradeRecord {
        TradeRecord {
            id: Uuid::new_v4(),
            session_id: session.id,
            wallet: pubkey.to_string(),
            side: decision.side,
            sol_amount: if decision.side == Side::Buy {
                decision.amount
            } else {
                0.0
            },
            token_amount: if decision.side == Side::Sell {
                decision.amount
            } else {
                0.0
            },
            price: 0.0,
            price_impact_pct: 0.0,
            slippage_bps: 0,
            settlement_ref: None,
            success: false,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
        }
    }

    /// Evaluate stop conditions between batches.
    async fn check_stop(&self) -> Option<StopReason> {
        let st = self.state.lock().await;
        let session = &st.session;

        if session.capital.loss_percent >= self.config.max_loss_percent {
            Some(StopReason::LossThreshold)
        } else if session.metrics.total_volume >= self.config.target_volume {
            Some(StopReason::TargetVolume)
        } else if Utc::now() >= session.scheduled_end {
            Some(StopReason::DurationElapsed)
        } else if session.capital.current <= CAPITAL_FLOOR_SOL {
            Some(StopReason::CapitalExhausted)
        } else {
            None
        }
    }

    /// Sweep residual balances, mark the terminal state, and emit the
    /// final records. In-flight settlements have already been applied by
    /// the time we get here; nothing is preempted.
    async fn finish(mut self, session_id: Uuid, reason: StopReason) {
        let final_session = {
            let mut guard = self.state.lock().await;
            let st = &mut *guard;

            st.session.status = reason.final_status();
            st.session.stop_reason = Some(reason);
            st.session.end_time = Some(Utc::now());

            let backend = self.executor.backend().clone();
            let SchedulerContext { pool, funding, .. } = st;
            pool.sweep(backend.as_ref(), funding).await;

            st.session.clone()
        };

        if let Err(e) = self.store.update_session_metrics(&final_session).await {
            warn!(session = %session_id, "final session persistence failed: {e}");
        }
        self.events
            .emit(SessionEvent::SessionStopped {
                session_id,
                status: final_session.status,
                reason: final_session.stop_reason,
                total_volume: final_session.metrics.total_volume,
            })
            .await;
        self.commands.close();

        info!(
            session = %session_id,
            status = ?final_session.status,
            reason = ?reason,
            volume = final_session.metrics.total_volume,
            trades = final_session.metrics.total_trades,
            "session finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CurveSimBackend, SettlementBackend, TransferBackend};
    use crate::pricing::LinearCurve;
    use crate::store::{MemoryStore, NullSink};

    struct Harness {
        scheduler: SessionScheduler,
        state: Arc<Mutex<SchedulerContext>>,
        commands: mpsc::Sender<SessionCommand>,
        cancel: CancellationToken,
    }

    async fn harness(config: SessionConfig, backend: Arc<dyn SettlementBackend>) -> Harness {
        let config = config.sanitized().unwrap();
        let mut funding = FundingAccount::new(config.starting_capital * 2.0);
        let mut pool = WalletPool::create(config.wallet_count, config.funding_batch_size);
        let per_wallet = config.starting_capital / config.wallet_count as f64;
        pool.fund_all(backend.as_ref(), &mut funding, per_wallet)
            .await
            .unwrap();
        if config.seed_asset_amount > 0.0 {
            pool.distribute_asset(backend.as_ref(), &funding, config.seed_asset_amount)
                .await
                .unwrap();
        }

        let session = Session::new(config.clone(), funding.pubkey().to_string(), 0.0001);
        let state = Arc::new(Mutex::new(SchedulerContext {
            session,
            pool,
            funding,
            recent_trades: VecDeque::new(),
        }));

        let executor = TradeExecutor::new(backend, config.slippage_bps, config.max_trade_size);
        let policy = DecisionPolicy::new(
            config.buy_ratio,
            config.min_trade_size,
            config.max_trade_size,
        );
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let scheduler = SessionScheduler::new(
            state.clone(),
            config,
            executor,
            policy,
            TradeRng::new(Some(42)),
            Arc::new(MemoryStore::new()),
            Arc::new(NullSink),
            cancel.clone(),
            rx,
        );

        Harness {
            scheduler,
            state,
            commands: tx,
            cancel,
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            wallet_count: 4,
            trades_per_minute: 600,
            parallel_trades: 5,
            starting_capital: 0.4,
            target_volume: 1_000.0,
            max_loss_percent: 100.0,
            duration_minutes: 60,
            min_trade_size: 0.001,
            max_trade_size: 0.01,
            seed_asset_amount: 0.0,
            ..SessionConfig::default()
        }
    }

    fn curve_backend() -> Arc<dyn SettlementBackend> {
        Arc::new(CurveSimBackend::new(
            LinearCurve::new(0.000001, 0.01, 1_000_000.0).unwrap(),
            0.000005,
        ))
    }

    fn fee_only_backend() -> Arc<dyn SettlementBackend> {
        Arc::new(TransferBackend::new(0.0001, 0.000005).unwrap())
    }

    #[tokio::test]
    async fn test_capital_conservation_under_parallel_batches() {
        let mut h = harness(fast_config(), curve_backend()).await;

        for _ in 0..20 {
            h.scheduler.run_batch().await;

            let st = h.state.lock().await;
            let pool_sum = st.pool.total_sol();
            assert!(
                (st.session.capital.current - pool_sum).abs() < 1e-9,
                "capital {} != pool sum {}",
                st.session.capital.current,
                pool_sum
            );
            assert!(st.session.capital.loss_percent >= 0.0);
            let m = &st.session.metrics;
            assert_eq!(m.total_trades, m.successful_trades + m.failed_trades);
            // No wallet ever overdraws.
            for snap in st.pool.snapshot() {
                assert!(snap.sol_balance >= 0.0);
                assert!(snap.asset_balance >= -ASSET_DUST);
            }
        }
    }

    #[tokio::test]
    async fn test_fee_only_loss_is_monotonic() {
        let cfg = SessionConfig {
            seed_asset_amount: 1_000.0,
            ..fast_config()
        };
        let mut h = harness(cfg, fee_only_backend()).await;

        let mut last_loss = 0.0;
        for _ in 0..10 {
            h.scheduler.run_batch().await;
            let st = h.state.lock().await;
            assert!(st.session.capital.loss_percent >= last_loss - 1e-12);
            last_loss = st.session.capital.loss_percent;
        }
        assert!(last_loss > 0.0);
    }

    #[tokio::test]
    async fn test_loss_threshold_stops_quickly() {
        // Fee-only backend bleeding 0.000005/trade against 0.0001 capital:
        // a single settled trade is already a 5% loss.
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
        let h = harness(cfg, fee_only_backend()).await;
        let state = h.state.clone();

        let handle = tokio::spawn(h.scheduler.run());
        tokio::time::timeout(std::time::Duration::from_secs(10), handle)
            .await
            .expect("session did not stop in time")
            .unwrap();

        let st = state.lock().await;
        assert_eq!(st.session.status, SessionStatus::Stopped);
        assert_eq!(st.session.stop_reason, Some(StopReason::LossThreshold));
        // Bounded number of trades before the threshold fired.
        assert!(st.session.metrics.total_trades <= 5);
    }

    #[tokio::test]
    async fn test_target_volume_completes_session() {
        let cfg = SessionConfig {
            target_volume: 0.005, // one decent batch overshoots this
            seed_asset_amount: 0.0,
            ..fast_config()
        };
        let h = harness(cfg, curve_backend()).await;
        let state = h.state.clone();

        let handle = tokio::spawn(h.scheduler.run());
        tokio::time::timeout(std::time::Duration::from_secs(10), handle)
            .await
            .expect("session did not complete in time")
            .unwrap();

        let st = state.lock().await;
        assert_eq!(st.session.status, SessionStatus::Completed);
        assert_eq!(st.session.stop_reason, Some(StopReason::TargetVolume));
        assert!(st.session.metrics.total_volume >= 0.005);
    }

    #[tokio::test]
    async fn test_duration_elapsed_completes_session() {
        let h = harness(fast_config(), curve_backend()).await;
        let state = h.state.clone();

        let handle = tokio::spawn(h.scheduler.run());
        // Pull the scheduled end into the past while it runs.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        {
            let mut st = state.lock().await;
            st.session.scheduled_end = Utc::now() - chrono::Duration::seconds(1);
        }

        tokio::time::timeout(std::time::Duration::from_secs(10), handle)
            .await
            .expect("session did not finish in time")
            .unwrap();

        let st = state.lock().await;
        assert_eq!(st.session.status, SessionStatus::Completed);
        assert_eq!(st.session.stop_reason, Some(StopReason::DurationElapsed));
    }

    #[tokio::test]
    async fn test_pause_extends_scheduled_end() {
        let h = harness(fast_config(), curve_backend()).await;
        let state = h.state.clone();
        let commands = h.commands.clone();
        let cancel = h.cancel.clone();

        let handle = tokio::spawn(h.scheduler.run());
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let end_before = state.lock().await.session.scheduled_end;

        commands.send(SessionCommand::Pause).await.unwrap();
        let pause_ms = 300u64;
        tokio::time::sleep(std::time::Duration::from_millis(pause_ms)).await;
        {
            let st = state.lock().await;
            assert_eq!(st.session.status, SessionStatus::Paused);
        }
        commands.send(SessionCommand::Resume).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let end_after = state.lock().await.session.scheduled_end;
        let extension = (end_after - end_before).num_milliseconds();
        assert!(
            extension >= pause_ms as i64 && extension < pause_ms as i64 + 200,
            "extension was {extension}ms"
        );

        cancel.cancel();
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
    }

    #[tokio::test]
    async fn test_stop_command_is_manual_stop() {
        let h = harness(fast_config(), curve_backend()).await;
        let state = h.state.clone();
        let commands = h.commands.clone();

        let handle = tokio::spawn(h.scheduler.run());
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        commands.send(SessionCommand::Stop).await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("session did not stop")
            .unwrap();

        let st = state.lock().await;
        assert_eq!(st.session.status, SessionStatus::Stopped);
        assert_eq!(st.session.stop_reason, Some(StopReason::Manual));
        // Sweep returned all residual SOL to the funding account.
        assert_eq!(st.pool.total_sol(), 0.0);
    }

    #[tokio::test]
    async fn test_failed_settlements_do_not_touch_balances() {
        let backend = Arc::new(
            CurveSimBackend::new(
                LinearCurve::new(0.000001, 0.01, 1_000_000.0).unwrap(),
                0.000005,
            )
            .with_failure_rate(1.0),
        );
        let mut h = harness(fast_config(), backend).await;

        let before = h.state.lock().await.pool.total_sol();
        for _ in 0..5 {
            h.scheduler.run_batch().await;
        }

        let st = h.state.lock().await;
        assert_eq!(st.session.metrics.successful_trades, 0);
        assert!(st.session.metrics.failed_trades > 0);
        assert!((st.pool.total_sol() - before).abs() < 1e-12);
        // Trade failures never flip the session out of running state.
        assert_eq!(st.session.status, SessionStatus::Initializing);
    }
}
