//! Session, capital, and trade record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::metrics::SessionMetrics;
use crate::pricing::Side;

/// Session state machine:
/// `initializing → running ⇄ paused → {stopped | completed | failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Initializing,
    Running,
    Paused,
    /// Halted by a protective condition or an explicit stop
    Stopped,
    /// Reached its volume target or ran its full duration
    Completed,
    /// Provisioning or funding failed; never traded
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Stopped | SessionStatus::Completed | SessionStatus::Failed
        )
    }
}

/// Why a session left the running state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    LossThreshold,
    TargetVolume,
    DurationElapsed,
    CapitalExhausted,
    Manual,
    ProvisioningFailed,
}

impl StopReason {
    /// Terminal status this reason maps to
    pub fn final_status(&self) -> SessionStatus {
        match self {
            StopReason::TargetVolume | StopReason::DurationElapsed => SessionStatus::Completed,
            StopReason::ProvisioningFailed => SessionStatus::Failed,
            _ => SessionStatus::Stopped,
        }
    }
}

/// Capital tracking for one session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capital {
    pub starting: f64,
    pub current: f64,
    pub loss_percent: f64,
    pub spent_on_fees: f64,
}

impl Capital {
    pub fn new(starting: f64) -> Self {
        Self {
            starting,
            current: starting,
            loss_percent: 0.0,
            spent_on_fees: 0.0,
        }
    }

    /// Refresh `current` from the summed wallet balances and recompute the
    /// loss percentage. Gains clamp the loss at zero.
    pub fn update(&mut self, current: f64) {
        self.current = current;
        self.loss_percent = if self.starting > 0.0 {
            (((self.starting - current) / self.starting) * 100.0).max(0.0)
        } else {
            0.0
        };
    }
}

/// One bounded run of the volume engine against one asset
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub status: SessionStatus,
    pub funding_pubkey: String,
    pub capital: Capital,
    pub metrics: SessionMetrics,
    pub config: SessionConfig,
    pub start_time: DateTime<Utc>,
    /// When the session is scheduled to wind down; pushed back by pauses
    pub scheduled_end: DateTime<Utc>,
    /// Set once the session reaches a terminal state
    pub end_time: Option<DateTime<Utc>>,
    pub stop_reason: Option<StopReason>,
}

impl Session {
    pub fn new(config: SessionConfig, funding_pubkey: String, start_price: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: SessionStatus::Initializing,
            funding_pubkey,
            capital: Capital::new(config.starting_capital),
            metrics: SessionMetrics::with_start_price(start_price),
            scheduled_end: now + chrono::Duration::minutes(config.duration_minutes as i64),
            config,
            start_time: now,
            end_time: None,
            stop_reason: None,
        }
    }
}

/// One trade attempt, settled or failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub wallet: String,
    pub side: Side,
    pub sol_amount: f64,
    pub token_amount: f64,
    pub price: f64,
    pub price_impact_pct: f64,
    pub slippage_bps: u32,
    pub settlement_ref: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Events emitted to the external notification sink
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        session_id: Uuid,
        wallet_count: usize,
        starting_capital: f64,
    },
    NewTrade {
        session_id: Uuid,
        trade: TradeRecord,
    },
    SessionStopped {
        session_id: Uuid,
        status: SessionStatus,
        reason: Option<StopReason>,
        total_volume: f64,
    },
}
