//! CLI command implementations

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backend::build_backend;
use crate::config::Config;
use crate::engine::VolumeEngine;
use crate::pricing::Side;

/// Optional overrides applied on top of the configured session parameters
#[derive(Debug, Default, Clone)]
pub struct RunOverrides {
    pub target_volume: Option<f64>,
    pub wallets: Option<usize>,
    pub duration_minutes: Option<u64>,
    pub seed: Option<u64>,
}

/// Run one session to completion
pub async fn run(config: &Config, overrides: RunOverrides) -> Result<()> {
    let mut config = config.clone();
    if let Some(seed) = overrides.seed {
        config.rng_seed = Some(seed);
    }

    let mut session_cfg = config.session.clone();
    if let Some(target) = overrides.target_volume {
        session_cfg.target_volume = target;
    }
    if let Some(wallets) = overrides.wallets {
        session_cfg.wallet_count = wallets;
    }
    if let Some(minutes) = overrides.duration_minutes {
        session_cfg.duration_minutes = minutes;
    }

    info!(
        "Starting volume session: {} wallets, {} SOL capital, {} SOL target, backend {:?}",
        session_cfg.wallet_count,
        session_cfg.starting_capital,
        session_cfg.target_volume,
        config.backend.kind
    );

    let engine = Arc::new(VolumeEngine::new(config)?);
    let id = engine.start_session(session_cfg).await?;
    info!("Session {} started", id);

    // Graceful stop on interrupt; in-flight settlements still apply.
    let interrupt_engine = engine.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping session {}", id);
            if let Err(e) = interrupt_engine.stop_session(id).await {
                error!("Stop failed: {}", e);
            }
        }
    });

    let session = engine.wait(id).await?;

    info!(
        "Session {} finished: {:?} ({:?})",
        id, session.status, session.stop_reason
    );
    let m = &session.metrics;
    info!(
        "Volume: {:.4} SOL ({:.1}x capital), trades: {} ok / {} failed, cycles: {}",
        m.total_volume, m.volume_multiplier, m.successful_trades, m.failed_trades, m.cycles
    );
    info!(
        "Capital: {:.6} -> {:.6} SOL (loss {:.2}%, fees {:.6})",
        session.capital.starting,
        session.capital.current,
        session.capital.loss_percent,
        session.capital.spent_on_fees
    );
    info!(
        "Price: start {:.9}, last {:.9}, range [{:.9}, {:.9}], avg slippage {:.3}%",
        m.start_price, m.current_price, m.lowest_price, m.highest_price, m.avg_slippage
    );

    Ok(())
}

/// Show the effective configuration with secrets masked
pub fn show_config(config: &Config) -> Result<()> {
    info!("Backend: {:?} ({})", config.backend.kind, config.backend.api_url);
    info!(
        "API key: {}",
        if config.backend.api_key.is_some() {
            "***configured***"
        } else {
            "(none)"
        }
    );
    info!(
        "Funding: {} SOL from {}",
        config.funding.balance_sol,
        config
            .funding
            .keypair_path
            .as_deref()
            .unwrap_or("(generated keypair)")
    );
    info!(
        "Store: {}",
        config.store.path.as_deref().unwrap_or("(in-memory)")
    );

    let s = &config.session;
    info!(
        "Session: {} wallets, {} SOL capital, target {} SOL, max loss {}%, {} min",
        s.wallet_count, s.starting_capital, s.target_volume, s.max_loss_percent, s.duration_minutes
    );
    info!(
        "Trading: {} tpm x{} parallel, size [{}, {}] SOL, buy ratio {}, slippage {}bps",
        s.trades_per_minute,
        s.parallel_trades,
        s.min_trade_size,
        s.max_trade_size,
        s.buy_ratio,
        s.slippage_bps
    );
    Ok(())
}

/// Fetch one quote from the configured backend
pub async fn quote(config: &Config, side: &str, amount: f64) -> Result<()> {
    let side = match side.to_lowercase().as_str() {
        "buy" => Side::Buy,
        "sell" => Side::Sell,
        other => anyhow::bail!("unknown side '{other}', expected buy or sell"),
    };

    let backend = build_backend(&config.backend)?;
    let quote = backend
        .quote(side, amount, config.session.slippage_bps)
        .await?;

    info!(
        "{} {}: {:.6} SOL <-> {:.4} tokens at {:.9} (impact {:.3}%, slippage {}bps)",
        quote.side,
        amount,
        quote.sol_amount,
        quote.token_amount,
        quote.price,
        quote.price_impact_pct,
        quote.slippage_bps
    );
    Ok(())
}
