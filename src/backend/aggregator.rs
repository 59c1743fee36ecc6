//! Aggregator trading API client
//!
//! Settles trades through an HTTP aggregator that quotes and executes swaps
//! server-side, returning a transaction signature as the settlement
//! reference. Transient transport failures are retried with exponential
//! backoff; a definitive API error fails the single trade attempt only.

use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;
use tracing::{debug, warn};

use async_trait::async_trait;

use crate::config::BackendKind;
use crate::error::{Error, Result};
use crate::pricing::{PriceQuote, Side};

use super::{Settlement, SettlementBackend};

/// Quote request payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRequest {
    action: Side,
    /// SOL for buys, tokens for sells
    amount: f64,
    slippage_bps: u32,
}

/// Quote response payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    out_amount: Option<f64>,
    price: Option<f64>,
    price_impact_pct: Option<f64>,
    error: Option<String>,
}

/// Swap execution request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest {
    action: Side,
    public_key: String,
    amount: f64,
    slippage_bps: u32,
}

/// Swap execution response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    signature: Option<String>,
    out_amount: Option<f64>,
    price: Option<f64>,
    price_impact_pct: Option<f64>,
    error: Option<String>,
}

/// Transfer request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequest {
    from: String,
    to: String,
    amount_sol: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferResponse {
    signature: Option<String>,
    error: Option<String>,
}

/// Aggregator-backed settlement over an HTTP trade API
pub struct AggregatorBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    fee_sol: f64,
}

impl AggregatorBackend {
    pub fn new(base_url: String, api_key: Option<String>, fee_sol: f64) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            fee_sol,
        }
    }

    fn retry_policy() -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_elapsed_time: Some(Duration::from_secs(5)),
            ..Default::default()
        }
    }

    async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        let url = format!("{}/{}", self.base_url, path);

        let resp = backoff::future::retry(Self::retry_policy(), || async {
            let mut req = self.client.post(&url).json(body);
            if let Some(key) = &self.api_key {
                req = req.query(&[("api-key", key.as_str())]);
            }

            let resp = req.send().await.map_err(|e| {
                warn!("aggregator request to {} failed: {}", url, e);
                backoff::Error::transient(Error::from(e))
            })?;

            if resp.status().is_server_error() {
                return Err(backoff::Error::transient(Error::SettlementFailed(format!(
                    "aggregator returned {}",
                    resp.status()
                ))));
            }
            if !resp.status().is_success() {
                return Err(backoff::Error::permanent(Error::SettlementFailed(format!(
                    "aggregator returned {}",
                    resp.status()
                ))));
            }

            resp.json::<Resp>()
                .await
                .map_err(|e| backoff::Error::permanent(Error::from(e)))
        })
        .await?;

        Ok(resp)
    }
}

#[async_trait]
impl SettlementBackend for AggregatorBackend {
    async fn quote(&self, side: Side, amount: f64, slippage_bps: u32) -> Result<PriceQuote> {
        let resp: QuoteResponse = self
            .post_json(
                "quote",
                &QuoteRequest {
                    action: side,
                    amount,
                    slippage_bps,
                },
            )
            .await?;

        if let Some(err) = resp.error {
            return Err(Error::SettlementFailed(format!("quote rejected: {err}")));
        }

        let out = resp
            .out_amount
            .ok_or_else(|| Error::SettlementFailed("quote missing outAmount".into()))?;
        let price = resp
            .price
            .ok_or_else(|| Error::SettlementFailed("quote missing price".into()))?;

        let (sol_amount, token_amount) = match side {
            Side::Buy => (amount, out),
            Side::Sell => (out, amount),
        };

        Ok(PriceQuote {
            side,
            sol_amount,
            token_amount,
            price,
            price_impact_pct: resp.price_impact_pct.unwrap_or(0.0),
            slippage_bps,
        })
    }

    async fn swap(&self, wallet: &Pubkey, quote: &PriceQuote) -> Result<Settlement> {
        let amount = match quote.side {
            Side::Buy => quote.sol_amount,
            Side::Sell => quote.token_amount,
        };

        let resp: SwapResponse = self
            .post_json(
                "swap",
                &SwapRequest {
                    action: quote.side,
                    public_key: wallet.to_string(),
                    amount,
                    slippage_bps: quote.slippage_bps,
                },
            )
            .await?;

        if let Some(err) = resp.error {
            return Err(Error::SettlementFailed(format!("swap rejected: {err}")));
        }

        let signature = resp
            .signature
            .ok_or_else(|| Error::SettlementFailed("swap missing signature".into()))?;
        let out = resp.out_amount.unwrap_or(match quote.side {
            Side::Buy => quote.token_amount,
            Side::Sell => quote.sol_amount,
        });
        let price = resp.price.unwrap_or(quote.price);

        debug!(side = %quote.side, signature = %signature, "aggregator settlement");

        let settlement = match quote.side {
            Side::Buy => Settlement {
                reference: signature,
                sol_delta: -quote.sol_amount,
                token_delta: out,
                sol_volume: quote.sol_amount,
                price,
                price_impact_pct: resp.price_impact_pct.unwrap_or(quote.price_impact_pct),
            },
            Side::Sell => Settlement {
                reference: signature,
                sol_delta: out,
                token_delta: -quote.token_amount,
                sol_volume: out,
                price,
                price_impact_pct: resp.price_impact_pct.unwrap_or(quote.price_impact_pct),
            },
        };
        Ok(settlement)
    }

    async fn transfer(&self, from: &Pubkey, to: &Pubkey, amount_sol: f64) -> Result<String> {
        let resp: TransferResponse = self
            .post_json(
                "transfer",
                &TransferRequest {
                    from: from.to_string(),
                    to: to.to_string(),
                    amount_sol,
                },
            )
            .await?;

        if let Some(err) = resp.error {
            return Err(Error::SettlementFailed(format!("transfer rejected: {err}")));
        }
        resp.signature
            .ok_or_else(|| Error::SettlementFailed("transfer missing signature".into()))
    }

    fn flat_fee_sol(&self) -> f64 {
        self.fee_sol
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Aggregator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        let b = AggregatorBackend::new("https://api.example.com/".into(), None, 0.000005);
        assert_eq!(b.base_url, "https://api.example.com");
    }

    #[test]
    fn test_request_serialization_is_camel_case() {
        let req = SwapRequest {
            action: Side::Buy,
            public_key: "abc".into(),
            amount: 0.01,
            slippage_bps: 250,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["action"], "buy");
        assert!(json.get("publicKey").is_some());
        assert!(json.get("slippageBps").is_some());
    }
}
