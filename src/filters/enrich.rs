//! Enrichment collaborators: pair metadata and the SOL/USD rate.
//!
//! Everything here is best-effort and never blocks core correctness. A
//! failed lookup degrades the event to whatever fields were obtained;
//! missing market-cap or age data means "cannot hard-reject on this axis",
//! not rejection.

use crate::types::LiquidityEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// SOL/USD price cache TTL.
const PRICE_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug)]
pub enum EnrichError {
    Transport(String),
    NoData,
}

impl std::fmt::Display for EnrichError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnrichError::Transport(msg) => write!(f, "Enrichment transport error: {}", msg),
            EnrichError::NoData => write!(f, "No enrichment data available"),
        }
    }
}

impl std::error::Error for EnrichError {}

/// Fields gathered for one event. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub base_symbol: Option<String>,
    pub base_name: Option<String>,
    pub market_cap_usd: Option<f64>,
    pub pair_age_hours: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub sol_price_usd: Option<f64>,
}

impl Enrichment {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Seam for the pipeline: live client in production, canned values in
/// tests.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, event: &LiquidityEvent) -> Enrichment;
}

/// Stand-in enricher producing no data. Filtering degrades gracefully.
pub struct NullEnricher;

#[async_trait]
impl Enricher for NullEnricher {
    async fn enrich(&self, _event: &LiquidityEvent) -> Enrichment {
        Enrichment::empty()
    }
}

// --- DexScreener wire schema ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexScreenerPair {
    #[serde(rename = "baseToken")]
    pub base_token: BaseToken,
    #[serde(rename = "quoteToken")]
    pub quote_token: QuoteToken,
    #[serde(rename = "priceUsd", default)]
    pub price_usd: Option<String>,
    #[serde(rename = "marketCap")]
    pub market_cap: Option<f64>,
    #[serde(rename = "fdv")]
    pub fdv: Option<f64>,
    #[serde(default)]
    pub liquidity: Option<PairLiquidity>,
    #[serde(rename = "pairCreatedAt")]
    pub pair_created_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseToken {
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteToken {
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairLiquidity {
    pub usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoPrice {
    solana: CoinGeckoUsd,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoUsd {
    usd: f64,
}

/// Derive the enrichment fields from the first SOL-quoted pair.
///
/// `observed_at` anchors the pair-age computation to block time so the
/// same event always ages identically.
pub fn enrichment_from_pairs(
    pairs: &[DexScreenerPair],
    observed_at: DateTime<Utc>,
) -> Option<Enrichment> {
    let pair = pairs.iter().find(|p| p.quote_token.symbol == "SOL")?;

    let pair_age_hours = pair.pair_created_at.and_then(|created_ms| {
        let age_secs = observed_at.timestamp() - created_ms / 1000;
        if age_secs < 0 {
            None
        } else {
            Some(age_secs as f64 / 3600.0)
        }
    });

    Some(Enrichment {
        base_symbol: Some(pair.base_token.symbol.clone()),
        base_name: Some(pair.base_token.name.clone()),
        market_cap_usd: pair.market_cap.or(pair.fdv),
        pair_age_hours,
        liquidity_usd: pair.liquidity.as_ref().and_then(|l| l.usd),
        sol_price_usd: None,
    })
}

/// Live enrichment client: DexScreener pair lookup plus a cached
/// CoinGecko SOL price.
pub struct EnrichmentClient {
    client: reqwest::Client,
    dexscreener_base: String,
    coingecko_base: String,
    sol_price_cache: Mutex<Option<(Instant, f64)>>,
}

impl EnrichmentClient {
    pub fn new() -> Result<Self, EnrichError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EnrichError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            dexscreener_base: "https://api.dexscreener.com".to_string(),
            coingecko_base: "https://api.coingecko.com".to_string(),
            sol_price_cache: Mutex::new(None),
        })
    }

    pub async fn fetch_pairs(&self, mint: &str) -> Result<Vec<DexScreenerPair>, EnrichError> {
        let url = format!("{}/token-pairs/v1/solana/{}", self.dexscreener_base, mint);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EnrichError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EnrichError::Transport(format!(
                "DexScreener status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| EnrichError::Transport(e.to_string()))
    }

    /// Cached SOL/USD rate. None when the price source is unreachable.
    pub async fn sol_price_usd(&self) -> Option<f64> {
        {
            let cache = self.sol_price_cache.lock().unwrap();
            if let Some((fetched_at, price)) = *cache {
                if fetched_at.elapsed() < PRICE_CACHE_TTL {
                    return Some(price);
                }
            }
        }

        let url = format!(
            "{}/api/v3/simple/price?ids=solana&vs_currencies=usd",
            self.coingecko_base
        );

        let price = match self.client.get(&url).send().await {
            Ok(response) => match response.json::<CoinGeckoPrice>().await {
                Ok(body) => Some(body.solana.usd),
                Err(e) => {
                    log::warn!("⚠️ SOL price parse failed: {}", e);
                    None
                }
            },
            Err(e) => {
                log::warn!("⚠️ SOL price fetch failed: {}", e);
                None
            }
        }?;

        let mut cache = self.sol_price_cache.lock().unwrap();
        *cache = Some((Instant::now(), price));
        Some(price)
    }
}

#[async_trait]
impl Enricher for EnrichmentClient {
    async fn enrich(&self, event: &LiquidityEvent) -> Enrichment {
        let mut enrichment = match self.fetch_pairs(&event.token_mint).await {
            Ok(pairs) => enrichment_from_pairs(&pairs, event.observed_at).unwrap_or_else(|| {
                log::debug!("No SOL pair on DexScreener for {}", event.token_mint);
                Enrichment::empty()
            }),
            Err(e) => {
                log::warn!("⚠️ Enrichment degraded for {}: {}", event.pair_string(), e);
                Enrichment::empty()
            }
        };

        enrichment.sol_price_usd = self.sol_price_usd().await;
        enrichment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sol_pair(created_ms: i64) -> DexScreenerPair {
        DexScreenerPair {
            base_token: BaseToken {
                name: "Test Token".to_string(),
                symbol: "TEST".to_string(),
            },
            quote_token: QuoteToken {
                symbol: "SOL".to_string(),
            },
            price_usd: Some("0.00015".to_string()),
            market_cap: Some(500_000.0),
            fdv: Some(600_000.0),
            liquidity: Some(PairLiquidity { usd: Some(45_000.0) }),
            pair_created_at: Some(created_ms),
        }
    }

    #[test]
    fn test_enrichment_from_sol_pair() {
        let observed = DateTime::<Utc>::from_timestamp(1_722_470_400, 0).unwrap();
        // Pair created 18 minutes before the event.
        let created_ms = (1_722_470_400 - 18 * 60) * 1000;

        let enrichment = enrichment_from_pairs(&[sol_pair(created_ms)], observed).unwrap();

        assert_eq!(enrichment.base_symbol.as_deref(), Some("TEST"));
        assert_eq!(enrichment.market_cap_usd, Some(500_000.0));
        assert_eq!(enrichment.liquidity_usd, Some(45_000.0));
        let age = enrichment.pair_age_hours.unwrap();
        assert!((age - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_non_sol_pairs_skipped() {
        let mut usdc_pair = sol_pair(0);
        usdc_pair.quote_token.symbol = "USDC".to_string();
        let observed = Utc::now();

        assert!(enrichment_from_pairs(&[usdc_pair], observed).is_none());
        assert!(enrichment_from_pairs(&[], observed).is_none());
    }

    #[test]
    fn test_market_cap_falls_back_to_fdv() {
        let mut pair = sol_pair(0);
        pair.market_cap = None;
        let observed = Utc::now();

        let enrichment = enrichment_from_pairs(&[pair], observed).unwrap();
        assert_eq!(enrichment.market_cap_usd, Some(600_000.0));
    }

    #[test]
    fn test_future_creation_time_gives_no_age() {
        let observed = DateTime::<Utc>::from_timestamp(1_722_470_400, 0).unwrap();
        let created_ms = (1_722_470_400 + 600) * 1000;

        let enrichment = enrichment_from_pairs(&[sol_pair(created_ms)], observed).unwrap();
        assert!(enrichment.pair_age_hours.is_none());
    }

    #[test]
    fn test_wire_schema_parses_real_shape() {
        let raw = r#"[
            {
                "chainId": "solana",
                "dexId": "raydium",
                "baseToken": {"address": "mint", "name": "Dog Wif Hat", "symbol": "WIF"},
                "quoteToken": {"symbol": "SOL"},
                "priceUsd": "2.31",
                "marketCap": 2310000000,
                "fdv": 2310000000,
                "liquidity": {"usd": 12000000, "base": 4000000, "quote": 38000},
                "pairCreatedAt": 1702500000000
            }
        ]"#;

        let pairs: Vec<DexScreenerPair> = serde_json::from_str(raw).unwrap();
        assert_eq!(pairs[0].base_token.symbol, "WIF");
        assert_eq!(pairs[0].market_cap, Some(2_310_000_000.0));
    }
}
