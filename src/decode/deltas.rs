//! Balance-delta analysis: derive the typed liquidity event from the
//! vault balance changes of a decoded instruction.
//!
//! The discriminator byte says what the transaction claims to do; the
//! balance deltas say what it actually did. An event is only derived when
//! both vaults moved in the direction the instruction implies. Ambiguous
//! patterns yield nothing rather than a guessed classification.

use crate::ingest::resolver::ResolvedTransaction;
use crate::types::{EventKind, LiquidityEvent, WSOL_MINT};
use crate::decode::instruction::{DecodedInstruction, PoolOp};
use chrono::{DateTime, Utc};

/// Noise floor: vault deltas under 0.1 SOL (dust, rounding, rent
/// adjustments) never produce events.
pub const MIN_SOL_DELTA_LAMPORTS: i128 = 100_000_000;

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// A swap observation feeding the per-pool volume baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeObservation {
    pub pool_account: String,
    pub token_mint: String,
    pub volume_sol: f64,
    /// SOL vault balance before the trade.
    pub sol_before: f64,
    pub signature: String,
    pub observed_at: DateTime<Utc>,
}

/// What the balance deltas amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum Analysis {
    /// A directionally consistent LP addition or removal.
    Liquidity(LiquidityEvent),
    /// A swap large enough to count toward the volume baseline.
    Trade(TradeObservation),
}

/// Signed SOL vault change in lamports, from the pre/post lamport arrays.
fn sol_vault_delta(tx: &ResolvedTransaction, vault: usize) -> Option<(i128, u64)> {
    let pre = *tx.pre_balances.get(vault)?;
    let post = *tx.post_balances.get(vault)?;
    Some((post as i128 - pre as i128, pre))
}

/// Signed token vault change in UI units, plus the vault's mint.
///
/// A vault missing from the pre set (pool creation) counts from zero.
fn token_vault_delta(tx: &ResolvedTransaction, vault: usize) -> Option<(f64, String)> {
    let pre = tx
        .pre_token_balances
        .iter()
        .find(|b| b.account_index == vault);
    let post = tx
        .post_token_balances
        .iter()
        .find(|b| b.account_index == vault);

    let mint = post
        .map(|b| b.mint.clone())
        .or_else(|| pre.map(|b| b.mint.clone()))?;

    if mint == WSOL_MINT {
        // The token vault holding wrapped SOL means the vault mapping is
        // reversed or the layout guess missed. Treat as ambiguous.
        return None;
    }

    let pre_amount = pre.map(|b| b.ui_amount).unwrap_or(0.0);
    let post_amount = post.map(|b| b.ui_amount).unwrap_or(0.0);

    Some((post_amount - pre_amount, mint))
}

/// Analyze one decoded instruction against the transaction's balances.
///
/// `fallback_time` stands in for the block time when the chain record
/// carries none, keeping replays deterministic.
pub fn analyze_balances(
    tx: &ResolvedTransaction,
    decoded: &DecodedInstruction,
    fallback_time: DateTime<Utc>,
) -> Option<Analysis> {
    if decoded.op == PoolOp::Unknown {
        return None;
    }

    let pool_account = tx.account_keys.get(decoded.pool_account?)?.to_string();
    let sol_vault = decoded.sol_vault?;
    let token_vault = decoded.token_vault?;

    let (sol_delta_lamports, sol_before_lamports) = sol_vault_delta(tx, sol_vault)?;

    if sol_delta_lamports.abs() < MIN_SOL_DELTA_LAMPORTS {
        log::debug!(
            "Vault delta below noise floor: {} lamports ({})",
            sol_delta_lamports,
            pool_account
        );
        return None;
    }

    let (token_delta, token_mint) = token_vault_delta(tx, token_vault)?;

    let sol_delta = sol_delta_lamports as f64 / LAMPORTS_PER_SOL;
    let sol_before = sol_before_lamports as f64 / LAMPORTS_PER_SOL;
    let observed_at = tx.block_time.unwrap_or(fallback_time);

    match decoded.op {
        PoolOp::Initialize | PoolOp::Initialize2 | PoolOp::Deposit => {
            // Both sides must flow into the pool.
            if sol_delta_lamports <= 0 || token_delta <= 0.0 {
                log::debug!(
                    "Inconsistent deltas for {} ({:+.4} SOL, {:+.2} tokens), dropping",
                    decoded.op_name(),
                    sol_delta,
                    token_delta
                );
                return None;
            }

            Some(Analysis::Liquidity(LiquidityEvent {
                kind: EventKind::LpAdd,
                pool_account,
                token_mint,
                base_symbol: None,
                sol_delta,
                token_delta,
                sol_before,
                signature: tx.signature.clone(),
                observed_at,
                is_new_pool: decoded.op.is_pool_creation(),
                spike: None,
            }))
        }
        PoolOp::Withdraw => {
            // Both sides must flow out of the pool.
            if sol_delta_lamports >= 0 || token_delta >= 0.0 {
                log::debug!(
                    "Inconsistent deltas for withdraw ({:+.4} SOL, {:+.2} tokens), dropping",
                    sol_delta,
                    token_delta
                );
                return None;
            }

            Some(Analysis::Liquidity(LiquidityEvent {
                kind: EventKind::LpRemove,
                pool_account,
                token_mint,
                base_symbol: None,
                sol_delta,
                token_delta,
                sol_before,
                signature: tx.signature.clone(),
                observed_at,
                is_new_pool: false,
                spike: None,
            }))
        }
        PoolOp::Swap => {
            // A swap moves the vaults in opposite directions.
            if sol_delta.signum() == token_delta.signum() {
                return None;
            }

            Some(Analysis::Trade(TradeObservation {
                pool_account,
                token_mint,
                volume_sol: sol_delta.abs(),
                sol_before,
                signature: tx.signature.clone(),
                observed_at,
            }))
        }
        PoolOp::Unknown => None,
    }
}

impl DecodedInstruction {
    fn op_name(&self) -> &'static str {
        match self.op {
            PoolOp::Initialize => "initialize",
            PoolOp::Initialize2 => "initialize2",
            PoolOp::Deposit => "deposit",
            PoolOp::Withdraw => "withdraw",
            PoolOp::Swap => "swap",
            PoolOp::Unknown => "unknown",
        }
    }
}
