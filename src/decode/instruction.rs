//! Raydium AMM V4 instruction classification.
//!
//! A pure function over the instruction discriminator byte and the account
//! index list. Unknown or irrelevant instructions are an expected, frequent
//! outcome, not a failure.

use crate::ingest::resolver::{CompiledInstruction, ResolvedTransaction};
use crate::ingest::subscription::RAYDIUM_AMM_V4;
use base64::Engine;
use solana_pubkey::Pubkey;
use std::str::FromStr;

/// Classified pool instruction variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOp {
    Initialize,
    Initialize2,
    Deposit,
    Withdraw,
    Swap,
    Unknown,
}

impl PoolOp {
    pub fn is_pool_creation(&self) -> bool {
        matches!(self, PoolOp::Initialize | PoolOp::Initialize2)
    }
}

/// The classified instruction plus the global account indices of the
/// pool account and its two vaults. Indices point into the transaction
/// account list, which is also what the balance arrays are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub op: PoolOp,
    pub pool_account: Option<usize>,
    pub sol_vault: Option<usize>,
    pub token_vault: Option<usize>,
}

impl DecodedInstruction {
    pub fn unknown() -> Self {
        Self {
            op: PoolOp::Unknown,
            pool_account: None,
            sol_vault: None,
            token_vault: None,
        }
    }
}

/// Map the discriminator byte to the instruction variant.
///
/// Raydium AMM V4 discriminators: 0 initialize, 1 initialize2,
/// 3 deposit, 4 withdraw, 9 swap (base in).
fn classify_discriminator(byte: u8) -> PoolOp {
    match byte {
        0 => PoolOp::Initialize,
        1 => PoolOp::Initialize2,
        3 => PoolOp::Deposit,
        4 => PoolOp::Withdraw,
        9 => PoolOp::Swap,
        _ => PoolOp::Unknown,
    }
}

/// Decode the instruction data blob (base58, with a base64 fallback) and
/// classify by its first byte.
pub fn classify_instruction_data(data: &str) -> PoolOp {
    if data.is_empty() {
        return PoolOp::Unknown;
    }

    let decoded = match bs58::decode(data).into_vec() {
        Ok(bytes) => bytes,
        Err(_) => match base64::engine::general_purpose::STANDARD.decode(data) {
            Ok(bytes) => bytes,
            Err(_) => return PoolOp::Unknown,
        },
    };

    match decoded.first() {
        Some(&byte) => {
            let op = classify_discriminator(byte);
            if op == PoolOp::Unknown {
                log::debug!("Unrecognized AMM discriminator: 0x{}", hex::encode([byte]));
            }
            op
        }
        None => PoolOp::Unknown,
    }
}

/// Account positions within the instruction's own account list, per the
/// Raydium AMM V4 layouts. Positions are translated to global indices.
///
/// initialize/initialize2: [.., amm @3, .., lp_mint @6, coin_mint @7,
/// pc_mint @8, coin_vault @9, pc_vault @10, ..]
/// deposit/withdraw: [token_program, amm @1, .., coin_vault @6, pc_vault @7, ..]
/// swap: [token_program, amm @1, .., coin_vault @5, pc_vault @6, ..]
fn vault_positions(op: PoolOp) -> Option<(usize, usize, usize)> {
    match op {
        PoolOp::Initialize | PoolOp::Initialize2 => Some((3, 9, 10)),
        PoolOp::Deposit | PoolOp::Withdraw => Some((1, 6, 7)),
        PoolOp::Swap => Some((1, 5, 6)),
        PoolOp::Unknown => None,
    }
}

fn global_index(
    instruction: &CompiledInstruction,
    position: usize,
    account_count: usize,
) -> Option<usize> {
    instruction
        .accounts
        .get(position)
        .copied()
        .filter(|&idx| idx < account_count)
}

/// Find and classify the relevant pool-program instruction of a resolved
/// transaction. Outer instructions are scanned before inner (CPI) ones.
pub fn decode_instruction(tx: &ResolvedTransaction) -> DecodedInstruction {
    let program = match Pubkey::from_str(RAYDIUM_AMM_V4) {
        Ok(p) => p,
        Err(_) => return DecodedInstruction::unknown(),
    };

    let instruction = tx.instructions.iter().find(|ix| {
        tx.account_keys
            .get(ix.program_id_index)
            .map(|key| *key == program)
            .unwrap_or(false)
    });

    let instruction = match instruction {
        Some(ix) => ix,
        None => return DecodedInstruction::unknown(),
    };

    let op = classify_instruction_data(&instruction.data);

    let (pool_pos, token_pos, sol_pos) = match vault_positions(op) {
        Some(positions) => positions,
        None => return DecodedInstruction::unknown(),
    };

    let account_count = tx.account_keys.len();

    DecodedInstruction {
        op,
        pool_account: global_index(instruction, pool_pos, account_count),
        sol_vault: global_index(instruction, sol_pos, account_count),
        token_vault: global_index(instruction, token_pos, account_count),
    }
}
