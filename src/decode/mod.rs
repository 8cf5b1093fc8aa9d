//! Pure decoding: instruction classification and balance-delta analysis.

pub mod deltas;
pub mod instruction;
pub mod volume;

pub use deltas::{analyze_balances, Analysis, TradeObservation, MIN_SOL_DELTA_LAMPORTS};
pub use instruction::{decode_instruction, DecodedInstruction, PoolOp};
pub use volume::{VolumeWindow, VOLUME_EMIT_FLOOR};
