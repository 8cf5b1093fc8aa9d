pub mod alerts;
pub mod config;
pub mod decode;
pub mod filters;
pub mod guardrails;
pub mod ingest;
pub mod notify;
pub mod pipeline;
pub mod signals;
pub mod store;
pub mod types;
pub mod util;

pub use alerts::AlertBoundary;
pub use config::{Config, ConfigError, FilterProfile, FilterTemplate};
pub use guardrails::{GuardrailError, GuardrailState};
pub use pipeline::{Pipeline, PoolMsg, PoolProcessor, StageContext};
pub use signals::{Confirmation, SignalWindow, SignalWindowTracker};
pub use types::{Alert, EventKind, LiquidityEvent, Priority, RawNotification, Verdict};
