//! Event enrichment and the early-stage filter engine.

pub mod early_stage;
pub mod enrich;

pub use early_stage::evaluate;
pub use enrich::{EnrichError, Enricher, Enrichment, EnrichmentClient, NullEnricher};
