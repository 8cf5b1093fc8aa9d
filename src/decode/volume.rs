//! Rolling per-pool volume baseline for spike derivation.
//!
//! Keeps a simple moving average of trade volumes over the window and
//! derives a `volume_spike` event when a trade clears the emission floor
//! multiple of that baseline. Profile-level multiplier thresholds are
//! applied later by the filter engine; the floor only bounds how many
//! candidate events are derived at all.

use crate::decode::deltas::TradeObservation;
use crate::types::{EventKind, LiquidityEvent, SpikeInfo};
use chrono::{DateTime, Duration, Utc};

/// Smallest multiplier worth deriving an event for. Matches the loosest
/// built-in profile threshold so no profile-passing spike is ever masked.
pub const VOLUME_EMIT_FLOOR: f64 = 1.5;

/// Rolling volume window for a single pool.
#[derive(Debug, Clone)]
pub struct VolumeWindow {
    window: Duration,
    points: Vec<(DateTime<Utc>, f64)>,
}

impl VolumeWindow {
    pub fn new(window_minutes: i64) -> Self {
        Self {
            window: Duration::minutes(window_minutes),
            points: Vec::new(),
        }
    }

    /// Record a trade volume and return (baseline, multiplier), the
    /// baseline including the new point.
    pub fn record(&mut self, volume_sol: f64, timestamp: DateTime<Utc>) -> (f64, f64) {
        let cutoff = timestamp - self.window;

        self.points.push((timestamp, volume_sol));
        self.points.retain(|(ts, _)| *ts > cutoff);

        let baseline =
            self.points.iter().map(|(_, vol)| vol).sum::<f64>() / self.points.len() as f64;

        let multiplier = if baseline > 0.0 {
            volume_sol / baseline
        } else {
            1.0
        };

        (baseline, multiplier)
    }

    /// Feed one swap observation; derives a volume_spike event when the
    /// trade clears the emission floor.
    pub fn observe(&mut self, trade: &TradeObservation) -> Option<LiquidityEvent> {
        let (baseline, multiplier) = self.record(trade.volume_sol, trade.observed_at);

        if multiplier < VOLUME_EMIT_FLOOR {
            log::debug!(
                "Volume below spike floor: {:.2} SOL ({:.1}x baseline)",
                trade.volume_sol,
                multiplier
            );
            return None;
        }

        Some(LiquidityEvent {
            kind: EventKind::VolumeSpike,
            pool_account: trade.pool_account.clone(),
            token_mint: trade.token_mint.clone(),
            base_symbol: None,
            sol_delta: trade.volume_sol,
            token_delta: 0.0,
            sol_before: trade.sol_before,
            signature: trade.signature.clone(),
            observed_at: trade.observed_at,
            is_new_pool: false,
            spike: Some(SpikeInfo {
                multiplier,
                baseline_sol: baseline,
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(offset_secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_722_470_400 + offset_secs, 0).unwrap()
    }

    fn trade(volume: f64, offset_secs: i64) -> TradeObservation {
        TradeObservation {
            pool_account: "pool".to_string(),
            token_mint: "mint".to_string(),
            volume_sol: volume,
            sol_before: 100.0,
            signature: format!("sig_{}", offset_secs),
            observed_at: ts(offset_secs),
        }
    }

    #[test]
    fn test_first_trade_sets_baseline_no_spike() {
        let mut window = VolumeWindow::new(60);
        let (baseline, multiplier) = window.record(10.0, ts(0));
        assert_eq!(baseline, 10.0);
        assert_eq!(multiplier, 1.0);
        assert!(window.observe(&trade(10.0, 1)).is_none());
    }

    #[test]
    fn test_spike_above_baseline_derives_event() {
        let mut window = VolumeWindow::new(60);

        // Build a steady 1-SOL baseline.
        for i in 0..10 {
            assert!(window.observe(&trade(1.0, i * 30)).is_none());
        }

        // 20 SOL against a ~1 SOL baseline is a clear spike.
        let event = window.observe(&trade(20.0, 310)).unwrap();
        assert_eq!(event.kind, EventKind::VolumeSpike);
        assert_eq!(event.sol_delta, 20.0);

        let spike = event.spike.unwrap();
        assert!(spike.multiplier > 5.0);
        assert!(spike.baseline_sol > 0.0);
    }

    #[test]
    fn test_old_points_evicted_from_baseline() {
        let mut window = VolumeWindow::new(60);

        window.record(100.0, ts(0));
        // One hour later the 100 SOL point is outside the window.
        let (baseline, _) = window.record(1.0, ts(3601));
        assert_eq!(baseline, 1.0);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_sub_floor_multiplier_no_event() {
        let mut window = VolumeWindow::new(60);

        for i in 0..5 {
            window.record(10.0, ts(i * 10));
        }

        // 12 SOL against a 10 SOL baseline is only ~1.16x.
        assert!(window.observe(&trade(12.0, 60)).is_none());
    }
}
