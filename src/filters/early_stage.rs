//! Early-stage filter engine.
//!
//! A pure, deterministic function of (event, enrichment, template,
//! profile, window status). Evaluation order is fixed:
//!
//! 1. Hard-reject rules (any one short-circuits, log-only)
//! 2. Profile magnitude threshold for the event kind
//! 3. Multi-signal gate for lp_add and volume_spike
//! 4. Accepted, with a priority tier derived from pair age
//!
//! Missing enrichment data never rejects: an axis without data simply
//! cannot hard-reject.

use crate::config::{FilterProfile, FilterTemplate};
use crate::filters::enrich::Enrichment;
use crate::signals::Confirmation;
use crate::types::{EventKind, LiquidityEvent, Priority, Verdict};

/// Evaluate one enriched event against the active template and profile.
pub fn evaluate(
    event: &LiquidityEvent,
    enrichment: &Enrichment,
    template: &FilterTemplate,
    profile: &FilterProfile,
    confirmation: Confirmation,
) -> Verdict {
    // Stage 1: hard rejects, in fixed order.

    if let Some(age) = enrichment.pair_age_hours {
        if age > template.hard_reject.pair_age_hours {
            return Verdict::Rejected {
                rule: "pair_age",
                reason: format!(
                    "pair age {:.1}h > {:.0}h limit",
                    age, template.hard_reject.pair_age_hours
                ),
            };
        }
        if age <= template.preferred_pair_age_hours {
            log::debug!("{} inside preferred age window ({:.1}h)", event.pair_string(), age);
        }
    }

    if let Some(market_cap) = enrichment.market_cap_usd {
        if market_cap >= template.hard_reject.market_cap_usd {
            return Verdict::Rejected {
                rule: "market_cap",
                reason: format!(
                    "MC ${:.1}M >= ${:.0}M limit",
                    market_cap / 1e6,
                    template.hard_reject.market_cap_usd / 1e6
                ),
            };
        }
    }

    if event.sol_before > template.hard_reject.baseline_liquidity_sol {
        return Verdict::Rejected {
            rule: "baseline_liquidity",
            reason: format!(
                "baseline {:.1} SOL > {:.0} SOL limit",
                event.sol_before, template.hard_reject.baseline_liquidity_sol
            ),
        };
    }

    if let Some(symbol) = &enrichment.base_symbol {
        if template.legacy_memes.contains(&symbol.to_uppercase()) {
            return Verdict::Rejected {
                rule: "legacy_symbol",
                reason: format!("{} is in the legacy exclusion set", symbol.to_uppercase()),
            };
        }
    }

    // Stage 2: profile magnitude threshold for this kind.

    match event.kind {
        EventKind::LpAdd => {
            let added_sol = event.magnitude_sol();
            if added_sol < profile.lp_add_min_sol {
                return Verdict::Rejected {
                    rule: "lp_add_min_sol",
                    reason: format!(
                        "+{:.1} SOL < {:.0} SOL minimum",
                        added_sol, profile.lp_add_min_sol
                    ),
                };
            }

            // The USD leg only applies when a price was obtained.
            if let Some(price) = enrichment.sol_price_usd {
                let added_usd = added_sol * price;
                if added_usd < profile.lp_add_min_usd {
                    return Verdict::Rejected {
                        rule: "lp_add_min_usd",
                        reason: format!(
                            "~${:.0} < ${:.0} minimum",
                            added_usd, profile.lp_add_min_usd
                        ),
                    };
                }
            }
        }
        EventKind::LpRemove => {
            let removed_pct = if event.sol_before > 0.0 {
                event.magnitude_sol() / event.sol_before * 100.0
            } else {
                0.0
            };
            if removed_pct < profile.lp_remove_min_pct {
                return Verdict::Rejected {
                    rule: "lp_remove_min_pct",
                    reason: format!(
                        "-{:.1}% < {:.0}% minimum",
                        removed_pct, profile.lp_remove_min_pct
                    ),
                };
            }
        }
        EventKind::VolumeSpike => {
            let multiplier = event.spike.map(|s| s.multiplier).unwrap_or(0.0);
            if multiplier < profile.volume_spike_multiplier {
                return Verdict::Rejected {
                    rule: "volume_spike_multiplier",
                    reason: format!(
                        "{:.1}x < {:.1}x minimum",
                        multiplier, profile.volume_spike_multiplier
                    ),
                };
            }
        }
    }

    // Stage 3: multi-signal gate. One isolated add or spike is noise
    // until a second distinct signal corroborates it.

    let needs_confirmation = template.require_multi_signal
        && matches!(event.kind, EventKind::LpAdd | EventKind::VolumeSpike);

    if needs_confirmation && confirmation != Confirmation::Confirmed {
        return Verdict::PendingConfirmation;
    }

    // Stage 4: accepted.

    Verdict::Accepted {
        priority: Priority::from_pair_age(enrichment.pair_age_hours),
    }
}
