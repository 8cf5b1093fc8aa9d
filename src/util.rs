//! Small formatting helpers.

/// Human-readable age string: "30m", "2h 30m", "1d 1h", "1y 6mo 7d".
pub fn format_age_human(hours: f64) -> String {
    if hours <= 0.0 {
        return "just now".to_string();
    }

    let total_minutes = (hours * 60.0) as i64;

    const MINUTES_PER_HOUR: i64 = 60;
    const MINUTES_PER_DAY: i64 = 60 * 24;
    const MINUTES_PER_MONTH: i64 = MINUTES_PER_DAY * 30;
    const MINUTES_PER_YEAR: i64 = MINUTES_PER_DAY * 365;

    let years = total_minutes / MINUTES_PER_YEAR;
    let mut remaining = total_minutes % MINUTES_PER_YEAR;

    let months = remaining / MINUTES_PER_MONTH;
    remaining %= MINUTES_PER_MONTH;

    let days = remaining / MINUTES_PER_DAY;
    remaining %= MINUTES_PER_DAY;

    let hours_part = remaining / MINUTES_PER_HOUR;
    let minutes_part = remaining % MINUTES_PER_HOUR;

    let mut parts = Vec::new();

    if years > 0 {
        parts.push(format!("{}y", years));
        if months > 0 {
            parts.push(format!("{}mo", months));
        }
        if days > 0 {
            parts.push(format!("{}d", days));
        }
    } else if months > 0 {
        parts.push(format!("{}mo", months));
        if days > 0 {
            parts.push(format!("{}d", days));
        }
    } else if days > 0 {
        parts.push(format!("{}d", days));
        if hours_part > 0 {
            parts.push(format!("{}h", hours_part));
        }
    } else if hours_part > 0 {
        parts.push(format!("{}h", hours_part));
        if minutes_part > 0 {
            parts.push(format!("{}m", minutes_part));
        }
    } else {
        parts.push(format!("{}m", minutes_part));
    }

    parts.join(" ")
}

/// Pair age with both numeric and human-readable formats.
pub fn format_pair_age(hours: Option<f64>) -> String {
    match hours {
        None => "unknown".to_string(),
        Some(h) if h < 1.0 => format!("{:.0}m ({})", h * 60.0, format_age_human(h)),
        Some(h) if h < 24.0 => format!("{:.1}h ({})", h, format_age_human(h)),
        Some(h) => format!("{:.0}h ({})", h, format_age_human(h)),
    }
}
