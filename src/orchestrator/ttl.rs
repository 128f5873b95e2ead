//! Duration strings for service expiry (`"30s"`, `"15m"`, `"2h"`, `"3d"`).

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::orchestrator::error::ControlError;

static TTL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d+)\s*(s|m|h|d)$").expect("ttl pattern is valid"));

const INVALID_TTL: &str = r#"Invalid TTL format. Use formats like "120s", "15m", "1h", "2d"."#;

pub fn parse_ttl(ttl: &str) -> Result<Duration, ControlError> {
    let invalid = || ControlError::validation("ttl", INVALID_TTL);
    let caps = TTL.captures(ttl.trim()).ok_or_else(invalid)?;
    let value: i64 = caps[1].parse().map_err(|_| invalid())?;

    let duration = match caps[2].to_ascii_lowercase().as_str() {
        "s" => Duration::try_seconds(value),
        "m" => Duration::try_minutes(value),
        "h" => Duration::try_hours(value),
        _ => Duration::try_days(value),
    };
    duration.ok_or_else(invalid)
}

/// Absolute expiry for a TTL counted from `now`.
pub fn expires_at_from_ttl(ttl: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ControlError> {
    let duration = parse_ttl(ttl)?;
    now.checked_add_signed(duration)
        .ok_or_else(|| ControlError::validation("ttl", INVALID_TTL))
}

/// Remaining time as the largest whole unit, `0s` once expired.
pub fn ttl_from_expires_at(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (expires_at - now).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3_600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3_600),
        s => format!("{}d", s / 86_400),
    }
}
