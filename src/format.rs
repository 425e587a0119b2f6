//! Display helpers for addresses, base-unit amounts and the game timer.
//!
//! Amounts and timestamps stay 256-bit integers until they reach these
//! functions; nothing here goes through floating point.

use alloy_primitives::U256;
use chrono::{
    DateTime,
    Utc,
};
use itertools::Itertools;

pub const GAME_ENDED: &str = "The game has ended.";

/// 10^15 base units, one thousandth of a whole token at 18 decimals.
const BASE_UNITS_PER_MILLI: u64 = 1_000_000_000_000_000;

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;

/// `0x1234567890abcdef1234` -> `0x1234...1234`. Inputs too short to
/// truncate are returned unchanged.
pub fn format_account_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Renders a base-unit amount as whole tokens with three fractional
/// digits, rounding half up.
pub fn format_amount(base_units: U256) -> String {
    let milli = U256::from(BASE_UNITS_PER_MILLI);
    let rounded = base_units.saturating_add(milli / U256::from(2u64)) / milli;
    let thousand = U256::from(1_000u64);
    let whole = rounded / thousand;
    let fraction = (rounded % thousand).as_limbs()[0];
    format!("{whole}.{fraction:03}")
}

/// Unix seconds as stored by the contract, clamped into `u64`.
pub fn unix_seconds(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

pub fn start_time(created_at: U256) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(unix_seconds(created_at)).ok()?;
    DateTime::<Utc>::from_timestamp(secs, 0)
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TimeUntil {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    pub millis: u64,
}

impl TimeUntil {
    pub fn is_zero(&self) -> bool {
        *self == TimeUntil::default()
    }
}

/// Time left until `ending_at` (unix seconds), always recomputed from the
/// wall clock. Past deadlines yield zero.
pub fn time_until(ending_at: U256, now: DateTime<Utc>) -> TimeUntil {
    let end_ms = unix_seconds(ending_at).saturating_mul(MS_PER_SECOND);
    let now_ms = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    let diff = end_ms.saturating_sub(now_ms);
    TimeUntil {
        days: diff / MS_PER_DAY,
        hours: (diff % MS_PER_DAY) / MS_PER_HOUR,
        minutes: (diff % MS_PER_HOUR) / MS_PER_MINUTE,
        seconds: (diff % MS_PER_MINUTE) / MS_PER_SECOND,
        millis: diff % MS_PER_SECOND,
    }
}

pub fn format_countdown(left: TimeUntil) -> String {
    let mut parts = Vec::with_capacity(4);
    if left.days > 0 {
        parts.push(format!("{}d", left.days));
    }
    if left.hours > 0 {
        parts.push(format!("{}h", left.hours));
    }
    if left.minutes > 0 {
        parts.push(format!("{}m", left.minutes));
    }
    if left.millis > 0 {
        parts.push(format!("{}.{:03}s", left.seconds, left.millis));
    } else if left.seconds > 0 {
        parts.push(format!("{}s", left.seconds));
    }
    if parts.is_empty() {
        GAME_ENDED.to_string()
    } else {
        parts.iter().join(" ")
    }
}

pub fn format_game_timer(ending_at: U256, now: DateTime<Utc>) -> String {
    format_countdown(time_until(ending_at, now))
}
