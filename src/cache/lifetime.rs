//! Entry lifetimes and the relative date expressions they are parsed from.
//!
//! A [`Lifetime`] is turned into an absolute expiry timestamp (seconds since
//! the Unix epoch) at save time. Accepted expressions:
//!
//! | Expression                    | Meaning                                  |
//! |-------------------------------|------------------------------------------|
//! | *(empty)*                     | never expires ([`MAX_TIMESTAMP`])        |
//! | `now`                         | the current second                       |
//! | `today`, `midnight`           | 00:00 UTC today                          |
//! | `tomorrow`, `yesterday`       | 00:00 UTC of that day                    |
//! | `@1700000000`                 | an explicit Unix timestamp               |
//! | `+1 hour`, `-2 days`, `30 min`| relative offsets, summed left to right   |
//! | `2 hours ago`                 | negates the offsets parsed so far        |
//! | `2030-01-01`, RFC 3339, ...   | absolute UTC dates                       |
//!
//! Anchors and offsets combine: `tomorrow +8 hours` is 08:00 UTC tomorrow.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::CacheError;

/// Expiry used when no lifetime is given: 18 January 2038, just inside the
/// range of a signed 32-bit timestamp.
pub const MAX_TIMESTAMP: i64 = 2_147_401_800;

const SECONDS_PER_DAY: i64 = 86_400;

/// How long a saved entry stays live.
///
/// # Examples
///
/// ```
/// use nixcache::cache::Lifetime;
///
/// let lifetime: Lifetime = "+1 hour".parse().unwrap();
/// assert_eq!(lifetime, Lifetime::After(3600));
/// assert_eq!(lifetime.resolve_at(1_000), 4_600);
///
/// let never: Lifetime = "".parse().unwrap();
/// assert_eq!(never, Lifetime::Never);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifetime {
    /// Expires at [`MAX_TIMESTAMP`].
    #[default]
    Never,
    /// Expires at an absolute Unix timestamp.
    At(i64),
    /// Expires this many seconds after the save (negative values are already
    /// expired on arrival).
    After(i64),
    /// Expires at midnight UTC `days` from today, shifted by `offset` seconds.
    Midnight { days: i64, offset: i64 },
}

impl Lifetime {
    /// Shorthand for [`Lifetime::At`].
    pub fn at(timestamp: i64) -> Self {
        Self::At(timestamp)
    }

    /// Resolves the lifetime against the current wall clock.
    pub fn expires_at(&self) -> i64 {
        self.resolve_at(Utc::now().timestamp())
    }

    /// Resolves the lifetime against `now` (seconds since the Unix epoch).
    pub fn resolve_at(&self, now: i64) -> i64 {
        match *self {
            Self::Never => MAX_TIMESTAMP,
            Self::At(timestamp) => timestamp,
            Self::After(seconds) => now.saturating_add(seconds),
            Self::Midnight { days, offset } => {
                let midnight = now - now.rem_euclid(SECONDS_PER_DAY);
                midnight
                    .saturating_add(days.saturating_mul(SECONDS_PER_DAY))
                    .saturating_add(offset)
            }
        }
    }
}

impl From<Duration> for Lifetime {
    fn from(duration: Duration) -> Self {
        Self::After(i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
    }
}

impl FromStr for Lifetime {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Ok(Self::Never);
        }

        let invalid = || CacheError::InvalidLifetime {
            input: s.to_owned(),
        };

        if let Some(raw) = input.strip_prefix('@') {
            return raw.trim().parse().map(Self::At).map_err(|_| invalid());
        }

        if let Some(timestamp) = parse_absolute(input) {
            return Ok(Self::At(timestamp));
        }

        let lowered = input.to_ascii_lowercase();
        let mut tokens = lowered.split_whitespace().peekable();
        let mut anchor_days: Option<i64> = None;
        let mut offset: i64 = 0;

        while let Some(token) = tokens.next() {
            match token {
                "now" => {}
                "today" | "midnight" => anchor_days = Some(0),
                "tomorrow" => anchor_days = Some(1),
                "yesterday" => anchor_days = Some(-1),
                "ago" => offset = -offset,
                _ => {
                    let (amount, attached_unit) = split_amount(token).ok_or_else(invalid)?;
                    let unit = if attached_unit.is_empty() {
                        tokens.next().ok_or_else(invalid)?
                    } else {
                        attached_unit
                    };
                    let seconds = unit_seconds(unit).ok_or_else(invalid)?;
                    offset = amount
                        .checked_mul(seconds)
                        .and_then(|delta| offset.checked_add(delta))
                        .ok_or_else(invalid)?;
                }
            }
        }

        Ok(match anchor_days {
            Some(days) => Self::Midnight { days, offset },
            None => Self::After(offset),
        })
    }
}

// Absolute dates are interpreted in UTC.
fn parse_absolute(input: &str) -> Option<i64> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(input) {
        return Some(datetime.timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc().timestamp());
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc().timestamp());
    }
    None
}

// Splits `+12hours` into `(12, "hours")`; the unit may be empty.
fn split_amount(token: &str) -> Option<(i64, &str)> {
    let (sign, rest) = match token.as_bytes().first()? {
        b'+' => (1, &token[1..]),
        b'-' => (-1, &token[1..]),
        _ => (1, token),
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let amount: i64 = rest[..digits].parse().ok()?;
    Some((sign * amount, &rest[digits..]))
}

fn unit_seconds(unit: &str) -> Option<i64> {
    let seconds = match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => SECONDS_PER_DAY,
        "w" | "week" | "weeks" => 7 * SECONDS_PER_DAY,
        "fortnight" | "fortnights" => 14 * SECONDS_PER_DAY,
        "month" | "months" => 30 * SECONDS_PER_DAY,
        "year" | "years" => 365 * SECONDS_PER_DAY,
        _ => return None,
    };
    Some(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2023-11-14T22:13:20Z
    const NOW: i64 = 1_700_000_000;
    const MIDNIGHT: i64 = 1_699_920_000;

    fn parse(s: &str) -> Lifetime {
        s.parse().unwrap()
    }

    #[test]
    fn empty_never_expires() {
        assert_eq!(parse(""), Lifetime::Never);
        assert_eq!(parse("   "), Lifetime::Never);
        assert_eq!(Lifetime::Never.resolve_at(NOW), MAX_TIMESTAMP);
    }

    #[test]
    fn relative_offsets() {
        assert_eq!(parse("+1 hour"), Lifetime::After(3_600));
        assert_eq!(parse("30 minutes"), Lifetime::After(1_800));
        assert_eq!(parse("-1 day"), Lifetime::After(-86_400));
        assert_eq!(parse("+2 days 3 hours"), Lifetime::After(2 * 86_400 + 3 * 3_600));
        assert_eq!(parse("+10s"), Lifetime::After(10));
        assert_eq!(parse("1 Week"), Lifetime::After(7 * 86_400));
    }

    #[test]
    fn ago_negates() {
        assert_eq!(parse("2 hours ago"), Lifetime::After(-7_200));
    }

    #[test]
    fn anchors_resolve_to_midnight() {
        assert_eq!(parse("today").resolve_at(NOW), MIDNIGHT);
        assert_eq!(parse("tomorrow").resolve_at(NOW), MIDNIGHT + 86_400);
        assert_eq!(parse("yesterday").resolve_at(NOW), MIDNIGHT - 86_400);
        assert_eq!(
            parse("tomorrow +8 hours").resolve_at(NOW),
            MIDNIGHT + 86_400 + 8 * 3_600
        );
    }

    #[test]
    fn now_is_now() {
        assert_eq!(parse("now").resolve_at(NOW), NOW);
    }

    #[test]
    fn explicit_timestamp() {
        assert_eq!(parse("@1700000000"), Lifetime::At(NOW));
        assert!("@soon".parse::<Lifetime>().is_err());
    }

    #[test]
    fn absolute_dates() {
        assert_eq!(parse("2023-11-14"), Lifetime::At(MIDNIGHT));
        assert_eq!(parse("2023-11-14 22:13:20"), Lifetime::At(NOW));
        assert_eq!(parse("2023-11-14T22:13:20Z"), Lifetime::At(NOW));
        assert_eq!(parse("2023-11-14T23:13:20+01:00"), Lifetime::At(NOW));
    }

    #[test]
    fn garbage_rejected() {
        for input in ["soon", "+1 fortnite", "+1", "hour", "next tuesday"] {
            assert!(
                matches!(
                    input.parse::<Lifetime>(),
                    Err(CacheError::InvalidLifetime { .. })
                ),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn from_duration() {
        assert_eq!(
            Lifetime::from(Duration::from_secs(90)),
            Lifetime::After(90)
        );
        assert_eq!(Lifetime::at(5).resolve_at(NOW), 5);
    }
}
