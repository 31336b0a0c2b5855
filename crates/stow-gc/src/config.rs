//! Garbage collection settings.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use stow_pack::PackConfig;

use crate::error::{GcError, GcResult};

/// Garbage packs at least this large are left alone.
pub const DEFAULT_COALESCE_GARBAGE_LIMIT: u64 = 50 << 20;

const DAY: u64 = 24 * 60 * 60;
const WEEK: u64 = 7 * DAY;

/// Configuration for a [`GarbageCollector`](crate::GarbageCollector).
///
/// Loadable from TOML:
///
/// ```toml
/// coalesce_garbage_limit = 1048576
/// prune_expire = "2.weeks.ago"
///
/// [pack]
/// compression_level = 9
/// build_bitmaps = false
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Unreachable-garbage packs smaller than this many bytes are rewritten
    /// into the next garbage pack. `0` disables coalescing, `u64::MAX`
    /// coalesces every garbage pack.
    pub coalesce_garbage_limit: u64,
    /// Loose objects modified before this instant may be pruned.
    pub prune_expire: PruneExpire,
    /// Settings for every pack written.
    pub pack: PackConfig,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            coalesce_garbage_limit: DEFAULT_COALESCE_GARBAGE_LIMIT,
            prune_expire: PruneExpire::default(),
            pack: PackConfig::default(),
        }
    }
}

impl GcConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> GcResult<Self> {
        toml::from_str(s).map_err(|e| GcError::Config(e.to_string()))
    }
}

/// When loose objects become old enough to prune.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PruneExpire {
    /// Nothing is ever old enough.
    Never,
    /// Everything written before the prune started.
    Now,
    /// Everything older than this age at the time of the prune.
    Age(Duration),
    /// Everything written before this instant.
    At(DateTime<Utc>),
}

impl Default for PruneExpire {
    fn default() -> Self {
        PruneExpire::Age(Duration::from_secs(2 * WEEK))
    }
}

impl PruneExpire {
    /// The instant a loose object must be strictly older than to be pruned,
    /// or `None` if nothing may be pruned.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            PruneExpire::Never => None,
            PruneExpire::Now => Some(now),
            PruneExpire::At(when) => Some(*when),
            PruneExpire::Age(age) => Some(
                TimeDelta::from_std(*age)
                    .ok()
                    .and_then(|age| now.checked_sub_signed(age))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            ),
        }
    }
}

fn unit_seconds(unit: &str) -> Option<u64> {
    let unit = unit.strip_suffix('s').unwrap_or(unit);
    Some(match unit {
        "second" | "sec" => 1,
        "minute" | "min" => 60,
        "hour" => 60 * 60,
        "day" => DAY,
        "week" => WEEK,
        "month" => 30 * DAY,
        "year" => 365 * DAY,
        _ => return None,
    })
}

impl FromStr for PruneExpire {
    type Err = GcError;

    /// Accepts `now`, `never`, relative ages such as `2.weeks.ago` or
    /// `3 days ago`, RFC 3339 timestamps and `YYYY-MM-DD` dates (midnight UTC).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| GcError::InvalidExpire {
            value: s.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = s.trim();
        match trimmed {
            "now" => return Ok(PruneExpire::Now),
            "never" => return Ok(PruneExpire::Never),
            _ => {}
        }
        if let Ok(when) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(PruneExpire::At(when.with_timezone(&Utc)));
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            let midnight = date
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| invalid("date out of range"))?;
            return Ok(PruneExpire::At(midnight.and_utc()));
        }

        let words: Vec<&str> = trimmed
            .split(|c: char| c == '.' || c.is_whitespace())
            .filter(|w| !w.is_empty())
            .collect();
        let [count, unit, "ago"] = words.as_slice() else {
            return Err(invalid("expected now, never, a date, or '<n>.<unit>.ago'"));
        };
        let count: u64 = count.parse().map_err(|_| invalid("count is not a number"))?;
        let unit = unit_seconds(unit).ok_or_else(|| invalid("unknown time unit"))?;
        let secs = count
            .checked_mul(unit)
            .ok_or_else(|| invalid("age too large"))?;
        Ok(PruneExpire::Age(Duration::from_secs(secs)))
    }
}

impl fmt::Display for PruneExpire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PruneExpire::Never => f.write_str("never"),
            PruneExpire::Now => f.write_str("now"),
            PruneExpire::At(when) => f.write_str(&when.to_rfc3339()),
            PruneExpire::Age(age) => {
                let secs = age.as_secs();
                if secs != 0 && secs % WEEK == 0 {
                    write!(f, "{}.weeks.ago", secs / WEEK)
                } else if secs != 0 && secs % DAY == 0 {
                    write!(f, "{}.days.ago", secs / DAY)
                } else {
                    write!(f, "{secs}.seconds.ago")
                }
            }
        }
    }
}

impl TryFrom<String> for PruneExpire {
    type Error = GcError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PruneExpire> for String {
    fn from(value: PruneExpire) -> Self {
        value.to_string()
    }
}
