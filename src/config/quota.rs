//! Rate-limit quota in `"<count>/<period>"` notation.
//!
//! Accepted forms (case-insensitive):
//! - `100/minute`, `5/10 seconds`
//! - `100 per minute`, `20 per 5 m`
//!
//! Units: `millisecond(s)`, `second(s)`, `minute(s)`, `hour(s)`, `day(s)` or
//! `ms`, `s`, `m`, `h`, `d`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Error produced when a quota string cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuotaError {
    #[error("quota `{0}` must look like `<count>/<period>`")]
    Malformed(String),
    #[error("quota count must be a positive integer, got `{0}`")]
    InvalidCount(String),
    #[error("quota period multiplier must be a positive integer, got `{0}`")]
    InvalidMultiplier(String),
    #[error("unknown quota period unit `{0}`")]
    UnknownUnit(String),
    #[error("quota limit must be greater than zero")]
    ZeroLimit,
    #[error("quota period must be greater than zero")]
    ZeroPeriod,
    #[error("quota period must be a whole number of milliseconds")]
    SubMillisecondPeriod,
}

/// A validated `limit` requests per `period`.
///
/// Both values are strictly positive; the constructor is the only way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quota {
    limit: u64,
    period: Duration,
}

impl Quota {
    pub fn new(limit: u64, period: Duration) -> Result<Self, QuotaError> {
        if limit == 0 {
            return Err(QuotaError::ZeroLimit);
        }
        if period.is_zero() {
            return Err(QuotaError::ZeroPeriod);
        }
        if period.subsec_nanos() % 1_000_000 != 0 {
            return Err(QuotaError::SubMillisecondPeriod);
        }
        Ok(Self { limit, period })
    }

    pub fn per_second(limit: u64) -> Result<Self, QuotaError> {
        Self::new(limit, Duration::from_secs(1))
    }

    pub fn per_minute(limit: u64) -> Result<Self, QuotaError> {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Maximum admitted requests per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Window length.
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            limit: 100,
            period: Duration::from_secs(60),
        }
    }
}

const SECOND_MS: u64 = 1_000;
const MINUTE_MS: u64 = 60 * SECOND_MS;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;

fn unit_millis(unit: &str) -> Option<u64> {
    match unit {
        "ms" | "millisecond" | "milliseconds" => Some(1),
        "s" | "sec" | "second" | "seconds" => Some(SECOND_MS),
        "m" | "min" | "minute" | "minutes" => Some(MINUTE_MS),
        "h" | "hour" | "hours" => Some(HOUR_MS),
        "d" | "day" | "days" => Some(DAY_MS),
        _ => None,
    }
}

impl FromStr for Quota {
    type Err = QuotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let (count, period) = normalized
            .split_once('/')
            .or_else(|| normalized.split_once(" per "))
            .ok_or_else(|| QuotaError::Malformed(s.to_string()))?;

        let count = count.trim();
        let limit: u64 = count
            .parse()
            .map_err(|_| QuotaError::InvalidCount(count.to_string()))?;

        let mut parts = period.split_whitespace();
        let (multiplier, unit) = match (parts.next(), parts.next(), parts.next()) {
            (Some(unit), None, None) => (1, unit),
            (Some(n), Some(unit), None) => {
                let n: u64 = n
                    .parse()
                    .map_err(|_| QuotaError::InvalidMultiplier(n.to_string()))?;
                if n == 0 {
                    return Err(QuotaError::ZeroPeriod);
                }
                (n, unit)
            }
            _ => return Err(QuotaError::Malformed(s.to_string())),
        };

        let millis = unit_millis(unit).ok_or_else(|| QuotaError::UnknownUnit(unit.to_string()))?;
        Quota::new(limit, Duration::from_millis(millis.saturating_mul(multiplier)))
    }
}

impl TryFrom<String> for Quota {
    type Error = QuotaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quota> for String {
    fn from(quota: Quota) -> Self {
        quota.to_string()
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = u64::try_from(self.period.as_millis()).unwrap_or(u64::MAX);
        let (n, unit) = [
            (DAY_MS, "day"),
            (HOUR_MS, "hour"),
            (MINUTE_MS, "minute"),
            (SECOND_MS, "second"),
        ]
        .into_iter()
        .find(|(size, _)| millis % size == 0)
        .map_or((millis, "millisecond"), |(size, unit)| (millis / size, unit));

        if n == 1 {
            write!(f, "{}/{}", self.limit, unit)
        } else {
            write!(f, "{}/{} {}s", self.limit, n, unit)
        }
    }
}
