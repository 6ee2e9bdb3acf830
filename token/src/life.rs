use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TokenError;

/// Named token lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Life {
    OneMin,
    OneHour,
    OneDay,
    OneWeek,
    ThirtyDays,
    NinetyDays,
}

impl Life {
    pub const SHORT: Life = Life::OneHour;
    pub const NORMAL: Life = Life::OneDay;
    pub const LONG: Life = Life::NinetyDays;

    pub const ALL: [Life; 6] = [
        Life::OneMin,
        Life::OneHour,
        Life::OneDay,
        Life::OneWeek,
        Life::ThirtyDays,
        Life::NinetyDays,
    ];

    pub fn seconds(self) -> i64 {
        const MINUTE: i64 = 60;
        const HOUR: i64 = 60 * MINUTE;
        const DAY: i64 = 24 * HOUR;
        match self {
            Life::OneMin => MINUTE,
            Life::OneHour => HOUR,
            Life::OneDay => DAY,
            Life::OneWeek => 7 * DAY,
            Life::ThirtyDays => 30 * DAY,
            Life::NinetyDays => 90 * DAY,
        }
    }

    pub fn millis(self) -> i64 {
        self.seconds() * 1000
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Life::OneMin => "one-min",
            Life::OneHour => "one-hour",
            Life::OneDay => "one-day",
            Life::OneWeek => "one-week",
            Life::ThirtyDays => "thirty-days",
            Life::NinetyDays => "ninety-days",
        }
    }
}

impl Default for Life {
    fn default() -> Self {
        Life::SHORT
    }
}

impl fmt::Display for Life {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Life {
    type Err = TokenError;

    /// Accepts the kebab-case names as well as `short`, `normal` and `long`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "short" => return Ok(Life::SHORT),
            "normal" => return Ok(Life::NORMAL),
            "long" => return Ok(Life::LONG),
            _ => {}
        }
        Life::ALL
            .into_iter()
            .find(|life| life.as_str() == name)
            .ok_or_else(|| TokenError::Configuration(format!("Unknown token life: {}", s)))
    }
}
