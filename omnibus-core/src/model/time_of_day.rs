use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// a clock time expressed as whole seconds since midnight on the trip's
/// operating day. values past 24:00:00 are legal and mean "the small hours
/// of the next day" for journeys that cross midnight.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TimeOfDay(pub i32);

pub const SECONDS_PER_DAY: i32 = 24 * 60 * 60;

impl TimeOfDay {
    pub fn from_hms(hours: i32, minutes: i32, seconds: i32) -> TimeOfDay {
        TimeOfDay(hours * 3600 + minutes * 60 + seconds)
    }

    pub fn seconds(&self) -> i32 {
        self.0
    }

    /// true if this time spills past midnight into the following day
    pub fn is_next_day(&self) -> bool {
        self.0 >= SECONDS_PER_DAY
    }

    /// the same instant expressed relative to the following operating day
    pub fn previous_day_equivalent(&self) -> TimeOfDay {
        TimeOfDay(self.0 + SECONDS_PER_DAY)
    }

    pub fn checked_add_seconds(&self, seconds: i64) -> Option<TimeOfDay> {
        let total = i64::from(self.0) + seconds;
        i32::try_from(total).ok().filter(|t| *t >= 0).map(TimeOfDay)
    }
}

impl Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let h = self.0 / 3600;
        let m = self.0 % 3600 / 60;
        let s = self.0 % 60;
        write!(f, "{h:02}:{m:02}:{s:02}")
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("invalid time of day '{0}'")]
pub struct ParseTimeOfDayError(String);

impl FromStr for TimeOfDay {
    type Err = ParseTimeOfDayError;

    /// parses `HH:MM` or `HH:MM:SS`, where `HH` may exceed 24
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParseTimeOfDayError(s.to_string());
        let mut parts = s.split(':');
        let hours: i32 = parts
            .next()
            .and_then(|p| p.trim().parse().ok())
            .ok_or_else(bad)?;
        let minutes: i32 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .filter(|m| (0..60).contains(m))
            .ok_or_else(bad)?;
        let seconds: i32 = match parts.next() {
            Some(p) => p.parse().ok().filter(|x| (0..60).contains(x)).ok_or_else(bad)?,
            None => 0,
        };
        if parts.next().is_some() || hours < 0 {
            return Err(bad());
        }
        Ok(TimeOfDay::from_hms(hours, minutes, seconds))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let t: TimeOfDay = "09:05".parse().unwrap();
        assert_eq!(t, TimeOfDay::from_hms(9, 5, 0));
        assert_eq!(t.to_string(), "09:05:00");

        // past-midnight times survive a round trip
        let t: TimeOfDay = "25:30:15".parse().unwrap();
        assert!(t.is_next_day());
        assert_eq!(t.to_string(), "25:30:15");

        assert!("9".parse::<TimeOfDay>().is_err());
        assert!("09:61".parse::<TimeOfDay>().is_err());
        assert!("-1:00".parse::<TimeOfDay>().is_err());
    }
}
