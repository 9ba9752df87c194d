use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::model::{BankHolidayId, CalendarId};

/// a recurring weekly operating pattern: seven day-of-week flags and a
/// validity interval. an open end date means the pattern runs indefinitely.
///
/// a calendar with no day flag set and no dated inclusion is a normal state
/// (some patterns only ever run on explicitly added days) and simply never
/// operates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    pub id: CalendarId,
    pub mon: bool,
    pub tue: bool,
    pub wed: bool,
    pub thu: bool,
    pub fri: bool,
    pub sat: bool,
    pub sun: bool,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    /// human-readable description of the exceptions, e.g. "not school holidays"
    pub summary: String,
}

impl Calendar {
    pub fn day_flag(&self, weekday: Weekday) -> bool {
        match weekday {
            Weekday::Mon => self.mon,
            Weekday::Tue => self.tue,
            Weekday::Wed => self.wed,
            Weekday::Thu => self.thu,
            Weekday::Fri => self.fri,
            Weekday::Sat => self.sat,
            Weekday::Sun => self.sun,
        }
    }

    /// true if the date falls inside the validity interval. dates outside
    /// never operate, whatever the exceptions say.
    pub fn in_validity(&self, date: NaiveDate) -> bool {
        self.start_date <= date && self.end_date.map_or(true, |end| date <= end)
    }
}

/// a dated exception attached to a calendar. `operation` true adds the
/// day(s), false suppresses them. `special` marks a one-off extra working
/// (as opposed to a recurring term-time style range).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDate {
    pub calendar: CalendarId,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub operation: bool,
    pub special: bool,
    pub summary: String,
}

impl CalendarDate {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && self.end_date.map_or(true, |end| end >= date)
    }
}

/// a named public holiday, e.g. "ChristmasDay" or the "AllBankHolidays"
/// grouping. concrete dates live in [BankHolidayDate] rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankHoliday {
    pub id: BankHolidayId,
    pub name: String,
}

/// one concrete date of a named holiday. `scotland` restricts the row to
/// Scottish (`Some(true)`) or non-Scottish (`Some(false)`) services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankHolidayDate {
    pub bank_holiday: BankHolidayId,
    pub date: NaiveDate,
    pub scotland: Option<bool>,
}

/// links a calendar to a named holiday: the pattern does (or does not)
/// operate on that holiday's registered dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarBankHoliday {
    pub calendar: CalendarId,
    pub bank_holiday: BankHolidayId,
    pub operation: bool,
}

/// a calendar's bank-holiday association resolved against the registered
/// dates table, ready for date resolution
#[derive(Debug, Clone)]
pub struct HolidayRule {
    pub operation: bool,
    pub dates: BTreeSet<NaiveDate>,
}

/// decides whether a pattern operates on one concrete date.
///
/// an explicit non-operating mark always wins: a date covered by an
/// exclusion (or a non-operation holiday association) never operates, even
/// when the weekday flag is set or another rule adds it. with no exclusion
/// in play, the weekday flag decides, and days the flags miss can still be
/// added by an inclusion or an operation holiday association.
pub fn allows(
    calendar: &Calendar,
    exceptions: &[CalendarDate],
    holidays: &[HolidayRule],
    date: NaiveDate,
) -> bool {
    if !calendar.in_validity(date) {
        return false;
    }
    let excluded = exceptions
        .iter()
        .any(|exception| !exception.operation && exception.contains(date))
        || holidays
            .iter()
            .any(|rule| !rule.operation && rule.dates.contains(&date));
    if excluded {
        return false;
    }
    if calendar.day_flag(date.weekday()) {
        return true;
    }
    exceptions
        .iter()
        .any(|exception| exception.operation && exception.contains(date))
        || holidays
            .iter()
            .any(|rule| rule.operation && rule.dates.contains(&date))
}

/// a parsed-but-not-yet-persisted operating pattern, as produced by the
/// feed parsers. the import context interns these by content so that the
/// thousands of journeys sharing one pattern share one calendar row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CalendarPattern {
    pub days: [bool; 7],
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub summary: String,
    pub exceptions: Vec<ExceptionPattern>,
    /// (holiday name, operates) pairs; a later entry for the same name
    /// overrides an earlier one
    pub bank_holidays: Vec<(String, bool)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionPattern {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub operation: bool,
    pub special: bool,
    pub summary: String,
}

impl CalendarPattern {
    /// content key for per-run interning
    pub fn content_hash(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.days.hash(&mut hasher);
        self.start_date.hash(&mut hasher);
        self.end_date.hash(&mut hasher);
        self.summary.hash(&mut hasher);
        for exception in &self.exceptions {
            exception.start_date.hash(&mut hasher);
            exception.end_date.hash(&mut hasher);
            exception.operation.hash(&mut hasher);
            exception.special.hash(&mut hasher);
            exception.summary.hash(&mut hasher);
        }
        self.bank_holidays.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn mondays_only() -> Calendar {
        Calendar {
            id: CalendarId(1),
            mon: true,
            tue: false,
            wed: false,
            thu: false,
            fri: false,
            sat: false,
            sun: false,
            start_date: date(2024, 1, 1),
            end_date: None,
            summary: String::new(),
        }
    }

    fn exception(on: NaiveDate, operation: bool) -> CalendarDate {
        CalendarDate {
            calendar: CalendarId(1),
            start_date: on,
            end_date: Some(on),
            operation,
            special: operation,
            summary: String::new(),
        }
    }

    #[test]
    fn test_excluded_monday_does_not_operate() {
        let calendar = mondays_only();
        let exceptions = [exception(date(2024, 3, 4), false)];

        assert!(!allows(&calendar, &exceptions, &[], date(2024, 3, 4)));
        // an ordinary monday still runs
        assert!(allows(&calendar, &exceptions, &[], date(2024, 3, 11)));
        // before the validity start, nothing runs
        assert!(!allows(&calendar, &exceptions, &[], date(2023, 12, 25)));
    }

    #[test]
    fn test_exclusion_beats_simultaneous_inclusion() {
        let calendar = mondays_only();
        let monday = date(2024, 3, 4);
        let exceptions = [exception(monday, false), exception(monday, true)];
        let holidays = [HolidayRule {
            operation: true,
            dates: BTreeSet::from([monday]),
        }];

        assert!(!allows(&calendar, &exceptions, &holidays, monday));
    }

    #[test]
    fn test_open_ended_calendar_runs_indefinitely() {
        let calendar = mondays_only();

        assert!(allows(&calendar, &[], &[], date(2054, 3, 2)));
        assert!(!allows(&calendar, &[], &[], date(2023, 12, 18)));
    }

    #[test]
    fn test_added_day_on_unset_weekday() {
        let calendar = mondays_only();
        let saturday = date(2024, 3, 9);
        let exceptions = [exception(saturday, true)];

        assert!(!allows(&calendar, &[], &[], saturday));
        assert!(allows(&calendar, &exceptions, &[], saturday));
    }

    #[test]
    fn test_holiday_rules() {
        let calendar = mondays_only();
        // easter monday 2024
        let holiday_monday = date(2024, 4, 1);

        let removes = [HolidayRule {
            operation: false,
            dates: BTreeSet::from([holiday_monday]),
        }];
        assert!(!allows(&calendar, &[], &removes, holiday_monday));

        // christmas 2024 is a wednesday, added by an operation association
        let christmas = date(2024, 12, 25);
        let adds = [HolidayRule {
            operation: true,
            dates: BTreeSet::from([christmas]),
        }];
        assert!(allows(&calendar, &[], &adds, christmas));
        // the association only applies on registered dates
        assert!(!allows(&calendar, &[], &adds, date(2024, 12, 24)));
    }

    #[test]
    fn test_pattern_hash_distinguishes_content() {
        let mut a = CalendarPattern {
            days: [true, true, true, true, true, false, false],
            start_date: Some(date(2024, 1, 1)),
            ..Default::default()
        };
        let b = a.clone();
        assert_eq!(a.content_hash(), b.content_hash());

        a.bank_holidays.push(("ChristmasDay".to_string(), false));
        assert_ne!(a.content_hash(), b.content_hash());
    }
}
