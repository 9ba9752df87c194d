//! flattening of the TransXChange OperatingProfile hierarchy -- regular
//! day-of-week flags, special-days ranges, nested bank-holiday groupings
//! and serviced-organisation (term-time) day sets -- into the flat
//! calendar-plus-exceptions shape the rest of the pipeline stores. the
//! hierarchy itself is never persisted.

use chrono::{Datelike, NaiveDate};
use log::warn;
use minidom::Element;
use std::collections::HashMap;

use omnibus_core::import::text::normalize_summary;
use omnibus_core::model::{CalendarPattern, ExceptionPattern};

use crate::txc::document::{child, child_text, descend, parse_date};
use crate::txc::ServicedOrganisation;

/// a special-days range, with `operation` true for days added and false for
/// days suppressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    fn length_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// one entry of a DaysOfOperation/DaysOfNonOperation bank-holiday list:
/// either a named holiday (the element's tag) or an explicitly dated
/// OtherPublicHoliday
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankHolidayElement {
    Named(String),
    Other { date: NaiveDate, description: String },
}

/// a serviced organisation's day set as referenced by one profile: the
/// organisation's name for summary building plus the resolved date ranges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServicedDaySet {
    pub name: String,
    pub ranges: Vec<DateRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatingProfile {
    /// monday-first day-of-week flags
    pub regular_days: [bool; 7],
    pub operation_days: Vec<DateRange>,
    pub nonoperation_days: Vec<DateRange>,
    pub operation_bank_holidays: Vec<BankHolidayElement>,
    pub nonoperation_bank_holidays: Vec<BankHolidayElement>,
    pub operation_working_days: Option<ServicedDaySet>,
    pub operation_holidays: Option<ServicedDaySet>,
    pub nonoperation_working_days: Option<ServicedDaySet>,
    pub nonoperation_holidays: Option<ServicedDaySet>,
}

impl OperatingProfile {
    pub fn parse(
        element: &Element,
        organisations: &HashMap<String, ServicedOrganisation>,
    ) -> OperatingProfile {
        let mut profile = OperatingProfile::default();

        if let Some(days) = descend(element, &["RegularDayType", "DaysOfWeek"]) {
            for day in days.children() {
                profile.set_days(day.name());
            }
        }

        if let Some(special) = child(element, "SpecialDaysOperation") {
            profile.operation_days = parse_date_ranges(child(special, "DaysOfOperation"));
            profile.nonoperation_days = parse_date_ranges(child(special, "DaysOfNonOperation"));
        }

        if let Some(holidays) = child(element, "BankHolidayOperation") {
            profile.operation_bank_holidays =
                parse_bank_holidays(child(holidays, "DaysOfOperation"));
            profile.nonoperation_bank_holidays =
                parse_bank_holidays(child(holidays, "DaysOfNonOperation"));
        }

        if let Some(sodt) = child(element, "ServicedOrganisationDayType") {
            let resolve = |path: &[&str]| -> Option<ServicedDaySet> {
                let reference = descend(sodt, path)?;
                let code = reference.text().trim().to_string();
                let organisation = organisations.get(&code)?;
                let ranges = if path.contains(&"WorkingDays") {
                    &organisation.working_days
                } else {
                    &organisation.holidays
                };
                Some(ServicedDaySet {
                    name: organisation.name.clone(),
                    ranges: ranges
                        .iter()
                        .map(|(start, end)| DateRange {
                            start: *start,
                            end: *end,
                        })
                        .collect(),
                })
            };
            profile.operation_working_days =
                resolve(&["DaysOfOperation", "WorkingDays", "ServicedOrganisationRef"]);
            profile.operation_holidays =
                resolve(&["DaysOfOperation", "Holidays", "ServicedOrganisationRef"]);
            profile.nonoperation_working_days =
                resolve(&["DaysOfNonOperation", "WorkingDays", "ServicedOrganisationRef"]);
            profile.nonoperation_holidays =
                resolve(&["DaysOfNonOperation", "Holidays", "ServicedOrganisationRef"]);
        }

        profile
    }

    fn set_days(&mut self, tag: &str) {
        let flags: &[usize] = match tag {
            "Monday" => &[0],
            "Tuesday" => &[1],
            "Wednesday" => &[2],
            "Thursday" => &[3],
            "Friday" => &[4],
            "Saturday" => &[5],
            "Sunday" => &[6],
            "MondayToFriday" => &[0, 1, 2, 3, 4],
            "MondayToSaturday" => &[0, 1, 2, 3, 4, 5],
            "MondayToSunday" => &[0, 1, 2, 3, 4, 5, 6],
            "Weekend" => &[5, 6],
            "NotSaturday" => &[0, 1, 2, 3, 4, 6],
            // HolidaysOnly: no regular day at all, the bank-holiday
            // associations carry the whole pattern
            "HolidaysOnly" => &[],
            other => {
                warn!("unrecognised day element {other}");
                &[]
            }
        };
        for flag in flags {
            self.regular_days[*flag] = true;
        }
    }

    /// flattens the profile into the flat stored shape, over the service's
    /// operating period. the summary string is assembled deterministically
    /// from the named sub-clauses so identical profiles intern identically.
    pub fn to_calendar_pattern(
        &self,
        period_start: Option<NaiveDate>,
        period_end: Option<NaiveDate>,
    ) -> CalendarPattern {
        let mut exceptions = Vec::new();
        let mut summary_parts: Vec<String> = Vec::new();

        for range in &self.nonoperation_days {
            exceptions.push(exception(range, false, false, ""));
        }
        for range in &self.operation_days {
            // a week-plus "special" operating range is really a term-time
            // style pattern that was encoded in the wrong element
            let special = range.length_days() <= 5;
            if !special {
                warn!(
                    "{} to {} is {} days long",
                    range.start,
                    range.end,
                    range.length_days()
                );
            }
            exceptions.push(exception(range, true, special, ""));
        }

        let mut bank_holidays: Vec<(String, bool)> = Vec::new();
        for (elements, operation) in [
            (&self.operation_bank_holidays, true),
            (&self.nonoperation_bank_holidays, false),
        ] {
            for element in elements {
                match element {
                    BankHolidayElement::Named(name) => {
                        let name = if name == "HolidaysOnly" {
                            "AllBankHolidays"
                        } else {
                            name
                        };
                        bank_holidays.push((name.to_string(), operation));
                    }
                    BankHolidayElement::Other { date, description } => {
                        exceptions.push(exception(
                            &DateRange {
                                start: *date,
                                end: *date,
                            },
                            operation,
                            operation,
                            description,
                        ));
                    }
                }
            }
        }

        // serviced-organisation day sets; when both the working-day and
        // holiday halves are given they cancel out and are ignored
        if self.nonoperation_working_days != self.nonoperation_holidays {
            if let Some(days) = &self.nonoperation_working_days {
                if !days.name.is_empty() {
                    summary_parts.push(format!("not {} days", days.name));
                }
                for range in &days.ranges {
                    exceptions.push(exception(range, false, false, ""));
                }
            } else if let Some(days) = &self.nonoperation_holidays {
                if !days.name.is_empty() {
                    summary_parts.push(format!("not {} holidays", days.name));
                }
                for range in &days.ranges {
                    exceptions.push(exception(range, false, false, ""));
                }
            }
        }
        if self.operation_working_days != self.operation_holidays {
            if let Some(days) = &self.operation_working_days {
                if !days.name.is_empty() {
                    summary_parts.push(format!("{} days", days.name));
                }
                for range in &days.ranges {
                    exceptions.push(exception(range, true, false, ""));
                }
            } else if let Some(days) = &self.operation_holidays {
                if !days.name.is_empty() {
                    summary_parts.push(format!("{} holidays", days.name));
                }
                for range in &days.ranges {
                    exceptions.push(exception(range, true, false, ""));
                }
            }
        }

        let mut summary = summary_parts.join(", ");
        if period_start.is_some() && period_start == period_end {
            let only = format_long_date(period_start.unwrap());
            if summary.is_empty() {
                summary = format!("{only} only");
            } else {
                summary = format!("{summary}, {only} only");
            }
        }
        if !summary.is_empty() {
            summary = normalize_summary(&summary);
        }

        CalendarPattern {
            days: self.regular_days,
            start_date: period_start,
            end_date: period_end,
            summary,
            exceptions,
            bank_holidays,
        }
    }
}

fn exception(range: &DateRange, operation: bool, special: bool, summary: &str) -> ExceptionPattern {
    ExceptionPattern {
        start_date: range.start,
        end_date: Some(range.end),
        operation,
        special,
        summary: summary.to_string(),
    }
}

fn parse_date_ranges(parent: Option<&Element>) -> Vec<DateRange> {
    parent
        .map(|element| {
            element
                .children()
                .filter(|range| range.name() == "DateRange")
                .filter_map(|range| {
                    let start = child_text(range, "StartDate").and_then(|d| parse_date(&d))?;
                    let end = child_text(range, "EndDate")
                        .and_then(|d| parse_date(&d))
                        .unwrap_or(start);
                    Some(DateRange { start, end })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_bank_holidays(parent: Option<&Element>) -> Vec<BankHolidayElement> {
    parent
        .map(|element| {
            element
                .children()
                .filter_map(|holiday| {
                    if holiday.name() == "OtherPublicHoliday" {
                        let date = child_text(holiday, "Date").and_then(|d| parse_date(&d))?;
                        Some(BankHolidayElement::Other {
                            date,
                            description: child_text(holiday, "Description").unwrap_or_default(),
                        })
                    } else {
                        Some(BankHolidayElement::Named(holiday.name().to_string()))
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

/// "Wednesday 1 May 2024", without the zero-padding chrono's %d carries
fn format_long_date(date: NaiveDate) -> String {
    format!(
        "{} {} {} {}",
        date.format("%A"),
        date.day(),
        date.format("%B"),
        date.year()
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn parse_profile(xml: &str) -> OperatingProfile {
        let wrapped = format!(
            r#"<OperatingProfile xmlns="http://www.transxchange.org.uk/">{xml}</OperatingProfile>"#
        );
        let element: Element = wrapped.parse().unwrap();
        let mut organisations = HashMap::new();
        organisations.insert(
            "SCH1".to_string(),
            ServicedOrganisation {
                code: "SCH1".to_string(),
                name: "Norfolk school".to_string(),
                working_days: vec![(date(2024, 1, 8), date(2024, 2, 9))],
                holidays: vec![(date(2024, 2, 12), date(2024, 2, 16))],
            },
        );
        OperatingProfile::parse(&element, &organisations)
    }

    #[test]
    fn test_weekday_elements() {
        let profile = parse_profile(
            "<RegularDayType><DaysOfWeek><MondayToFriday/></DaysOfWeek></RegularDayType>",
        );
        assert_eq!(profile.regular_days, [true, true, true, true, true, false, false]);

        let profile = parse_profile(
            "<RegularDayType><DaysOfWeek><Saturday/><Sunday/></DaysOfWeek></RegularDayType>",
        );
        assert_eq!(
            profile.regular_days,
            [false, false, false, false, false, true, true]
        );
    }

    #[test]
    fn test_bank_holiday_lists() {
        let profile = parse_profile(
            "<RegularDayType><DaysOfWeek><MondayToSaturday/></DaysOfWeek></RegularDayType>
             <BankHolidayOperation>
               <DaysOfNonOperation>
                 <ChristmasDay/>
                 <BoxingDay/>
                 <OtherPublicHoliday>
                   <Description>carnival day</Description>
                   <Date>2024-08-14</Date>
                 </OtherPublicHoliday>
               </DaysOfNonOperation>
               <DaysOfOperation><GoodFriday/></DaysOfOperation>
             </BankHolidayOperation>",
        );
        assert_eq!(
            profile.operation_bank_holidays,
            vec![BankHolidayElement::Named("GoodFriday".to_string())]
        );
        assert_eq!(profile.nonoperation_bank_holidays.len(), 3);

        let pattern = profile.to_calendar_pattern(Some(date(2024, 1, 1)), None);
        assert_eq!(
            pattern.bank_holidays,
            vec![
                ("GoodFriday".to_string(), true),
                ("ChristmasDay".to_string(), false),
                ("BoxingDay".to_string(), false),
            ]
        );
        // the dated one became a suppressed-day exception
        assert_eq!(pattern.exceptions.len(), 1);
        assert_eq!(pattern.exceptions[0].start_date, date(2024, 8, 14));
        assert!(!pattern.exceptions[0].operation);
    }

    #[test]
    fn test_long_special_range_is_demoted() {
        let profile = parse_profile(
            "<RegularDayType><DaysOfWeek><Monday/></DaysOfWeek></RegularDayType>
             <SpecialDaysOperation>
               <DaysOfOperation>
                 <DateRange><StartDate>2024-07-01</StartDate><EndDate>2024-08-30</EndDate></DateRange>
                 <DateRange><StartDate>2024-05-06</StartDate></DateRange>
               </DaysOfOperation>
             </SpecialDaysOperation>",
        );
        let pattern = profile.to_calendar_pattern(Some(date(2024, 1, 1)), None);

        let long = &pattern.exceptions[0];
        assert!(long.operation);
        assert!(!long.special, "a two-month range is not a one-off special");
        let single = &pattern.exceptions[1];
        assert!(single.operation);
        assert!(single.special);
        assert_eq!(single.end_date, Some(date(2024, 5, 6)));
    }

    #[test]
    fn test_serviced_organisation_summary() {
        let profile = parse_profile(
            "<RegularDayType><DaysOfWeek><MondayToFriday/></DaysOfWeek></RegularDayType>
             <ServicedOrganisationDayType>
               <DaysOfNonOperation>
                 <Holidays><ServicedOrganisationRef>SCH1</ServicedOrganisationRef></Holidays>
               </DaysOfNonOperation>
             </ServicedOrganisationDayType>",
        );
        let pattern = profile.to_calendar_pattern(Some(date(2024, 1, 1)), Some(date(2024, 7, 19)));

        assert_eq!(pattern.summary, "not Norfolk school holidays");
        assert_eq!(pattern.exceptions.len(), 1);
        assert_eq!(pattern.exceptions[0].start_date, date(2024, 2, 12));
        assert!(!pattern.exceptions[0].operation);
    }

    #[test]
    fn test_single_day_period_summary() {
        let profile = parse_profile(
            "<RegularDayType><DaysOfWeek><Saturday/></DaysOfWeek></RegularDayType>",
        );
        let only = date(2024, 6, 8);
        let pattern = profile.to_calendar_pattern(Some(only), Some(only));
        assert_eq!(pattern.summary, "Saturday 8 June 2024 only");
    }
}
