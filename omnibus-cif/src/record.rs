//! fixed-width ATCO-CIF record parsing. every line opens with a two-letter
//! record identity; the columns after that are positional. records the
//! pipeline has no use for parse to None and are skipped.

use chrono::NaiveDate;

use omnibus_core::model::{TimeOfDay, TimingStatus};

/// the journey header's recurrence fields, kept raw enough that identical
/// headers with identical exceptions intern to one calendar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JourneyHeader {
    pub days: [bool; 7],
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub inbound: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CifRecord {
    /// QL: a stop's display name
    LocationName { stop_code: String, name: String },
    /// QB: a stop's grid reference
    LocationGrid {
        stop_code: String,
        easting: Option<f64>,
        northing: Option<f64>,
    },
    /// QD: opens a route; everything until the next QD belongs to it
    RouteHeader {
        operator: String,
        line_name: String,
        outbound: bool,
        description: String,
    },
    /// QS: opens a journey
    JourneyHeader(JourneyHeader),
    /// QE: a running/not-running exception range for the open journey
    Exception {
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        operation: bool,
    },
    /// QO: the journey's origin call
    Origin {
        stop_code: String,
        departure: Option<TimeOfDay>,
    },
    /// QI: an intermediate call
    Intermediate {
        stop_code: String,
        arrival: Option<TimeOfDay>,
        departure: Option<TimeOfDay>,
        timing_status: Option<TimingStatus>,
    },
    /// QT: the destination call, which closes the journey
    Destination {
        stop_code: String,
        arrival: Option<TimeOfDay>,
    },
    /// QN: a free-text note attached to whatever preceded it
    Note { code: String, text: String },
}

fn field(line: &[u8], range: std::ops::Range<usize>) -> String {
    let end = range.end.min(line.len());
    let start = range.start.min(end);
    String::from_utf8_lossy(&line[start..end]).trim().to_string()
}

/// `99999999` is the scheme's "no date"
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    if text == "99999999" || text.len() != 8 {
        return None;
    }
    NaiveDate::parse_from_str(text, "%Y%m%d").ok()
}

/// `HHMM`, where HH may pass 24 for after-midnight calls
pub fn parse_time(text: &str) -> Option<TimeOfDay> {
    if text.len() != 4 {
        return None;
    }
    let hours: i32 = text[..2].parse().ok()?;
    let minutes: i32 = text[2..].parse().ok()?;
    (0..60).contains(&minutes).then(|| TimeOfDay::from_hms(hours, minutes, 0))
}

pub fn parse_record(line: &[u8]) -> Option<CifRecord> {
    match line.get(..2)? {
        b"QL" => Some(CifRecord::LocationName {
            stop_code: field(line, 3..15),
            name: field(line, 15..63),
        }),
        b"QB" => Some(CifRecord::LocationGrid {
            stop_code: field(line, 3..15),
            easting: field(line, 15..23).parse().ok(),
            northing: field(line, 23..31).parse().ok(),
        }),
        b"QD" => Some(CifRecord::RouteHeader {
            operator: field(line, 3..7),
            line_name: field(line, 7..11),
            outbound: line.get(11) == Some(&b'O'),
            description: field(line, 12..line.len()),
        }),
        b"QS" => {
            let mut days = [false; 7];
            for (i, flag) in days.iter_mut().enumerate() {
                *flag = line.get(29 + i) == Some(&b'1');
            }
            Some(CifRecord::JourneyHeader(JourneyHeader {
                days,
                start_date: parse_date(&field(line, 13..21)),
                end_date: parse_date(&field(line, 21..29)),
                inbound: line.get(64) == Some(&b'I'),
            }))
        }
        b"QE" => Some(CifRecord::Exception {
            start_date: parse_date(&field(line, 2..10)),
            end_date: parse_date(&field(line, 10..18)),
            operation: line.get(18) == Some(&b'1'),
        }),
        b"QO" => Some(CifRecord::Origin {
            stop_code: field(line, 2..14),
            departure: parse_time(&field(line, 14..18)),
        }),
        b"QI" => {
            let timing_status = match line.get(26..28) {
                Some([b'T', b'1']) => Some(TimingStatus::Principal),
                Some([b'T', b'0']) => Some(TimingStatus::Other),
                _ => None,
            };
            Some(CifRecord::Intermediate {
                stop_code: field(line, 2..14),
                arrival: parse_time(&field(line, 14..18)),
                departure: parse_time(&field(line, 18..22)),
                timing_status,
            })
        }
        b"QT" => Some(CifRecord::Destination {
            stop_code: field(line, 2..14),
            arrival: parse_time(&field(line, 14..18)),
        }),
        b"QN" => Some(CifRecord::Note {
            code: field(line, 2..7),
            text: field(line, 7..line.len()),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_route_header() {
        let line = b"QDNMET 163 OGlen Road - City Centre";
        let Some(CifRecord::RouteHeader {
            operator,
            line_name,
            outbound,
            description,
        }) = parse_record(line)
        else {
            panic!("not a route header");
        };
        assert_eq!(operator, "MET");
        assert_eq!(line_name, "163");
        assert!(outbound);
        assert_eq!(description, "Glen Road - City Centre");
    }

    #[test]
    fn test_journey_header_days_and_dates() {
        // columns: identity 0..2, journey id 7..13, dates 13..29, days 29..36
        let line = b"QSNMET 00000120240101202412311001100";
        let Some(CifRecord::JourneyHeader(header)) = parse_record(line) else {
            panic!("not a journey header");
        };
        assert_eq!(header.start_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(header.end_date, NaiveDate::from_ymd_opt(2024, 12, 31));
        assert_eq!(header.days, [true, false, false, true, true, false, false]);
    }

    #[test]
    fn test_open_ended_journey_header() {
        let line = b"QSNMET 00000220240101999999991111100";
        let Some(CifRecord::JourneyHeader(header)) = parse_record(line) else {
            panic!("not a journey header");
        };
        assert_eq!(header.end_date, None);
        assert_eq!(header.days, [true, true, true, true, true, false, false]);
    }

    #[test]
    fn test_calls() {
        let origin = parse_record(b"QO1000001234560905").unwrap();
        assert_eq!(
            origin,
            CifRecord::Origin {
                stop_code: "100000123456".to_string(),
                departure: Some(TimeOfDay::from_hms(9, 5, 0)),
            }
        );

        let intermediate = parse_record(b"QI10000012345709150915B   T1").unwrap();
        let CifRecord::Intermediate {
            arrival,
            departure,
            timing_status,
            ..
        } = intermediate
        else {
            panic!("not an intermediate call");
        };
        assert_eq!(arrival, Some(TimeOfDay::from_hms(9, 15, 0)));
        assert_eq!(departure, Some(TimeOfDay::from_hms(9, 15, 0)));
        assert_eq!(timing_status, Some(TimingStatus::Principal));

        // an after-midnight call on a journey that crossed the day boundary
        let late = parse_record(b"QT1000001234582505").unwrap();
        let CifRecord::Destination { arrival, .. } = late else {
            panic!("not a destination call");
        };
        assert!(arrival.unwrap().is_next_day());
    }

    #[test]
    fn test_exception_range() {
        let record = parse_record(b"QE20240304202403040").unwrap();
        assert_eq!(
            record,
            CifRecord::Exception {
                start_date: NaiveDate::from_ymd_opt(2024, 3, 4),
                end_date: NaiveDate::from_ymd_opt(2024, 3, 4),
                operation: false,
            }
        );
    }

    #[test]
    fn test_unknown_identity_is_skipped() {
        assert_eq!(parse_record(b"ZZwhatever"), None);
        assert_eq!(parse_record(b"Q"), None);
    }
}
