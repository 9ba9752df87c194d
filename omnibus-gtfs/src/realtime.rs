//! the GTFS-Realtime trip-update overlay: matching a feed entity to a
//! stored trip by its feed-specific identifier and applying delay offsets
//! to the scheduled times. read-only over the core model; a delay never
//! changes what is stored, only what is displayed as expected.

use serde::{Deserialize, Serialize};

use omnibus_core::model::{StopTime, TimeOfDay, Trip};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedMessage {
    pub entity: Vec<FeedEntity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedEntity {
    pub id: String,
    pub trip_update: Option<TripUpdate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TripUpdate {
    pub trip: TripDescriptor,
    pub stop_time_update: Vec<StopTimeUpdate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TripDescriptor {
    pub trip_id: String,
    pub schedule_relationship: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StopTimeUpdate {
    pub stop_sequence: Option<u16>,
    pub stop_id: Option<String>,
    pub schedule_relationship: Option<String>,
    pub arrival: Option<StopTimeEvent>,
    pub departure: Option<StopTimeEvent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StopTimeEvent {
    pub delay: Option<i64>,
    pub time: Option<i64>,
}

pub fn parse_feed(json: &str) -> Result<FeedMessage, serde_json::Error> {
    serde_json::from_str(json)
}

impl FeedMessage {
    /// the trip update for one stored trip, matched on the feed-specific
    /// journey identifier recorded at import time
    pub fn trip_update_for(&self, trip: &Trip) -> Option<&TripUpdate> {
        if trip.ticket_machine_code.is_empty() {
            return None;
        }
        self.entity
            .iter()
            .filter_map(|entity| entity.trip_update.as_ref())
            .find(|update| update.trip.trip_id == trip.ticket_machine_code)
    }
}

impl TripUpdate {
    pub fn is_cancelled(&self) -> bool {
        self.trip.schedule_relationship.as_deref() == Some("CANCELED")
    }
}

/// one stop-visit with the overlay applied
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedStopTime {
    pub sequence: u16,
    pub expected_arrival: Option<TimeOfDay>,
    pub expected_departure: Option<TimeOfDay>,
    pub skipped: bool,
}

/// applies a trip update across the trip's scheduled stop times. an update
/// row holds from its own stop onward until the next row takes over, the
/// way the wire format defines propagation.
pub fn apply_trip_update(stop_times: &[StopTime], update: &TripUpdate) -> Vec<ExpectedStopTime> {
    let mut current: Option<&StopTimeUpdate> = None;
    let mut remaining = update.stop_time_update.as_slice();

    stop_times
        .iter()
        .map(|stop_time| {
            while let Some((next, rest)) = remaining.split_first() {
                if next.stop_sequence.is_some_and(|seq| seq <= stop_time.sequence) {
                    current = Some(next);
                    remaining = rest;
                } else {
                    break;
                }
            }

            let Some(update) = current else {
                return ExpectedStopTime {
                    sequence: stop_time.sequence,
                    expected_arrival: None,
                    expected_departure: None,
                    skipped: false,
                };
            };
            if update.schedule_relationship.as_deref() == Some("SKIPPED")
                && update.stop_sequence == Some(stop_time.sequence)
            {
                return ExpectedStopTime {
                    sequence: stop_time.sequence,
                    expected_arrival: None,
                    expected_departure: None,
                    skipped: true,
                };
            }
            let delayed = |scheduled: Option<TimeOfDay>, event: &Option<StopTimeEvent>| {
                let delay = event.as_ref()?.delay?;
                scheduled?.checked_add_seconds(delay)
            };
            ExpectedStopTime {
                sequence: stop_time.sequence,
                expected_arrival: delayed(stop_time.arrival, &update.arrival),
                expected_departure: delayed(stop_time.departure, &update.departure),
                skipped: false,
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use omnibus_core::model::{StopRef, TimingStatus};
    use pretty_assertions::assert_eq;

    fn stop_time(sequence: u16, departure: &str) -> StopTime {
        StopTime {
            sequence,
            stop: StopRef::Stop(format!("stop-{sequence}")),
            arrival: Some(departure.parse().unwrap()),
            departure: Some(departure.parse().unwrap()),
            pick_up: true,
            set_down: true,
            timing_status: TimingStatus::Unknown,
        }
    }

    const FEED: &str = r#"{
      "entity": [
        {
          "id": "1",
          "tripUpdate": {
            "trip": {"tripId": "4411_2552", "scheduleRelationship": "SCHEDULED"},
            "stopTimeUpdate": [
              {"stopSequence": 1, "stopId": "stop-1", "departure": {"delay": 120}},
              {"stopSequence": 3, "stopId": "stop-3", "scheduleRelationship": "SKIPPED"}
            ]
          }
        }
      ]
    }"#;

    #[test]
    fn test_delays_propagate_to_following_stops() {
        let feed = parse_feed(FEED).unwrap();
        let update = &feed.entity[0].trip_update.as_ref().unwrap();

        let stop_times = [
            stop_time(0, "09:00"),
            stop_time(1, "09:10"),
            stop_time(2, "09:20"),
            stop_time(3, "09:30"),
            stop_time(4, "09:40"),
        ];
        let expected = apply_trip_update(&stop_times, update);

        // before the first update row, no expectation
        assert_eq!(expected[0].expected_departure, None);
        // the +120s delay lands at its own stop and carries forward
        assert_eq!(
            expected[1].expected_departure,
            Some("09:12".parse().unwrap())
        );
        assert_eq!(
            expected[2].expected_departure,
            Some("09:22".parse().unwrap())
        );
        // the skipped stop is marked; later stops fall under the skipped
        // row without being skipped themselves
        assert!(expected[3].skipped);
        assert!(!expected[4].skipped);
        assert_eq!(expected[4].expected_departure, None);
    }

    #[test]
    fn test_cancelled_trip_detection() {
        let json = r#"{
          "entity": [{
            "id": "x",
            "tripUpdate": {
              "trip": {"tripId": "t1", "scheduleRelationship": "CANCELED"},
              "stopTimeUpdate": []
            }
          }]
        }"#;
        let feed = parse_feed(json).unwrap();
        assert!(feed.entity[0].trip_update.as_ref().unwrap().is_cancelled());
    }
}
