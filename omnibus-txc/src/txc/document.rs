//! a document model for the subset of the TransXChange schema the pipeline
//! consumes, built by walking the element tree once. elements are matched
//! by local name so the TransXChange namespace never needs spelling out.

use std::collections::HashMap;
use std::io::BufRead;

use chrono::NaiveDate;
use minidom::Element;

use omnibus_core::model::TimeOfDay;

use crate::txc::operating_profile::OperatingProfile;
use crate::TxcError;

pub(crate) fn child<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
    element.children().find(|c| c.name() == name)
}

pub(crate) fn child_text(element: &Element, name: &str) -> Option<String> {
    child(element, name)
        .map(|c| c.text().trim().to_string())
        .filter(|text| !text.is_empty())
}

pub(crate) fn descend<'a>(element: &'a Element, path: &[&str]) -> Option<&'a Element> {
    path.iter()
        .try_fold(element, |current, name| child(current, name))
}

/// parses "PT1H2M3S" style durations into whole seconds
pub(crate) fn parse_iso_duration_seconds(value: &str) -> Option<i64> {
    let rest = value.strip_prefix("PT").or_else(|| value.strip_prefix("-PT"))?;
    let negative = value.starts_with('-');
    let mut seconds: i64 = 0;
    let mut number = String::new();
    for c in rest.chars() {
        if c.is_ascii_digit() {
            number.push(c);
        } else {
            let n: i64 = number.parse().ok()?;
            number.clear();
            seconds += match c {
                'H' => n * 3600,
                'M' => n * 60,
                'S' => n,
                _ => return None,
            };
        }
    }
    if !number.is_empty() {
        return None;
    }
    Some(if negative { -seconds } else { seconds })
}

pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

#[derive(Debug, Clone)]
pub struct TxcStop {
    pub atco_code: String,
    pub common_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct TxcOperator {
    /// the document-local id other elements reference
    pub id: String,
    pub national_code: Option<String>,
    pub code: Option<String>,
    pub licence_number: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TxcLine {
    pub id: String,
    pub line_name: String,
    pub line_brand: String,
    pub outbound_description: String,
    pub inbound_description: String,
}

#[derive(Debug, Clone)]
pub struct TxcService {
    pub service_code: String,
    pub mode: String,
    pub description: String,
    pub origin: String,
    pub destination: String,
    pub vias: Vec<String>,
    pub marketing_name: String,
    pub public_use: Option<String>,
    pub operating_period_start: Option<NaiveDate>,
    pub operating_period_end: Option<NaiveDate>,
    pub operating_profile: Option<OperatingProfile>,
    pub registered_operator_ref: Option<String>,
    pub lines: Vec<TxcLine>,
    pub journey_patterns: HashMap<String, JourneyPattern>,
}

#[derive(Debug, Clone)]
pub struct JourneyPattern {
    pub id: String,
    pub inbound: bool,
    pub section_refs: Vec<String>,
    pub operating_profile: Option<OperatingProfile>,
}

/// a stop-visit inside a timing link: the stop reference plus how the
/// vehicle treats the stop there
#[derive(Debug, Clone, Default)]
pub struct StopUsageElement {
    pub stop_ref: String,
    pub activity: Option<String>,
    pub timing_status: Option<String>,
    pub wait_seconds: i64,
    pub sequence_number: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct TimingLink {
    pub from: StopUsageElement,
    pub to: StopUsageElement,
    pub run_seconds: i64,
    pub route_link_ref: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct JourneyPatternSection {
    pub timing_links: Vec<TimingLink>,
}

#[derive(Debug, Clone)]
pub struct VehicleJourney {
    pub code: String,
    pub service_ref: String,
    pub line_ref: String,
    pub journey_pattern_ref: String,
    pub departure_time: Option<TimeOfDay>,
    pub operating_profile: Option<OperatingProfile>,
    pub operator_ref: Option<String>,
    pub block_code: String,
    pub block_description: String,
    pub garage_ref: Option<String>,
    pub vehicle_type_code: String,
    pub vehicle_type_description: String,
    pub ticket_machine_journey_code: String,
    pub ticket_machine_service_code: String,
    pub sequence_number: Option<u16>,
    pub notes: Vec<(String, String)>,
}

/// a named organisation (typically a school) with its working-day and
/// holiday date sets, referenced from operating profiles
#[derive(Debug, Clone, Default)]
pub struct ServicedOrganisation {
    pub code: String,
    pub name: String,
    pub working_days: Vec<(NaiveDate, NaiveDate)>,
    pub holidays: Vec<(NaiveDate, NaiveDate)>,
}

#[derive(Debug, Clone, Default)]
pub struct TransXChangeDocument {
    pub revision_number: String,
    pub stops: Vec<TxcStop>,
    pub operators: Vec<TxcOperator>,
    pub services: Vec<TxcService>,
    pub journey_pattern_sections: HashMap<String, JourneyPatternSection>,
    pub vehicle_journeys: Vec<VehicleJourney>,
    pub garages: HashMap<String, String>,
    pub serviced_organisations: HashMap<String, ServicedOrganisation>,
    /// route-link id -> track polyline of (lon, lat) points
    pub route_link_tracks: HashMap<String, Vec<(f64, f64)>>,
}

impl TransXChangeDocument {
    pub fn operator(&self, document_ref: &str) -> Option<&TxcOperator> {
        self.operators.iter().find(|op| op.id == document_ref)
    }

    /// the journeys of one service line, in document order
    pub fn journeys_for(&self, service_code: &str, line_id: &str) -> Vec<&VehicleJourney> {
        self.vehicle_journeys
            .iter()
            .filter(|vj| vj.service_ref == service_code && vj.line_ref == line_id)
            .collect()
    }
}

pub fn parse_document(reader: impl BufRead) -> Result<TransXChangeDocument, TxcError> {
    let root = Element::from_reader(reader)?;
    Ok(parse_root(&root))
}

fn parse_root(root: &Element) -> TransXChangeDocument {
    let mut document = TransXChangeDocument {
        revision_number: root.attr("RevisionNumber").unwrap_or_default().to_string(),
        ..Default::default()
    };

    if let Some(stops) = child(root, "StopPoints") {
        for stop in stops.children() {
            let atco_code = child_text(stop, "StopPointRef")
                .or_else(|| descend(stop, &["AtcoCode"]).map(|e| e.text().trim().to_string()));
            if let Some(atco_code) = atco_code {
                document.stops.push(TxcStop {
                    atco_code,
                    common_name: child_text(stop, "CommonName").unwrap_or_default(),
                });
            }
        }
    }

    if let Some(organisations) = child(root, "ServicedOrganisations") {
        for organisation in organisations.children() {
            let parsed = parse_serviced_organisation(organisation);
            document
                .serviced_organisations
                .insert(parsed.code.clone(), parsed);
        }
    }

    if let Some(operators) = child(root, "Operators") {
        for operator in operators.children() {
            document.operators.push(TxcOperator {
                id: operator.attr("id").unwrap_or_default().to_string(),
                national_code: child_text(operator, "NationalOperatorCode"),
                code: child_text(operator, "OperatorCode"),
                licence_number: child_text(operator, "LicenceNumber"),
                name: operator_name(operator),
            });
        }
    }

    if let Some(route_sections) = child(root, "RouteSections") {
        for section in route_sections.children() {
            for link in section.children() {
                if link.name() != "RouteLink" {
                    continue;
                }
                let Some(id) = link.attr("id") else {
                    continue;
                };
                let track = parse_track(link);
                if !track.is_empty() {
                    document.route_link_tracks.insert(id.to_string(), track);
                }
            }
        }
    }

    if let Some(sections) = child(root, "JourneyPatternSections") {
        for section in sections.children() {
            let id = section.attr("id").unwrap_or_default().to_string();
            document
                .journey_pattern_sections
                .insert(id, parse_section(section));
        }
    }

    if let Some(garages) = child(root, "Garages") {
        for garage in garages.children() {
            if let Some(code) = child_text(garage, "GarageCode") {
                let name = garage_name(&code, child_text(garage, "GarageName"));
                document.garages.insert(code, name);
            }
        }
    }

    if let Some(services) = child(root, "Services") {
        for service in services.children() {
            if service.name() == "Service" {
                document
                    .services
                    .push(parse_service(service, &document.serviced_organisations));
            }
        }
    }

    if let Some(journeys) = child(root, "VehicleJourneys") {
        for journey in journeys.children() {
            document
                .vehicle_journeys
                .push(parse_vehicle_journey(journey, &document.serviced_organisations));
        }
    }

    document
}

/// the first of the name variants an Operator element may carry
fn operator_name(operator: &Element) -> Option<String> {
    ["TradingName", "OperatorNameOnLicence", "OperatorShortName"]
        .iter()
        .find_map(|name| child_text(operator, name))
        .map(|name| name.replace("&amp;", "&"))
}

/// garages name themselves things like "Sheringham Bus Depot" or the
/// placeholder "Garage 'KB'"; strip both kinds of noise
fn garage_name(code: &str, name: Option<String>) -> String {
    let Some(name) = name else {
        return String::new();
    };
    if name == format!("Garage '{code}'") {
        return String::new();
    }
    let mut name = name.as_str();
    for suffix in [
        " Bus Depot", " depot", " Depot", " DEPOT", " garage", " Garage", " GARAGE",
    ] {
        name = name.strip_suffix(suffix).unwrap_or(name);
    }
    name.trim().to_string()
}

fn parse_serviced_organisation(element: &Element) -> ServicedOrganisation {
    let date_ranges = |name: &str| -> Vec<(NaiveDate, NaiveDate)> {
        descend(element, &[name])
            .map(|days| {
                days.children()
                    .filter(|range| range.name() == "DateRange")
                    .filter_map(|range| {
                        let start = child_text(range, "StartDate").and_then(|d| parse_date(&d))?;
                        let end = child_text(range, "EndDate")
                            .and_then(|d| parse_date(&d))
                            .unwrap_or(start);
                        Some((start, end))
                    })
                    .collect()
            })
            .unwrap_or_default()
    };
    ServicedOrganisation {
        code: child_text(element, "OrganisationCode").unwrap_or_default(),
        name: child_text(element, "Name").unwrap_or_default(),
        working_days: date_ranges("WorkingDays"),
        holidays: date_ranges("Holidays"),
    }
}

fn parse_section(section: &Element) -> JourneyPatternSection {
    let timing_links = section
        .children()
        .filter(|link| link.name() == "JourneyPatternTimingLink")
        .map(|link| TimingLink {
            from: parse_stop_usage(link, "From"),
            to: parse_stop_usage(link, "To"),
            run_seconds: child_text(link, "RunTime")
                .and_then(|d| parse_iso_duration_seconds(&d))
                .unwrap_or(0),
            route_link_ref: child_text(link, "RouteLinkRef"),
        })
        .collect();
    JourneyPatternSection { timing_links }
}

/// a RouteLink's mapped track, as a lon/lat polyline. points come either as
/// plain Latitude/Longitude children or wrapped in a Translation element.
fn parse_track(link: &Element) -> Vec<(f64, f64)> {
    let Some(mapping) = descend(link, &["Track", "Mapping"]) else {
        return Vec::new();
    };
    mapping
        .children()
        .filter(|location| location.name() == "Location")
        .filter_map(|location| {
            let point = child(location, "Translation").unwrap_or(location);
            let longitude: f64 = child_text(point, "Longitude")?.parse().ok()?;
            let latitude: f64 = child_text(point, "Latitude")?.parse().ok()?;
            Some((longitude, latitude))
        })
        .collect()
}

fn parse_stop_usage(link: &Element, end: &str) -> StopUsageElement {
    let Some(element) = child(link, end) else {
        return StopUsageElement::default();
    };
    StopUsageElement {
        stop_ref: child_text(element, "StopPointRef").unwrap_or_default(),
        activity: child_text(element, "Activity"),
        timing_status: child_text(element, "TimingStatus"),
        wait_seconds: child_text(element, "WaitTime")
            .and_then(|d| parse_iso_duration_seconds(&d))
            .unwrap_or(0),
        sequence_number: element
            .attr("SequenceNumber")
            .and_then(|n| n.parse().ok()),
    }
}

fn parse_service(
    service: &Element,
    organisations: &HashMap<String, ServicedOrganisation>,
) -> TxcService {
    let mut lines = Vec::new();
    if let Some(lines_element) = child(service, "Lines") {
        for line in lines_element.children() {
            let raw_name = child_text(line, "LineName").unwrap_or_default();
            // some publishers smuggle a brand after a pipe
            let (line_name, line_brand) = match raw_name.find('|') {
                Some(pipe) => (
                    raw_name[..pipe].to_string(),
                    raw_name[pipe + 1..].to_string(),
                ),
                None => (raw_name, String::new()),
            };
            lines.push(TxcLine {
                id: line.attr("id").unwrap_or_default().to_string(),
                line_name,
                line_brand,
                outbound_description: descend(line, &["OutboundDescription", "Description"])
                    .map(|e| e.text().trim().to_string())
                    .unwrap_or_default(),
                inbound_description: descend(line, &["InboundDescription", "Description"])
                    .map(|e| e.text().trim().to_string())
                    .unwrap_or_default(),
            });
        }
    }

    let mut journey_patterns = HashMap::new();
    if let Some(standard) = child(service, "StandardService") {
        for pattern in standard.children() {
            if pattern.name() != "JourneyPattern" {
                continue;
            }
            let id = pattern.attr("id").unwrap_or_default().to_string();
            journey_patterns.insert(
                id.clone(),
                JourneyPattern {
                    id,
                    inbound: child_text(pattern, "Direction").as_deref() == Some("inbound"),
                    section_refs: pattern
                        .children()
                        .filter(|c| c.name() == "JourneyPatternSectionRefs")
                        .map(|c| c.text().trim().to_string())
                        .collect(),
                    operating_profile: child(pattern, "OperatingProfile")
                        .map(|profile| OperatingProfile::parse(profile, organisations)),
                },
            );
        }
    }

    let operating_period = child(service, "OperatingPeriod");
    TxcService {
        service_code: child_text(service, "ServiceCode").unwrap_or_default(),
        mode: child_text(service, "Mode").unwrap_or_default(),
        description: child_text(service, "Description").unwrap_or_default(),
        origin: descend(service, &["StandardService", "Origin"])
            .map(|e| e.text().trim().to_string())
            .unwrap_or_default(),
        destination: descend(service, &["StandardService", "Destination"])
            .map(|e| e.text().trim().to_string())
            .unwrap_or_default(),
        vias: descend(service, &["StandardService", "Vias"])
            .map(|vias| vias.children().map(|via| via.text().trim().to_string()).collect())
            .unwrap_or_default(),
        marketing_name: child_text(service, "MarketingName").unwrap_or_default(),
        public_use: child_text(service, "PublicUse"),
        operating_period_start: operating_period
            .and_then(|period| child_text(period, "StartDate"))
            .and_then(|date| parse_date(&date)),
        operating_period_end: operating_period
            .and_then(|period| child_text(period, "EndDate"))
            .and_then(|date| parse_date(&date)),
        operating_profile: child(service, "OperatingProfile")
            .map(|profile| OperatingProfile::parse(profile, organisations)),
        registered_operator_ref: child_text(service, "RegisteredOperatorRef"),
        lines,
        journey_patterns,
    }
}

fn parse_vehicle_journey(
    journey: &Element,
    organisations: &HashMap<String, ServicedOrganisation>,
) -> VehicleJourney {
    let operational = child(journey, "Operational");
    let block = operational.and_then(|o| child(o, "Block"));
    let vehicle_type = operational.and_then(|o| child(o, "VehicleType"));
    let ticket_machine = operational.and_then(|o| child(o, "TicketMachine"));

    let notes = journey
        .children()
        .filter(|c| c.name() == "Note")
        .filter_map(|note| {
            let text = child_text(note, "NoteText")?;
            Some((child_text(note, "NoteCode").unwrap_or_default(), text))
        })
        .collect();

    VehicleJourney {
        code: child_text(journey, "VehicleJourneyCode").unwrap_or_default(),
        service_ref: child_text(journey, "ServiceRef").unwrap_or_default(),
        line_ref: child_text(journey, "LineRef").unwrap_or_default(),
        journey_pattern_ref: child_text(journey, "JourneyPatternRef").unwrap_or_default(),
        departure_time: child_text(journey, "DepartureTime").and_then(|t| t.parse().ok()),
        operating_profile: child(journey, "OperatingProfile")
            .map(|profile| OperatingProfile::parse(profile, organisations)),
        operator_ref: child_text(journey, "OperatorRef"),
        block_code: block
            .and_then(|b| child_text(b, "BlockNumber"))
            .unwrap_or_default(),
        block_description: block
            .and_then(|b| child_text(b, "Description"))
            .unwrap_or_default(),
        garage_ref: child_text(journey, "GarageRef")
            .or_else(|| operational.and_then(|o| child_text(o, "GarageRef"))),
        vehicle_type_code: vehicle_type
            .and_then(|vt| child_text(vt, "VehicleTypeCode"))
            .unwrap_or_default(),
        vehicle_type_description: vehicle_type
            .and_then(|vt| child_text(vt, "Description"))
            .unwrap_or_default(),
        ticket_machine_journey_code: ticket_machine
            .and_then(|tm| child_text(tm, "JourneyCode"))
            .unwrap_or_default(),
        ticket_machine_service_code: ticket_machine
            .and_then(|tm| child_text(tm, "TicketMachineServiceCode"))
            .unwrap_or_default(),
        sequence_number: journey.attr("SequenceNumber").and_then(|n| n.parse().ok()),
        notes,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_iso_durations() {
        assert_eq!(parse_iso_duration_seconds("PT5M"), Some(300));
        assert_eq!(parse_iso_duration_seconds("PT1H2M3S"), Some(3723));
        assert_eq!(parse_iso_duration_seconds("PT0S"), Some(0));
        assert_eq!(parse_iso_duration_seconds("-PT30S"), Some(-30));
        assert_eq!(parse_iso_duration_seconds("5M"), None);
    }

    const DOCUMENT: &str = r#"<TransXChange xmlns="http://www.transxchange.org.uk/" RevisionNumber="3">
      <StopPoints>
        <AnnotatedStopPointRef>
          <StopPointRef>2900A181</StopPointRef>
          <CommonName>Market Place</CommonName>
        </AnnotatedStopPointRef>
        <AnnotatedStopPointRef>
          <StopPointRef>2900B482</StopPointRef>
          <CommonName>Railway Station</CommonName>
        </AnnotatedStopPointRef>
      </StopPoints>
      <Operators>
        <Operator id="O1">
          <NationalOperatorCode>FECS</NationalOperatorCode>
          <OperatorCode>FE</OperatorCode>
          <TradingName>First Eastern Counties</TradingName>
        </Operator>
      </Operators>
      <JourneyPatternSections>
        <JourneyPatternSection id="JPS1">
          <JourneyPatternTimingLink id="JPTL1">
            <From SequenceNumber="1">
              <Activity>pickUp</Activity>
              <StopPointRef>2900A181</StopPointRef>
              <TimingStatus>principalTimingPoint</TimingStatus>
            </From>
            <To SequenceNumber="2">
              <StopPointRef>2900B482</StopPointRef>
              <TimingStatus>otherPoint</TimingStatus>
            </To>
            <RunTime>PT10M</RunTime>
          </JourneyPatternTimingLink>
        </JourneyPatternSection>
      </JourneyPatternSections>
      <Services>
        <Service>
          <ServiceCode>ea_21-45A-_-y08</ServiceCode>
          <Lines>
            <Line id="L1">
              <LineName>45A</LineName>
            </Line>
          </Lines>
          <OperatingPeriod>
            <StartDate>2024-01-01</StartDate>
          </OperatingPeriod>
          <RegisteredOperatorRef>O1</RegisteredOperatorRef>
          <StandardService>
            <Origin>Fakenham</Origin>
            <Destination>Norwich</Destination>
            <JourneyPattern id="JP1">
              <Direction>outbound</Direction>
              <JourneyPatternSectionRefs>JPS1</JourneyPatternSectionRefs>
            </JourneyPattern>
          </StandardService>
        </Service>
      </Services>
      <VehicleJourneys>
        <VehicleJourney>
          <OperatingProfile>
            <RegularDayType>
              <DaysOfWeek><MondayToFriday/></DaysOfWeek>
            </RegularDayType>
          </OperatingProfile>
          <VehicleJourneyCode>VJ1</VehicleJourneyCode>
          <ServiceRef>ea_21-45A-_-y08</ServiceRef>
          <LineRef>L1</LineRef>
          <JourneyPatternRef>JP1</JourneyPatternRef>
          <DepartureTime>09:00:00</DepartureTime>
        </VehicleJourney>
      </VehicleJourneys>
    </TransXChange>"#;

    #[test]
    fn test_parse_document_subset() {
        let document = parse_document(DOCUMENT.as_bytes()).unwrap();

        assert_eq!(document.revision_number, "3");
        assert_eq!(document.stops.len(), 2);
        assert_eq!(document.operators.len(), 1);
        assert_eq!(
            document.operators[0].national_code.as_deref(),
            Some("FECS")
        );
        assert_eq!(document.services.len(), 1);

        let service = &document.services[0];
        assert_eq!(service.service_code, "ea_21-45A-_-y08");
        assert_eq!(service.lines[0].line_name, "45A");
        assert_eq!(service.origin, "Fakenham");
        assert!(service.journey_patterns.contains_key("JP1"));

        let section = &document.journey_pattern_sections["JPS1"];
        assert_eq!(section.timing_links.len(), 1);
        assert_eq!(section.timing_links[0].run_seconds, 600);
        assert_eq!(
            section.timing_links[0].from.timing_status.as_deref(),
            Some("principalTimingPoint")
        );

        let journeys = document.journeys_for("ea_21-45A-_-y08", "L1");
        assert_eq!(journeys.len(), 1);
        assert_eq!(
            journeys[0].departure_time,
            Some(TimeOfDay::from_hms(9, 0, 0))
        );
        let profile = journeys[0].operating_profile.as_ref().unwrap();
        assert_eq!(profile.regular_days, [true, true, true, true, true, false, false]);
    }
}
