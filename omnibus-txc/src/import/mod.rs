mod journeys;
mod service;

pub use journeys::handle_journeys;
pub use service::handle_service;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::Path;

use kdam::BarExt;
use log::{error, warn};

use omnibus_core::import::ImportContext;
use omnibus_core::store::Store;

use crate::txc::parse_document;
use crate::TxcError;

/// outbound/inbound descriptions shipped beside the documents in a
/// `IncludedServices.csv`, keyed on operator + line name + direction
#[derive(Debug, Default)]
pub struct ServiceDescriptions {
    pub by_key: HashMap<String, String>,
}

impl ServiceDescriptions {
    fn from_csv(reader: impl Read) -> ServiceDescriptions {
        let mut by_key = HashMap::new();
        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers = csv_reader.headers().ok().cloned().unwrap_or_default();
        let index = |name: &str| headers.iter().position(|h| h == name);
        let (Some(operator), Some(line_name), Some(direction), Some(description)) = (
            index("Operator"),
            index("LineName"),
            index("Dir"),
            index("Description"),
        ) else {
            return ServiceDescriptions::default();
        };
        for record in csv_reader.records().flatten() {
            if let (Some(op), Some(line), Some(dir), Some(desc)) = (
                record.get(operator),
                record.get(line_name),
                record.get(direction),
                record.get(description),
            ) {
                by_key.insert(format!("{op}{line}{dir}"), desc.to_string());
            }
        }
        ServiceDescriptions { by_key }
    }

    /// descriptions for a document file named like `..._NATX_323.xml`
    pub fn for_filename(&self, filename: &str) -> (Option<&str>, Option<&str>) {
        let stem = filename.strip_suffix(".xml").unwrap_or(filename);
        let mut parts = stem.rsplit('_');
        let (Some(line_name), Some(operator)) = (parts.next(), parts.next()) else {
            return (None, None);
        };
        let key = format!("{operator}{line_name}");
        (
            self.by_key.get(&format!("{key}O")).map(String::as_str),
            self.by_key.get(&format!("{key}I")).map(String::as_str),
        )
    }
}

/// derives the region id a legacy archive is partitioned by from its file
/// name: `EA.zip` covers East Anglia, the national coach dataset maps to
/// GB, and anything longer is not a region archive at all
pub fn region_from_archive_name(archive_name: &str) -> Option<String> {
    let stem = Path::new(archive_name).file_stem()?.to_str()?;
    let region = stem.to_uppercase();
    match region.as_str() {
        "NCSD" => Some("GB".to_string()),
        "IOM" => Some("IM".to_string()),
        _ if region.len() <= 2 => Some(region),
        _ => None,
    }
}

/// works through one archive: every XML member in listing order, with a
/// malformed member logged and skipped while the batch carries on. a file
/// that is not a zip at all is treated as a single loose document.
pub fn handle_archive(
    store: &mut Store,
    ctx: &mut ImportContext,
    archive_path: &Path,
    only_files: &[String],
) -> Result<(), TxcError> {
    let display = archive_path.display().to_string();
    let file =
        File::open(archive_path).map_err(|e| TxcError::Io(display.clone(), e))?;

    let mut archive = match zip::ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(_) => {
            // plain XML
            let file =
                File::open(archive_path).map_err(|e| TxcError::Io(display.clone(), e))?;
            return handle_file(store, ctx, BufReader::new(file), &display, &Default::default());
        }
    };

    let descriptions = match archive.by_name("IncludedServices.csv") {
        Ok(member) => ServiceDescriptions::from_csv(member),
        Err(_) => ServiceDescriptions::default(),
    };

    let names: Vec<String> = archive
        .file_names()
        .filter(|name| name.ends_with(".xml"))
        .filter(|name| only_files.is_empty() || only_files.iter().any(|f| f == name))
        .map(str::to_string)
        .collect();

    let mut bar = kdam::Bar::builder()
        .total(names.len())
        .desc(display.clone())
        .build()
        .ok();
    for name in names {
        let mut member = archive
            .by_name(&name)
            .map_err(|e| TxcError::Archive(display.clone(), e))?;
        let mut content = Vec::new();
        member
            .read_to_end(&mut content)
            .map_err(|e| TxcError::Io(name.clone(), e))?;
        if let Err(e) = handle_file(store, ctx, Cursor::new(content), &name, &descriptions) {
            error!("{name}: {e}");
        }
        if let Some(bar) = bar.as_mut() {
            let _ = bar.update(1);
        }
    }
    Ok(())
}

/// imports one TransXChange document
pub fn handle_file(
    store: &mut Store,
    ctx: &mut ImportContext,
    reader: impl BufRead,
    filename: &str,
    descriptions: &ServiceDescriptions,
) -> Result<(), TxcError> {
    let document = parse_document(reader)?;
    if document.vehicle_journeys.is_empty() {
        warn!("{filename} has no journeys");
        return Ok(());
    }

    let stops = resolve_stops(store, &document.stops);

    for (code, name) in &document.garages {
        ctx.intern_garage(store, code, name);
    }

    for index in 0..document.services.len() {
        service::handle_service(store, ctx, &document, index, filename, &stops, descriptions)?;
    }
    Ok(())
}

/// how a document stop reference resolved locally
#[derive(Debug, Clone)]
pub enum ResolvedStop {
    /// a stop we know, by its canonical code
    Known(String),
    /// nothing local matches; the raw code (or name) is carried through so
    /// the visit is kept rather than dropped
    Unknown(String),
}

/// matches the document's stop list against the local stop table, upper-
/// casing codes and trying the zero-padded variant some publishers drop
pub fn resolve_stops(
    store: &Store,
    document_stops: &[crate::txc::TxcStop],
) -> HashMap<String, ResolvedStop> {
    let mut resolved = HashMap::new();
    for stop in document_stops {
        let code = stop.atco_code.to_uppercase();
        let entry = if store.stop(&code).is_some() {
            ResolvedStop::Known(code.clone())
        } else if code.len() == 11 && code.chars().all(|c| c.is_ascii_digit()) {
            let padded = format!("0{code}");
            if store.stop(&padded).is_some() {
                warn!("{code} resolved as {padded}");
                ResolvedStop::Known(padded)
            } else {
                ResolvedStop::Unknown(stop.atco_code.clone())
            }
        } else {
            ResolvedStop::Unknown(stop.atco_code.clone())
        };
        resolved.insert(code, entry);
    }
    resolved
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::NaiveDate;
    use omnibus_core::import::sync;
    use omnibus_core::model::TripId;

    const DOCUMENT: &str = r#"<TransXChange xmlns="http://www.transxchange.org.uk/" RevisionNumber="5">
      <StopPoints>
        <AnnotatedStopPointRef><StopPointRef>2900A181</StopPointRef><CommonName>Market Place</CommonName></AnnotatedStopPointRef>
        <AnnotatedStopPointRef><StopPointRef>2900B482</StopPointRef><CommonName>Railway Station</CommonName></AnnotatedStopPointRef>
      </StopPoints>
      <Operators>
        <Operator id="O1"><NationalOperatorCode>FECS</NationalOperatorCode><TradingName>First Eastern Counties</TradingName></Operator>
      </Operators>
      <JourneyPatternSections>
        <JourneyPatternSection id="JPS1">
          <JourneyPatternTimingLink id="JPTL1">
            <From SequenceNumber="1"><StopPointRef>2900A181</StopPointRef><TimingStatus>principalTimingPoint</TimingStatus></From>
            <To SequenceNumber="2"><StopPointRef>2900B482</StopPointRef><TimingStatus>principalTimingPoint</TimingStatus></To>
            <RunTime>PT45M</RunTime>
          </JourneyPatternTimingLink>
        </JourneyPatternSection>
      </JourneyPatternSections>
      <Services>
        <Service>
          <ServiceCode>ea_21-45A-_-y08</ServiceCode>
          <Lines><Line id="L1"><LineName>45A</LineName></Line></Lines>
          <OperatingPeriod><StartDate>2024-01-01</StartDate></OperatingPeriod>
          <OperatingProfile>
            <RegularDayType><DaysOfWeek><MondayToFriday/></DaysOfWeek></RegularDayType>
          </OperatingProfile>
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
          <VehicleJourneyCode>VJ1</VehicleJourneyCode>
          <ServiceRef>ea_21-45A-_-y08</ServiceRef><LineRef>L1</LineRef>
          <JourneyPatternRef>JP1</JourneyPatternRef>
          <DepartureTime>09:00:00</DepartureTime>
        </VehicleJourney>
        <VehicleJourney>
          <VehicleJourneyCode>VJ2</VehicleJourneyCode>
          <ServiceRef>ea_21-45A-_-y08</ServiceRef><LineRef>L1</LineRef>
          <JourneyPatternRef>JP1</JourneyPatternRef>
          <DepartureTime>10:00:00</DepartureTime>
        </VehicleJourney>
      </VehicleJourneys>
    </TransXChange>"#;

    fn run_import(store: &mut Store) -> (Vec<TripId>, usize) {
        let source = store.get_or_create_source("EA", "ftp://ftp.tnds.basemap.co.uk/EA.zip");
        let mut ctx = ImportContext::new(source, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        ctx.region = Some("EA".to_string());
        ctx.is_tnds = true;
        handle_file(
            store,
            &mut ctx,
            DOCUMENT.as_bytes(),
            "ea_21-45A-_-y08-1.xml",
            &Default::default(),
        )
        .unwrap();
        sync::mark_old_services_as_not_current(store, &ctx);
        sync::finish_services(store, &ctx);

        assert_eq!(ctx.route_ids.len(), 1);
        let route = *ctx.route_ids.iter().next().unwrap();
        let trips = store.trips_of_route(route).iter().map(|t| t.id).collect();
        (trips, store.services().count())
    }

    #[test]
    fn test_reimport_is_idempotent_and_keeps_trip_ids() {
        let mut store = Store::new();

        let (first_trips, first_services) = run_import(&mut store);
        assert_eq!(first_trips.len(), 2);
        assert_eq!(first_services, 1);

        // the same archive again: same rows, same primary keys
        let (second_trips, second_services) = run_import(&mut store);
        assert_eq!(second_services, 1);
        assert_eq!(first_trips, second_trips);
    }

    #[test]
    fn test_region_from_archive_name() {
        assert_eq!(region_from_archive_name("EA.zip"), Some("EA".to_string()));
        assert_eq!(region_from_archive_name("/data/s.zip"), Some("S".to_string()));
        assert_eq!(region_from_archive_name("NCSD.zip"), Some("GB".to_string()));
        assert_eq!(region_from_archive_name("IOM.zip"), Some("IM".to_string()));
        assert_eq!(region_from_archive_name("stagecoach-norfolk.zip"), None);
    }

    #[test]
    fn test_included_services_descriptions() {
        let csv = "Operator,LineName,Dir,Description\n\
                   NATX,323,O,Cardiff - Liverpool\n\
                   NATX,323,I,Liverpool - Cardiff\n";
        let descriptions = ServiceDescriptions::from_csv(csv.as_bytes());
        let (outbound, inbound) = descriptions.for_filename("NCSD_TXC_NATX_323.xml");
        assert_eq!(outbound, Some("Cardiff - Liverpool"));
        assert_eq!(inbound, Some("Liverpool - Cardiff"));
    }
}
