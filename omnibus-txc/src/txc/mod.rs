mod document;
mod operating_profile;

pub use document::{
    parse_document, JourneyPattern, JourneyPatternSection, ServicedOrganisation, StopUsageElement,
    TimingLink, TransXChangeDocument, TxcLine, TxcOperator, TxcService, TxcStop, VehicleJourney,
};
pub use operating_profile::{BankHolidayElement, DateRange, OperatingProfile, ServicedDaySet};
