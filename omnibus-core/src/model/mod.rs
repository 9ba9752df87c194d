mod calendar;
mod ids;
mod network;
mod time_of_day;
mod timetable;

pub use calendar::{
    allows, BankHoliday, BankHolidayDate, Calendar, CalendarBankHoliday, CalendarDate,
    CalendarPattern, ExceptionPattern, HolidayRule,
};
pub use ids::{
    BankHolidayId, BlockId, CalendarId, GarageId, NoteId, RouteId, ServiceId, SourceId, TripId,
    VehicleTypeId,
};
pub use network::{DataSource, Operator, OperatorCode, OperatorId, StopPoint, StopUsage};
pub use time_of_day::TimeOfDay;
pub use timetable::{
    Block, Direction, Garage, Note, Route, Service, StopRef, StopTime, TimingStatus, Trip,
    VehicleType,
};
