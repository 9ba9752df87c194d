use serde::{Deserialize, Serialize};

/// declares a numeric row identifier newtype for one store table.
macro_rules! row_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(CalendarId);
row_id!(BankHolidayId);
row_id!(RouteId);
row_id!(
    /// stable across re-imports of an unchanged schedule, so external
    /// references (deep links to a journey) keep working
    TripId
);
row_id!(ServiceId);
row_id!(SourceId);
row_id!(NoteId);
row_id!(BlockId);
row_id!(VehicleTypeId);
row_id!(GarageId);
