//! static alias tables for operator references that the code and name
//! schemes cannot place: trading names and legacy regional codes with no
//! correspondence in the national operator-code database. loaded once at
//! compile time; resolution over them is a pure function.

/// trading name -> national operator code
const TRADING_NAME_OPERATORS: &[(&str, &str)] = &[
    ("ARRIVA LONDON NORTH LIMITED", "ALNO"),
    ("ARRIVA LONDON SOUTH LIMITED", "ALSO"),
    ("ARRIVA THE SHIRES LIMITED", "ASES"),
    ("Arriva Northumbria", "ANUM"),
    ("BLUE TRIANGLE BUSES LIMITED", "BTRI"),
    ("Borderbus", "BDRB"),
    ("Bungay and Beccles Area CT", "BBCT"),
    ("Carters Heritage Buses", "CTCS"),
    ("Dartmouth Steam Railway And River Boat Company", "DRMR"),
    ("EAST LONDON BUS & COACH COMPANY LIMITED", "ELBG"),
    ("Fal River Ferries", "KHFC"),
    ("First Cornwall", "FCWL"),
    ("Gloucestershire", "SCGL"),
    ("H.C.Chambers & Son", "CHMB"),
    ("Halesworth Area Community Transport", "HACT"),
    ("Harwich Harbour Ferry", "HHFS"),
    ("IoW Floating Bridge", "IOWC"),
    ("King Harry Ferry Co", "KHFC"),
    ("LONDON CENTRAL BUS COMPANY LIMITED", "LONC"),
    ("LONDON SOVEREIGN LIMITED", "LSOV"),
    ("METROBUS LIMITED", "METR"),
    ("METROLINE WEST LIMITED", "MTLN"),
    ("Notts & Derby", "NDTR"),
    ("Rothbury Securities Ltd", "ROTH"),
    ("SOUTH EAST LONDON & KENT BUS COMPANY LTD", "SELK"),
    ("SULLIVAN BUS & COACH LIMITED", "SULV"),
    ("Southwold Town Council", "SWTC"),
    ("Stowmarket Minibus & Coach Hire", "MBCH"),
    ("TOWER TRANSIT LIMITED", "TOTR"),
    ("TRAMTRACK CROYDON LTD", "TRAM"),
    ("UNO BUSES LIMITED", "UNOE"),
    ("Westminster Passenger Service Association", "WPSA"),
];

/// legacy regional operator code -> national operator code
const CODE_OPERATORS: &[(&str, &str)] = &[
    ("1866", "BPTR"), // Burnley & Pendle
    ("2152", "RSTY"), // R S Tyrer & Sons
    ("2916", "SPCT"), // South Pennine Community Transport
    ("ACY", "ACYM"),  // Arriva Cymru
    ("ADD", "ADDI"),  // Addison News
    ("ALI", "AMDD"),  // Alasdair MacDonald
    ("AM0", "AMID"),  // Arriva Midlands
    ("CL", "CFSV"),   // Coniston Launch
    ("CO", "CFSV"),
    ("DAM", "DAMC"), // D A & A J MacLean
    ("DPC", "DPCE"), // Prentice Coaches
    ("EWE", "EWEN"), // Ewens Coach Hire
    ("EYM", "EYMS"), // East Yorkshire Motor Services
    ("HBSY", "YTIG"), // Yorkshire Tiger
    ("HIB", "HIMB"), // Holy Island Minibus
    ("JO1", "JTMT"), // John's Travel
    ("KL", "KELC"),  // Keswick Launch
    ("PCV", "PCVN"), // Canavan Travel
    ("RB1", "RBRO"), // Richards Bros
    ("RGJ", "RGJS"), // R G Jamieson & Son
    ("RMB", "RMBL"), // Routemaster Buses
    ("SGI", "SGIL"), // Steel Group Investments
    ("WINF", "WMLC"), // Windermere Lake Cruises
];

/// operator names that mean "no operator" rather than an operator we have
/// failed to identify
const NON_NAMES: &[&str] = &["Replacement Service", "UNKWN"];

pub fn operator_for_trading_name(name: &str) -> Option<&'static str> {
    TRADING_NAME_OPERATORS
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, noc)| *noc)
}

pub fn operator_for_code(code: &str) -> Option<&'static str> {
    CODE_OPERATORS
        .iter()
        .find(|(alias, _)| *alias == code)
        .map(|(_, noc)| *noc)
}

pub fn is_non_operator_name(name: &str) -> bool {
    NON_NAMES.contains(&name)
}
