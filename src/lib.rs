// Postcode Validation - Core Library
// Checks registered addresses against the postcode history table:
// the postcode must have existed on the registration date and the
// address coordinates must agree with the postcode's reference point.

pub mod config;
pub mod error;
pub mod matcher;
pub mod normalizer;
pub mod pipeline;
pub mod reference;

// Re-export commonly used types
pub use config::{AddressColumns, PipelineConfig, DEFAULT_DATE_FORMATS};
pub use error::PipelineError;
pub use matcher::{
    coordinates_close, geodesic_distance_meters, validate, within_date_range,
    FailureReason, MatchCandidate, MatchOutcome, Matcher, PostcodeIndex, ValidationSummary,
    DEFAULT_TOLERANCE_METERS,
};
pub use normalizer::{
    extract_postcode, parse_coordinate, parse_identifier, parse_registration_date,
    AddressRecord, ColumnIndex,
};
pub use pipeline::{
    load_address_table, run, write_output, write_summary, AddressTable, POSTCODE_COLUMN,
    VALIDATED_COLUMN,
};
pub use reference::{load_reference, parse_year_month, PostcodeReference};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
