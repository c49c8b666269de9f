//! H.264/AVC configuration handling: avcC record parsing and conversion of
//! length-prefixed sample data to Annex-B framing.

/// avcC parsing and NAL framing conversion
pub mod parser;
/// NAL unit types and start-code constants
pub mod types;

pub use parser::AvcConfig;
pub use types::{NalType, ACCESS_UNIT_DELIMITER, START_CODE};
