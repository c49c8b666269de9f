//! AAC configuration handling: AudioSpecificConfig parsing and per-frame
//! ADTS header synthesis.

/// AudioSpecificConfig parsing
pub mod parser;
/// AAC configuration and ADTS types
pub mod types;

pub use parser::parse_audio_specific_config;
pub use types::{AacConfig, AudioObjectType, ADTS_HEADER_LEN};
