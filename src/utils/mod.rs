//! # Utility Functions and Types
//!
//! Common helpers used throughout the tsio library:
//!
//! - Bit-level reading for codec configuration records
//! - CRC-32/MPEG-2 calculation for PSI tables

/// Bitstream reading utilities
pub mod bits;

/// CRC calculation implementations
pub mod crc;

pub use bits::BitReader;
pub use crc::crc32_mpeg2;
