//! Codec configuration helpers for the elementary streams the muxer carries.

/// AAC configuration and ADTS synthesis
pub mod aac;

/// H.264 configuration and NAL framing
pub mod h264;
