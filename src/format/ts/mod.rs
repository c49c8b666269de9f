//! # MPEG Transport Stream (TS) Implementation
//!
//! A live MPEG-TS mux write path with HLS output:
//!
//! - PES packet assembly with PTS/DTS timestamps
//! - Fragmentation into 188-byte TS packets with adaptation fields,
//!   PCR stamping and per-PID continuity counters
//! - PSI (PAT/PMT) generation at every segment start
//! - Duration-triggered segment rotation with a sliding-window playlist
//!
//! ## Example
//!
//! ```rust,no_run
//! use tsio::format::ts::{MediaKind, MuxerConfig, TsMuxer};
//! use std::time::Duration;
//!
//! # async fn run() -> tsio::Result<()> {
//! let mut muxer = TsMuxer::new(MuxerConfig {
//!     segment_duration: Duration::from_secs(2),
//!     expected_medias: vec![MediaKind::Audio],
//!     base_dir: Some("/tmp/hls".into()),
//!     ..MuxerConfig::default()
//! });
//!
//! muxer.start().await?;
//! muxer.on_audio_config(&[0x12, 0x10]).await?; // 44.1 kHz stereo AAC-LC
//! muxer.on_audio_sample(&[0u8; 256], Duration::ZERO).await?;
//! muxer.stop().await?;
//! # Ok(())
//! # }
//! ```

/// Observer interface and writer error taxonomy
pub mod delegate;

/// HLS segment rotation and playlist management
pub mod hls;

/// Muxer engine and configuration
pub mod muxer;

/// Fragmentation of PES packets into TS packets
pub mod packetizer;

/// PES packet handling
pub mod pes;

/// PSI (PAT/PMT) section generation
pub mod psi;

/// Core TS types and constants
pub mod types;

pub use delegate::{TsMuxerDelegate, WriterErrorKind};
pub use hls::{MediaSegment, SegmentWriter};
pub use muxer::{MediaKind, MuxerConfig, TsMuxer, PCR_INTERVAL};
pub use pes::{PesHeader, PesPacket};
pub use types::{
    DEFAULT_PID_AUDIO, DEFAULT_PID_PMT, DEFAULT_PID_VIDEO, PID_PAT, STREAM_TYPE_AAC_ADTS,
    STREAM_TYPE_H264, TS_PACKET_SIZE,
};
