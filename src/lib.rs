#![deny(missing_docs)]

//! # tsio - Live MPEG-TS Muxing Toolkit
//!
//! `tsio` turns elementary audio (AAC) and video (H.264) access units into
//! a standards-conformant MPEG-2 Transport Stream and writes it as
//! fixed-duration HLS segments with a sliding-window playlist.
//!
//! ## Features
//!
//! - PES framing with PTS/DTS timestamps
//! - TS packetization: PID routing, continuity counters, adaptation
//!   fields, PCR stamping, random-access marking
//! - PAT/PMT generation at every segment start
//! - Duration-triggered segment rotation, playlist maintenance and
//!   on-disk pruning of expired segments
//! - ADTS header synthesis from an AudioSpecificConfig and Annex-B
//!   conversion driven by an `avcC` record
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tsio::format::ts::{MediaKind, MuxerConfig, TsMuxer};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> tsio::Result<()> {
//!     let mut muxer = TsMuxer::new(MuxerConfig {
//!         expected_medias: vec![MediaKind::Audio, MediaKind::Video],
//!         base_dir: Some("/tmp/stream".into()),
//!         ..MuxerConfig::default()
//!     });
//!
//!     muxer.start().await?;
//!
//!     // deliver codec configs, then feed access units:
//!     muxer.on_audio_config(&[0x12, 0x10]).await?;
//!     // muxer.on_video_config(&avcc_record).await?;
//!     // muxer.on_video_sample(&au, pts, Some(dts), is_idr).await?;
//!
//!     muxer.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `codec`: AAC and H.264 configuration helpers
//! - `format`: the transport stream muxer, PSI generation and the HLS
//!   segment writer
//! - `error`: error types and the crate-wide `Result`
//! - `utils`: bit reading and CRC-32/MPEG-2

/// Codec configuration helpers for AAC and H.264
pub mod codec;

/// Error types and utilities
pub mod error;

/// Media format implementations (MPEG-TS, HLS)
pub mod format;

/// Common utilities and helper functions
pub mod utils;

pub use error::{Result, TsioError};
