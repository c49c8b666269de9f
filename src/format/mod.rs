//! Media container implementations. Currently MPEG-TS with HLS output.

/// MPEG transport stream muxing and HLS segmentation
pub mod ts;
