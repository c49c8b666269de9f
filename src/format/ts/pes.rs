use super::types::pts_ticks;
use bytes::{BufMut, BytesMut};
use std::time::Duration;

/// Packetized Elementary Stream (PES) packet header.
///
/// Models the subset of the PES syntax a muxer emits: start code,
/// stream id, packet length, data alignment and PTS/DTS timestamps.
/// Scrambling, ESCR, trick-mode and the other optional fields are never
/// set on the write path.
#[derive(Debug, Clone)]
pub struct PesHeader {
    /// Stream identifier indicating content type
    ///
    /// 0xC0 for AAC audio, 0xE0 for H.264 video.
    pub stream_id: u8,
    /// Data alignment indicator
    ///
    /// Set because every PES this muxer emits starts on an access unit
    /// boundary.
    pub data_alignment: bool,
    /// Presentation Time Stamp (33 bits at 90 kHz)
    pub pts: Option<u64>,
    /// Decoding Time Stamp (33 bits at 90 kHz)
    ///
    /// Only present when it differs from the PTS.
    pub dts: Option<u64>,
}

impl PesHeader {
    /// Creates a new PES header with a specific stream ID.
    ///
    /// # Arguments
    /// * `stream_id` - The stream_id for this PES header.
    pub fn new(stream_id: u8) -> Self {
        Self {
            stream_id,
            data_alignment: true,
            pts: None,
            dts: None,
        }
    }

    /// Sets the Presentation Time Stamp (PTS) for the PES header.
    ///
    /// # Arguments
    /// * `pts` - The PTS Duration to set.
    ///
    /// # Returns
    /// The modified PesHeader instance.
    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(pts_ticks(pts));
        self
    }

    /// Sets the Decoding Time Stamp (DTS) for the PES header.
    ///
    /// # Arguments
    /// * `dts` - The DTS Duration to set.
    ///
    /// # Returns
    /// The modified PesHeader instance.
    pub fn with_dts(mut self, dts: Duration) -> Self {
        self.dts = Some(pts_ticks(dts));
        self
    }

    fn timestamp_len(&self) -> usize {
        self.pts.map_or(0, |_| 5) + self.dts.map_or(0, |_| 5)
    }

    /// Returns the length in bytes of the serialized header.
    ///
    /// This is the fixed 9-byte prefix plus 5 bytes per present
    /// timestamp.
    pub fn len(&self) -> usize {
        9 + self.timestamp_len()
    }

    /// Returns true when the header carries no timestamps.
    pub fn is_empty(&self) -> bool {
        self.pts.is_none() && self.dts.is_none()
    }

    /// Writes the PES header to a BytesMut buffer.
    ///
    /// This method encodes all header fields into the buffer according
    /// to MPEG-TS PES syntax. `payload_len` feeds the
    /// `PES_packet_length` field: video streams (0xE0..=0xEF) use the
    /// unbounded form (zero) because coded pictures routinely exceed
    /// the 16-bit field; all other streams carry the exact length.
    ///
    /// # Arguments
    /// * `buf` - The BytesMut buffer to write the header to.
    /// * `payload_len` - Length in bytes of the elementary stream
    ///   payload that will follow the header.
    pub fn write_to(&self, buf: &mut BytesMut, payload_len: usize) {
        buf.put_u8(0x00);
        buf.put_u8(0x00);
        buf.put_u8(0x01);
        buf.put_u8(self.stream_id);

        let is_video = self.stream_id & 0xF0 == 0xE0;
        let bounded = 3 + self.timestamp_len() + payload_len;
        let packet_length = if is_video || bounded > u16::MAX as usize {
            0
        } else {
            bounded as u16
        };
        buf.put_u16(packet_length);

        let mut flags = 0x80u8; // marker bits '10'
        if self.data_alignment {
            flags |= 0x04;
        }
        buf.put_u8(flags);

        let mut flags2 = 0u8;
        if self.pts.is_some() {
            flags2 |= 0x80;
        }
        if self.dts.is_some() {
            flags2 |= 0x40;
        }
        buf.put_u8(flags2);

        buf.put_u8(self.timestamp_len() as u8);

        if let Some(pts) = self.pts {
            let marker = if self.dts.is_some() { 0x30 } else { 0x20 };
            write_timestamp(buf, marker, pts);
        }
        if let Some(dts) = self.dts {
            write_timestamp(buf, 0x10, dts);
        }
    }
}

/// Represents a complete Packetized Elementary Stream (PES) packet.
///
/// A PES packet consists of a header and payload data. The payload is
/// the elementary stream form of one access unit: an ADTS frame for
/// audio, an Annex-B NAL sequence for video.
#[derive(Debug)]
pub struct PesPacket {
    /// PES header containing the stream id and timestamps
    pub header: PesHeader,
    /// Actual payload data of the PES packet
    pub payload: BytesMut,
}

impl PesPacket {
    /// Creates a new PES packet with the specified stream ID and
    /// payload data.
    ///
    /// # Arguments
    /// * `stream_id` - The stream identifier (e.g., video or audio)
    /// * `payload` - The elementary stream payload
    ///
    /// # Returns
    /// A new PesPacket instance.
    pub fn new(stream_id: u8, payload: BytesMut) -> Self {
        Self {
            header: PesHeader::new(stream_id),
            payload,
        }
    }

    /// Sets the Presentation Time Stamp (PTS) for the PES packet.
    ///
    /// # Arguments
    /// * `pts` - Presentation Time Stamp for the PES packet
    ///
    /// # Returns
    /// The modified PesPacket instance.
    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.header = self.header.with_pts(pts);
        self
    }

    /// Sets the Decoding Time Stamp (DTS) for the PES packet.
    ///
    /// # Arguments
    /// * `dts` - Decoding Time Stamp for the PES packet
    ///
    /// # Returns
    /// The modified PesPacket instance.
    pub fn with_dts(mut self, dts: Duration) -> Self {
        self.header = self.header.with_dts(dts);
        self
    }

    /// Returns the total length of the PES packet in bytes.
    ///
    /// This includes the fixed header size, optional PTS/DTS fields,
    /// and the payload length.
    pub fn len(&self) -> usize {
        self.header.len() + self.payload.len()
    }

    /// Returns true when both the header timestamps and the payload are
    /// empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty() && self.header.is_empty()
    }

    /// Writes the complete PES packet to a BytesMut buffer.
    ///
    /// # Arguments
    /// * `buf` - The BytesMut buffer to write the PES packet to
    pub fn write_to(&self, buf: &mut BytesMut) {
        self.header.write_to(buf, self.payload.len());
        buf.extend_from_slice(&self.payload);
    }
}

/// Helper function to write PTS/DTS timestamps to a buffer.
///
/// Splits the 33-bit timestamp into the classic 3|15|15 groups, each
/// followed by a marker bit.
///
/// # Arguments
/// * `buf` - The BytesMut buffer to write to
/// * `marker` - The high nibble: 0x20 PTS alone, 0x30 PTS when DTS
///   follows, 0x10 DTS
/// * `ts` - The timestamp value to write
fn write_timestamp(buf: &mut BytesMut, marker: u8, ts: u64) {
    let ts = ts & 0x1_FFFF_FFFF;

    buf.put_u8(marker | ((ts >> 29) & 0x0E) as u8 | 0x01);
    buf.put_u16((((ts >> 14) & 0xFFFE) | 0x01) as u16);
    buf.put_u16((((ts << 1) & 0xFFFE) | 0x01) as u16);
}
