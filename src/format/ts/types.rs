use bytes::{BufMut, BytesMut};
use std::time::Duration;

// Stream IDs
/// Stream ID for H.264 video streams in PES packets
pub const STREAM_ID_H264: u8 = 0xE0;
/// Stream ID for AAC audio streams in PES packets
pub const STREAM_ID_AAC: u8 = 0xC0;

// PIDs
/// PID for the Program Association Table, fixed by ISO/IEC 13818-1
pub const PID_PAT: u16 = 0x0000;
/// Default PID for the Program Map Table
pub const DEFAULT_PID_PMT: u16 = 4095;
/// Default PID for the video elementary stream
pub const DEFAULT_PID_VIDEO: u16 = 256;
/// Default PID for the audio elementary stream
pub const DEFAULT_PID_AUDIO: u16 = 257;

// Table IDs
/// Table ID for the Program Association Table
pub const TABLE_ID_PAT: u8 = 0x00;
/// Table ID for the Program Map Table
pub const TABLE_ID_PMT: u8 = 0x02;

// Elementary stream types
/// Stream type for H.264 video
pub const STREAM_TYPE_H264: u8 = 0x1B;
/// Stream type for ADTS-framed AAC audio
pub const STREAM_TYPE_AAC_ADTS: u8 = 0x0F;

// Constants
/// Size of a transport stream packet in bytes
pub const TS_PACKET_SIZE: usize = 188;
/// Size of the fixed transport stream packet header in bytes
pub const TS_HEADER_SIZE: usize = 4;
/// Clock frequency for Presentation Time Stamps (PTS) in Hz
pub const PTS_HZ: u64 = 90_000;
/// Clock frequency for Program Clock Reference (PCR) values in Hz
pub const PCR_HZ: u64 = 27_000_000;

/// Payload layout of a transport stream packet, the 2-bit
/// `adaptation_field_control` header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptationControl {
    /// Payload only (0b01)
    Payload = 0b01,
    /// Adaptation field only, no payload (0b10)
    AdaptationOnly = 0b10,
    /// Adaptation field followed by payload (0b11)
    AdaptationAndPayload = 0b11,
}

/// The fixed 4-byte transport stream packet header.
///
/// Only the fields a muxer sets are modelled; transport error,
/// priority and scrambling are always zero on the write path.
#[derive(Debug, Clone, Copy)]
pub struct TsHeader {
    /// Payload unit start indicator (1-bit)
    ///
    /// Set to 1 on the packet in which a PES packet or PSI section
    /// begins.
    pub payload_unit_start: bool,
    /// PID (13-bit)
    ///
    /// Packet identifier, used to demultiplex the elementary streams
    /// and PSI tables riding in the same transport stream.
    pub pid: u16,
    /// Adaptation field control (2-bit)
    ///
    /// Indicates whether an adaptation field and/or payload is present
    /// in the packet.
    pub adaptation: AdaptationControl,
    /// Continuity counter (4-bit)
    ///
    /// Counter incrementing modulo 16 for each payload-carrying packet
    /// of the same PID, used by receivers to detect packet loss.
    pub continuity_counter: u8,
}

impl TsHeader {
    /// Creates a payload-only header for `pid`.
    ///
    /// # Arguments
    /// * `pid` - Packet identifier for the new header
    pub fn new(pid: u16) -> Self {
        Self {
            payload_unit_start: false,
            pid,
            adaptation: AdaptationControl::Payload,
            continuity_counter: 0,
        }
    }

    /// Writes the TS header to a BytesMut buffer.
    ///
    /// Packs the header fields into four bytes, sync byte included,
    /// in bit-correct positions according to the MPEG-TS specification.
    ///
    /// # Arguments
    /// * `buf` - BytesMut buffer to write the header to
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(0x47);

        let mut b1 = ((self.pid >> 8) & 0x1F) as u8;
        if self.payload_unit_start {
            b1 |= 0x40;
        }
        buf.put_u8(b1);
        buf.put_u8((self.pid & 0xFF) as u8);

        buf.put_u8(((self.adaptation as u8) << 4) | (self.continuity_counter & 0x0F));
    }
}

/// One program entry of the Program Association Table.
#[derive(Debug, Clone)]
pub struct PatProgram {
    /// Program number (16-bit)
    ///
    /// Identifies a program within the transport stream; this muxer
    /// emits a single program numbered 1.
    pub program_number: u16,
    /// Program map PID (13-bit)
    ///
    /// PID of the Program Map Table associated with this program.
    pub pmt_pid: u16,
}

/// Program Association Table (PAT) in MPEG Transport Stream.
///
/// The PAT maps program numbers to PMT PIDs. It is always transmitted
/// on PID 0x0000 and is the entry point for demultiplexing.
#[derive(Debug, Clone, Default)]
pub struct Pat {
    /// Program loop entries
    pub programs: Vec<PatProgram>,
}

impl Pat {
    /// Creates a PAT announcing a single program on the given PMT PID.
    ///
    /// # Arguments
    /// * `pmt_pid` - PID the Program Map Table will be carried on
    pub fn single_program(pmt_pid: u16) -> Self {
        Self {
            programs: vec![PatProgram {
                program_number: 1,
                pmt_pid,
            }],
        }
    }

    /// Writes the PAT program loop to a BytesMut buffer.
    ///
    /// Each entry is written as a program number followed by its PMT
    /// PID with the three reserved bits set.
    ///
    /// # Arguments
    /// * `buf` - BytesMut buffer to write the program loop to
    pub fn write_to(&self, buf: &mut BytesMut) {
        for program in &self.programs {
            buf.put_u16(program.program_number);
            buf.put_u16(program.pmt_pid & 0x1FFF | 0x7 << 13);
        }
    }
}

/// One elementary stream entry of the Program Map Table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsEntry {
    /// Elementary stream type (8-bit)
    ///
    /// Indicates the encoding of the elementary stream: 0x0F for ADTS
    /// AAC, 0x1B for H.264.
    pub stream_type: u8,
    /// Elementary PID (13-bit)
    ///
    /// PID of the packets carrying the elementary stream data.
    pub pid: u16,
}

/// Program Map Table (PMT) for the single program this muxer emits.
///
/// The PMT lists the elementary streams of the program and names the
/// PID that carries the program clock reference.
#[derive(Debug, Clone, Default)]
pub struct Pmt {
    /// PID carrying the Program Clock Reference (PCR)
    pub pcr_pid: u16,
    /// Elementary stream loop, in configuration order
    pub streams: Vec<EsEntry>,
}

impl Pmt {
    /// Writes the PMT body to a BytesMut buffer.
    ///
    /// Serializes the PCR PID, an empty program-info loop and the
    /// elementary stream loop with empty ES-info descriptors.
    ///
    /// # Arguments
    /// * `buf` - BytesMut buffer to write the PMT body to
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u16(self.pcr_pid & 0x1FFF | 0x7 << 13);
        buf.put_u16(0xF000); // no program descriptors

        for entry in &self.streams {
            buf.put_u8(entry.stream_type);
            buf.put_u16(entry.pid & 0x1FFF | 0x7 << 13);
            buf.put_u16(0xF000); // empty ES info
        }
    }

    /// Adds an elementary stream, replacing any previous entry on the
    /// same PID.
    ///
    /// # Arguments
    /// * `stream_type` - Elementary stream type of the entry
    /// * `pid` - PID the elementary stream is carried on
    pub fn upsert_stream(&mut self, stream_type: u8, pid: u16) {
        if let Some(existing) = self.streams.iter_mut().find(|entry| entry.pid == pid) {
            existing.stream_type = stream_type;
        } else {
            self.streams.push(EsEntry { stream_type, pid });
        }
    }
}

/// Converts a media timestamp to 90 kHz PTS/DTS ticks.
///
/// # Arguments
/// * `time` - Media timestamp to convert
///
/// # Returns
/// Tick count at the 90 kHz PTS clock rate, truncated.
pub fn pts_ticks(time: Duration) -> u64 {
    (time.as_nanos() * PTS_HZ as u128 / 1_000_000_000) as u64
}

/// Converts a media timestamp to 27 MHz PCR ticks.
///
/// # Arguments
/// * `time` - Media timestamp to convert
///
/// # Returns
/// Tick count at the 27 MHz PCR clock rate, truncated.
pub fn pcr_ticks(time: Duration) -> u64 {
    (time.as_nanos() * PCR_HZ as u128 / 1_000_000_000) as u64
}

/// Encodes a 27 MHz PCR value into its 6-byte adaptation field form.
///
/// The layout is the 33-bit base at 90 kHz, six reserved one bits, and
/// the 9-bit extension carrying the remaining 27 MHz ticks.
///
/// # Arguments
/// * `ticks` - PCR value in 27 MHz ticks
///
/// # Returns
/// The six bytes that follow the PCR flag in an adaptation field.
pub fn encode_pcr(ticks: u64) -> [u8; 6] {
    let base = (ticks / 300) & 0x1_FFFF_FFFF;
    let ext = (ticks % 300) as u16;

    [
        (base >> 25) as u8,
        (base >> 17) as u8,
        (base >> 9) as u8,
        (base >> 1) as u8,
        (((base & 0x01) as u8) << 7) | 0x7E | ((ext >> 8) as u8 & 0x01),
        (ext & 0xFF) as u8,
    ]
}
