use crate::error::{Result, TsioError};

/// Length in bytes of an ADTS header without CRC protection
pub const ADTS_HEADER_LEN: usize = 7;

/// AAC audio object types this muxer can carry, as signalled in the
/// AudioSpecificConfig (ISO/IEC 14496-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioObjectType {
    /// AAC Main
    Main = 1,
    /// AAC Low Complexity, the profile produced by virtually every encoder
    Lc = 2,
    /// AAC Scalable Sample Rate
    Ssr = 3,
    /// AAC Long Term Prediction
    Ltp = 4,
}

impl AudioObjectType {
    /// Maps the 5-bit audioObjectType field to a supported object type.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(AudioObjectType::Main),
            2 => Ok(AudioObjectType::Lc),
            3 => Ok(AudioObjectType::Ssr),
            4 => Ok(AudioObjectType::Ltp),
            other => Err(TsioError::Codec(format!(
                "unsupported AAC object type {}",
                other
            ))),
        }
    }

    /// The 2-bit profile value used in ADTS headers (object type minus one).
    pub fn adts_profile(self) -> u8 {
        self as u8 - 1
    }
}

/// Decoder configuration for an AAC elementary stream, extracted from an
/// AudioSpecificConfig and used to synthesize one ADTS header per access
/// unit.
#[derive(Debug, Clone)]
pub struct AacConfig {
    /// Audio object type from the AudioSpecificConfig
    pub object_type: AudioObjectType,
    /// Index into the MPEG-4 sampling frequency table
    pub sample_rate_index: u8,
    /// Channel configuration (1 = mono, 2 = stereo, ...)
    pub channel_configuration: u8,
    /// Samples per access unit, 1024 for plain AAC
    pub frame_length: u16,
}

impl AacConfig {
    /// Sampling rate in Hz, if the stored index is a table entry.
    pub fn sample_rate(&self) -> Option<u32> {
        match self.sample_rate_index {
            0 => Some(96000),
            1 => Some(88200),
            2 => Some(64000),
            3 => Some(48000),
            4 => Some(44100),
            5 => Some(32000),
            6 => Some(24000),
            7 => Some(22050),
            8 => Some(16000),
            9 => Some(12000),
            10 => Some(11025),
            11 => Some(8000),
            12 => Some(7350),
            _ => None,
        }
    }

    /// Duration of one access unit in seconds.
    pub fn frame_duration(&self) -> Option<f64> {
        self.sample_rate()
            .map(|rate| self.frame_length as f64 / rate as f64)
    }

    /// Synthesizes the 7-byte ADTS header for a raw AAC access unit of
    /// `payload_len` bytes.
    ///
    /// The frame length field covers the header itself, so the largest
    /// representable payload is `0x1FFF - 7` bytes.
    pub fn adts_header(&self, payload_len: usize) -> Result<[u8; ADTS_HEADER_LEN]> {
        let frame_length = payload_len + ADTS_HEADER_LEN;
        if frame_length > 0x1FFF {
            return Err(TsioError::InvalidData(format!(
                "AAC access unit of {} bytes exceeds the ADTS frame length field",
                payload_len
            )));
        }
        let frame_length = frame_length as u16;
        let buffer_fullness = 0x7FFu16; // variable bit rate

        let mut header = [0u8; ADTS_HEADER_LEN];
        header[0] = 0xFF; // sync word, high 8 bits
        // sync word low 4 bits, MPEG-4 id, layer 0, protection absent
        header[1] = 0xF1;
        header[2] = (self.object_type.adts_profile() << 6)
            | ((self.sample_rate_index & 0x0F) << 2)
            | ((self.channel_configuration >> 2) & 0x01);
        header[3] = ((self.channel_configuration & 0x03) << 6) | ((frame_length >> 11) & 0x03) as u8;
        header[4] = ((frame_length >> 3) & 0xFF) as u8;
        header[5] = ((frame_length & 0x07) << 5) as u8 | ((buffer_fullness >> 6) & 0x1F) as u8;
        header[6] = ((buffer_fullness & 0x3F) << 2) as u8;

        Ok(header)
    }
}
