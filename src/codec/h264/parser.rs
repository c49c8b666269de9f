use super::types::{NalType, ACCESS_UNIT_DELIMITER, START_CODE};
use crate::error::{Result, TsioError};
use bytes::{BufMut, BytesMut};

/// Decoder configuration for an H.264 elementary stream, extracted from an
/// `avcC` configuration record (ISO/IEC 14496-15).
///
/// Carries the parameter sets that get spliced in front of IDR access
/// units and the NAL length size used to convert length-prefixed sample
/// data to Annex-B framing.
#[derive(Debug, Clone)]
pub struct AvcConfig {
    /// AVCProfileIndication from the record
    pub profile: u8,
    /// AVCLevelIndication from the record
    pub level: u8,
    /// Bytes per NAL length prefix in sample data (1, 2 or 4)
    pub nal_length_size: usize,
    /// First sequence parameter set, without start code
    pub sps: Vec<u8>,
    /// First picture parameter set, without start code
    pub pps: Vec<u8>,
}

impl AvcConfig {
    /// Parses an `avcC` record.
    ///
    /// Only the first SPS and PPS are retained; streams that switch
    /// parameter sets mid-GOP deliver a fresh record instead.
    pub fn parse(avcc: &[u8]) -> Result<Self> {
        if avcc.len() < 7 {
            return Err(TsioError::Parser("avcC record too short".into()));
        }
        if avcc[0] != 1 {
            return Err(TsioError::Parser(format!(
                "unsupported avcC version {}",
                avcc[0]
            )));
        }

        let profile = avcc[1];
        let level = avcc[3];
        let nal_length_size = (avcc[4] & 0x03) as usize + 1;
        if nal_length_size == 3 {
            return Err(TsioError::Parser("3-byte NAL length prefixes are invalid".into()));
        }

        let mut offset = 5;
        let num_sps = avcc[offset] & 0x1F;
        offset += 1;
        if num_sps == 0 {
            return Err(TsioError::Parser("avcC record carries no SPS".into()));
        }

        let sps = read_parameter_set(avcc, &mut offset, "SPS")?;
        expect_nal_type(&sps, NalType::Sps, "SPS")?;
        for _ in 1..num_sps {
            read_parameter_set(avcc, &mut offset, "SPS")?;
        }

        let num_pps = *avcc
            .get(offset)
            .ok_or_else(|| TsioError::Parser("avcC truncated at PPS count".into()))?;
        offset += 1;
        if num_pps == 0 {
            return Err(TsioError::Parser("avcC record carries no PPS".into()));
        }
        let pps = read_parameter_set(avcc, &mut offset, "PPS")?;
        expect_nal_type(&pps, NalType::Pps, "PPS")?;

        Ok(Self {
            profile,
            level,
            nal_length_size,
            sps,
            pps,
        })
    }

    /// The Annex-B prefix for an IDR access unit: AUD, SPS, PPS, each with
    /// a 4-byte start code.
    pub fn idr_prefix(&self) -> BytesMut {
        let mut buf =
            BytesMut::with_capacity(ACCESS_UNIT_DELIMITER.len() + 8 + self.sps.len() + self.pps.len());
        buf.put_slice(&ACCESS_UNIT_DELIMITER);
        buf.put_slice(&START_CODE);
        buf.put_slice(&self.sps);
        buf.put_slice(&START_CODE);
        buf.put_slice(&self.pps);
        buf
    }

    /// Converts a length-prefixed access unit into Annex-B framing by
    /// replacing every NAL length prefix with a 4-byte start code.
    pub fn to_annex_b(&self, data: &[u8]) -> Result<BytesMut> {
        let mut out = BytesMut::with_capacity(data.len() + 16);
        let mut offset = 0;

        while offset < data.len() {
            if offset + self.nal_length_size > data.len() {
                return Err(TsioError::Parser(
                    "access unit truncated inside a NAL length prefix".into(),
                ));
            }
            let mut nal_len = 0usize;
            for &byte in &data[offset..offset + self.nal_length_size] {
                nal_len = (nal_len << 8) | byte as usize;
            }
            offset += self.nal_length_size;

            if nal_len == 0 || offset + nal_len > data.len() {
                return Err(TsioError::Parser(format!(
                    "NAL length {} exceeds access unit bounds",
                    nal_len
                )));
            }

            out.put_slice(&START_CODE);
            out.put_slice(&data[offset..offset + nal_len]);
            offset += nal_len;
        }

        Ok(out)
    }
}

fn expect_nal_type(data: &[u8], want: NalType, kind: &str) -> Result<()> {
    let header = data
        .first()
        .ok_or_else(|| TsioError::Parser(format!("avcC carries an empty {}", kind)))?;
    if NalType::from_header(*header)? != want {
        return Err(TsioError::Parser(format!(
            "avcC {} entry carries NAL header {:#04x}",
            kind, header
        )));
    }
    Ok(())
}

fn read_parameter_set(avcc: &[u8], offset: &mut usize, kind: &str) -> Result<Vec<u8>> {
    if *offset + 2 > avcc.len() {
        return Err(TsioError::Parser(format!(
            "avcC truncated at {} length",
            kind
        )));
    }
    let len = u16::from_be_bytes([avcc[*offset], avcc[*offset + 1]]) as usize;
    *offset += 2;
    if *offset + len > avcc.len() {
        return Err(TsioError::Parser(format!("avcC truncated at {} data", kind)));
    }
    let data = avcc[*offset..*offset + len].to_vec();
    *offset += len;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h264::types::NalType;

    fn sample_avcc() -> Vec<u8> {
        vec![
            0x01, // configurationVersion
            0x42, // AVCProfileIndication (Baseline)
            0xC0, // profile_compatibility
            0x1E, // AVCLevelIndication (level 3.0)
            0xFF, // lengthSizeMinusOne = 3
            0xE1, // one SPS
            0x00, 0x0A, // SPS length
            0x67, 0x42, 0xC0, 0x1E, 0xD9, 0x00, 0x50, 0x05, 0xBA, 0x10,
            0x01, // one PPS
            0x00, 0x04, // PPS length
            0x68, 0xCE, 0x3C, 0x80,
        ]
    }

    #[test]
    fn test_parse_avcc() {
        let config = AvcConfig::parse(&sample_avcc()).unwrap();
        assert_eq!(config.profile, 0x42);
        assert_eq!(config.level, 0x1E);
        assert_eq!(config.nal_length_size, 4);
        assert_eq!(config.sps.len(), 10);
        assert_eq!(NalType::from_header(config.sps[0]).unwrap(), NalType::Sps);
        assert_eq!(config.pps.len(), 4);
        assert_eq!(NalType::from_header(config.pps[0]).unwrap(), NalType::Pps);
    }

    #[test]
    fn test_parse_rejects_truncated_record() {
        let mut avcc = sample_avcc();
        avcc.truncate(12);
        assert!(AvcConfig::parse(&avcc).is_err());
    }

    #[test]
    fn test_parse_rejects_wrong_parameter_set_type() {
        // corrupt the SPS NAL header into a PPS header
        let mut avcc = sample_avcc();
        avcc[8] = 0x68;
        assert!(AvcConfig::parse(&avcc).is_err());

        // corrupt the PPS NAL header into a slice header
        let mut avcc = sample_avcc();
        avcc[21] = 0x41;
        assert!(AvcConfig::parse(&avcc).is_err());
    }

    #[test]
    fn test_to_annex_b() {
        let config = AvcConfig::parse(&sample_avcc()).unwrap();

        let mut au = Vec::new();
        au.extend_from_slice(&5u32.to_be_bytes());
        au.extend_from_slice(&[0x65, 0x01, 0x02, 0x03, 0x04]);
        au.extend_from_slice(&3u32.to_be_bytes());
        au.extend_from_slice(&[0x41, 0xAA, 0xBB]);

        let annex_b = config.to_annex_b(&au).unwrap();
        assert_eq!(&annex_b[..4], &START_CODE);
        assert_eq!(annex_b[4], 0x65);
        assert_eq!(&annex_b[9..13], &START_CODE);
        assert_eq!(annex_b[13], 0x41);
        assert_eq!(annex_b.len(), au.len());
    }

    #[test]
    fn test_to_annex_b_rejects_bad_length() {
        let config = AvcConfig::parse(&sample_avcc()).unwrap();
        let au = [0x00, 0x00, 0x01, 0x00, 0x65]; // claims 256-byte NAL
        assert!(config.to_annex_b(&au).is_err());
    }

    #[test]
    fn test_idr_prefix_layout() {
        let config = AvcConfig::parse(&sample_avcc()).unwrap();
        let prefix = config.idr_prefix();

        assert_eq!(&prefix[..6], &ACCESS_UNIT_DELIMITER);
        assert_eq!(&prefix[6..10], &START_CODE);
        assert_eq!(prefix[10], 0x67);
        let pps_at = 10 + config.sps.len() + 4;
        assert_eq!(prefix[pps_at], 0x68);
    }
}
