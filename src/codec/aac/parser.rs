use super::types::{AacConfig, AudioObjectType};
use crate::utils::BitReader;
use crate::{Result, TsioError};

/// Parses a raw AudioSpecificConfig (ISO/IEC 14496-3) into an [`AacConfig`].
///
/// Only the leading fields are consumed: audioObjectType (5 bits),
/// samplingFrequencyIndex (4 bits) and channelConfiguration (4 bits).
/// Extension payloads such as SBR signalling are ignored; escape-coded
/// object types and explicit sampling frequencies are rejected since no
/// ADTS header can describe them.
pub fn parse_audio_specific_config(data: &[u8]) -> Result<AacConfig> {
    if data.len() < 2 {
        return Err(TsioError::Parser("AudioSpecificConfig too short".into()));
    }

    let mut reader = BitReader::new(data);

    let object_type_raw = reader.read_bits(5)? as u8;
    if object_type_raw == 31 {
        return Err(TsioError::Parser(
            "escape-coded AAC object types are not supported".into(),
        ));
    }
    let object_type = AudioObjectType::from_u8(object_type_raw)?;

    let sample_rate_index = reader.read_bits(4)? as u8;
    if sample_rate_index == 15 {
        return Err(TsioError::Parser(
            "explicit sampling frequency is not supported".into(),
        ));
    }

    let channel_configuration = reader.read_bits(4)? as u8;
    if channel_configuration == 0 || channel_configuration > 7 {
        return Err(TsioError::Parser(format!(
            "unsupported AAC channel configuration {}",
            channel_configuration
        )));
    }

    let config = AacConfig {
        object_type,
        sample_rate_index,
        channel_configuration,
        frame_length: 1024,
    };
    if config.sample_rate().is_none() {
        return Err(TsioError::Parser(format!(
            "reserved AAC sampling frequency index {}",
            sample_rate_index
        )));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lc_44100_stereo() {
        // AAC-LC, 44.1 kHz, stereo
        let config = parse_audio_specific_config(&[0x12, 0x10]).unwrap();
        assert_eq!(config.object_type, AudioObjectType::Lc);
        assert_eq!(config.sample_rate_index, 4);
        assert_eq!(config.channel_configuration, 2);
        assert_eq!(config.sample_rate(), Some(44100));
    }

    #[test]
    fn test_parse_lc_48000_stereo() {
        // (2 << 3) | (3 >> 1) = 0x11, ((3 & 1) << 7) | (2 << 3) = 0x90
        let config = parse_audio_specific_config(&[0x11, 0x90]).unwrap();
        assert_eq!(config.object_type, AudioObjectType::Lc);
        assert_eq!(config.sample_rate(), Some(48000));
        assert_eq!(config.channel_configuration, 2);
    }

    #[test]
    fn test_parse_rejects_short_input() {
        assert!(parse_audio_specific_config(&[0x12]).is_err());
    }

    #[test]
    fn test_parse_rejects_explicit_frequency() {
        // samplingFrequencyIndex = 15 escapes into a 24-bit frequency
        assert!(parse_audio_specific_config(&[0x17, 0x80, 0x00, 0x00]).is_err());
    }
}
