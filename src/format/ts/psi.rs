//! Program Specific Information: PAT/PMT section serialization and the
//! wrapping of sections into transport stream packets.

use super::types::{
    AdaptationControl, Pat, Pmt, TsHeader, PID_PAT, TABLE_ID_PAT, TABLE_ID_PMT, TS_PACKET_SIZE,
};
use crate::utils::crc32_mpeg2;
use bytes::{BufMut, BytesMut};

/// Transport stream id carried in the PAT section header.
const TRANSPORT_STREAM_ID: u16 = 1;
/// Program number carried in the PMT section header.
const PROGRAM_NUMBER: u16 = 1;

/// Builds a complete PAT section, CRC included.
pub fn pat_section(pat: &Pat) -> BytesMut {
    let mut body = BytesMut::new();
    pat.write_to(&mut body);
    build_section(TABLE_ID_PAT, TRANSPORT_STREAM_ID, &body)
}

/// Builds a complete PMT section, CRC included.
pub fn pmt_section(pmt: &Pmt) -> BytesMut {
    let mut body = BytesMut::new();
    pmt.write_to(&mut body);
    build_section(TABLE_ID_PMT, PROGRAM_NUMBER, &body)
}

fn build_section(table_id: u8, table_id_extension: u16, body: &[u8]) -> BytesMut {
    // section_length counts everything after itself: extension (2),
    // version (1), section numbers (2), body, CRC (4)
    let section_length = body.len() + 9;
    debug_assert!(section_length <= 0x3FD);

    let mut section = BytesMut::with_capacity(3 + section_length);
    section.put_u8(table_id);
    section.put_u16(0xB000 | (section_length as u16 & 0x3FF));
    section.put_u16(table_id_extension);
    section.put_u8(0xC1); // version 0, current_next = 1
    section.put_u8(0x00); // section number
    section.put_u8(0x00); // last section number
    section.put_slice(body);

    let crc = crc32_mpeg2(&section);
    section.put_u32(crc);
    section
}

/// Wraps a PSI section into transport stream packets on `pid`.
///
/// The first packet sets `payload_unit_start_indicator` and carries a
/// zero pointer field; unused packet space is stuffed with 0xFF as the
/// PSI rules require (no adaptation field on section packets).
pub fn section_packets(pid: u16, section: &[u8], continuity: &mut u8, out: &mut BytesMut) {
    let mut remaining = section;
    let mut first = true;

    while first || !remaining.is_empty() {
        let mut header = TsHeader::new(pid);
        header.payload_unit_start = first;
        header.adaptation = AdaptationControl::Payload;
        header.continuity_counter = *continuity;
        *continuity = (*continuity + 1) & 0x0F;
        header.write_to(out);

        let mut available = TS_PACKET_SIZE - 4;
        if first {
            out.put_u8(0x00); // pointer field
            available -= 1;
        }

        let chunk = remaining.len().min(available);
        out.put_slice(&remaining[..chunk]);
        remaining = &remaining[chunk..];

        for _ in chunk..available {
            out.put_u8(0xFF);
        }
        first = false;
    }
}

/// Convenience wrapper emitting PAT followed by PMT, the pair every
/// segment opens with.
pub fn program_packets(
    pat: &Pat,
    pmt: &Pmt,
    pmt_pid: u16,
    pat_continuity: &mut u8,
    pmt_continuity: &mut u8,
) -> BytesMut {
    let mut out = BytesMut::with_capacity(2 * TS_PACKET_SIZE);
    section_packets(PID_PAT, &pat_section(pat), pat_continuity, &mut out);
    section_packets(pmt_pid, &pmt_section(pmt), pmt_continuity, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::types::{DEFAULT_PID_PMT, STREAM_TYPE_AAC_ADTS, STREAM_TYPE_H264};

    #[test]
    fn test_pat_section_layout() {
        let section = pat_section(&Pat::single_program(DEFAULT_PID_PMT));

        assert_eq!(section[0], TABLE_ID_PAT);
        let section_length = (u16::from_be_bytes([section[1], section[2]]) & 0x3FF) as usize;
        assert_eq!(section.len(), 3 + section_length);
        // one program: number 1 on PID 4095
        assert_eq!(u16::from_be_bytes([section[8], section[9]]), 1);
        assert_eq!(u16::from_be_bytes([section[10], section[11]]) & 0x1FFF, 4095);
        // CRC over everything before the CRC field verifies
        let crc_offset = section.len() - 4;
        let stored = u32::from_be_bytes([
            section[crc_offset],
            section[crc_offset + 1],
            section[crc_offset + 2],
            section[crc_offset + 3],
        ]);
        assert_eq!(stored, crc32_mpeg2(&section[..crc_offset]));
    }

    #[test]
    fn test_pmt_section_layout() {
        let mut pmt = Pmt {
            pcr_pid: 256,
            streams: Vec::new(),
        };
        pmt.upsert_stream(STREAM_TYPE_H264, 256);
        pmt.upsert_stream(STREAM_TYPE_AAC_ADTS, 257);

        let section = pmt_section(&pmt);

        assert_eq!(section[0], TABLE_ID_PMT);
        assert_eq!(u16::from_be_bytes([section[8], section[9]]) & 0x1FFF, 256);
        // first ES entry directly after the empty program-info loop
        assert_eq!(section[12], STREAM_TYPE_H264);
        assert_eq!(u16::from_be_bytes([section[13], section[14]]) & 0x1FFF, 256);
        assert_eq!(section[17], STREAM_TYPE_AAC_ADTS);
        assert_eq!(u16::from_be_bytes([section[18], section[19]]) & 0x1FFF, 257);
    }

    #[test]
    fn test_section_packets_fit_one_packet() {
        let mut out = BytesMut::new();
        let mut continuity = 0u8;
        let section = pat_section(&Pat::single_program(DEFAULT_PID_PMT));
        section_packets(PID_PAT, &section, &mut continuity, &mut out);

        assert_eq!(out.len(), TS_PACKET_SIZE);
        assert_eq!(out[0], 0x47);
        assert_eq!(out[1] & 0x40, 0x40); // payload unit start
        assert_eq!(out[4], 0x00); // pointer field
        assert_eq!(out[5], TABLE_ID_PAT);
        // stuffing after the section
        assert_eq!(out[5 + section.len()], 0xFF);
        assert_eq!(continuity, 1);
    }

    #[test]
    fn test_long_section_spans_packets() {
        let section = vec![0xAB; 200];
        let mut out = BytesMut::new();
        let mut continuity = 15u8;
        section_packets(0x30, &section, &mut continuity, &mut out);

        assert_eq!(out.len(), 2 * TS_PACKET_SIZE);
        // continuity wraps 15 -> 0
        assert_eq!(out[3] & 0x0F, 15);
        assert_eq!(out[TS_PACKET_SIZE + 3] & 0x0F, 0);
        // second packet has no pointer field and no payload unit start
        assert_eq!(out[TS_PACKET_SIZE + 1] & 0x40, 0);
        assert_eq!(continuity, 1);
    }
}
