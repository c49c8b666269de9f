//! Fragmentation of PES packets into 188-byte transport stream packets.

use super::types::{encode_pcr, AdaptationControl, TsHeader, TS_HEADER_SIZE, TS_PACKET_SIZE};
use bytes::{BufMut, BytesMut};

/// Adaptation field content for the first packet of a PES.
#[derive(Debug, Clone, Copy, Default)]
struct AdaptationFlags {
    random_access: bool,
    pcr: Option<u64>,
}

impl AdaptationFlags {
    fn any(&self) -> bool {
        self.random_access || self.pcr.is_some()
    }

    /// Bytes occupied by the flags byte and optional PCR (the length byte
    /// itself not included).
    fn body_len(&self) -> usize {
        1 + if self.pcr.is_some() { 6 } else { 0 }
    }
}

/// Splits `pes` into transport stream packets on `pid`, appending them to
/// `out`.
///
/// The first packet sets `payload_unit_start_indicator`; `pcr` and
/// `random_access` ride in its adaptation field. The continuity counter is
/// used then incremented (mod 16) for every payload-carrying packet, so a
/// fresh counter starts the stream at zero. Short final payloads are
/// padded through adaptation field stuffing (0xFF), keeping every packet
/// at exactly 188 bytes.
pub fn packetize(
    pid: u16,
    pes: &[u8],
    continuity: &mut u8,
    pcr: Option<u64>,
    random_access: bool,
    out: &mut BytesMut,
) {
    let flags = AdaptationFlags {
        random_access,
        pcr,
    };

    if pes.is_empty() {
        // nothing to carry, but PCR/RAI may still need a packet of their own
        if flags.any() {
            write_packet(pid, &[], false, flags, *continuity, out);
        }
        return;
    }

    let mut remaining = pes;
    let mut first = true;

    while !remaining.is_empty() {
        let af = if first { flags } else { AdaptationFlags::default() };
        let reserved = if af.any() { 1 + af.body_len() } else { 0 };
        let capacity = TS_PACKET_SIZE - TS_HEADER_SIZE - reserved;
        let chunk = remaining.len().min(capacity);

        write_packet(pid, &remaining[..chunk], first, af, *continuity, out);
        *continuity = (*continuity + 1) & 0x0F;

        remaining = &remaining[chunk..];
        first = false;
    }
}

/// Emits one 188-byte packet carrying `payload`, stuffing the gap through
/// the adaptation field.
fn write_packet(
    pid: u16,
    payload: &[u8],
    payload_unit_start: bool,
    flags: AdaptationFlags,
    continuity: u8,
    out: &mut BytesMut,
) {
    let body = TS_PACKET_SIZE - TS_HEADER_SIZE;
    let af_total = body - payload.len();

    let mut header = TsHeader::new(pid);
    header.payload_unit_start = payload_unit_start;
    header.continuity_counter = continuity;
    header.adaptation = match (af_total > 0, payload.is_empty()) {
        (false, _) => AdaptationControl::Payload,
        (true, false) => AdaptationControl::AdaptationAndPayload,
        (true, true) => AdaptationControl::AdaptationOnly,
    };
    header.write_to(out);

    if af_total > 0 {
        out.put_u8((af_total - 1) as u8);
        if af_total > 1 {
            let mut af_flags = 0u8;
            if flags.random_access {
                af_flags |= 0x40;
            }
            if flags.pcr.is_some() {
                af_flags |= 0x10;
            }
            out.put_u8(af_flags);
            if let Some(ticks) = flags.pcr {
                out.put_slice(&encode_pcr(ticks));
            }
            let stuffing = af_total - 1 - flags.body_len();
            for _ in 0..stuffing {
                out.put_u8(0xFF);
            }
        }
    }

    out.put_slice(payload);
    debug_assert_eq!(out.len() % TS_PACKET_SIZE, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packets(buf: &BytesMut) -> Vec<&[u8]> {
        assert_eq!(buf.len() % TS_PACKET_SIZE, 0);
        buf.chunks(TS_PACKET_SIZE).collect()
    }

    #[test]
    fn test_large_pes_fragments_cleanly() {
        let pes = vec![0x55u8; 600];
        let mut out = BytesMut::new();
        let mut continuity = 0u8;

        packetize(256, &pes, &mut continuity, None, false, &mut out);

        let packets = packets(&out);
        assert_eq!(packets.len(), 4); // 184 * 3 = 552, remainder 48
        for (i, packet) in packets.iter().enumerate() {
            assert_eq!(packet[0], 0x47);
            assert_eq!(packet[3] & 0x0F, i as u8);
            let pusi = packet[1] & 0x40 != 0;
            assert_eq!(pusi, i == 0);
        }
        assert_eq!(continuity, 4);

        // the final packet pads with adaptation stuffing before its 48 payload bytes
        let last = packets[3];
        assert_eq!(last[3] >> 4, 0b11);
        assert_eq!(last[4] as usize, 184 - 48 - 1);
        assert_eq!(last[6], 0xFF);
        assert_eq!(&last[TS_PACKET_SIZE - 48..], &pes[552..]);
    }

    #[test]
    fn test_exact_fit_has_no_adaptation() {
        let pes = vec![0xAAu8; 184];
        let mut out = BytesMut::new();
        let mut continuity = 0u8;

        packetize(257, &pes, &mut continuity, None, false, &mut out);

        let packets = packets(&out);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0][3] >> 4, 0b01);
        assert_eq!(&packets[0][4..], &pes[..]);
    }

    #[test]
    fn test_pcr_rides_first_packet() {
        let pes = vec![0x11u8; 400];
        let mut out = BytesMut::new();
        let mut continuity = 0u8;

        packetize(256, &pes, &mut continuity, Some(27_000_000), true, &mut out);

        let packets = packets(&out);
        let first = packets[0];
        assert_eq!(first[3] >> 4, 0b11);
        assert_eq!(first[4], 7); // flags + 6-byte PCR
        assert_eq!(first[5], 0x50); // random access + PCR flag
        // PCR base = 90000 (one second)
        let base = (first[6] as u64) << 25
            | (first[7] as u64) << 17
            | (first[8] as u64) << 9
            | (first[9] as u64) << 1
            | (first[10] as u64) >> 7;
        assert_eq!(base, 90_000);

        // later packets carry payload only
        assert_eq!(packets[1][3] >> 4, 0b01);
    }

    #[test]
    fn test_single_byte_stuffing() {
        // payload of 183 forces a one-byte adaptation field (length 0)
        let pes = vec![0x22u8; 183];
        let mut out = BytesMut::new();
        let mut continuity = 0u8;

        packetize(256, &pes, &mut continuity, None, false, &mut out);

        let packets = packets(&out);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0][3] >> 4, 0b11);
        assert_eq!(packets[0][4], 0);
        assert_eq!(&packets[0][5..], &pes[..]);
    }

    #[test]
    fn test_empty_pes_with_pcr_emits_adaptation_only() {
        let mut out = BytesMut::new();
        let mut continuity = 3u8;

        packetize(256, &[], &mut continuity, Some(0), false, &mut out);

        let packets = packets(&out);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0][3] >> 4, 0b10);
        assert_eq!(packets[0][4], 183);
        // no payload present, counter untouched
        assert_eq!(continuity, 3);
    }

    #[test]
    fn test_random_access_without_pcr() {
        let pes = vec![0x33u8; 10];
        let mut out = BytesMut::new();
        let mut continuity = 0u8;

        packetize(257, &pes, &mut continuity, None, true, &mut out);

        let first = &out[..TS_PACKET_SIZE];
        assert_eq!(first[3] >> 4, 0b11);
        assert_eq!(first[5] & 0x40, 0x40);
        assert_eq!(first[5] & 0x10, 0);
    }
}
