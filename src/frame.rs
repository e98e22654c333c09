//! MBAP framing for Modbus TCP.
//!
//! Every Modbus TCP frame is a 7-byte MBAP header followed by a PDU
//! (function code plus payload). All header fields are big-endian. The
//! `length` field counts the bytes following it, i.e. the unit id plus
//! the PDU.

/// MBAP header size in bytes (transaction, protocol, length, unit id)
pub const MBAP_HEADER_LEN: usize = 7;

/// Maximum PDU size (function code + payload)
pub const MAX_PDU_LEN: usize = 253;

/// Maximum Modbus TCP frame size (MBAP header + PDU)
pub const MAX_TCP_FRAME_LEN: usize = 260;

/// Parsed MBAP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    /// Echoed verbatim in the response
    pub transaction_id: u16,
    /// Must be 0x0000 for Modbus
    pub protocol_id: u16,
    /// Byte count following this field (unit id + PDU)
    pub length: u16,
    /// Slave address, 0 is broadcast
    pub unit_id: u8,
}

impl MbapHeader {
    /// Parse an MBAP header from the start of `buf`
    ///
    /// Returns `None` if fewer than 7 bytes are available. No field
    /// validation happens here; the engine decides what to accept.
    pub fn parse(buf: &[u8]) -> Option<MbapHeader> {
        if buf.len() < MBAP_HEADER_LEN {
            return None;
        }

        Some(MbapHeader {
            transaction_id: u16::from_be_bytes([buf[0], buf[1]]),
            protocol_id: u16::from_be_bytes([buf[2], buf[3]]),
            length: u16::from_be_bytes([buf[4], buf[5]]),
            unit_id: buf[6],
        })
    }

    /// Append this header to `out`
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.transaction_id.to_be_bytes());
        out.extend_from_slice(&self.protocol_id.to_be_bytes());
        out.extend_from_slice(&self.length.to_be_bytes());
        out.push(self.unit_id);
    }

    /// Total frame size this header declares, including the 6 bytes
    /// preceding the length field
    pub fn frame_len(&self) -> usize {
        6 + self.length as usize
    }
}

/// Build a complete response frame around `pdu`
///
/// The transaction id and unit id are echoed from the request; the
/// protocol id is always 0 and the length is rewritten to cover the
/// unit id plus the PDU.
pub fn build_response(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let header = MbapHeader {
        transaction_id,
        protocol_id: 0,
        length: (1 + pdu.len()) as u16,
        unit_id,
    };

    let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
    header.write(&mut frame);
    frame.extend_from_slice(pdu);
    frame
}
