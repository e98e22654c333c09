//! Request validation, dispatch and response construction.
//!
//! The engine consumes one candidate frame and produces either a
//! complete response frame or nothing. Malformed MBAP envelopes (short
//! frame, nonzero protocol id, foreign unit id) are dropped without a
//! reply; everything else gets either a normal response or an exception
//! PDU with the function byte OR-ed with 0x80.

use std::sync::Arc;

use log::{debug, warn};

use crate::error::ModsimError;
use crate::frame::{build_response, MbapHeader, MBAP_HEADER_LEN};
use crate::protocol::{ExceptionCode, FunctionCode};
use crate::store::RegisterStore;
use crate::utils::bytes_to_hex;
use crate::{MAX_READ_BITS, MAX_READ_WORDS, MAX_WRITE_BITS, MAX_WRITE_WORDS};

/// Stateless per-request processor shared by all client handlers
#[derive(Debug)]
pub struct ProtocolEngine {
    unit_id: u8,
    store: Arc<RegisterStore>,
}

impl ProtocolEngine {
    /// Create an engine answering for `unit_id` against `store`
    pub fn new(unit_id: u8, store: Arc<RegisterStore>) -> Self {
        Self { unit_id, store }
    }

    /// Process one frame; `None` means silent drop
    pub fn process(&self, frame: &[u8]) -> Option<Vec<u8>> {
        // MBAP plus at least the function byte
        if frame.len() < MBAP_HEADER_LEN + 1 {
            return None;
        }

        let header = MbapHeader::parse(frame)?;
        if header.protocol_id != 0 {
            debug!("dropping frame with protocol id 0x{:04X}", header.protocol_id);
            return None;
        }

        // Unit 0 is broadcast; on TCP it is answered like a direct hit.
        if header.unit_id != 0 && header.unit_id != self.unit_id {
            debug!(
                "dropping frame for unit {} (configured {})",
                header.unit_id, self.unit_id
            );
            return None;
        }

        let fc = frame[MBAP_HEADER_LEN];
        let payload = &frame[MBAP_HEADER_LEN + 1..];

        let result = match FunctionCode::from_u8(fc) {
            Some(FunctionCode::ReadCoils) => self.read_bits(payload, false),
            Some(FunctionCode::ReadDiscreteInputs) => self.read_bits(payload, true),
            Some(FunctionCode::ReadHoldingRegisters) => self.read_words(payload, false),
            Some(FunctionCode::ReadInputRegisters) => self.read_words(payload, true),
            Some(FunctionCode::WriteSingleCoil) => self.write_single_coil(payload),
            Some(FunctionCode::WriteSingleRegister) => self.write_single_register(payload),
            Some(FunctionCode::WriteMultipleCoils) => self.write_multiple_coils(payload),
            Some(FunctionCode::WriteMultipleRegisters) => self.write_multiple_registers(payload),
            None => {
                warn!("unsupported function code 0x{:02X}", fc);
                Err(ExceptionCode::IllegalFunction)
            }
        };

        let pdu = match result {
            Ok(body) => {
                let mut pdu = Vec::with_capacity(1 + body.len());
                pdu.push(fc);
                pdu.extend_from_slice(&body);
                pdu
            }
            Err(code) => {
                debug!(
                    "exception {} for request {}",
                    code,
                    bytes_to_hex(&frame[MBAP_HEADER_LEN..])
                );
                vec![fc | 0x80, code.to_u8()]
            }
        };

        Some(build_response(header.transaction_id, header.unit_id, &pdu))
    }

    /// FC 0x01 / 0x02: start + quantity in, byte count + packed bits out
    fn read_bits(&self, payload: &[u8], discrete: bool) -> Result<Vec<u8>, ExceptionCode> {
        let (start, quantity) = parse_span(payload)?;
        if quantity == 0 || quantity > MAX_READ_BITS {
            return Err(ExceptionCode::IllegalDataValue);
        }

        let read = if discrete {
            self.store.read_discrete(start, quantity)
        } else {
            self.store.read_coils(start, quantity)
        };
        let packed = read.map_err(store_exception)?;

        let mut body = Vec::with_capacity(1 + packed.len());
        body.push(packed.len() as u8);
        body.extend_from_slice(&packed);
        Ok(body)
    }

    /// FC 0x03 / 0x04: start + quantity in, byte count + words out
    fn read_words(&self, payload: &[u8], input: bool) -> Result<Vec<u8>, ExceptionCode> {
        let (start, quantity) = parse_span(payload)?;
        if quantity == 0 || quantity > MAX_READ_WORDS {
            return Err(ExceptionCode::IllegalDataValue);
        }

        let read = if input {
            self.store.read_input(start, quantity)
        } else {
            self.store.read_holding(start, quantity)
        };
        let words = read.map_err(store_exception)?;

        let mut body = Vec::with_capacity(1 + words.len());
        body.push(words.len() as u8);
        body.extend_from_slice(&words);
        Ok(body)
    }

    /// FC 0x05: the value must be 0x0000 or 0xFF00; the reply echoes the
    /// request body
    fn write_single_coil(&self, payload: &[u8]) -> Result<Vec<u8>, ExceptionCode> {
        let (addr, value) = parse_span(payload)?;
        let state = match value {
            0x0000 => false,
            0xFF00 => true,
            _ => return Err(ExceptionCode::IllegalDataValue),
        };

        self.store.write_coil(addr, state).map_err(store_exception)?;
        Ok(payload[..4].to_vec())
    }

    /// FC 0x06: echo reply
    fn write_single_register(&self, payload: &[u8]) -> Result<Vec<u8>, ExceptionCode> {
        let (addr, value) = parse_span(payload)?;
        self.store.write_register(addr, value).map_err(store_exception)?;
        Ok(payload[..4].to_vec())
    }

    /// FC 0x0F: start, quantity, byte count, packed bits; replies with
    /// start and quantity
    fn write_multiple_coils(&self, payload: &[u8]) -> Result<Vec<u8>, ExceptionCode> {
        let (start, quantity) = parse_span(payload)?;
        if payload.len() < 5 {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let byte_count = payload[4] as usize;

        if quantity == 0
            || quantity > MAX_WRITE_BITS
            || byte_count != (quantity as usize + 7) / 8
            || payload.len() < 5 + byte_count
        {
            return Err(ExceptionCode::IllegalDataValue);
        }

        self.store
            .write_coils(start, quantity, &payload[5..5 + byte_count])
            .map_err(store_exception)?;
        Ok(payload[..4].to_vec())
    }

    /// FC 0x10: start, quantity, byte count, words; replies with start
    /// and quantity
    fn write_multiple_registers(&self, payload: &[u8]) -> Result<Vec<u8>, ExceptionCode> {
        let (start, quantity) = parse_span(payload)?;
        if payload.len() < 5 {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let byte_count = payload[4] as usize;

        if quantity == 0
            || quantity > MAX_WRITE_WORDS
            || byte_count != quantity as usize * 2
            || payload.len() < 5 + byte_count
        {
            return Err(ExceptionCode::IllegalDataValue);
        }

        self.store
            .write_registers(start, quantity, &payload[5..5 + byte_count])
            .map_err(store_exception)?;
        Ok(payload[..4].to_vec())
    }
}

/// Pull the leading address/quantity (or address/value) pair
fn parse_span(payload: &[u8]) -> Result<(u16, u16), ExceptionCode> {
    if payload.len() < 4 {
        return Err(ExceptionCode::IllegalDataValue);
    }
    Ok((
        u16::from_be_bytes([payload[0], payload[1]]),
        u16::from_be_bytes([payload[2], payload[3]]),
    ))
}

/// Map a store failure onto the wire exception
fn store_exception(err: ModsimError) -> ExceptionCode {
    match err {
        ModsimError::OutOfRange { .. } => ExceptionCode::IllegalDataAddress,
        _ => ExceptionCode::IllegalDataValue,
    }
}
