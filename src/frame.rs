//! Modbus TCP (MBAP) frame codec
//!
//! An MBAP frame is a 6-byte header (transaction id, protocol id, length)
//! followed by the unit id and the PDU; the length field counts the unit id
//! plus the PDU. Decoding is incremental: callers accumulate socket bytes in
//! a buffer and retry until a full frame is available.

use crate::constants::{MAX_MBAP_LENGTH, MBAP_HEADER_LEN, MIN_MBAP_LENGTH};
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::ModbusPdu;

/// A decoded Modbus TCP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpFrame {
    /// Transaction identifier, echoed from request to response
    pub transaction_id: u16,
    /// Unit identifier (slave address on the far side of a gateway)
    pub unit_id: u8,
    /// Protocol data unit
    pub pdu: ModbusPdu,
}

impl TcpFrame {
    /// Create a frame carrying the given PDU
    pub fn new(transaction_id: u16, unit_id: u8, pdu: ModbusPdu) -> Self {
        Self {
            transaction_id,
            unit_id,
            pdu,
        }
    }
}

/// Decode one frame from the front of `buf`.
///
/// Returns `Ok(Some((frame, consumed)))` when a complete frame is available,
/// `Ok(None)` when more bytes are needed (caller buffers and retries), and
/// `Err` when the header is malformed — the connection must be closed, no
/// response sent.
pub fn decode(buf: &[u8]) -> ModbusResult<Option<(TcpFrame, usize)>> {
    if buf.len() < MBAP_HEADER_LEN {
        return Ok(None);
    }

    let transaction_id = u16::from_be_bytes([buf[0], buf[1]]);
    let protocol_id = u16::from_be_bytes([buf[2], buf[3]]);
    let length = u16::from_be_bytes([buf[4], buf[5]]) as usize;

    if protocol_id != 0 {
        return Err(ModbusError::frame(format!(
            "protocol id {protocol_id} is not Modbus"
        )));
    }
    if !(MIN_MBAP_LENGTH..=MAX_MBAP_LENGTH).contains(&length) {
        return Err(ModbusError::frame(format!(
            "declared length {length} outside [{MIN_MBAP_LENGTH}, {MAX_MBAP_LENGTH}]"
        )));
    }

    let total = MBAP_HEADER_LEN + length;
    if buf.len() < total {
        return Ok(None);
    }

    let unit_id = buf[MBAP_HEADER_LEN];
    let pdu = ModbusPdu::from_slice(&buf[MBAP_HEADER_LEN + 1..total])?;

    Ok(Some((
        TcpFrame {
            transaction_id,
            unit_id,
            pdu,
        },
        total,
    )))
}

/// Encode a frame into wire bytes, computing the length field from the PDU.
pub fn encode(frame: &TcpFrame) -> Vec<u8> {
    let length = (1 + frame.pdu.len()) as u16;
    let mut out = Vec::with_capacity(MBAP_HEADER_LEN + length as usize);

    out.extend_from_slice(&frame.transaction_id.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&length.to_be_bytes());
    out.push(frame.unit_id);
    out.extend_from_slice(frame.pdu.as_slice());

    out
}
