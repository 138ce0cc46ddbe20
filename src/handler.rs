//! Request handler: PDU in, PDU out
//!
//! Stateless dispatch of one request PDU against the register store. The
//! validation ladder follows the Modbus specification: function code, then
//! payload shape, then quantity range, then store bounds and access. Every
//! failure maps to a standards-compliant exception PDU; nothing here closes
//! the connection.

use tracing::{debug, warn};

use crate::constants::{
    EXCEPTION_ILLEGAL_DATA_ADDRESS, EXCEPTION_ILLEGAL_DATA_VALUE, EXCEPTION_ILLEGAL_FUNCTION,
    FC_READ_COILS, FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL,
    FC_WRITE_SINGLE_REGISTER, MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS,
    MAX_WRITE_REGISTERS,
};
use crate::pdu::{ModbusPdu, PduBuilder};
use crate::store::{RegisterSpace, RegisterStore, StoreError};

/// Process one request PDU and produce the response PDU.
///
/// Always returns a PDU; protocol errors become exception responses and the
/// connection stays open. Only the connection manager decides to hang up.
pub fn handle_request(request: &ModbusPdu, store: &RegisterStore) -> ModbusPdu {
    let Some(fc) = request.function_code() else {
        // An empty PDU cannot name a function; answer as an unknown one
        return PduBuilder::build_exception(0, EXCEPTION_ILLEGAL_FUNCTION);
    };
    let payload = &request.as_slice()[1..];

    debug!(
        "Handling request: FC={:02X} ({}), payload_len={}",
        fc,
        ModbusPdu::function_code_description(fc),
        payload.len()
    );

    match fc {
        FC_READ_COILS => read_bits(fc, payload, store, RegisterSpace::Coil),
        FC_READ_DISCRETE_INPUTS => read_bits(fc, payload, store, RegisterSpace::Discrete),
        FC_READ_HOLDING_REGISTERS => read_registers(fc, payload, store, RegisterSpace::Holding),
        FC_READ_INPUT_REGISTERS => read_registers(fc, payload, store, RegisterSpace::Input),
        FC_WRITE_SINGLE_COIL => write_single_coil(fc, payload, store),
        FC_WRITE_SINGLE_REGISTER => write_single_register(fc, payload, store),
        FC_WRITE_MULTIPLE_COILS => write_multiple_coils(fc, payload, store),
        FC_WRITE_MULTIPLE_REGISTERS => write_multiple_registers(fc, payload, store),
        _ => {
            warn!("Unsupported function code: 0x{:02X}", fc);
            PduBuilder::build_exception(fc, EXCEPTION_ILLEGAL_FUNCTION)
        }
    }
}

/// Map a store error to the exception PDU the client sees
fn store_exception(fc: u8, err: StoreError) -> ModbusPdu {
    let code = match err {
        StoreError::OutOfRange { .. } => EXCEPTION_ILLEGAL_DATA_ADDRESS,
        StoreError::ReadOnly { .. } => EXCEPTION_ILLEGAL_FUNCTION,
        // Already logged at error level by the store; the client sees a
        // plain data-value exception
        StoreError::SourceContract { .. } => EXCEPTION_ILLEGAL_DATA_VALUE,
    };
    PduBuilder::build_exception(fc, code)
}

/// Infallible in practice: response sizes are bounded by the quantity limits
fn built(pdu: crate::error::ModbusResult<ModbusPdu>, fc: u8) -> ModbusPdu {
    pdu.unwrap_or_else(|_| PduBuilder::build_exception(fc, EXCEPTION_ILLEGAL_DATA_VALUE))
}

fn read_registers(fc: u8, payload: &[u8], store: &RegisterStore, space: RegisterSpace) -> ModbusPdu {
    if payload.len() != 4 {
        return PduBuilder::build_exception(fc, EXCEPTION_ILLEGAL_DATA_VALUE);
    }
    let address = u16::from_be_bytes([payload[0], payload[1]]);
    let quantity = u16::from_be_bytes([payload[2], payload[3]]);

    if quantity == 0 || quantity > MAX_READ_REGISTERS {
        return PduBuilder::build_exception(fc, EXCEPTION_ILLEGAL_DATA_VALUE);
    }

    match store.read(space, address, quantity) {
        Ok(values) => built(PduBuilder::build_read_registers_response(fc, &values), fc),
        Err(err) => store_exception(fc, err),
    }
}

fn read_bits(fc: u8, payload: &[u8], store: &RegisterStore, space: RegisterSpace) -> ModbusPdu {
    if payload.len() != 4 {
        return PduBuilder::build_exception(fc, EXCEPTION_ILLEGAL_DATA_VALUE);
    }
    let address = u16::from_be_bytes([payload[0], payload[1]]);
    let quantity = u16::from_be_bytes([payload[2], payload[3]]);

    if quantity == 0 || quantity > MAX_READ_COILS {
        return PduBuilder::build_exception(fc, EXCEPTION_ILLEGAL_DATA_VALUE);
    }

    match store.read(space, address, quantity) {
        Ok(values) => {
            let bits: Vec<bool> = values.iter().map(|&v| v != 0).collect();
            built(PduBuilder::build_read_bits_response(fc, &bits), fc)
        }
        Err(err) => store_exception(fc, err),
    }
}

fn write_single_coil(fc: u8, payload: &[u8], store: &RegisterStore) -> ModbusPdu {
    if payload.len() != 4 {
        return PduBuilder::build_exception(fc, EXCEPTION_ILLEGAL_DATA_VALUE);
    }
    let address = u16::from_be_bytes([payload[0], payload[1]]);
    let raw = u16::from_be_bytes([payload[2], payload[3]]);

    // Only 0xFF00 (ON) and 0x0000 (OFF) are defined
    let bit = match raw {
        0xFF00 => 1,
        0x0000 => 0,
        _ => return PduBuilder::build_exception(fc, EXCEPTION_ILLEGAL_DATA_VALUE),
    };

    match store.write(RegisterSpace::Coil, address, &[bit]) {
        Ok(()) => built(PduBuilder::build_write_echo(fc, address, raw), fc),
        Err(err) => store_exception(fc, err),
    }
}

fn write_single_register(fc: u8, payload: &[u8], store: &RegisterStore) -> ModbusPdu {
    if payload.len() != 4 {
        return PduBuilder::build_exception(fc, EXCEPTION_ILLEGAL_DATA_VALUE);
    }
    let address = u16::from_be_bytes([payload[0], payload[1]]);
    let value = u16::from_be_bytes([payload[2], payload[3]]);

    match store.write(RegisterSpace::Holding, address, &[value]) {
        Ok(()) => built(PduBuilder::build_write_echo(fc, address, value), fc),
        Err(err) => store_exception(fc, err),
    }
}

fn write_multiple_registers(fc: u8, payload: &[u8], store: &RegisterStore) -> ModbusPdu {
    if payload.len() < 5 {
        return PduBuilder::build_exception(fc, EXCEPTION_ILLEGAL_DATA_VALUE);
    }
    let address = u16::from_be_bytes([payload[0], payload[1]]);
    let quantity = u16::from_be_bytes([payload[2], payload[3]]);
    let byte_count = payload[4] as usize;

    if quantity == 0
        || quantity > MAX_WRITE_REGISTERS
        || byte_count != quantity as usize * 2
        || payload.len() != 5 + byte_count
    {
        return PduBuilder::build_exception(fc, EXCEPTION_ILLEGAL_DATA_VALUE);
    }

    let values: Vec<u16> = payload[5..]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    match store.write(RegisterSpace::Holding, address, &values) {
        Ok(()) => built(PduBuilder::build_write_echo(fc, address, quantity), fc),
        Err(err) => store_exception(fc, err),
    }
}

fn write_multiple_coils(fc: u8, payload: &[u8], store: &RegisterStore) -> ModbusPdu {
    if payload.len() < 5 {
        return PduBuilder::build_exception(fc, EXCEPTION_ILLEGAL_DATA_VALUE);
    }
    let address = u16::from_be_bytes([payload[0], payload[1]]);
    let quantity = u16::from_be_bytes([payload[2], payload[3]]);
    let byte_count = payload[4] as usize;

    if quantity == 0
        || quantity > MAX_WRITE_COILS
        || byte_count != (quantity as usize).div_ceil(8)
        || payload.len() != 5 + byte_count
    {
        return PduBuilder::build_exception(fc, EXCEPTION_ILLEGAL_DATA_VALUE);
    }

    // Unpack LSB-first
    let bits: Vec<u16> = (0..quantity as usize)
        .map(|i| {
            let byte = payload[5 + i / 8];
            u16::from(byte >> (i % 8) & 1)
        })
        .collect();

    match store.write(RegisterSpace::Coil, address, &bits) {
        Ok(()) => built(PduBuilder::build_write_echo(fc, address, quantity), fc),
        Err(err) => store_exception(fc, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use crate::store::Block;
    use std::sync::Arc;

    fn store() -> RegisterStore {
        RegisterStore::new()
            .with_block(
                RegisterSpace::Holding,
                Block::new(100, 10, Arc::new(StaticSource::new((1..=10).collect()))),
            )
            .with_block(
                RegisterSpace::Input,
                Block::new(100, 10, Arc::new(StaticSource::filled(10, 0x00FF))),
            )
            .with_block(
                RegisterSpace::Coil,
                Block::new(0, 16, Arc::new(StaticSource::filled(16, 0))),
            )
            .with_block(
                RegisterSpace::Discrete,
                Block::new(0, 16, Arc::new(StaticSource::new(vec![1; 16]))),
            )
    }

    fn request(bytes: &[u8]) -> ModbusPdu {
        ModbusPdu::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_read_holding_registers() {
        let response = handle_request(&request(&[0x03, 0x00, 0x64, 0x00, 0x03]), &store());
        assert_eq!(response.as_slice(), &[0x03, 0x06, 0, 1, 0, 2, 0, 3]);
    }

    #[test]
    fn test_read_input_registers() {
        let response = handle_request(&request(&[0x04, 0x00, 0x64, 0x00, 0x02]), &store());
        assert_eq!(response.as_slice(), &[0x04, 0x04, 0x00, 0xFF, 0x00, 0xFF]);
    }

    #[test]
    fn test_read_coils_and_discrete() {
        let response = handle_request(&request(&[0x01, 0x00, 0x00, 0x00, 0x09]), &store());
        assert_eq!(response.as_slice(), &[0x01, 0x02, 0x00, 0x00]);

        let response = handle_request(&request(&[0x02, 0x00, 0x00, 0x00, 0x09]), &store());
        assert_eq!(response.as_slice(), &[0x02, 0x02, 0xFF, 0x01]);
    }

    #[test]
    fn test_write_single_register_echoes() {
        let store = store();
        let response = handle_request(&request(&[0x06, 0x00, 0x65, 0x12, 0x34]), &store);
        assert_eq!(response.as_slice(), &[0x06, 0x00, 0x65, 0x12, 0x34]);

        let read = handle_request(&request(&[0x03, 0x00, 0x65, 0x00, 0x01]), &store);
        assert_eq!(read.as_slice(), &[0x03, 0x02, 0x12, 0x34]);
    }

    #[test]
    fn test_write_single_coil() {
        let store = store();
        let response = handle_request(&request(&[0x05, 0x00, 0x03, 0xFF, 0x00]), &store);
        assert_eq!(response.as_slice(), &[0x05, 0x00, 0x03, 0xFF, 0x00]);

        let read = handle_request(&request(&[0x01, 0x00, 0x00, 0x00, 0x08]), &store);
        assert_eq!(read.as_slice(), &[0x01, 0x01, 0x08]);

        // Any value other than 0xFF00/0x0000 is malformed
        let response = handle_request(&request(&[0x05, 0x00, 0x03, 0x12, 0x34]), &store);
        assert_eq!(response.as_slice(), &[0x85, 0x03]);
    }

    #[test]
    fn test_write_multiple_registers() {
        let store = store();
        let response = handle_request(
            &request(&[0x10, 0x00, 0x66, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x00, 0x0B]),
            &store,
        );
        assert_eq!(response.as_slice(), &[0x10, 0x00, 0x66, 0x00, 0x02]);

        let read = handle_request(&request(&[0x03, 0x00, 0x66, 0x00, 0x02]), &store);
        assert_eq!(read.as_slice(), &[0x03, 0x04, 0x00, 0x0A, 0x00, 0x0B]);
    }

    #[test]
    fn test_write_multiple_coils() {
        let store = store();
        let response = handle_request(
            &request(&[0x0F, 0x00, 0x00, 0x00, 0x0A, 0x02, 0b0100_1101, 0b0000_0011]),
            &store,
        );
        assert_eq!(response.as_slice(), &[0x0F, 0x00, 0x00, 0x00, 0x0A]);

        let read = handle_request(&request(&[0x01, 0x00, 0x00, 0x00, 0x0A]), &store);
        assert_eq!(read.as_slice(), &[0x01, 0x02, 0b0100_1101, 0b0000_0011]);
    }

    #[test]
    fn test_unknown_function_code() {
        let response = handle_request(&request(&[0x2B, 0x0E, 0x01, 0x00]), &store());
        assert_eq!(response.as_slice(), &[0xAB, 0x01]);
    }

    #[test]
    fn test_bad_payload_shape() {
        // Truncated read request
        let response = handle_request(&request(&[0x03, 0x00, 0x64, 0x00]), &store());
        assert_eq!(response.as_slice(), &[0x83, 0x03]);

        // Oversized read request
        let response = handle_request(&request(&[0x03, 0x00, 0x64, 0x00, 0x01, 0x00]), &store());
        assert_eq!(response.as_slice(), &[0x83, 0x03]);

        // FC16 byte count disagrees with quantity
        let response = handle_request(
            &request(&[0x10, 0x00, 0x64, 0x00, 0x02, 0x02, 0x00, 0x0A]),
            &store(),
        );
        assert_eq!(response.as_slice(), &[0x90, 0x03]);
    }

    #[test]
    fn test_quantity_out_of_range() {
        // Zero registers
        let response = handle_request(&request(&[0x03, 0x00, 0x64, 0x00, 0x00]), &store());
        assert_eq!(response.as_slice(), &[0x83, 0x03]);

        // 126 registers exceeds the FC03 maximum
        let response = handle_request(&request(&[0x03, 0x00, 0x64, 0x00, 0x7E]), &store());
        assert_eq!(response.as_slice(), &[0x83, 0x03]);

        // 2001 coils exceeds the FC01 maximum
        let response = handle_request(&request(&[0x01, 0x00, 0x00, 0x07, 0xD1]), &store());
        assert_eq!(response.as_slice(), &[0x81, 0x03]);
    }

    #[test]
    fn test_address_out_of_range() {
        // Valid quantity, but the range leaves the configured block
        let response = handle_request(&request(&[0x03, 0x00, 0x6D, 0x00, 0x02]), &store());
        assert_eq!(response.as_slice(), &[0x83, 0x02]);

        let response = handle_request(&request(&[0x06, 0x00, 0x00, 0x00, 0x01]), &store());
        assert_eq!(response.as_slice(), &[0x86, 0x02]);
    }

    #[test]
    fn test_write_to_read_only_block() {
        let store = RegisterStore::new().with_block(
            RegisterSpace::Holding,
            Block::new(0, 4, Arc::new(StaticSource::filled(4, 5))).read_only(),
        );

        let response = handle_request(&request(&[0x06, 0x00, 0x00, 0x00, 0x01]), &store);
        assert_eq!(response.as_slice(), &[0x86, 0x01]);

        // Store untouched
        let read = handle_request(&request(&[0x03, 0x00, 0x00, 0x00, 0x01]), &store);
        assert_eq!(read.as_slice(), &[0x03, 0x02, 0x00, 0x05]);
    }

    #[test]
    fn test_source_contract_violation_maps_to_data_value() {
        struct ShortSource;
        impl crate::source::ValueSource for ShortSource {
            fn read(&self, _offset: usize, count: usize) -> Option<Vec<u16>> {
                Some(vec![0; count.saturating_sub(1)])
            }
            fn write(&self, _offset: usize, _values: &[u16]) -> bool {
                false
            }
        }
        let store = RegisterStore::new().with_block(
            RegisterSpace::Holding,
            Block::new(0, 16, Arc::new(ShortSource)),
        );

        let response = handle_request(&request(&[0x03, 0x00, 0x00, 0x00, 0x04]), &store);
        assert_eq!(response.as_slice(), &[0x83, 0x03]);
    }
}
