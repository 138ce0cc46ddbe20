//! Optimized Modbus PDU data structure
//!
//! Use a fixed-size stack array to avoid heap allocation and improve performance.

use tracing::debug;

use crate::constants::MAX_PDU_SIZE;
use crate::error::{ModbusError, ModbusResult};

/// High-performance PDU with stack-allocated fixed array
#[derive(Debug, Clone)]
pub struct ModbusPdu {
    /// Fixed-size buffer (stack)
    data: [u8; MAX_PDU_SIZE],
    /// Actual data length
    len: usize,
}

impl ModbusPdu {
    /// Create an empty PDU
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_PDU_SIZE],
            len: 0,
        }
    }

    /// Create a PDU from a byte slice
    #[inline]
    pub fn from_slice(data: &[u8]) -> ModbusResult<Self> {
        if data.len() > MAX_PDU_SIZE {
            return Err(ModbusError::Protocol {
                message: format!("PDU too large: {} bytes (max {})", data.len(), MAX_PDU_SIZE),
            });
        }

        let mut pdu = Self::new();
        pdu.data[..data.len()].copy_from_slice(data);
        pdu.len = data.len();

        Ok(pdu)
    }

    /// Push a single byte
    #[inline]
    pub fn push(&mut self, byte: u8) -> ModbusResult<()> {
        if self.len >= MAX_PDU_SIZE {
            return Err(ModbusError::Protocol {
                message: "PDU buffer full".to_string(),
            });
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Push u16 in big-endian
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> ModbusResult<()> {
        self.push((value >> 8) as u8)?;
        self.push((value & 0xFF) as u8)?;
        Ok(())
    }

    /// Extend with a byte slice
    #[inline]
    pub fn extend(&mut self, data: &[u8]) -> ModbusResult<()> {
        if self.len + data.len() > MAX_PDU_SIZE {
            return Err(ModbusError::Protocol {
                message: format!(
                    "PDU would exceed max size: {} + {} > {}",
                    self.len,
                    data.len(),
                    MAX_PDU_SIZE
                ),
            });
        }
        self.data[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    /// Get immutable data slice
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Get current length
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get function code (first byte)
    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        if self.len > 0 {
            Some(self.data[0])
        } else {
            None
        }
    }

    /// Check if exception response
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code()
            .map(|fc| fc & 0x80 != 0)
            .unwrap_or(false)
    }

    /// Get exception code
    #[inline]
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() && self.len > 1 {
            Some(self.data[1])
        } else {
            None
        }
    }

    /// Get human-readable function code description
    pub fn function_code_description(fc: u8) -> &'static str {
        match fc & 0x7F {
            0x01 => "Read Coils",
            0x02 => "Read Discrete Inputs",
            0x03 => "Read Holding Registers",
            0x04 => "Read Input Registers",
            0x05 => "Write Single Coil",
            0x06 => "Write Single Register",
            0x0F => "Write Multiple Coils",
            0x10 => "Write Multiple Registers",
            _ => "Unknown Function",
        }
    }
}

impl Default for ModbusPdu {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ModbusPdu {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for ModbusPdu {}

/// Server-side response PDU builders
pub struct PduBuilder;

impl PduBuilder {
    /// Build a register read response PDU for FC03/FC04
    ///
    /// # Arguments
    /// * `fc` - Function code (3 or 4)
    /// * `registers` - Register values to return (1-125)
    pub fn build_read_registers_response(fc: u8, registers: &[u16]) -> ModbusResult<ModbusPdu> {
        if !matches!(fc, 0x03 | 0x04) {
            return Err(ModbusError::invalid_function(fc));
        }

        let mut pdu = ModbusPdu::new();
        pdu.push(fc)?;
        pdu.push((registers.len() * 2) as u8)?;
        for &value in registers {
            pdu.push_u16(value)?;
        }

        debug!(
            "Response PDU built: FC={:02X} ({}), registers={}",
            fc,
            ModbusPdu::function_code_description(fc),
            registers.len()
        );
        Ok(pdu)
    }

    /// Build a bit read response PDU for FC01/FC02
    ///
    /// Packs bit values LSB-first into `ceil(n / 8)` bytes, trailing bits zero.
    ///
    /// # Arguments
    /// * `fc` - Function code (1 or 2)
    /// * `bits` - Coil or discrete input states (1-2000)
    pub fn build_read_bits_response(fc: u8, bits: &[bool]) -> ModbusResult<ModbusPdu> {
        if !matches!(fc, 0x01 | 0x02) {
            return Err(ModbusError::invalid_function(fc));
        }

        let byte_count = bits.len().div_ceil(8);
        let mut pdu = ModbusPdu::new();
        pdu.push(fc)?;
        pdu.push(byte_count as u8)?;

        for chunk in bits.chunks(8) {
            let mut byte = 0u8;
            for (i, &bit) in chunk.iter().enumerate() {
                if bit {
                    byte |= 1 << i;
                }
            }
            pdu.push(byte)?;
        }

        debug!(
            "Response PDU built: FC={:02X} ({}), bits={}",
            fc,
            ModbusPdu::function_code_description(fc),
            bits.len()
        );
        Ok(pdu)
    }

    /// Build a write echo response PDU for FC05/FC06/FC15/FC16
    ///
    /// Single writes echo address + value; multi-writes echo address + quantity.
    pub fn build_write_echo(fc: u8, address: u16, value: u16) -> ModbusResult<ModbusPdu> {
        if !matches!(fc, 0x05 | 0x06 | 0x0F | 0x10) {
            return Err(ModbusError::invalid_function(fc));
        }

        let mut pdu = ModbusPdu::new();
        pdu.push(fc)?;
        pdu.push_u16(address)?;
        pdu.push_u16(value)?;
        Ok(pdu)
    }

    /// Build an exception response PDU
    ///
    /// # Arguments
    /// * `fc` - Function code of the offending request (exception bit is set here)
    /// * `exception_code` - Modbus exception code
    pub fn build_exception(fc: u8, exception_code: u8) -> ModbusPdu {
        debug!(
            "Exception PDU built: FC={:02X} ({}), exception_code={:02X}",
            fc,
            ModbusPdu::function_code_description(fc),
            exception_code
        );

        let mut pdu = ModbusPdu::new();
        // Two pushes into an empty 253-byte buffer cannot fail
        let _ = pdu.push(fc | 0x80);
        let _ = pdu.push(exception_code);
        pdu
    }
}
