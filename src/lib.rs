//! # Mockbus - Mock Modbus TCP Register Server
//!
//! A small Modbus TCP server that emulates a device register map for testing
//! clients against a SunSpec-style layout. Register blocks are backed by
//! pluggable value sources: a static cell array, or a randomized generator
//! that answers every read with a fresh draw — the "always changing device"
//! a poller under test expects.
//!
//! ## Features
//!
//! - **Complete request engine**: MBAP framing, function-code dispatch,
//!   standards-compliant exception responses
//! - **Four address spaces**: holding/input registers, coils, discrete inputs,
//!   each with configurable base, length and access mode
//! - **Pluggable value sources**: static (deterministic, writable) or
//!   randomized (fresh per-read draw in a configured range)
//! - **Concurrent clients**: one tokio task per connection, sequential
//!   processing within a connection, shared read-mostly store
//!
//! ## Supported Function Codes
//!
//! | Code | Function |
//! |------|----------|
//! | 0x01 | Read Coils |
//! | 0x02 | Read Discrete Inputs |
//! | 0x03 | Read Holding Registers |
//! | 0x04 | Read Input Registers |
//! | 0x05 | Write Single Coil |
//! | 0x06 | Write Single Register |
//! | 0x0F | Write Multiple Coils |
//! | 0x10 | Write Multiple Registers |
//!
//! Everything else is answered with an illegal-function exception.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mockbus::{ModbusTcpServer, RegisterStore};
//!
//! #[tokio::main]
//! async fn main() -> mockbus::ModbusResult<()> {
//!     // SunSpec-style mock: block at 40000, 69 registers, random [0, 255]
//!     let store = Arc::new(RegisterStore::sunspec_mock());
//!
//!     let mut server = ModbusTcpServer::from_address("0.0.0.0:1502", store)?;
//!     let addr = server.start().await?;
//!     println!("serving mock registers on {addr}");
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop();
//!     Ok(())
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Modbus protocol constants based on official specification
pub mod constants;

/// High-performance PDU with stack-allocated fixed array
pub mod pdu;

/// Modbus TCP (MBAP) frame codec
pub mod frame;

/// Value sources for register blocks
pub mod source;

/// In-memory register store with four address spaces
pub mod store;

/// Stateless request handler
pub mod handler;

/// TCP server and per-connection tasks
pub mod server;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use mockbus::tokio) ===
pub use tokio;

// === Error handling ===
pub use error::{ModbusError, ModbusResult};

// === Core types ===
pub use frame::TcpFrame;
pub use pdu::{ModbusPdu, PduBuilder};

// === Register map ===
pub use source::{RandomSource, StaticSource, ValueSource};
pub use store::{Access, Block, RegisterSpace, RegisterStore, StoreError};

// === Server ===
pub use handler::handle_request;
pub use server::{ModbusTcpServer, ServerConfig};

// === Protocol limits (commonly needed constants) ===
pub use constants::{
    MAX_PDU_SIZE, MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};

/// Modbus TCP default port
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
