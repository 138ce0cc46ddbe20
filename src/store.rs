//! In-memory register store
//!
//! Four independent Modbus address spaces, each optionally backed by one
//! configured [`Block`] with a base address, length, access mode and a
//! [`ValueSource`]. The store validates absolute addresses against the block
//! bounds and delegates the actual values to the source; bit spaces (coils,
//! discrete inputs) store 0/1 cells.
//!
//! The store is shared read-mostly behind an `Arc` by all connection tasks.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use crate::constants::{DEFAULT_BLOCK_BASE, DEFAULT_BLOCK_LENGTH, DEFAULT_VALUE_MAX};
use crate::source::{RandomSource, StaticSource, ValueSource};

/// The four standard Modbus address spaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterSpace {
    /// Read-write 16-bit registers (FC03/FC06/FC16)
    Holding,
    /// Read-only 16-bit registers (FC04)
    Input,
    /// Read-write single bits (FC01/FC05/FC15)
    Coil,
    /// Read-only single bits (FC02)
    Discrete,
}

impl RegisterSpace {
    /// Whether the Modbus data model allows writes to this space at all
    pub fn is_writable_class(self) -> bool {
        matches!(self, Self::Holding | Self::Coil)
    }
}

/// Block access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    /// Reads and writes allowed
    #[default]
    ReadWrite,
    /// Writes rejected with [`StoreError::ReadOnly`]
    ReadOnly,
}

/// Store operation error, mapped to Modbus exception codes by the handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Requested range is outside the configured block (or no block exists)
    #[error("address range [{address}, {address}+{count}) outside configured block")]
    OutOfRange { address: u16, count: u16 },

    /// Write against a read-only space or block
    #[error("{space:?} space is read-only")]
    ReadOnly { space: RegisterSpace },

    /// The value source broke its count contract; logged, never silent
    #[error("value source returned {got} values, expected {expected}")]
    SourceContract { expected: usize, got: usize },
}

/// One configured register block: base address, length and a value source
pub struct Block {
    base: u16,
    length: u16,
    access: Access,
    source: Arc<dyn ValueSource>,
}

impl Block {
    /// Create a read-write block
    pub fn new(base: u16, length: u16, source: Arc<dyn ValueSource>) -> Self {
        Self {
            base,
            length,
            access: Access::ReadWrite,
            source,
        }
    }

    /// Mark the block read-only
    pub fn read_only(mut self) -> Self {
        self.access = Access::ReadOnly;
        self
    }

    /// Absolute address range check; returns the relative offset on success
    fn offset_of(&self, address: u16, count: u16) -> Option<usize> {
        if count == 0 || address < self.base {
            return None;
        }
        let end = address as u32 + count as u32;
        if end > self.base as u32 + self.length as u32 {
            return None;
        }
        Some((address - self.base) as usize)
    }
}

/// Register store holding the four address spaces
#[derive(Default)]
pub struct RegisterStore {
    holding: Option<Block>,
    input: Option<Block>,
    coil: Option<Block>,
    discrete: Option<Block>,
}

impl RegisterStore {
    /// Create an empty store with no configured blocks
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the block for one space, replacing any existing one
    pub fn with_block(mut self, space: RegisterSpace, block: Block) -> Self {
        *self.slot_mut(space) = Some(block);
        self
    }

    /// The SunSpec-style mock layout: holding and input register blocks at
    /// base 40000, 69 registers, fresh random values in `[0, 255]` per read;
    /// coil and discrete blocks of the same length at base 0.
    pub fn sunspec_mock() -> Self {
        let length = DEFAULT_BLOCK_LENGTH;
        Self::new()
            .with_block(
                RegisterSpace::Holding,
                Block::new(
                    DEFAULT_BLOCK_BASE,
                    length,
                    Arc::new(RandomSource::new(length as usize, DEFAULT_VALUE_MAX)),
                ),
            )
            .with_block(
                RegisterSpace::Input,
                Block::new(
                    DEFAULT_BLOCK_BASE,
                    length,
                    Arc::new(RandomSource::new(length as usize, DEFAULT_VALUE_MAX)),
                ),
            )
            .with_block(
                RegisterSpace::Coil,
                Block::new(0, length, Arc::new(StaticSource::filled(length as usize, 0))),
            )
            .with_block(
                RegisterSpace::Discrete,
                Block::new(0, length, Arc::new(StaticSource::filled(length as usize, 0))),
            )
    }

    fn slot(&self, space: RegisterSpace) -> Option<&Block> {
        match space {
            RegisterSpace::Holding => self.holding.as_ref(),
            RegisterSpace::Input => self.input.as_ref(),
            RegisterSpace::Coil => self.coil.as_ref(),
            RegisterSpace::Discrete => self.discrete.as_ref(),
        }
    }

    fn slot_mut(&mut self, space: RegisterSpace) -> &mut Option<Block> {
        match space {
            RegisterSpace::Holding => &mut self.holding,
            RegisterSpace::Input => &mut self.input,
            RegisterSpace::Coil => &mut self.coil,
            RegisterSpace::Discrete => &mut self.discrete,
        }
    }

    /// Read `count` values starting at absolute `address`.
    ///
    /// Bit spaces return 0/1 cells. Every read emits a `get_values` event,
    /// matching the observable behavior the mock exists to provide.
    pub fn read(
        &self,
        space: RegisterSpace,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, StoreError> {
        let block = self
            .slot(space)
            .ok_or(StoreError::OutOfRange { address, count })?;
        let offset = block
            .offset_of(address, count)
            .ok_or(StoreError::OutOfRange { address, count })?;

        info!(event = "get_values", space = ?space, address, count);

        let values = block
            .source
            .read(offset, count as usize)
            .ok_or(StoreError::OutOfRange { address, count })?;

        if values.len() != count as usize {
            error!(
                space = ?space,
                address,
                expected = count,
                got = values.len(),
                "value source violated its count contract"
            );
            return Err(StoreError::SourceContract {
                expected: count as usize,
                got: values.len(),
            });
        }

        Ok(values)
    }

    /// Write values starting at absolute `address`.
    ///
    /// Bit spaces take 0/1 cells. Read-only spaces and read-only blocks are
    /// rejected before any mutation.
    pub fn write(
        &self,
        space: RegisterSpace,
        address: u16,
        values: &[u16],
    ) -> Result<(), StoreError> {
        let count = values.len() as u16;
        let block = self
            .slot(space)
            .ok_or(StoreError::OutOfRange { address, count })?;

        if !space.is_writable_class() || block.access == Access::ReadOnly {
            return Err(StoreError::ReadOnly { space });
        }

        let offset = block
            .offset_of(address, count)
            .ok_or(StoreError::OutOfRange { address, count })?;

        if !block.source.write(offset, values) {
            return Err(StoreError::OutOfRange { address, count });
        }
        Ok(())
    }
}
