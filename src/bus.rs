use core::fmt::Debug;

use bitfield::bitfield;
use num_enum::IntoPrimitive;

/// Logical I/O function addressed by a bus command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum IoFunction {
    /// Function 0 carries the control registers and the CSA address window
    Control = 0,
    /// Function 1 carries the bulk data path
    Data = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Read,
    Write,
}

/// Single-register access (CMD52): one data byte in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cmd52 {
    pub direction: Direction,
    pub function: IoFunction,
    /// Read-after-write: the chip latches the written byte and returns the
    /// updated register value in the response
    pub raw: bool,
    pub address: u32,
    pub data: u8,
}

impl Cmd52 {
    pub fn read(function: IoFunction, address: u32) -> Self {
        Self {
            direction: Direction::Read,
            function,
            raw: false,
            address,
            data: 0,
        }
    }

    pub fn write(function: IoFunction, address: u32, data: u8) -> Self {
        Self {
            direction: Direction::Write,
            function,
            raw: false,
            address,
            data,
        }
    }

    pub fn write_readback(function: IoFunction, address: u32, data: u8) -> Self {
        Self {
            direction: Direction::Write,
            function,
            raw: true,
            address,
            data,
        }
    }

    /// Encodes the 32-bit CMD52 argument word for this access.
    pub fn arg(&self) -> u32 {
        let mut arg = Cmd52Arg(0);
        arg.set_rw(matches!(self.direction, Direction::Write) as u32);
        arg.set_function(u32::from(u8::from(self.function)));
        arg.set_raw(self.raw as u32);
        arg.set_address(self.address);
        arg.set_data(u32::from(self.data));
        arg.0
    }
}

/// Multi-byte access (CMD53): `count` blocks of `block_size` bytes in block
/// mode, or `count` raw bytes in byte mode.
///
/// `count` must fit the 9-bit argument field (at most 511); a transfer
/// needing more must be split into multiple commands.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cmd53 {
    pub function: IoFunction,
    pub address: u32,
    pub block_mode: bool,
    /// Advance the target address after every byte (fixed-address transfers
    /// drain a FIFO instead)
    pub increment: bool,
    pub count: u32,
    pub block_size: u32,
}

impl Cmd53 {
    /// Number of bytes moved by this command.
    pub fn transfer_len(&self) -> usize {
        if self.block_mode {
            (self.count * self.block_size) as usize
        } else {
            self.count as usize
        }
    }

    /// Encodes the 32-bit CMD53 argument word for this access.
    pub fn arg(&self, direction: Direction) -> u32 {
        debug_assert!(self.count < 512, "count does not fit the 9-bit field");

        let mut arg = Cmd53Arg(0);
        arg.set_rw(matches!(direction, Direction::Write) as u32);
        arg.set_function(u32::from(u8::from(self.function)));
        arg.set_block_mode(self.block_mode as u32);
        arg.set_op_code(self.increment as u32);
        arg.set_address(self.address);
        arg.set_count(self.count);
        arg.0
    }
}

/// Physical-bus collaborator.
///
/// Every method is exactly one bus transaction. Implementations own the
/// bus-session (host) lock and hold it only for the duration of a single
/// call, so that an interrupt dispatched between commands can use the bus
/// without deadlocking against the request path.
pub trait SdioBus {
    type Error: Debug;

    /// Executes one single-register transaction. For reads and read-after
    /// -write accesses the response byte is stored back into `cmd.data`.
    fn cmd52(&mut self, cmd: &mut Cmd52) -> Result<(), Self::Error>;

    /// Executes one multi-byte read of `cmd.transfer_len()` bytes into `buf`.
    fn cmd53_read(&mut self, cmd: &Cmd53, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Executes one multi-byte write of `cmd.transfer_len()` bytes from `buf`.
    fn cmd53_write(&mut self, cmd: &Cmd53, buf: &[u8]) -> Result<(), Self::Error>;

    /// Registers the card interrupt with the host controller.
    fn claim_irq(&mut self) -> Result<(), Self::Error>;

    /// Unregisters the card interrupt from the host controller.
    fn release_irq(&mut self) -> Result<(), Self::Error>;
}

/* Low level command argument encoding */

bitfield! {
 struct Cmd52Arg(u32);
    impl Debug;
    u32;
    pub rw, set_rw: 31, 31;
    pub function, set_function: 30, 28;
    pub raw, set_raw: 27, 27;
    pub address, set_address: 25, 9;
    pub data, set_data: 7, 0;
}

bitfield! {
 struct Cmd53Arg(u32);
    impl Debug;
    u32;
    pub rw, set_rw: 31, 31;
    pub function, set_function: 30, 28;
    pub block_mode, set_block_mode: 27, 27;
    pub op_code, set_op_code: 26, 26;
    pub address, set_address: 25, 9;
    pub count, set_count: 8, 0;
}
