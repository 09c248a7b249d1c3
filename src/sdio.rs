use embedded_hal::delay::DelayNs;

use crate::bus::{Cmd52, Cmd53, IoFunction, SdioBus};
use crate::irq::IrqLock;
use crate::registers::{
    is_direct_address, Chip, EN_VMM, INT_0, INT_1, INT_2, INT_3, INT_4, IRQ_FLAGS_OFFSET,
    MAX_NUM_INT, REG_CSA_ENABLE, REG_CSA_PORT, REG_CSA_WINDOW, REG_DMA_COUNT, REG_FN0_BLOCK_SIZE,
    REG_FN1_BLOCK_SIZE, REG_FN1_INT_PENDING, REG_IEN, REG_IOE, REG_IOR, REG_IO_ABORT,
    REG_IRQ_CLEAR_1000, REG_IRQ_FLAG_3000, REG_VMM_CTL_3000, SEL_VMM_TBL0, SEL_VMM_TBL1,
    WILC_CHIPID, WILC_INTR_ENABLE, WILC_MISC, WILC_PIN_MUX_0,
};
use crate::settings::{Config, IrqMode, MAX_BLOCK_SIZE};

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Failed to read from the chip over SDIO
    BusRead,
    /// Failed to write to the chip over SDIO
    BusWrite,
    /// Failed to claim the bus-level interrupt
    IrqClaim,
    /// More interrupt lines requested than the chip exposes
    TooManyInterrupts(u32),
    /// Operation requires a completed bring-up
    NotInitialized,
}

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    /// Configured block size is zero, too large, or not a power of two
    InvalidBlockSize(u32),
    /// Function 1 never reported ready within the retry budget
    Func1NotReady,
    /// Chip identification value matches no supported family
    UnknownChipId(u32),
    Other(Error),
}

impl From<Error> for InitError {
    fn from(error: Error) -> Self {
        InitError::Other(error)
    }
}

/// SDIO host-interface transport for the WILC chip family.
///
/// Owns the bus collaborator and the negotiated session state (block size,
/// chip variant); borrows the [`IrqLock`] shared with the platform's bus
/// interrupt callback.
pub struct WilcSdio<'a, B> {
    bus: B,
    irq: &'a IrqLock,
    config: Config,
    block_size: u32,
    chip: Option<Chip>,
    nint: u32,
    is_init: bool,
}

impl<'a, B> WilcSdio<'a, B>
where
    B: SdioBus,
{
    /// Constructs a new transport from a bus collaborator and the interrupt
    /// lock shared with the bus interrupt callback.
    pub fn new(bus: B, irq: &'a IrqLock, config: Config) -> WilcSdio<'a, B> {
        Self {
            bus,
            irq,
            config,
            block_size: 0,
            chip: None,
            nint: 0,
            is_init: false,
        }
    }

    /// Releases ownership of the bus.
    pub fn free(self) -> B {
        self.bus
    }

    /// The interrupt lock to hand to the platform's bus interrupt callback
    /// (see [`IrqLock::dispatch`]).
    pub fn irq_lock(&self) -> &'a IrqLock {
        self.irq
    }

    /// Chip variant latched by the first successful bring-up.
    pub fn chip(&self) -> Option<Chip> {
        self.chip
    }

    pub fn is_init(&self) -> bool {
        self.is_init
    }

    /* Bus bring-up */

    /// Brings the interface up: enables CSA addressing, negotiates both
    /// block sizes, enables function 1 and its interrupt, and verifies chip
    /// identity. Identity verification is skipped on a resume-from-suspend
    /// re-init when the variant is already known.
    ///
    /// On failure no session state is latched and the interface stays down.
    pub fn init(&mut self, resume: bool, delay: &mut impl DelayNs) -> Result<Chip, InitError> {
        match self.bring_up(resume, delay) {
            Ok(chip) => {
                self.chip = Some(chip);
                self.is_init = true;
                Ok(chip)
            }
            Err(error) => {
                self.block_size = 0;
                self.chip = None;
                self.is_init = false;
                Err(error)
            }
        }
    }

    fn bring_up(&mut self, resume: bool, delay: &mut impl DelayNs) -> Result<Chip, InitError> {
        let block_size = self.config.block_size;

        if !block_size.is_power_of_two() || block_size > MAX_BLOCK_SIZE {
            return Err(InitError::InvalidBlockSize(block_size));
        }

        /* Enable function 0 CSA addressing */

        self.write_readback(REG_CSA_ENABLE, 0x80)?;

        /* Function 0 block size */

        self.set_block_size(REG_FN0_BLOCK_SIZE, self.config.block_size)?;
        self.block_size = self.config.block_size;

        /* Enable function 1 I/O */

        self.write_readback(REG_IOE, 0x2)?;

        /* Wait for function 1 to come up */

        const MAX_ATTEMPTS: usize = 3;

        for i in 0..MAX_ATTEMPTS {
            let ior = self.read_byte(IoFunction::Control, REG_IOR)?;

            if ior == 0x2 {
                break;
            } else if i == MAX_ATTEMPTS - 1 {
                return Err(InitError::Func1NotReady);
            }

            delay.delay_us(500u32);
        }

        /* Function 1 block size */

        self.set_block_size(REG_FN1_BLOCK_SIZE, self.config.block_size)?;

        /* Function 1 interrupt enable */

        self.write_readback(REG_IEN, 0x3)?;

        /* Verify chip identity */

        if resume {
            if let Some(chip) = self.chip {
                return Ok(chip);
            }
        }

        let chipid = self.read_reg(WILC_CHIPID)?;

        Chip::from_chipid(chipid).ok_or(InitError::UnknownChipId(chipid))
    }

    /// Marks the interface down. Hardware quiescing is the reset-sequence
    /// collaborator's job, not this layer's.
    pub fn deinit(&mut self) {
        self.is_init = false;
    }

    /// Aborts function 1 I/O, resetting the card side of the interface.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.write_byte(IoFunction::Control, REG_IO_ABORT, 0x8)
    }

    /* Register and block transport */

    /// Reads a 32-bit chip register. Registers in the reserved direct range
    /// are a single byte wide and read with one CMD52; everything else goes
    /// through the CSA window and port.
    pub fn read_reg(&mut self, address: u32) -> Result<u32, Error> {
        if is_direct_address(address) {
            return self.read_byte(IoFunction::Control, address).map(u32::from);
        }

        self.set_csa_address(address)?;

        let cmd = self.csa_port_word();
        let mut buf = [0u8; 4];

        self.bus
            .cmd53_read(&cmd, &mut buf)
            .map_err(|_| Error::BusRead)?;

        Ok(u32::from_le_bytes(buf))
    }

    /// Writes a 32-bit chip register; see [`WilcSdio::read_reg`] for the
    /// addressing rules. Values are little-endian on the wire.
    pub fn write_reg(&mut self, address: u32, value: u32) -> Result<(), Error> {
        if is_direct_address(address) {
            return self.write_byte(IoFunction::Control, address, value as u8);
        }

        self.set_csa_address(address)?;

        let cmd = self.csa_port_word();

        self.bus
            .cmd53_write(&cmd, &value.to_le_bytes())
            .map_err(|_| Error::BusWrite)
    }

    /// Reads `buf.len()` bytes from the chip. Address 0 drains the function 1
    /// data path; any other address streams through the CSA window, which is
    /// re-programmed (and advanced) for every chunk.
    ///
    /// The length is rounded up to a 4-byte boundary before chunking into
    /// full blocks plus a byte-mode remainder; padding bytes are read into a
    /// bounce buffer and discarded. A failed chunk aborts the rest; earlier
    /// chunks are not rolled back.
    pub fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), Error> {
        let plan = self.plan_transfer(address, buf.len())?;

        if let Some((cmd, window)) = plan.head {
            if let Some(addr) = window {
                self.set_csa_address(addr)?;
            }
            self.bus
                .cmd53_read(&cmd, &mut buf[..plan.split])
                .map_err(|_| Error::BusRead)?;
        }

        if let Some((cmd, window)) = plan.tail {
            if let Some(addr) = window {
                self.set_csa_address(addr)?;
            }

            let tail = &mut buf[plan.split..];

            if plan.bounced {
                let mut bounce = [0u8; MAX_BLOCK_SIZE as usize];
                let padded = &mut bounce[..cmd.transfer_len()];

                self.bus
                    .cmd53_read(&cmd, padded)
                    .map_err(|_| Error::BusRead)?;

                let keep = tail.len();
                tail.copy_from_slice(&padded[..keep]);
            } else {
                self.bus.cmd53_read(&cmd, tail).map_err(|_| Error::BusRead)?;
            }
        }

        Ok(())
    }

    /// Writes `buf.len()` bytes to the chip; see [`WilcSdio::read`] for the
    /// addressing and chunking rules. Padding bytes are zero on the wire.
    pub fn write(&mut self, address: u32, buf: &[u8]) -> Result<(), Error> {
        let plan = self.plan_transfer(address, buf.len())?;

        if let Some((cmd, window)) = plan.head {
            if let Some(addr) = window {
                self.set_csa_address(addr)?;
            }
            self.bus
                .cmd53_write(&cmd, &buf[..plan.split])
                .map_err(|_| Error::BusWrite)?;
        }

        if let Some((cmd, window)) = plan.tail {
            if let Some(addr) = window {
                self.set_csa_address(addr)?;
            }

            let tail = &buf[plan.split..];

            if plan.bounced {
                let mut bounce = [0u8; MAX_BLOCK_SIZE as usize];
                bounce[..tail.len()].copy_from_slice(tail);

                self.bus
                    .cmd53_write(&cmd, &bounce[..cmd.transfer_len()])
                    .map_err(|_| Error::BusWrite)?;
            } else {
                self.bus
                    .cmd53_write(&cmd, tail)
                    .map_err(|_| Error::BusWrite)?;
            }
        }

        Ok(())
    }

    /// Splits a block transfer into a direct block-mode chunk and a tail,
    /// with the window address (if any) each chunk must program first.
    ///
    /// The chip moves 32-bit words, so an unaligned length is padded up to
    /// the next word boundary. The chunk that contains the padding cannot be
    /// issued straight from the caller's slice and is marked `bounced`: the
    /// byte-mode remainder in the common case, or the final block on its own
    /// when the padded length lands exactly on a block boundary.
    fn plan_transfer(&self, address: u32, len: usize) -> Result<TransferPlan, Error> {
        if !self.is_init {
            return Err(Error::NotInitialized);
        }

        let (function, port) = if address > 0 {
            (IoFunction::Control, REG_CSA_PORT)
        } else {
            (IoFunction::Data, 0)
        };

        let padded = (len + 3) & !3;
        let block_size = self.block_size as usize;
        let nblk = padded / block_size;
        let nleft = padded % block_size;

        let cmd = |block_mode: bool, count: usize| Cmd53 {
            function,
            address: port,
            block_mode,
            increment: true,
            count: count as u32,
            block_size: self.block_size,
        };

        let bounced = padded != len;

        let (direct_blocks, tail) = if nleft > 0 {
            (nblk, Some(cmd(false, nleft)))
        } else if bounced {
            // nblk >= 1 here: the padding sits in the final block
            (nblk - 1, Some(cmd(true, 1)))
        } else {
            (nblk, None)
        };

        let split = direct_blocks * block_size;
        let window = |offset: usize| (address > 0).then(|| address + offset as u32);

        Ok(TransferPlan {
            head: (direct_blocks > 0).then(|| (cmd(true, direct_blocks), window(0))),
            tail: tail.map(|cmd| (cmd, window(split))),
            split,
            bounced,
        })
    }

    /* Interrupt engine */

    /// Pending DMA transfer size in words, from the two count registers.
    pub fn read_size(&mut self) -> Result<u32, Error> {
        let low = self.read_byte(IoFunction::Control, REG_DMA_COUNT)?;
        let high = self.read_byte(IoFunction::Control, REG_DMA_COUNT + 1)?;

        Ok(u32::from(low) | u32::from(high) << 8)
    }

    /// Combined interrupt status: pending DMA word count in the low bits,
    /// pending interrupt lines at [`IRQ_FLAGS_OFFSET`] and above. The
    /// registers consulted depend on the chip variant and interrupt mode.
    pub fn read_int(&mut self) -> Result<u32, Error> {
        let mut status = self.read_size()?;

        match self.config.irq_mode {
            IrqMode::DedicatedPin => {
                let chip = self.chip.ok_or(Error::NotInitialized)?;
                let (reg, mask) = chip.irq_flag_reg();

                let flags = self.read_byte(IoFunction::Data, reg)? & mask;
                status |= u32::from(flags) << IRQ_FLAGS_OFFSET;
            }
            IrqMode::SharedBus => {
                let pending = self.read_byte(IoFunction::Data, REG_FN1_INT_PENDING)?;

                if pending & (1 << 0) != 0 {
                    status |= INT_0;
                }
                if pending & (1 << 2) != 0 {
                    status |= INT_1;
                }
                if pending & (1 << 3) != 0 {
                    status |= INT_2;
                }
                if pending & (1 << 4) != 0 {
                    status |= INT_3;
                }
                if pending & (1 << 5) != 0 {
                    status |= INT_4;
                }

                // Lines above the count handed to `sync_ext` should never fire.
                for line in self.nint..MAX_NUM_INT {
                    if status & (1 << (IRQ_FLAGS_OFFSET + line)) != 0 {
                        #[cfg(feature = "defmt")]
                        defmt::warn!("pending interrupt on unsynced line {}", line);
                        break;
                    }
                }
            }
        }

        Ok(status)
    }

    /// Acknowledges interrupts and drives the VMM table selection. The mask
    /// carries line clears in its low bits plus [`SEL_VMM_TBL0`],
    /// [`SEL_VMM_TBL1`] and [`EN_VMM`]; the clear register(s) written depend
    /// on the chip variant. Line clears only apply in dedicated-pin mode.
    pub fn clear_int_ext(&mut self, mask: u32) -> Result<(), Error> {
        let chip = self.chip.ok_or(Error::NotInitialized)?;
        let irq_gpio = self.config.irq_mode == IrqMode::DedicatedPin;
        let lines = (mask & ((1 << MAX_NUM_INT) - 1)) as u8;

        match chip {
            Chip::Wilc1000 => {
                // One register takes both the line clears and the VMM bits.
                let mut reg = if irq_gpio { lines } else { 0 };

                if mask & SEL_VMM_TBL0 != 0 {
                    reg |= 1 << 5;
                }
                if mask & SEL_VMM_TBL1 != 0 {
                    reg |= 1 << 6;
                }
                if mask & EN_VMM != 0 {
                    reg |= 1 << 7;
                }

                if reg != 0 {
                    self.write_byte(IoFunction::Control, REG_IRQ_CLEAR_1000, reg)?;
                }

                Ok(())
            }
            Chip::Wilc3000 => {
                // Line clears and VMM control live in separate registers. A
                // failed line clear must not skip the VMM write; the first
                // error is surfaced once both have been attempted.
                let mut first_error = None;

                if irq_gpio && lines != 0 {
                    if let Err(error) =
                        self.write_byte(IoFunction::Control, REG_IRQ_FLAG_3000, lines)
                    {
                        first_error = Some(error);
                    }
                }

                let mut vmm = 0u8;

                if mask & SEL_VMM_TBL0 != 0 {
                    vmm |= 1 << 0;
                }
                if mask & SEL_VMM_TBL1 != 0 {
                    vmm |= 1 << 1;
                }
                if mask & EN_VMM != 0 {
                    vmm |= 1 << 2;
                }

                if vmm != 0 {
                    if let Err(error) = self.write_byte(IoFunction::Control, REG_VMM_CTL_3000, vmm)
                    {
                        first_error.get_or_insert(error);
                    }
                }

                match first_error {
                    Some(error) => Err(error),
                    None => Ok(()),
                }
            }
        }
    }

    /// Configures the number of interrupt lines the chip may raise. In
    /// dedicated-pin mode this also routes the interrupt onto the pin and
    /// enables the requested lines chip-side.
    pub fn sync_ext(&mut self, nint: u32) -> Result<(), Error> {
        if nint > MAX_NUM_INT {
            return Err(Error::TooManyInterrupts(nint));
        }

        let chip = self.chip.ok_or(Error::NotInitialized)?;
        self.nint = nint;

        if chip == Chip::Wilc3000 {
            /* Disable the power sequencer */

            let misc = self.read_reg(WILC_MISC)?;
            self.write_reg(WILC_MISC, misc & !(1 << 8))?;
        }

        if self.config.irq_mode == IrqMode::DedicatedPin {
            /* Route the interrupt onto the dedicated pin */

            let mux = self.read_reg(WILC_PIN_MUX_0)?;
            self.write_reg(WILC_PIN_MUX_0, mux | 1 << 8)?;

            /* Enable the requested lines */

            let mut enable = self.read_reg(WILC_INTR_ENABLE)?;

            for line in 0..nint {
                enable |= 1 << (27 + line);
            }

            self.write_reg(WILC_INTR_ENABLE, enable)?;
        }

        Ok(())
    }

    /// Resets the interrupt lock and claims the bus-level interrupt. The
    /// platform's callback should route into [`IrqLock::dispatch`].
    pub fn enable_interrupt(&mut self) -> Result<(), Error> {
        self.irq.reset();

        self.bus.claim_irq().map_err(|_| Error::IrqClaim)
    }

    /// Blocks until any in-flight dispatch completes, then releases the
    /// bus-level interrupt.
    ///
    /// A release failure is not surfaced; dispatches are already locked out
    /// by the time it is attempted.
    pub fn disable_interrupt(&mut self) {
        self.irq.wait_and_disable();

        let _ = self.bus.release_irq();

        self.irq.reset();
    }

    /* Address window */

    /// Programs the CSA window base ahead of an out-of-window access. The
    /// window is function 0 state on the chip and is treated as transient:
    /// callers re-program it before every windowed transaction.
    fn set_csa_address(&mut self, address: u32) -> Result<(), Error> {
        self.write_byte(IoFunction::Control, REG_CSA_WINDOW, address as u8)?;
        self.write_byte(IoFunction::Control, REG_CSA_WINDOW + 1, (address >> 8) as u8)?;
        self.write_byte(IoFunction::Control, REG_CSA_WINDOW + 2, (address >> 16) as u8)?;

        Ok(())
    }

    /// One 32-bit word through the CSA port, byte mode.
    fn csa_port_word(&self) -> Cmd53 {
        Cmd53 {
            function: IoFunction::Control,
            address: REG_CSA_PORT,
            block_mode: false,
            increment: true,
            count: 4,
            block_size: self.block_size,
        }
    }

    /* Raw CMD52 helpers */

    fn read_byte(&mut self, function: IoFunction, address: u32) -> Result<u8, Error> {
        let mut cmd = Cmd52::read(function, address);

        self.bus.cmd52(&mut cmd).map_err(|_| Error::BusRead)?;

        Ok(cmd.data)
    }

    fn write_byte(&mut self, function: IoFunction, address: u32, data: u8) -> Result<(), Error> {
        let mut cmd = Cmd52::write(function, address, data);

        self.bus.cmd52(&mut cmd).map_err(|_| Error::BusWrite)
    }

    fn write_readback(&mut self, address: u32, data: u8) -> Result<u8, Error> {
        let mut cmd = Cmd52::write_readback(IoFunction::Control, address, data);

        self.bus.cmd52(&mut cmd).map_err(|_| Error::BusWrite)?;

        Ok(cmd.data)
    }

    fn set_block_size(&mut self, register: u32, block_size: u32) -> Result<(), Error> {
        self.write_byte(IoFunction::Control, register, block_size as u8)?;
        self.write_byte(IoFunction::Control, register + 1, (block_size >> 8) as u8)
    }
}

struct TransferPlan {
    head: Option<(Cmd53, Option<u32>)>,
    tail: Option<(Cmd53, Option<u32>)>,
    split: usize,
    bounced: bool,
}
