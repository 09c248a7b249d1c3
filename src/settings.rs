/// How the chip signals interrupts to the host. Fixed at bring-up; selects
/// the status-decode and clear paths used by the interrupt engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IrqMode {
    /// A dedicated out-of-band interrupt pin is wired to the host
    DedicatedPin,
    /// Interrupts are signaled in-band on the shared SDIO interrupt line
    #[default]
    SharedBus,
}

/// Block size negotiated for both I/O functions during bring-up.
pub const DEFAULT_BLOCK_SIZE: u32 = 512;

/// Largest block size the chip's I/O functions accept. Block sizes must be
/// a power of two no bigger than this.
pub const MAX_BLOCK_SIZE: u32 = 512;

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub irq_mode: IrqMode,
    pub block_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            irq_mode: IrqMode::default(),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_irq_mode(mut self, irq_mode: IrqMode) -> Self {
        self.irq_mode = irq_mode;
        self
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }
}
