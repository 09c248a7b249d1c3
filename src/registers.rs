//! Fixed register map of the WILC SDIO host interface, and the chip-variant
//! tag that keys the interrupt register layout.

/* Function 0: CCCR and the vendor CSA window */

/// I/O-enable register; bit 1 turns function 1 on.
pub const REG_IOE: u32 = 0x2;
/// I/O-ready register; function 1 reports bit 1 once it is up.
pub const REG_IOR: u32 = 0x3;
/// Interrupt-enable register; master enable plus function 1.
pub const REG_IEN: u32 = 0x4;
/// I/O-abort register; bit 3 resets the card.
pub const REG_IO_ABORT: u32 = 0x6;
/// Function 0 block size, two bytes little-endian.
pub const REG_FN0_BLOCK_SIZE: u32 = 0x10;
/// Vendor CCCR extension; bit 7 enables CSA addressing.
pub const REG_CSA_ENABLE: u32 = 0x100;
/// CSA window base, three consecutive bytes holding address bits [23:0].
pub const REG_CSA_WINDOW: u32 = 0x10c;
/// Data port through which windowed accesses move bytes.
pub const REG_CSA_PORT: u32 = 0x10f;
/// Function 1 block size, two bytes little-endian.
pub const REG_FN1_BLOCK_SIZE: u32 = 0x110;

/* Direct-access size/status registers */

/// Pending DMA word count, two bytes little-endian.
pub const REG_DMA_COUNT: u32 = 0xf2;
/// WILC3000 VMM control (select/enable bits [2:0]).
pub const REG_VMM_CTL_3000: u32 = 0xf1;
/// WILC1000 pending interrupt lines (function 1).
pub const REG_IRQ_FLAG_1000: u32 = 0xf7;
/// WILC1000 interrupt clear: line clears plus VMM control in one byte.
pub const REG_IRQ_CLEAR_1000: u32 = 0xf8;
/// WILC3000 pending interrupt lines; writing the same bits clears them.
pub const REG_IRQ_FLAG_3000: u32 = 0xfe;
/// Function 1 interrupt-pending register polled in shared-bus mode.
pub const REG_FN1_INT_PENDING: u32 = 0x04;

/* Chip-side (windowed) registers */

pub const WILC_CHIPID: u32 = 0x1000;
pub const WILC_INTR_ENABLE: u32 = 0x1050;
pub const WILC_MISC: u32 = 0x1348;
pub const WILC_PIN_MUX_0: u32 = 0x1408;

/* Interrupt bitmap encoding */

/// Pending interrupt lines sit above the DMA word count in the status word.
pub const IRQ_FLAGS_OFFSET: u32 = 16;
pub const DMA_COUNT_MASK: u32 = (1 << IRQ_FLAGS_OFFSET) - 1;
pub const MAX_NUM_INT: u32 = 5;
pub const INT_0: u32 = 1 << IRQ_FLAGS_OFFSET;
pub const INT_1: u32 = 1 << (IRQ_FLAGS_OFFSET + 1);
pub const INT_2: u32 = 1 << (IRQ_FLAGS_OFFSET + 2);
pub const INT_3: u32 = 1 << (IRQ_FLAGS_OFFSET + 3);
pub const INT_4: u32 = 1 << (IRQ_FLAGS_OFFSET + 4);

/* Interrupt-clear request layout (the `clear_int_ext` mask) */

pub const SEL_VMM_TBL0: u32 = 1 << 5;
pub const SEL_VMM_TBL1: u32 = 1 << 6;
pub const EN_VMM: u32 = 1 << 7;

/// Registers in this range are reachable with a single CMD52 and bypass the
/// CSA window entirely.
pub(crate) fn is_direct_address(address: u32) -> bool {
    (0xf0..=0xff).contains(&address)
}

const CHIP_FAMILY_MASK: u32 = 0xffff_f000;
const CHIPID_FAMILY_1000: u32 = 0x0010_0000;
const CHIPID_FAMILY_3000: u32 = 0x0030_0000;

/// Chip variant, determined once at bring-up from the chip-identification
/// register. Drives the interrupt status/clear register layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Chip {
    Wilc1000,
    Wilc3000,
}

impl Chip {
    /// Decodes a chip-identification value into a known family.
    pub fn from_chipid(chipid: u32) -> Option<Self> {
        match chipid & CHIP_FAMILY_MASK {
            CHIPID_FAMILY_1000 => Some(Chip::Wilc1000),
            CHIPID_FAMILY_3000 => Some(Chip::Wilc3000),
            _ => None,
        }
    }

    /// Function 1 register holding the pending interrupt lines in
    /// dedicated-pin mode, with the mask of valid line bits.
    pub(crate) fn irq_flag_reg(self) -> (u32, u8) {
        match self {
            Chip::Wilc1000 => (REG_IRQ_FLAG_1000, 0x1f),
            Chip::Wilc3000 => (REG_IRQ_FLAG_3000, 0x0f),
        }
    }
}
