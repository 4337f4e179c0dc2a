//! Bitfield decoding for the crossing's signalling indicators.
//!
//! The BP signalling area reports indicator bits in addressed bytes. The
//! crossing is covered by four of them, spread over two addresses:
//!
//! | address | bit  | indicator  |
//! |---------|------|------------|
//! | `0x08`  | 0x80 | SPW5261    |
//! | `0x08`  | 0x40 | SPW5264    |
//! | `0x08`  | 0x01 | SPW5261BR  |
//! | `0x09`  | 0x20 | SPW5264BR  |

use serde::Serialize;

pub const PRIMARY_ADDRESS: u16 = 0x08;
pub const SECONDARY_ADDRESS: u16 = 0x09;

const SPW5261_MASK: u16 = 0x80;
const SPW5264_MASK: u16 = 0x40;
const SPW5261_BR_MASK: u16 = 0x01;
const SPW5264_BR_MASK: u16 = 0x20;

/// Latched indicator state. Each flag holds the last bit seen for it until overwritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndicatorSet {
    pub spw5261: bool,
    pub spw5261_br: bool,
    pub spw5264: bool,
    pub spw5264_br: bool,
}

impl IndicatorSet {
    /// Apply one addressed update. Unknown addresses leave the set untouched.
    ///
    /// Every indicator mapped from `address` is overwritten, set or clear.
    pub fn apply(self, address: u16, data: u16) -> Self {
        match address {
            PRIMARY_ADDRESS => Self {
                spw5261: data & SPW5261_MASK != 0,
                spw5264: data & SPW5264_MASK != 0,
                spw5261_br: data & SPW5261_BR_MASK != 0,
                ..self
            },
            SECONDARY_ADDRESS => Self {
                spw5264_br: data & SPW5264_BR_MASK != 0,
                ..self
            },
            _ => self,
        }
    }

    pub fn is_significant(address: u16) -> bool {
        matches!(address, PRIMARY_ADDRESS | SECONDARY_ADDRESS)
    }

    /// The barrier is down when any indicator is set.
    pub fn any_set(&self) -> bool {
        self.spw5261 || self.spw5261_br || self.spw5264 || self.spw5264_br
    }
}
