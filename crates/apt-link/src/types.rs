use core::fmt;
use time::OffsetDateTime;

/// Address of the host PC on the APT bus.
pub const HOST: u8 = 0x01;
/// Address of the controller motherboard.
pub const MOTHERBOARD: u8 = 0x11;
/// Address of the first slot card; slot `n` (zero-based) sits at `SLOT_BASE + n`.
pub const SLOT_BASE: u8 = 0x21;
/// Destination bit marking a frame that carries a length-prefixed payload.
pub const EXTENDED_FLAG: u8 = 0x80;
/// Slot addresses reserved above `SLOT_BASE`.
pub const MAX_SLOTS: u8 = 16;

/// A node on the APT bus. Slot indices are zero-based on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Address {
    Host,
    Motherboard,
    Slot(u8),
    Other(u8),
}

impl Address {
    /// Address of a slot given its 1-based number as written in configuration files.
    pub fn slot(one_based: u16) -> Option<Self> {
        if one_based >= 1 && one_based <= u16::from(MAX_SLOTS) {
            Some(Address::Slot((one_based - 1) as u8))
        } else {
            None
        }
    }

    /// Raw 7-bit address byte (without the extended flag).
    pub fn byte(self) -> u8 {
        match self {
            Address::Host => HOST,
            Address::Motherboard => MOTHERBOARD,
            Address::Slot(n) => SLOT_BASE.wrapping_add(n) & !EXTENDED_FLAG,
            Address::Other(b) => b & !EXTENDED_FLAG,
        }
    }

    pub fn from_byte(raw: u8) -> Self {
        let b = raw & !EXTENDED_FLAG;
        match b {
            HOST => Address::Host,
            MOTHERBOARD => Address::Motherboard,
            _ if b >= SLOT_BASE && b < SLOT_BASE + MAX_SLOTS => Address::Slot(b - SLOT_BASE),
            _ => Address::Other(b),
        }
    }

    /// 1-based slot number, if this is a slot address.
    pub fn slot_number(self) -> Option<u16> {
        match self {
            Address::Slot(n) => Some(u16::from(n) + 1),
            _ => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Host => f.write_str("host"),
            Address::Motherboard => f.write_str("motherboard"),
            Address::Slot(n) => write!(f, "slot {}", u16::from(*n) + 1),
            Address::Other(b) => write!(f, "0x{b:02X}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timestamp(pub OffsetDateTime);

#[derive(Clone, Debug)]
pub struct PortInfo {
    pub name: String,
    pub driver: String,
}
