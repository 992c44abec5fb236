use core::fmt;

use crate::{commands, Address, LinkError, Result, EXTENDED_FLAG};

/// Size of the fixed APT header: command id, length (or two params), destination, source.
pub const HEADER_LEN: usize = 6;
/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD: usize = u16::MAX as usize - HEADER_LEN;

/// Body of an APT frame.
///
/// Short frames carry two parameter bytes in header positions 2-3 and nothing after the
/// header. Long frames carry a little-endian length there and the payload follows.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FrameBody {
    Short { param1: u8, param2: u8 },
    Long(Vec<u8>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandFrame {
    pub command_id: u16,
    pub destination: Address,
    pub source: Address,
    pub body: FrameBody,
}

impl CommandFrame {
    pub fn short(command_id: u16, destination: Address, param1: u8, param2: u8) -> Self {
        Self {
            command_id,
            destination,
            source: Address::Host,
            body: FrameBody::Short { param1, param2 },
        }
    }

    pub fn long(command_id: u16, destination: Address, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD {
            return Err(LinkError::PayloadTooLarge(payload.len()));
        }
        Ok(Self {
            command_id,
            destination,
            source: Address::Host,
            body: FrameBody::Long(payload),
        })
    }

    /// Request that `destination` copy the parameters last applied by `command_id`
    /// on `channel` into non-volatile storage.
    pub fn persist(destination: Address, channel: u16, command_id: u16) -> Self {
        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&channel.to_le_bytes());
        payload.extend_from_slice(&command_id.to_le_bytes());
        Self {
            command_id: commands::MOT_SET_EEPROMPARAMS,
            destination,
            source: Address::Host,
            body: FrameBody::Long(payload),
        }
    }

    pub fn is_extended(&self) -> bool {
        matches!(self.body, FrameBody::Long(_))
    }

    /// Payload bytes; empty for short frames.
    pub fn payload(&self) -> &[u8] {
        match &self.body {
            FrameBody::Long(p) => p,
            FrameBody::Short { .. } => &[],
        }
    }

    pub fn params(&self) -> Option<(u8, u8)> {
        match self.body {
            FrameBody::Short { param1, param2 } => Some((param1, param2)),
            FrameBody::Long(_) => None,
        }
    }

    /// Destination byte as written on the wire.
    pub fn destination_byte(&self) -> u8 {
        if self.is_extended() {
            self.destination.byte() | EXTENDED_FLAG
        } else {
            self.destination.byte()
        }
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload().len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.command_id.to_le_bytes());
        match &self.body {
            FrameBody::Short { param1, param2 } => {
                out.push(*param1);
                out.push(*param2);
            }
            FrameBody::Long(payload) => {
                // long() bounds the payload, but a caller may have edited `body` directly
                let len = u16::try_from(payload.len()).unwrap_or(u16::MAX);
                out.extend_from_slice(&len.to_le_bytes());
            }
        }
        out.push(self.destination_byte());
        out.push(self.source.byte());
        out.extend_from_slice(self.payload());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(LinkError::Malformed("shorter than header"));
        }
        let command_id = u16::from_le_bytes([bytes[0], bytes[1]]);
        let dest = bytes[4];
        let source = Address::from_byte(bytes[5]);
        let destination = Address::from_byte(dest);
        if dest & EXTENDED_FLAG == 0 {
            if bytes.len() != HEADER_LEN {
                return Err(LinkError::Malformed("trailing bytes after short frame"));
            }
            return Ok(Self {
                command_id,
                destination,
                source,
                body: FrameBody::Short {
                    param1: bytes[2],
                    param2: bytes[3],
                },
            });
        }
        let len = usize::from(u16::from_le_bytes([bytes[2], bytes[3]]));
        if len > MAX_PAYLOAD {
            return Err(LinkError::Malformed("length above protocol ceiling"));
        }
        if bytes.len() != HEADER_LEN + len {
            return Err(LinkError::Malformed("length field does not match payload"));
        }
        Ok(Self {
            command_id,
            destination,
            source,
            body: FrameBody::Long(bytes[HEADER_LEN..].to_vec()),
        })
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.body {
            FrameBody::Short { param1, param2 } => write!(
                f,
                "0x{:04X} -> {} ({param1}, {param2})",
                self.command_id, self.destination
            ),
            FrameBody::Long(ref p) => write!(
                f,
                "0x{:04X} -> {} [{} bytes]",
                self.command_id,
                self.destination,
                p.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_frame_layout() {
        let f = CommandFrame::short(commands::RESTART_PROCESSOR, Address::Motherboard, 1, 0);
        assert_eq!(f.to_bytes(), vec![0x0B, 0x40, 0x01, 0x00, 0x11, 0x01]);
        assert!(!f.is_extended());
    }

    #[test]
    fn long_frame_sets_flag_and_length() {
        let f = CommandFrame::long(0x4004, Address::Motherboard, vec![0, 0, 0x10, 0]).unwrap();
        assert_eq!(
            f.to_bytes(),
            vec![0x04, 0x40, 0x04, 0x00, 0x91, 0x01, 0x00, 0x00, 0x10, 0x00]
        );
        let s = CommandFrame::long(0x4041, Address::Slot(2), vec![3, 0]).unwrap();
        assert_eq!(s.destination_byte(), 0xA3);
    }

    #[test]
    fn round_trip_preserves_fields() {
        for len in [0usize, 1, 90, MAX_PAYLOAD] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let f = CommandFrame::long(0x4102, Address::Slot(4), payload.clone()).unwrap();
            let back = CommandFrame::decode(&f.to_bytes()).unwrap();
            assert_eq!(back.command_id, 0x4102);
            assert_eq!(back.destination, Address::Slot(4));
            assert!(back.is_extended());
            assert_eq!(back.payload(), payload.as_slice());
        }
        let s = CommandFrame::short(0x40F8, Address::Motherboard, 3, 1);
        assert_eq!(CommandFrame::decode(&s.to_bytes()).unwrap(), s);
    }

    #[test]
    fn oversize_payload_rejected() {
        let err = CommandFrame::long(0x4102, Address::Motherboard, vec![0; MAX_PAYLOAD + 1]);
        assert!(matches!(err, Err(LinkError::PayloadTooLarge(n)) if n == MAX_PAYLOAD + 1));
    }

    #[test]
    fn decode_rejects_bad_lengths() {
        assert!(matches!(
            CommandFrame::decode(&[0x04, 0x40, 0x02]),
            Err(LinkError::Malformed(_))
        ));
        assert!(matches!(
            CommandFrame::decode(&[0x04, 0x40, 0x04, 0x00, 0x91, 0x01, 0x00]),
            Err(LinkError::Malformed(_))
        ));
        assert!(matches!(
            CommandFrame::decode(&[0x0B, 0x40, 0x01, 0x00, 0x11, 0x01, 0xFF]),
            Err(LinkError::Malformed(_))
        ));
    }

    #[test]
    fn persist_names_channel_and_command() {
        let f = CommandFrame::persist(Address::Slot(0), 0, commands::MCM_SET_STAGEPARAMS);
        assert_eq!(
            f.to_bytes(),
            vec![0xB9, 0x04, 0x04, 0x00, 0xA1, 0x01, 0x00, 0x00, 0x41, 0x40]
        );
    }
}
