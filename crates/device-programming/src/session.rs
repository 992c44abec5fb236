//! Pieces shared by the programming sessions: awaited requests, reply parsing and
//! caller-side cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use apt_link::{CommandFrame, FrameBody, LinkError, RequestResponseChannel};

use crate::{ProgramError, Result};

/// Per-reply wait used when the caller does not choose one.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Shared flag a caller sets to stop a session before its next chunk.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Data bytes of a reply: the payload of a long frame, or the two header parameters of a
/// short one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Reply(Vec<u8>);

impl Reply {
    pub(crate) fn parse(raw: &[u8]) -> Result<Self> {
        let frame = CommandFrame::decode(raw)?;
        Ok(Reply(match frame.body {
            FrameBody::Short { param1, param2 } => vec![param1, param2],
            FrameBody::Long(payload) => payload,
        }))
    }

    pub(crate) fn byte(&self, at: usize) -> Result<u8> {
        self.0
            .get(at)
            .copied()
            .ok_or(ProgramError::Link(LinkError::Malformed("reply too short")))
    }

    pub(crate) fn u16_at(&self, at: usize) -> Result<u16> {
        Ok(u16::from_le_bytes([self.byte(at)?, self.byte(at + 1)?]))
    }

    pub(crate) fn u32_at(&self, at: usize) -> Result<u32> {
        Ok(u32::from_le_bytes([
            self.byte(at)?,
            self.byte(at + 1)?,
            self.byte(at + 2)?,
            self.byte(at + 3)?,
        ]))
    }
}

/// Wait for the reply to something already sent.
pub(crate) fn await_reply<C: RequestResponseChannel + ?Sized>(
    link: &mut C,
    timeout: Duration,
    step: u8,
) -> Result<Reply> {
    match link.receive_timeout(timeout)? {
        Some(raw) => Reply::parse(&raw),
        None => Err(ProgramError::ProtocolTimeout { step }),
    }
}

/// Send `frame` and wait for its reply.
pub(crate) fn request<C: RequestResponseChannel + ?Sized>(
    link: &mut C,
    frame: &CommandFrame,
    timeout: Duration,
    step: u8,
) -> Result<Reply> {
    link.send_frame(frame)?;
    await_reply(link, timeout, step)
}
