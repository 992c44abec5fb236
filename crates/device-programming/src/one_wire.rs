//! One-wire identity chip programming through the motherboard.
//!
//! Programming mode is enabled for a slot, the chunk limit is read, the image is streamed
//! in length-prefixed fragments and programming mode is disabled again. A session that
//! fails after the mode was entered tries hard to leave it, restarting the controller as
//! the last resort.

use std::thread;
use std::time::Duration;

use apt_link::{commands, Address, CommandFrame, RequestResponseChannel, HEADER_LEN, MAX_PAYLOAD};

use crate::session::{await_reply, request, CancelToken, DEFAULT_RESPONSE_TIMEOUT};
use crate::{ProgramError, Result};

/// The device needs this long after its connection state changes before data is accepted.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(400);
/// Attempts at leaving programming mode before the controller is restarted.
pub const DISABLE_ATTEMPTS: usize = 10;

/// Bytes ahead of the data in a program fragment's payload: slot and a reserved byte.
const CHUNK_PREFIX: usize = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OneWireState {
    Idle,
    ProgrammingEnabled,
    SizeKnown,
    Programming,
    Disabled,
    Done,
}

/// Message for a non-zero reply to "enable programming".
pub fn enable_outcome(status: u8) -> &'static str {
    match status {
        0 => "Programming was cancelled.",
        1 => "No device is connected.",
        2 => "Device does not support one-wire.",
        3 => "Device was already programming.",
        4 => "Unable to enter programming mode.",
        _ => "Some unknown event occurred.",
    }
}

/// Message for a non-zero reply to a data chunk.
pub fn chunk_outcome(status: u8) -> &'static str {
    match status {
        1 => "Device was disconnected.",
        2 => "Device does not support one-wire.",
        4 => "Device abnormally stopped programming.",
        5 => "Device's memory has overflowed.",
        6 => "Maximum programming size violated.",
        _ => "Some unknown event occurred.",
    }
}

/// Message for the reply to "disable programming", and whether it means success.
///
/// Firmware revisions differ in which of 0 and 4 they report after a good write.
pub fn disable_outcome(status: u8) -> (&'static str, bool) {
    match status {
        0 => ("Device was successfully programmed.", true),
        1 => ("No device is connected.", false),
        2 => ("Device does not support one-wire.", false),
        3 => ("Unable to exit programming mode.", false),
        4 => ("Programming successful.", true),
        _ => ("Some unknown event occurred.", false),
    }
}

/// Runs a one-wire session over a link held exclusively for the whole session.
pub struct OneWireProgrammer<C> {
    link: C,
    timeout: Duration,
    settle: Duration,
    cancel: Option<CancelToken>,
    state: OneWireState,
}

impl<C: RequestResponseChannel> OneWireProgrammer<C> {
    pub fn new(link: C) -> Self {
        Self {
            link,
            timeout: DEFAULT_RESPONSE_TIMEOUT,
            settle: DEFAULT_SETTLE,
            cancel: None,
            state: OneWireState::Idle,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn state(&self) -> OneWireState {
        self.state
    }

    pub fn into_inner(self) -> C {
        self.link
    }

    /// Program `data` into the one-wire chip of the device in `slot` (zero-based).
    ///
    /// Returns the device's outcome message on success.
    pub fn program(&mut self, slot: u8, data: &[u8]) -> Result<&'static str> {
        let mut step = 1;
        let result = self.run(slot, data, &mut step);
        match &result {
            Ok(outcome) => {
                self.state = OneWireState::Done;
                tracing::info!(slot, outcome, "one-wire programmed");
            }
            Err(e) => {
                tracing::warn!(slot, step, error = %e, "one-wire programming failed");
                self.recover(slot, step);
                self.state = OneWireState::Idle;
            }
        }
        result
    }

    fn run(&mut self, slot: u8, data: &[u8], step: &mut u8) -> Result<&'static str> {
        *step = 1;
        let reply = request(&mut self.link, &mode_frame(slot, true)?, self.timeout, *step)?;
        let status = reply.byte(2)?;
        if status != 0 {
            return Err(status_error(*step, status, enable_outcome(status)));
        }
        self.state = OneWireState::ProgrammingEnabled;
        tracing::info!(slot, "one-wire programming enabled");

        *step = 2;
        let size =
            CommandFrame::short(commands::OW_REQ_PROGRAMMING_SIZE, Address::Motherboard, 0, 0);
        let reply = request(&mut self.link, &size, self.timeout, *step)?;
        let chunk = usize::from(reply.u16_at(0)?).min(MAX_PAYLOAD - CHUNK_PREFIX);
        if chunk == 0 {
            return Err(status_error(*step, 0, "Device reported a zero chunk size."));
        }
        self.state = OneWireState::SizeKnown;

        *step = 3;
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        self.state = OneWireState::Programming;
        self.send_image(slot, data, chunk, *step)?;

        *step = 4;
        let reply = request(&mut self.link, &mode_frame(slot, false)?, self.timeout, *step)?;
        let status = reply.byte(2)?;
        let (outcome, ok) = disable_outcome(status);
        if !ok {
            return Err(status_error(*step, status, outcome));
        }
        self.state = OneWireState::Disabled;
        Ok(outcome)
    }

    /// Stream `data` through one reused buffer, sending only the filled prefix each time.
    fn send_image(&mut self, slot: u8, data: &[u8], chunk: usize, step: u8) -> Result<()> {
        let mut buf = CommandFrame::long(
            commands::OW_PROGRAM,
            Address::Motherboard,
            vec![0; CHUNK_PREFIX + chunk],
        )?
        .to_bytes();
        buf[HEADER_LEN] = slot;
        for (i, piece) in data.chunks(chunk).enumerate() {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(ProgramError::Cancelled { step });
            }
            let len = CHUNK_PREFIX + piece.len();
            // bounded by MAX_PAYLOAD above
            let [lo, hi] = (len as u16).to_le_bytes();
            buf[2] = lo;
            buf[3] = hi;
            let start = HEADER_LEN + CHUNK_PREFIX;
            buf[start..start + piece.len()].copy_from_slice(piece);
            self.link.send_fragment(&buf, HEADER_LEN + len)?;
            let status = await_reply(&mut self.link, self.timeout, step)?.byte(2)?;
            if status != 0 {
                return Err(status_error(step, status, chunk_outcome(status)));
            }
            tracing::debug!(slot, chunk = i, len = piece.len(), "one-wire chunk accepted");
        }
        Ok(())
    }

    /// Leave the device in a usable state after a failure at `step`.
    fn recover(&mut self, slot: u8, step: u8) {
        match step {
            2 | 3 => {
                if !self.try_disable(slot) {
                    tracing::warn!(slot, "programming mode still active, restarting controller");
                    self.restart();
                }
            }
            4 => self.restart(),
            _ => {}
        }
    }

    fn try_disable(&mut self, slot: u8) -> bool {
        let frame =
            CommandFrame::short(commands::OW_SET_PROGRAMMING, Address::Motherboard, slot, 0);
        for attempt in 1..=DISABLE_ATTEMPTS {
            match request(&mut self.link, &frame, self.timeout, 4) {
                Ok(_) => {
                    tracing::info!(slot, attempt, "one-wire programming disabled");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(slot, attempt, error = %e, "disable programming unanswered")
                }
            }
        }
        false
    }

    fn restart(&mut self) {
        if let Err(e) = self.link.restart_device() {
            tracing::warn!(error = %e, "controller restart not sent");
        }
    }
}

/// Enable or disable programming mode for `slot`.
fn mode_frame(slot: u8, enable: bool) -> Result<CommandFrame> {
    Ok(CommandFrame::long(
        commands::OW_SET_PROGRAMMING,
        Address::Motherboard,
        vec![slot, 0, u8::from(enable)],
    )?)
}

fn status_error(step: u8, status: u8, message: &str) -> ProgramError {
    ProgramError::ProtocolStatus {
        step,
        status,
        message: message.to_string(),
    }
}
