//! Lookup-table programming.
//!
//! An inquiry is opened for one table, the device's chunk limit is read, the inquiry data
//! is streamed, then programming is opened and inquiry plus payload are streamed again
//! before the table is finished. Every request waits for its reply.

use std::time::Duration;

use apt_link::{commands, Address, CommandFrame, RequestResponseChannel, MAX_PAYLOAD};

use crate::session::{request, CancelToken, Reply, DEFAULT_RESPONSE_TIMEOUT};
use crate::{ProgramError, Result};

/// Chunk reply status meaning "more expected".
const STATUS_CONTINUE: u8 = 12;
/// Bad-address value the device reports when nothing went wrong.
const NO_BAD_ADDRESS: u32 = 0xFFFF_FFFF;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LutState {
    Idle,
    InquiryBegun,
    SizeKnown,
    InquirySent,
    ProgrammingBegun,
    DataSent,
    Finished,
}

/// One table to program.
#[derive(Clone, Copy, Debug)]
pub struct LutImage<'a> {
    pub table: u8,
    pub inquiry: &'a [u8],
    pub payload: &'a [u8],
}

/// Runs a LUT session over a link held exclusively for the whole session.
pub struct LutProgrammer<C> {
    link: C,
    timeout: Duration,
    cancel: Option<CancelToken>,
    state: LutState,
}

impl<C: RequestResponseChannel> LutProgrammer<C> {
    pub fn new(link: C) -> Self {
        Self {
            link,
            timeout: DEFAULT_RESPONSE_TIMEOUT,
            cancel: None,
            state: LutState::Idle,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn state(&self) -> LutState {
        self.state
    }

    pub fn into_inner(self) -> C {
        self.link
    }

    /// Program `image`. On failure the open inquiry or programming window is closed
    /// before the error is returned, and the session is back in [`LutState::Idle`].
    pub fn program(&mut self, image: &LutImage<'_>) -> Result<()> {
        let mut step = 1;
        match self.run(image, &mut step) {
            Ok(()) => {
                self.state = LutState::Finished;
                tracing::info!(table = image.table, "lut programmed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(table = image.table, step, error = %e, "lut programming failed");
                self.cleanup(image.table, step);
                self.state = LutState::Idle;
                Err(e)
            }
        }
    }

    fn run(&mut self, image: &LutImage<'_>, step: &mut u8) -> Result<()> {
        let table = image.table;

        *step = 1;
        let reply = self.short_request(commands::LUT_SET_INQUIRY, table, 1, *step)?;
        expect_status(&[0], reply.byte(1)?, *step)?;
        self.state = LutState::InquiryBegun;
        tracing::info!(table, "lut inquiry open");

        *step = 2;
        let reply = self.short_request(commands::LUT_REQ_PROGRAMMING_SIZE, table, 1, *step)?;
        let chunk = chunk_size(reply.u32_at(1)?, *step)?;
        self.state = LutState::SizeKnown;
        tracing::debug!(table, chunk, "lut chunk size");

        *step = 3;
        self.send_chunks(commands::LUT_INQUIRE, table, image.inquiry, chunk, *step)?;
        self.state = LutState::InquirySent;

        *step = 4;
        let reply = self.short_request(commands::LUT_SET_PROGRAMMING, table, 1, *step)?;
        expect_status(&[0], reply.byte(1)?, *step)?;
        self.state = LutState::ProgrammingBegun;
        tracing::info!(table, "lut programming open");

        *step = 5;
        let mut data = Vec::with_capacity(image.inquiry.len() + image.payload.len());
        data.extend_from_slice(image.inquiry);
        data.extend_from_slice(image.payload);
        self.send_chunks(commands::LUT_PROGRAM, table, &data, chunk, *step)?;
        self.state = LutState::DataSent;

        *step = 6;
        let reply = self.short_request(commands::LUT_FINISH_PROGRAMMING, table, 1, *step)?;
        let bad = reply.u32_at(1)?;
        if bad != NO_BAD_ADDRESS {
            return Err(ProgramError::BadAddress(bad));
        }
        Ok(())
    }

    fn short_request(&mut self, command: u16, table: u8, enable: u8, step: u8) -> Result<Reply> {
        let frame = CommandFrame::short(command, Address::Motherboard, table, enable);
        request(&mut self.link, &frame, self.timeout, step)
    }

    fn send_chunks(
        &mut self,
        command: u16,
        table: u8,
        data: &[u8],
        chunk: usize,
        step: u8,
    ) -> Result<()> {
        for (i, piece) in data.chunks(chunk).enumerate() {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(ProgramError::Cancelled { step });
            }
            let mut payload = Vec::with_capacity(piece.len() + 1);
            payload.push(table);
            payload.extend_from_slice(piece);
            let frame = CommandFrame::long(command, Address::Motherboard, payload)?;
            let reply = request(&mut self.link, &frame, self.timeout, step)?;
            expect_status(&[0, STATUS_CONTINUE], reply.byte(1)?, step)?;
            tracing::debug!(table, step, chunk = i, len = piece.len(), "lut chunk accepted");
        }
        Ok(())
    }

    /// Close whatever window `step` left open. Failures here are only logged.
    fn cleanup(&mut self, table: u8, step: u8) {
        let command = match step {
            1..=3 => commands::LUT_SET_INQUIRY,
            4..=6 => commands::LUT_SET_PROGRAMMING,
            _ => return,
        };
        let frame = CommandFrame::short(command, Address::Motherboard, table, 0);
        if let Err(e) = self.link.send_frame(&frame) {
            tracing::warn!(table, step, error = %e, "lut cleanup frame not sent");
        }
    }
}

fn expect_status(accepted: &[u8], status: u8, step: u8) -> Result<()> {
    if accepted.contains(&status) {
        Ok(())
    } else {
        Err(ProgramError::ProtocolStatus {
            step,
            status,
            message: "bad response".to_string(),
        })
    }
}

/// Usable chunk length: the device limit as a 16-bit value, bounded by what one frame
/// can carry next to the table byte.
fn chunk_size(reported: u32, step: u8) -> Result<usize> {
    let limit = usize::from(reported as u16).min(MAX_PAYLOAD - 1);
    if limit == 0 {
        return Err(ProgramError::ProtocolStatus {
            step,
            status: 0,
            message: "device reported a zero chunk size".to_string(),
        });
    }
    Ok(limit)
}
