use std::time::Duration;

use crate::{commands, Address, CommandFrame, LinkError, Result};

/// Write-only side of a link.
///
/// Provisioning pushes frames through this and never waits for a reply; the device
/// applies parameters in the order they arrive.
pub trait FrameSink {
    /// Send raw bytes as one transfer.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Encode and send one frame.
    fn send_frame(&mut self, frame: &CommandFrame) -> Result<()> {
        tracing::debug!(
            command = format_args!("0x{:04X}", frame.command_id),
            destination = %frame.destination,
            len = frame.payload().len(),
            "send frame"
        );
        self.send(&frame.to_bytes())
    }
}

/// A link that can also wait for the device's replies.
///
/// The device matches replies to requests by arrival order, so a caller must hold the
/// link exclusively between a request and its reply.
pub trait RequestResponseChannel: FrameSink {
    /// Send only the first `len` bytes of `buf`.
    fn send_fragment(&mut self, buf: &[u8], len: usize) -> Result<()> {
        let head = buf
            .get(..len)
            .ok_or(LinkError::Malformed("fragment length exceeds buffer"))?;
        self.send(head)
    }

    /// Receive one frame, blocking until it arrives.
    fn receive(&mut self) -> Result<Vec<u8>>;

    /// Receive one frame, or `None` if nothing arrived within `timeout`.
    fn receive_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Ask the controller to reboot.
    fn restart_device(&mut self) -> Result<()> {
        self.send_frame(&CommandFrame::short(
            commands::RESTART_PROCESSOR,
            Address::Motherboard,
            1,
            0,
        ))
    }
}

impl<T: FrameSink + ?Sized> FrameSink for &mut T {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).send(bytes)
    }
}

impl<T: RequestResponseChannel + ?Sized> RequestResponseChannel for &mut T {
    fn send_fragment(&mut self, buf: &[u8], len: usize) -> Result<()> {
        (**self).send_fragment(buf, len)
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        (**self).receive()
    }

    fn receive_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        (**self).receive_timeout(timeout)
    }

    fn restart_device(&mut self) -> Result<()> {
        (**self).restart_device()
    }
}
