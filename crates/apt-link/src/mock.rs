use std::collections::VecDeque;
use std::time::Duration;

use time::OffsetDateTime;

use crate::{
    commands, Address, CommandFrame, FrameSink, LinkError, PortInfo, RequestResponseChannel,
    Result, Timestamp,
};

/// One transfer captured by [`MockLink`].
#[derive(Clone, Debug)]
pub struct SentRecord {
    pub bytes: Vec<u8>,
    pub fragment: bool,
    pub at: Timestamp,
}

/// In-process link that records every transfer and replays scripted replies.
///
/// Replies are consumed in order. A scripted silence, or an empty script, reads as a
/// timeout.
pub struct MockLink {
    name: String,
    sent: Vec<SentRecord>,
    replies: VecDeque<Option<Vec<u8>>>,
    restarts: usize,
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new("mock0")
    }
}

impl MockLink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sent: Vec::new(),
            replies: VecDeque::new(),
            restarts: 0,
        }
    }

    pub fn list() -> Vec<PortInfo> {
        vec![PortInfo {
            name: "mock0".to_string(),
            driver: "mock".to_string(),
        }]
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push_reply(&mut self, bytes: Vec<u8>) {
        self.replies.push_back(Some(bytes));
    }

    pub fn push_reply_frame(&mut self, frame: &CommandFrame) {
        self.push_reply(frame.to_bytes());
    }

    /// Script one reply window in which the device stays silent.
    pub fn push_silence(&mut self) {
        self.replies.push_back(None);
    }

    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    pub fn sent(&self) -> &[SentRecord] {
        &self.sent
    }

    /// Decoded view of everything sent so far.
    pub fn sent_frames(&self) -> Result<Vec<CommandFrame>> {
        self.sent
            .iter()
            .map(|r| CommandFrame::decode(&r.bytes))
            .collect()
    }

    pub fn restarts(&self) -> usize {
        self.restarts
    }

    pub fn clear(&mut self) {
        self.sent.clear();
        self.replies.clear();
        self.restarts = 0;
    }

    fn record(&mut self, bytes: &[u8], fragment: bool) {
        self.sent.push(SentRecord {
            bytes: bytes.to_vec(),
            fragment,
            at: Timestamp(OffsetDateTime::now_utc()),
        });
    }
}

impl FrameSink for MockLink {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.record(bytes, false);
        Ok(())
    }
}

impl RequestResponseChannel for MockLink {
    fn send_fragment(&mut self, buf: &[u8], len: usize) -> Result<()> {
        let head = buf
            .get(..len)
            .ok_or(LinkError::Malformed("fragment length exceeds buffer"))?;
        self.record(head, true);
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        // Nothing would ever arrive, so report it instead of blocking forever
        self.replies
            .pop_front()
            .flatten()
            .ok_or(LinkError::Timeout)
    }

    fn receive_timeout(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>> {
        Ok(self.replies.pop_front().flatten())
    }

    fn restart_device(&mut self) -> Result<()> {
        self.restarts += 1;
        let frame = CommandFrame::short(commands::RESTART_PROCESSOR, Address::Motherboard, 1, 0);
        self.record(&frame.to_bytes(), false);
        Ok(())
    }
}
