//! device-programming: multi-step programming sessions for modular motion controllers
//!
//! Two blocking request/reply protocols: lookup-table (LUT) programming and one-wire
//! identity programming. Both need exclusive use of the link from the first request to
//! the end of cleanup, because the controller matches replies to requests by arrival
//! order. Run them from a worker thread; pass a [`CancelToken`] to stop before the next
//! chunk.

mod error;
pub use error::{ProgramError, Result};

mod session;
pub use session::{CancelToken, DEFAULT_RESPONSE_TIMEOUT};

mod lut;
pub use lut::{LutImage, LutProgrammer, LutState};

mod one_wire;
pub use one_wire::{
    chunk_outcome, disable_outcome, enable_outcome, OneWireProgrammer, OneWireState,
    DEFAULT_SETTLE, DISABLE_ATTEMPTS,
};
