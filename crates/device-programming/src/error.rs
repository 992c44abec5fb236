use apt_link::LinkError;
use thiserror::Error;

pub type Result<T, E = ProgramError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("programming failure: step {step} timeout")]
    ProtocolTimeout { step: u8 },
    #[error("programming failure: step {step}: {message} (status {status})")]
    ProtocolStatus {
        step: u8,
        status: u8,
        message: String,
    },
    #[error("programming failure: invalid address 0x{0:08X}")]
    BadAddress(u32),
    #[error("programming cancelled at step {step}")]
    Cancelled { step: u8 },
}

impl ProgramError {
    /// Step the session was on when it failed, if the error names one.
    pub fn step(&self) -> Option<u8> {
        match self {
            ProgramError::ProtocolTimeout { step }
            | ProgramError::ProtocolStatus { step, .. }
            | ProgramError::Cancelled { step } => Some(*step),
            ProgramError::BadAddress(_) => Some(6),
            ProgramError::Link(_) => None,
        }
    }
}
