use thiserror::Error;

use crate::MAX_PAYLOAD;

pub type Result<T, E = LinkError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("port not found: {0}")]
    PortNotFound(String),
    #[error("operation not supported on this link: {0}")]
    Unsupported(&'static str),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("timeout")]
    Timeout,
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
    #[error("payload of {0} bytes exceeds the {max} byte frame limit", max = MAX_PAYLOAD)]
    PayloadTooLarge(usize),
}
