use thiserror::Error;

/// Rejected operations. Missing pose data is never an error; it is carried as `None`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// `start` while another session is recording
    #[error("recording session '{0}' is already active")]
    SessionActive(String),

    /// `stop` without a running session
    #[error("no recording session is active")]
    NoActiveSession,

    /// Frame index did not increase
    #[error("frame {got} arrived after frame {last}")]
    FrameOutOfOrder { last: u64, got: u64 },

    /// Timestamp is NaN or infinite
    #[error("frame {frame_index} has non-finite timestamp")]
    NonFiniteTimestamp { frame_index: u64 },

    /// Parameter rejected before processing starts
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
