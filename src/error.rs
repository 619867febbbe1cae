//! Error types for AGI sessions and the FastAGI listener

use thiserror::Error;

/// Result alias used throughout the crate.
pub type AgiResult<T> = Result<T, AgiError>;

/// Everything that can go wrong while talking AGI.
///
/// Nothing in this crate retries: every variant is handed to the caller,
/// who owns the decision to retry, hang up, or drop the session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgiError {
    /// Read or write failure on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream (EOF).
    #[error("connection closed")]
    ConnectionClosed,

    /// No complete reply arrived before the deadline.
    ///
    /// The stream may hold a partial reply afterwards; the session refuses
    /// further commands.
    #[error("timed out after {timeout_ms}ms waiting for a reply")]
    Timeout {
        /// Deadline that elapsed.
        timeout_ms: u64,
    },

    /// Reply does not start with a decimal status code.
    #[error("malformed reply code: {raw:?}")]
    MalformedCode {
        /// Reply text as received.
        raw: String,
    },

    /// Status code is not followed by ` result=<integer>`.
    #[error("malformed result in reply: {raw:?}")]
    MalformedResult {
        /// Reply text as received.
        raw: String,
    },

    /// Reply too short to classify, or a status code outside the known set.
    #[error("empty or unrecognized reply: {raw:?}")]
    InvalidReply {
        /// Reply text as received.
        raw: String,
    },

    /// Asterisk reported the channel hung up (out-of-band `HANGUP` line).
    #[error("channel hung up")]
    HungUp,

    /// Handshake line without the `agi_` prefix or the `": "` separator.
    #[error("invalid environment line: {line:?}")]
    InvalidEnvironment {
        /// Offending line, without its terminator.
        line: String,
    },

    /// Local protocol violation (newline in an argument, over-long line).
    #[error("protocol error: {message}")]
    ProtocolError {
        /// Description of the violation.
        message: String,
    },

    /// A previous read timed out or failed; the reply stream is out of step.
    #[error("session is desynchronized after a failed read")]
    Desynchronized,

    /// A command replied with a value the wrapper treats as failure.
    #[error("{command} failed: {raw:?}")]
    CommandFailed {
        /// Command verb.
        command: String,
        /// Reply text as received.
        raw: String,
    },

    /// The FastAGI listener stopped accepting connections.
    #[error("listener failed: {message}")]
    ListenerFailed {
        /// Description of the failure.
        message: String,
    },
}

impl AgiError {
    pub(crate) fn protocol_error(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    /// Read/write failure or closed stream.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ConnectionClosed)
    }

    /// Reply deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Reply text could not be classified.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedCode { .. } | Self::MalformedResult { .. } | Self::InvalidReply { .. }
        )
    }

    /// Out-of-band hangup notification.
    pub fn is_hangup(&self) -> bool {
        matches!(self, Self::HungUp)
    }

    /// Raw reply text carried by parse and command errors.
    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::MalformedCode { raw }
            | Self::MalformedResult { raw }
            | Self::InvalidReply { raw }
            | Self::CommandFailed { raw, .. } => Some(raw),
            _ => None,
        }
    }
}
