//! Error types shared across the whole crate.
//!
//! Mirrors the shape of the teacher's hand-written `MilterError`: one error
//! enum per concern, `#[from]` conversions at I/O boundaries, but expressed
//! with `thiserror` the way the on-domain `miltr` crate does it.

use thiserror::Error;

use crate::command::Command;
use crate::session::SessionState;

/// Top level error for anything that can go wrong while speaking milter.
#[derive(Debug, Error)]
pub enum Error {
    /// A framing or payload problem on the wire. Always fatal to the session.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O failure, including timeouts. Always fatal to the session.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The user-supplied decision function (or rcpt validator) returned an error.
    #[error("application error: {0}")]
    Application(String),

    /// Programmer error: the body buffer, header cursor, or option set was misused.
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),
}

impl Error {
    pub fn application<E: std::fmt::Display>(err: E) -> Self {
        Error::Application(err.to_string())
    }

    /// True for errors that must close the underlying stream.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::Io(_))
    }
}

/// Errors in framing, parsing, or negotiating the wire protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("packet length {0} exceeds the 512 MiB hard limit")]
    PacketTooLarge(u32),

    #[error("received a zero-length packet")]
    EmptyPacket,

    #[error("payload of {0} bytes exceeds the negotiated max data size of {1} bytes")]
    PayloadTooLarge(usize, usize),

    #[error("unknown command code {0:#04x}")]
    UnknownCommand(u8),

    #[error("unknown response code {0:#04x}")]
    UnknownResponse(u8),

    #[error("malformed {0} payload: {1}")]
    Malformed(&'static str, String),

    #[error("unsupported milter protocol version {0}; supported range is {1}..={2}")]
    UnsupportedVersion(u32, u32, u32),

    #[error("negotiation failed: required {0:?} were not granted by the peer")]
    NegotiationRejected(String),

    #[error("received {0:?} while session was in state {1:?}")]
    OutOfSequence(Command, SessionState),

    #[error("SMTP reply text encodes to more than 64 KiB - 2 bytes")]
    ReplyTooLarge,
}

/// Programmer-error class: these indicate a bug in the calling code, not in the
/// remote peer or the wire data. They are returned, never panicked, so tests
/// can assert on them per the crate's exception-for-control-flow policy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("wrote to the body spool buffer after it had already been read or sought")]
    WriteAfterRead,

    #[error("header cursor used before calling next()")]
    CursorNotPositioned,

    #[error("header cursor is past the end of the header list")]
    CursorExhausted,

    #[error("invalid option combination: {0}")]
    InvalidOptions(&'static str),

    #[error("a decision has already been recorded for this transaction")]
    DecisionAlreadyMade,
}
