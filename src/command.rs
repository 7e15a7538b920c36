//! The command code alphabet (§6): one variant per MTA→filter event.
//!
//! Kept separate from [`crate::message`]'s parsed payloads so that session
//! bookkeeping (state transitions, "out of sequence" errors) can refer to
//! *which* command arrived without re-parsing or cloning its payload.

use crate::error::ProtocolError;

/// A single MTA→filter event code, per the wire alphabet in SPEC_FULL.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    OptNeg,
    Macro,
    Connect,
    Helo,
    Mail,
    Rcpt,
    Data,
    Header,
    EndOfHeaders,
    Body,
    EndOfMessage,
    Abort,
    Quit,
    QuitNewConnection,
    Unknown,
}

impl Command {
    pub const fn code(self) -> u8 {
        match self {
            Command::OptNeg => b'O',
            Command::Macro => b'D',
            Command::Connect => b'C',
            Command::Helo => b'H',
            Command::Mail => b'M',
            Command::Rcpt => b'R',
            Command::Data => b'T',
            Command::Header => b'L',
            Command::EndOfHeaders => b'N',
            Command::Body => b'B',
            Command::EndOfMessage => b'E',
            Command::Abort => b'A',
            Command::Quit => b'Q',
            Command::QuitNewConnection => b'K',
            Command::Unknown => b'U',
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            b'O' => Command::OptNeg,
            b'D' => Command::Macro,
            b'C' => Command::Connect,
            b'H' => Command::Helo,
            b'M' => Command::Mail,
            b'R' => Command::Rcpt,
            b'T' => Command::Data,
            b'L' => Command::Header,
            b'N' => Command::EndOfHeaders,
            b'B' => Command::Body,
            b'E' => Command::EndOfMessage,
            b'A' => Command::Abort,
            b'Q' => Command::Quit,
            b'K' => Command::QuitNewConnection,
            b'U' => Command::Unknown,
            _ => return None,
        })
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Command::from_code(code).ok_or(ProtocolError::UnknownCommand(code))
    }
}

/// The response code alphabet (§6): filter→MTA terminal/continuation replies
/// and modification-action tags, kept as plain code constants since their
/// payload shapes live on [`crate::message::Response`] and
/// [`crate::message::ModificationAction`] directly.
pub mod response_code {
    pub const CONTINUE: u8 = b'c';
    pub const ACCEPT: u8 = b'a';
    pub const REJECT: u8 = b'r';
    pub const TEMPFAIL: u8 = b't';
    pub const DISCARD: u8 = b'd';
    pub const REPLY_CODE: u8 = b'y';
    pub const SKIP: u8 = b's';
    pub const PROGRESS: u8 = b'p';

    pub const ADD_RCPT: u8 = b'+';
    pub const DEL_RCPT: u8 = b'-';
    pub const ADD_RCPT_PAR: u8 = b'2';
    pub const REPLACE_BODY: u8 = b'b';
    pub const ADD_HEADER: u8 = b'h';
    pub const INSERT_HEADER: u8 = b'i';
    pub const CHANGE_HEADER: u8 = b'm';
    pub const CHANGE_FROM: u8 = b'e';
    pub const QUARANTINE: u8 = b'q';

    pub const OPTNEG: u8 = b'O';
}

/// Address family codes used in the `connect` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Unknown,
    Unix,
    Inet4,
    Inet6,
}

impl Default for AddressFamily {
    fn default() -> Self {
        AddressFamily::Unknown
    }
}

impl AddressFamily {
    pub const fn code(self) -> u8 {
        match self {
            AddressFamily::Unknown => b'U',
            AddressFamily::Unix => b'L',
            AddressFamily::Inet4 => b'4',
            AddressFamily::Inet6 => b'6',
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            b'U' => AddressFamily::Unknown,
            b'L' => AddressFamily::Unix,
            b'4' => AddressFamily::Inet4,
            b'6' => AddressFamily::Inet6,
            _ => return None,
        })
    }
}
