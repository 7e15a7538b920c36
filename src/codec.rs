//! The wire codec (C1): framing, de-framing, and the little helpers every
//! payload encoder/decoder in [`crate::message`] builds on.
//!
//! Grounded on the teacher's `MilterMessage::try_from`/`ResponseMessage`
//! length-prefix handling in `milter_message.rs`, generalized to async I/O
//! over any `tokio::io::{AsyncRead, AsyncWrite}` the way `miltr-server`'s
//! `MilterCodec` frames over `futures::{AsyncRead, AsyncWrite}`.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, ProtocolError};

/// Hard wire limit on `len` (code byte + payload), independent of negotiation.
pub const MAX_PACKET_LEN: u32 = 512 * 1024 * 1024;

/// A single framed milter packet: a one-byte command/response code and its
/// payload. This is the unit [`read_packet`]/[`write_packet`] move across the
/// wire; [`crate::message`] interprets `data` based on `code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub code: u8,
    pub data: BytesMut,
}

impl Packet {
    pub fn new(code: u8, data: impl Into<BytesMut>) -> Self {
        Self {
            code,
            data: data.into(),
        }
    }

    pub fn empty(code: u8) -> Self {
        Self {
            code,
            data: BytesMut::new(),
        }
    }

    /// `len` field that would be written on the wire for this packet.
    pub fn wire_len(&self) -> usize {
        1 + self.data.len()
    }
}

/// Read one packet off `stream`, honoring an optional read deadline.
///
/// `L=0` and `L>512 MiB` are rejected per the wire contract. On any error the
/// caller must treat the stream as dead: no partial-packet recovery is
/// attempted.
pub async fn read_packet<R>(stream: &mut R, timeout: Option<Duration>) -> Result<Packet, Error>
where
    R: AsyncRead + Unpin,
{
    let fut = async {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf);

        if len == 0 {
            return Err(Error::Protocol(ProtocolError::EmptyPacket));
        }
        if len > MAX_PACKET_LEN {
            return Err(Error::Protocol(ProtocolError::PacketTooLarge(len)));
        }

        let mut body = vec![0u8; len as usize];
        stream.read_exact(&mut body).await?;

        let code = body[0];
        let data = BytesMut::from(&body[1..]);
        Ok(Packet { code, data })
    };

    match timeout {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .map_err(|_| Error::Io(timed_out("read")))?,
        None => fut.await,
    }
}

/// Write one packet to `stream` as a single logical operation: length prefix,
/// code, and payload are all flushed together. A too-large packet is rejected
/// before anything is written.
pub async fn write_packet<W>(
    stream: &mut W,
    packet: &Packet,
    timeout: Option<Duration>,
) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
{
    let len = packet.wire_len();
    if len as u64 > MAX_PACKET_LEN as u64 {
        return Err(Error::Protocol(ProtocolError::PacketTooLarge(len as u32)));
    }

    let mut buf = BytesMut::with_capacity(4 + len);
    buf.put_u32(len as u32);
    buf.put_u8(packet.code);
    buf.extend_from_slice(&packet.data);

    let fut = async {
        stream.write_all(&buf).await?;
        stream.flush().await?;
        Ok::<(), std::io::Error>(())
    };

    match timeout {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .map_err(|_| timed_out("write"))??,
        None => fut.await?,
    }

    Ok(())
}

fn timed_out(op: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::TimedOut, format!("{op} timed out"))
}

/// Split a payload on NUL bytes into its component strings. The last string
/// may be unterminated (no trailing NUL); a single trailing NUL produces no
/// extra empty string.
pub fn decode_cstrings(data: &[u8]) -> Vec<String> {
    if data.is_empty() {
        return Vec::new();
    }

    let mut parts: Vec<&[u8]> = data.split(|&b| b == 0).collect();
    if data.last() == Some(&0) {
        parts.pop();
    }

    parts
        .into_iter()
        .map(|p| String::from_utf8_lossy(p).into_owned())
        .collect()
}

/// Append `s` followed by a terminating NUL.
pub fn append_cstring(buf: &mut BytesMut, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.put_u8(0);
}

/// Append a big-endian `u16`.
pub fn append_u16(buf: &mut BytesMut, v: u16) {
    buf.put_u16(v);
}

/// Append a big-endian `u32`.
pub fn append_u32(buf: &mut BytesMut, v: u32) {
    buf.put_u32(v);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trips_a_packet() {
        let mut wire = Vec::new();
        let mut data = BytesMut::new();
        append_cstring(&mut data, "example.com");
        let packet = Packet::new(b'H', data);

        write_packet(&mut wire, &packet, None).await.unwrap();

        let mut cursor = Cursor::new(wire);
        let decoded = read_packet(&mut cursor, None).await.unwrap();
        assert_eq!(decoded, packet);
    }

    #[tokio::test]
    async fn rejects_zero_length_packet() {
        let mut cursor = Cursor::new(vec![0u8, 0, 0, 0]);
        let err = read_packet(&mut cursor, None).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::EmptyPacket)));
    }

    #[tokio::test]
    async fn rejects_oversized_packet_length_without_reading_body() {
        let mut cursor = Cursor::new((MAX_PACKET_LEN + 1).to_be_bytes().to_vec());
        let err = read_packet(&mut cursor, None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::PacketTooLarge(_))
        ));
    }

    #[test]
    fn decodes_cstrings_with_unterminated_last_field() {
        let data = b"foo\0bar\0baz";
        assert_eq!(
            decode_cstrings(data),
            vec!["foo".to_string(), "bar".to_string(), "baz".to_string()]
        );
    }

    #[test]
    fn decodes_cstrings_with_trailing_nul() {
        let data = b"foo\0bar\0";
        assert_eq!(
            decode_cstrings(data),
            vec!["foo".to_string(), "bar".to_string()]
        );
    }

    #[test]
    fn decodes_empty_payload_as_no_strings() {
        assert!(decode_cstrings(b"").is_empty());
    }
}
