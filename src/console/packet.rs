//! RCON packet framing.
//!
//! Each packet is a little-endian `i32` length, followed by a request id, a
//! packet type, an ASCII body, and two NUL terminators. The length counts
//! everything after itself.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Packet type for a login request.
pub const LOGIN: i32 = 3;
/// Packet type for a command request, and for the login reply.
pub const COMMAND: i32 = 2;
/// Packet type for a command reply.
pub const RESPONSE: i32 = 0;
/// Request id the server uses to reject a login.
pub const AUTH_REJECTED_ID: i32 = -1;

/// Id plus type plus the two terminators.
const HEADER_AND_PADDING: usize = 10;
/// Upper bound on an accepted frame.
const MAX_FRAME: usize = 65_536;

/// A single RCON packet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RconPacket {
    /// Correlates replies with requests.
    pub request_id: i32,
    /// One of [`LOGIN`], [`COMMAND`], or [`RESPONSE`].
    pub kind: i32,
    /// Command text or reply payload.
    pub body: String,
}

/// Errors raised while framing packets.
#[derive(Debug, Error)]
pub enum PacketError {
    /// The body does not fit in a frame.
    #[error("packet body of {len} bytes exceeds the frame limit")]
    TooLarge {
        /// Body length in bytes.
        len: usize,
    },
    /// The peer announced an impossible frame length.
    #[error("invalid frame length {0}")]
    InvalidLength(i32),
    /// Reading from the stream failed.
    #[error("failed to read packet: {0}")]
    Io(#[from] std::io::Error),
}

impl RconPacket {
    /// Builds a packet.
    #[must_use]
    pub fn new(request_id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            request_id,
            kind,
            body: body.into(),
        }
    }

    /// Serialises the packet into a wire frame.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::TooLarge`] when the body exceeds the frame
    /// limit.
    #[expect(
        clippy::little_endian_bytes,
        reason = "RCON frames are little-endian on the wire"
    )]
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let body = self.body.as_bytes();
        let payload_len = body.len() + HEADER_AND_PADDING;
        let length = i32::try_from(payload_len)
            .ok()
            .filter(|_| payload_len <= MAX_FRAME)
            .ok_or(PacketError::TooLarge { len: body.len() })?;

        let mut frame = Vec::with_capacity(payload_len + 4);
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(&self.request_id.to_le_bytes());
        frame.extend_from_slice(&self.kind.to_le_bytes());
        frame.extend_from_slice(body);
        frame.extend_from_slice(&[0, 0]);
        Ok(frame)
    }
}

/// Reads one packet from `reader`.
///
/// # Errors
///
/// Returns [`PacketError::InvalidLength`] for frames shorter than the header
/// or longer than the frame limit, and [`PacketError::Io`] when the stream
/// ends early.
pub async fn read_packet<R>(reader: &mut R) -> Result<RconPacket, PacketError>
where
    R: AsyncRead + Unpin,
{
    let length = reader.read_i32_le().await?;
    let payload_len = usize::try_from(length)
        .ok()
        .filter(|len| (HEADER_AND_PADDING..=MAX_FRAME).contains(len))
        .ok_or(PacketError::InvalidLength(length))?;

    let request_id = reader.read_i32_le().await?;
    let kind = reader.read_i32_le().await?;
    let mut rest = vec![0_u8; payload_len - 8];
    reader.read_exact(&mut rest).await?;

    while rest.last() == Some(&0) {
        rest.pop();
    }
    Ok(RconPacket {
        request_id,
        kind,
        body: String::from_utf8_lossy(&rest).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_lays_out_frame() {
        let frame = RconPacket::new(7, COMMAND, "list")
            .encode()
            .unwrap_or_else(|err| panic!("encode: {err}"));

        assert_eq!(
            frame,
            vec![
                14, 0, 0, 0, // length
                7, 0, 0, 0, // request id
                2, 0, 0, 0, // type
                b'l', b'i', b's', b't', 0, 0,
            ]
        );
    }

    #[test]
    fn encode_rejects_oversized_bodies() {
        let body = "x".repeat(MAX_FRAME);
        let err = RconPacket::new(1, COMMAND, body)
            .encode()
            .expect_err("oversized body should fail");
        assert!(matches!(err, PacketError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn read_packet_decodes_reply() {
        let frame = RconPacket::new(-1, COMMAND, "")
            .encode()
            .unwrap_or_else(|err| panic!("encode: {err}"));
        let mut reader = frame.as_slice();

        let packet = read_packet(&mut reader)
            .await
            .unwrap_or_else(|err| panic!("read: {err}"));

        assert_eq!(packet.request_id, AUTH_REJECTED_ID);
        assert_eq!(packet.kind, COMMAND);
        assert!(packet.body.is_empty());
    }

    #[tokio::test]
    async fn read_packet_rejects_short_frames() {
        let frame: Vec<u8> = vec![4, 0, 0, 0, 1, 0, 0, 0];
        let mut reader = frame.as_slice();

        let err = read_packet(&mut reader)
            .await
            .expect_err("short frame should fail");
        assert!(matches!(err, PacketError::InvalidLength(4)));
    }

    #[tokio::test]
    async fn read_packet_reports_truncated_streams() {
        let frame: Vec<u8> = vec![20, 0, 0, 0, 1, 0, 0, 0];
        let mut reader = frame.as_slice();

        let err = read_packet(&mut reader)
            .await
            .expect_err("truncated frame should fail");
        assert!(matches!(err, PacketError::Io(_)));
    }
}
