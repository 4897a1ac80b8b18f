//! Framing helpers for the Server List Ping handshake.

use tokio::io::{AsyncRead, AsyncReadExt};

/// Protocol version advertised in the handshake. Status queries are answered
/// regardless of the value.
pub const PROTOCOL_VERSION: u32 = 767;

/// Handshake state requesting a status response.
const NEXT_STATE_STATUS: u32 = 1;

/// A length-prefixed status request (packet id 0, no payload).
pub const STATUS_REQUEST: [u8; 2] = [0x01, 0x00];

/// Longest VarInt accepted, in bytes.
const MAX_VARINT_BYTES: u32 = 5;

/// Appends `value` to `buf` as a protocol VarInt.
#[expect(
    clippy::cast_possible_truncation,
    reason = "the value is masked to seven bits first"
)]
pub fn write_varint(buf: &mut Vec<u8>, value: u32) {
    let mut remaining = value;
    loop {
        let byte = (remaining & 0x7F) as u8;
        remaining >>= 7;
        if remaining == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Reads a protocol VarInt.
///
/// # Errors
///
/// Returns an [`std::io::Error`] when the stream ends early or the VarInt
/// runs past five bytes.
pub async fn read_varint<R>(reader: &mut R) -> std::io::Result<u32>
where
    R: AsyncRead + Unpin,
{
    let mut value = 0_u32;
    for position in 0..MAX_VARINT_BYTES {
        let byte = reader.read_u8().await?;
        value |= u32::from(byte & 0x7F) << (7 * position);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        "VarInt is longer than five bytes",
    ))
}

/// Appends a VarInt-prefixed UTF-8 string.
pub fn write_string(buf: &mut Vec<u8>, value: &str) {
    write_varint(buf, u32::try_from(value.len()).unwrap_or(u32::MAX));
    buf.extend_from_slice(value.as_bytes());
}

/// Builds the length-prefixed handshake packet announcing a status query.
#[must_use]
#[expect(
    clippy::big_endian_bytes,
    reason = "the handshake carries the port in network byte order"
)]
pub fn handshake(host: &str, port: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(host.len() + 8);
    write_varint(&mut body, 0x00);
    write_varint(&mut body, PROTOCOL_VERSION);
    write_string(&mut body, host);
    body.extend_from_slice(&port.to_be_bytes());
    write_varint(&mut body, NEXT_STATE_STATUS);

    let mut frame = Vec::with_capacity(body.len() + 2);
    write_varint(&mut frame, u32::try_from(body.len()).unwrap_or(u32::MAX));
    frame.extend_from_slice(&body);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, vec![0x00])]
    #[case(1, vec![0x01])]
    #[case(127, vec![0x7F])]
    #[case(128, vec![0x80, 0x01])]
    #[case(25_565, vec![0xDD, 0xC7, 0x01])]
    #[case(u32::MAX, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F])]
    fn varints_match_protocol_examples(#[case] value: u32, #[case] expected: Vec<u8>) {
        let mut buf = Vec::new();
        write_varint(&mut buf, value);
        assert_eq!(buf, expected);
    }

    #[tokio::test]
    async fn read_varint_decodes_multibyte_values() {
        let bytes: Vec<u8> = vec![0xDD, 0xC7, 0x01, 0xAA];
        let mut reader = bytes.as_slice();
        let value = read_varint(&mut reader)
            .await
            .unwrap_or_else(|err| panic!("varint: {err}"));
        assert_eq!(value, 25_565);
        assert_eq!(reader, &[0xAA]);
    }

    #[tokio::test]
    async fn read_varint_rejects_overlong_values() {
        let bytes: Vec<u8> = vec![0xFF; 6];
        let mut reader = bytes.as_slice();
        let err = read_varint(&mut reader)
            .await
            .expect_err("overlong varint should fail");
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn handshake_encodes_host_port_and_state() {
        let frame = handshake("mc", 25_565);
        assert_eq!(
            frame,
            vec![
                0x09, // length
                0x00, // packet id
                0xFF, 0x05, // protocol 767
                0x02, b'm', b'c', // host
                0x63, 0xDD, // port
                0x01, // next state
            ]
        );
    }
}
