//! Minimal PostgreSQL wire protocol pieces for region probing.
//!
//! StartupMessage: Int32(length) Int32(196608 = v3.0) then `key\0value\0`
//! pairs and a final `\0`. Backend messages: Byte1(tag) Int32(length incl.
//! itself) body.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Protocol version 3.0.
pub const PROTOCOL_VERSION: i32 = 196608;

/// Upper bound on a probe response body; anything larger is truncated.
const MAX_BODY_LEN: usize = 16 * 1024;

/// Encode a StartupMessage with `user` and `database` parameters.
pub fn startup_message(user: &str, database: &str) -> BytesMut {
    let mut body = BytesMut::with_capacity(64 + user.len() + database.len());
    body.put_i32(PROTOCOL_VERSION);
    for (key, value) in [("user", user), ("database", database)] {
        body.put_slice(key.as_bytes());
        body.put_u8(0);
        body.put_slice(value.as_bytes());
        body.put_u8(0);
    }
    body.put_u8(0);

    let mut buf = BytesMut::with_capacity(body.len() + 4);
    buf.put_i32((body.len() + 4) as i32);
    buf.put_slice(&body);
    buf
}

/// First message a server sends back after a StartupMessage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMessage {
    /// `R`: the server wants credentials (or accepted without them).
    AuthenticationRequest { code: i32 },
    /// `E`: error text, the `M` field when present.
    ErrorResponse { message: String },
    /// Any other tag.
    Other { tag: u8 },
}

impl BackendMessage {
    /// Decode a message from its tag and body (length prefix stripped).
    pub fn decode(tag: u8, body: &[u8]) -> Self {
        match tag {
            b'R' => {
                let code = body
                    .get(..4)
                    .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
                    .unwrap_or(-1);
                BackendMessage::AuthenticationRequest { code }
            }
            b'E' => BackendMessage::ErrorResponse {
                message: error_message(body),
            },
            other => BackendMessage::Other { tag: other },
        }
    }
}

/// Read one backend message.
pub async fn read_message<R>(reader: &mut R) -> std::io::Result<BackendMessage>
where
    R: AsyncRead + Unpin,
{
    let tag = reader.read_u8().await?;
    let len = reader.read_i32().await?;
    let body_len = (len.max(4) as usize - 4).min(MAX_BODY_LEN);

    let mut body = vec![0u8; body_len];
    reader.read_exact(&mut body).await?;
    Ok(BackendMessage::decode(tag, &body))
}

/// Pull the human-readable message out of ErrorResponse fields.
///
/// Fields are `Byte1(code) String\0` repeated, terminated by `\0`. Falls
/// back to the whole body when no `M` field is found.
fn error_message(body: &[u8]) -> String {
    let mut rest = body;
    while let Some((&code, tail)) = rest.split_first() {
        if code == 0 {
            break;
        }
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        if code == b'M' {
            return String::from_utf8_lossy(&tail[..end]).into_owned();
        }
        rest = tail.get(end + 1..).unwrap_or_default();
    }
    String::from_utf8_lossy(body)
        .replace('\0', " ")
        .trim()
        .to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build an ErrorResponse the way a server would.
    pub(crate) fn error_response(message: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.push(b'S');
        body.extend_from_slice(b"FATAL\0");
        body.push(b'C');
        body.extend_from_slice(b"XX000\0");
        body.push(b'M');
        body.extend_from_slice(message.as_bytes());
        body.push(0);
        body.push(0);

        let mut msg = vec![b'E'];
        msg.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
        msg.extend_from_slice(&body);
        msg
    }

    /// AuthenticationSASL-style challenge.
    pub(crate) fn auth_request(code: i32) -> Vec<u8> {
        let mut msg = vec![b'R'];
        msg.extend_from_slice(&8i32.to_be_bytes());
        msg.extend_from_slice(&code.to_be_bytes());
        msg
    }

    #[test]
    fn test_startup_message_layout() {
        let buf = startup_message("postgres.abcdef", "postgres");
        let expected_body = b"user\0postgres.abcdef\0database\0postgres\0\0";
        assert_eq!(buf.len(), 8 + expected_body.len());
        assert_eq!(&buf[..4], &((8 + expected_body.len()) as i32).to_be_bytes());
        assert_eq!(&buf[4..8], &PROTOCOL_VERSION.to_be_bytes());
        assert_eq!(&buf[8..], expected_body);
    }

    #[test]
    fn test_decode_error_takes_message_field() {
        let raw = error_response("Tenant or user not found");
        let msg = BackendMessage::decode(raw[0], &raw[5..]);
        assert_eq!(
            msg,
            BackendMessage::ErrorResponse {
                message: "Tenant or user not found".to_string()
            }
        );
    }

    #[test]
    fn test_decode_error_without_fields_uses_body() {
        let msg = BackendMessage::decode(b'E', b"something broke\0");
        assert_eq!(
            msg,
            BackendMessage::ErrorResponse {
                message: "something broke".to_string()
            }
        );
    }

    #[test]
    fn test_decode_auth_and_other() {
        let raw = auth_request(10);
        assert_eq!(
            BackendMessage::decode(raw[0], &raw[5..]),
            BackendMessage::AuthenticationRequest { code: 10 }
        );
        assert_eq!(BackendMessage::decode(b'N', &[]), BackendMessage::Other { tag: b'N' });
    }

    #[tokio::test]
    async fn test_read_message_from_stream() {
        let raw = error_response("password authentication failed");
        let mut reader = &raw[..];
        let msg = read_message(&mut reader).await.unwrap();
        assert_eq!(
            msg,
            BackendMessage::ErrorResponse {
                message: "password authentication failed".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_read_message_truncated_stream_errors() {
        let raw = error_response("Tenant or user not found");
        let mut reader = &raw[..7];
        assert!(read_message(&mut reader).await.is_err());
    }
}
