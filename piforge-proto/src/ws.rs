//! The slice of RFC 6455 the status stream needs: handshake key derivation and
//! single unmasked text frames. Nothing here reads frames; clients never get
//! an answer to anything they send.

use base64::{Engine, prelude::BASE64_STANDARD};
use bytes::{BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};

/// GUID appended to the client key before hashing (RFC 6455 section 1.3).
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// FIN bit set, opcode 0x1 (text).
const FIN_TEXT: u8 = 0x81;

const LEN_16_MARKER: u8 = 126;
const LEN_64_MARKER: u8 = 127;

/// Derive the `Sec-WebSocket-Accept` value for a client's `Sec-WebSocket-Key`.
pub fn accept_key(client_key: &[u8]) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(client_key);
    sha1.update(WEBSOCKET_GUID.as_bytes());

    BASE64_STANDARD.encode(sha1.finalize())
}

/// Encode `payload` as one final, unmasked text frame.
///
/// Server-to-client frames are never masked. The length uses the shortest
/// form the protocol allows: 7 bits below 126, then 16 and 64 bit extended.
pub fn encode_text_frame(payload: &str) -> Bytes {
    let payload = payload.as_bytes();
    let len = payload.len();

    let mut frame = BytesMut::with_capacity(len + 10);
    frame.put_u8(FIN_TEXT);
    match len {
        0..126 => frame.put_u8(len as u8),
        126..=0xFFFF => {
            frame.put_u8(LEN_16_MARKER);
            frame.put_u16(len as u16);
        }
        _ => {
            frame.put_u8(LEN_64_MARKER);
            frame.put_u64(len as u64);
        }
    }
    frame.put_slice(payload);

    frame.freeze()
}
