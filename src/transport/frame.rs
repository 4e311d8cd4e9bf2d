//! Binary encoding of session messages.
//!
//! Every message is one tag byte followed by its fields, each written as a
//! big-endian `u32` length and the raw bytes:
//!
//! ```text
//! +--------+-------------------+-----------+-------------------+-----------+
//! | Tag    | Field 1 length    | Field 1   | Field 2 length    | Field 2   |
//! | 1 byte | 4 bytes (BE32)    | N bytes   | 4 bytes (BE32)    | M bytes   |
//! +--------+-------------------+-----------+-------------------+-----------+
//! ```
//!
//! | Tag    | Message       | Fields                                   |
//! |--------|---------------|------------------------------------------|
//! | `0x00` | Empty (reply) | none                                     |
//! | `0x01` | Attest        | evidence                                 |
//! | `0x02` | Handshake     | ephemeral public key, ciphertext         |
//! | `0x03` | Encrypted     | ciphertext                               |

use thiserror::Error;

use crate::core::{
    AttestRequest, AttestResponse, EncryptedMessage, HandshakeRequest, HandshakeResponse,
    LENGTH_PREFIX_SIZE, MESSAGE_TAG_ATTEST, MESSAGE_TAG_EMPTY, MESSAGE_TAG_ENCRYPTED,
    MESSAGE_TAG_HANDSHAKE, NoiseHandshakeMessage, SessionRequest, SessionResponse,
};

/// Message type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Reply that carries no message (responses only).
    Empty = MESSAGE_TAG_EMPTY,
    /// Attestation request or response.
    Attest = MESSAGE_TAG_ATTEST,
    /// Noise handshake request or response.
    Handshake = MESSAGE_TAG_HANDSHAKE,
    /// Encrypted application data.
    Encrypted = MESSAGE_TAG_ENCRYPTED,
}

impl MessageType {
    /// Parse a message type from its tag byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            MESSAGE_TAG_EMPTY => Some(Self::Empty),
            MESSAGE_TAG_ATTEST => Some(Self::Attest),
            MESSAGE_TAG_HANDSHAKE => Some(Self::Handshake),
            MESSAGE_TAG_ENCRYPTED => Some(Self::Encrypted),
            _ => None,
        }
    }

    /// Convert to the tag byte.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Message is too short.
    #[error("message too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum expected size.
        expected: usize,
        /// Actual size available.
        actual: usize,
    },

    /// Unknown or misplaced tag byte.
    #[error("invalid message tag: 0x{0:02x}")]
    InvalidTag(u8),

    /// A field does not fit a 32-bit length prefix, or a frame exceeds the
    /// configured maximum.
    #[error("field of {0} bytes is too large")]
    FieldTooLarge(usize),

    /// Bytes remain after the last field.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
}

/// Appends fields to an output buffer.
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new(tag: MessageType) -> Self {
        Self {
            buf: vec![tag.as_byte()],
        }
    }

    fn field(mut self, bytes: &[u8]) -> Result<Self, FrameError> {
        let len = u32::try_from(bytes.len()).map_err(|_| FrameError::FieldTooLarge(bytes.len()))?;
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(bytes);
        Ok(self)
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads fields from an input buffer.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Result<(MessageType, Self), FrameError> {
        let (&tag, rest) = bytes
            .split_first()
            .ok_or(FrameError::TooShort { expected: 1, actual: 0 })?;
        let tag = MessageType::from_byte(tag).ok_or(FrameError::InvalidTag(tag))?;
        Ok((tag, Self { buf: rest }))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], FrameError> {
        if self.buf.len() < len {
            return Err(FrameError::TooShort {
                expected: len,
                actual: self.buf.len(),
            });
        }
        let (head, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(head)
    }

    fn field(&mut self) -> Result<Vec<u8>, FrameError> {
        let mut len = [0u8; LENGTH_PREFIX_SIZE];
        len.copy_from_slice(self.take(LENGTH_PREFIX_SIZE)?);
        let len = u32::from_be_bytes(len) as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn finish(self) -> Result<(), FrameError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(FrameError::TrailingBytes(self.buf.len()))
        }
    }
}

fn write_handshake(writer: Writer, message: &NoiseHandshakeMessage) -> Result<Writer, FrameError> {
    writer
        .field(&message.ephemeral_public_key)?
        .field(&message.ciphertext)
}

fn read_handshake(reader: &mut Reader<'_>) -> Result<NoiseHandshakeMessage, FrameError> {
    Ok(NoiseHandshakeMessage {
        ephemeral_public_key: reader.field()?,
        ciphertext: reader.field()?,
    })
}

/// Encode a client request.
pub fn encode_request(request: &SessionRequest) -> Result<Vec<u8>, FrameError> {
    let writer = match request {
        SessionRequest::Attest(attest) => Writer::new(MessageType::Attest).field(&attest.evidence)?,
        SessionRequest::Handshake(handshake) => write_handshake(
            Writer::new(MessageType::Handshake),
            &handshake.noise_handshake_message,
        )?,
        SessionRequest::Encrypted(encrypted) => {
            Writer::new(MessageType::Encrypted).field(&encrypted.ciphertext)?
        }
    };
    Ok(writer.finish())
}

/// Decode a client request.
///
/// The empty tag is only valid for responses and is rejected here.
pub fn decode_request(bytes: &[u8]) -> Result<SessionRequest, FrameError> {
    let (tag, mut reader) = Reader::new(bytes)?;
    let request = match tag {
        MessageType::Empty => return Err(FrameError::InvalidTag(tag.as_byte())),
        MessageType::Attest => SessionRequest::Attest(AttestRequest {
            evidence: reader.field()?,
        }),
        MessageType::Handshake => SessionRequest::Handshake(HandshakeRequest {
            noise_handshake_message: read_handshake(&mut reader)?,
        }),
        MessageType::Encrypted => SessionRequest::Encrypted(EncryptedMessage {
            ciphertext: reader.field()?,
        }),
    };
    reader.finish()?;
    Ok(request)
}

/// Encode a service response.
pub fn encode_response(response: &SessionResponse) -> Result<Vec<u8>, FrameError> {
    let writer = match response {
        SessionResponse::Attest(attest) => {
            Writer::new(MessageType::Attest).field(&attest.evidence)?
        }
        SessionResponse::Handshake(handshake) => write_handshake(
            Writer::new(MessageType::Handshake),
            &handshake.noise_handshake_message,
        )?,
        SessionResponse::Encrypted(encrypted) => {
            Writer::new(MessageType::Encrypted).field(&encrypted.ciphertext)?
        }
        SessionResponse::Empty => Writer::new(MessageType::Empty),
    };
    Ok(writer.finish())
}

/// Decode a service response.
pub fn decode_response(bytes: &[u8]) -> Result<SessionResponse, FrameError> {
    let (tag, mut reader) = Reader::new(bytes)?;
    let response = match tag {
        MessageType::Empty => SessionResponse::Empty,
        MessageType::Attest => SessionResponse::Attest(AttestResponse {
            evidence: reader.field()?,
        }),
        MessageType::Handshake => SessionResponse::Handshake(HandshakeResponse {
            noise_handshake_message: read_handshake(&mut reader)?,
        }),
        MessageType::Encrypted => SessionResponse::Encrypted(EncryptedMessage {
            ciphertext: reader.field()?,
        }),
    };
    reader.finish()?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake_message() -> NoiseHandshakeMessage {
        NoiseHandshakeMessage {
            ephemeral_public_key: vec![0x04; 3],
            ciphertext: vec![0xAA, 0xBB],
        }
    }

    #[test]
    fn test_message_type_roundtrip() {
        for t in [
            MessageType::Empty,
            MessageType::Attest,
            MessageType::Handshake,
            MessageType::Encrypted,
        ] {
            assert_eq!(MessageType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(MessageType::from_byte(0x04), None);
        assert_eq!(MessageType::from_byte(0xFF), None);
    }

    #[test]
    fn test_handshake_request_layout() {
        let request = SessionRequest::Handshake(HandshakeRequest {
            noise_handshake_message: handshake_message(),
        });

        let bytes = encode_request(&request).unwrap();
        assert_eq!(hex::encode(&bytes), "020000000304040400000002aabb");
        assert_eq!(decode_request(&bytes).unwrap(), request);
    }

    #[test]
    fn test_empty_response_layout() {
        let bytes = encode_response(&SessionResponse::Empty).unwrap();
        assert_eq!(bytes, vec![MESSAGE_TAG_EMPTY]);
        assert_eq!(decode_response(&bytes).unwrap(), SessionResponse::Empty);
    }

    #[test]
    fn test_response_variants() {
        let responses = [
            SessionResponse::Attest(AttestResponse {
                evidence: b"evidence".to_vec(),
            }),
            SessionResponse::Handshake(HandshakeResponse {
                noise_handshake_message: handshake_message(),
            }),
            SessionResponse::Encrypted(EncryptedMessage { ciphertext: vec![] }),
        ];

        for response in responses {
            let bytes = encode_response(&response).unwrap();
            assert_eq!(decode_response(&bytes).unwrap(), response);
        }
    }

    #[test]
    fn test_request_rejects_empty_tag() {
        assert_eq!(
            decode_request(&[MESSAGE_TAG_EMPTY]),
            Err(FrameError::InvalidTag(MESSAGE_TAG_EMPTY))
        );
    }

    #[test]
    fn test_rejects_unknown_tag() {
        assert_eq!(decode_response(&[0x7F]), Err(FrameError::InvalidTag(0x7F)));
    }

    #[test]
    fn test_rejects_empty_input() {
        assert_eq!(
            decode_response(&[]),
            Err(FrameError::TooShort {
                expected: 1,
                actual: 0
            })
        );
    }

    #[test]
    fn test_rejects_truncated_field() {
        // Length says 5, only 2 bytes follow.
        let bytes = [MESSAGE_TAG_ENCRYPTED, 0, 0, 0, 5, 1, 2];
        assert_eq!(
            decode_response(&bytes),
            Err(FrameError::TooShort {
                expected: 5,
                actual: 2
            })
        );
    }

    #[test]
    fn test_rejects_truncated_length() {
        let bytes = [MESSAGE_TAG_ATTEST, 0, 0];
        assert!(matches!(
            decode_request(&bytes),
            Err(FrameError::TooShort { .. })
        ));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = encode_response(&SessionResponse::Empty).unwrap();
        bytes.extend_from_slice(&[1, 2, 3]);

        assert_eq!(decode_response(&bytes), Err(FrameError::TrailingBytes(3)));
    }
}
