//! Line-based codec for the framed reader and writer.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::BotError;

/// Upper bound on an incoming line, sized for IRCv3 message tags.
///
/// RFC 1459 lines top out at 512 bytes, but servers that negotiated
/// `message-tags` may prepend a tag section well past that.
pub(crate) const MAX_INBOUND_LINE_LEN: usize = 8191;

/// Newline-delimited codec.
///
/// Decoding yields one line at a time with the CR LF stripped; invalid UTF-8
/// from the server is replaced rather than treated as fatal. Encoding
/// appends CR LF, so queued strings are complete wire lines minus the
/// terminator.
pub(crate) struct LineCodec {
    /// Index of the next byte to check for a newline.
    next_index: usize,
    max_len: usize,
}

impl LineCodec {
    pub(crate) fn new() -> Self {
        Self {
            next_index: 0,
            max_len: MAX_INBOUND_LINE_LEN,
        }
    }

    #[cfg(test)]
    fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = BotError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, BotError> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > self.max_len {
                return Err(BotError::LineTooLong {
                    actual: line.len(),
                    limit: self.max_len,
                });
            }

            let text = String::from_utf8_lossy(&line);
            Ok(Some(text.trim_end_matches(['\r', '\n']).to_string()))
        } else {
            self.next_index = src.len();

            if src.len() > self.max_len {
                return Err(BotError::LineTooLong {
                    actual: src.len(),
                    limit: self.max_len,
                });
            }

            Ok(None)
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = BotError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), BotError> {
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}
