//! RFC 6242 message framing.
//!
//! NETCONF 1.0 ends every message with `]]>]]>`. Once both peers advertise
//! `base:1.1` the session switches to chunked framing, where a message is a
//! sequence of `\n#<len>\n<data>` chunks closed by `\n##\n`.

use super::*;

const END_OF_MESSAGE: &[u8] = b"]]>]]>";
const END_OF_CHUNKS: &[u8] = b"\n##\n";
const MAX_CHUNK_SIZE: u64 = 4_294_967_295;
/// `\n#` + up to 10 digits + `\n`.
const MAX_CHUNK_HEADER: usize = 13;

/// Message framing in effect on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// NETCONF 1.0 `]]>]]>` delimiter.
    #[default]
    EndOfMessage,
    /// NETCONF 1.1 chunked framing.
    Chunked,
}

/// Frames one message for the wire.
pub fn encode(framing: Framing, message: &str) -> Vec<u8> {
    match framing {
        Framing::EndOfMessage => {
            let mut out = Vec::with_capacity(message.len() + END_OF_MESSAGE.len());
            out.extend_from_slice(message.as_bytes());
            out.extend_from_slice(END_OF_MESSAGE);
            out
        }
        Framing::Chunked => {
            let header = format!("\n#{}\n", message.len());
            let mut out =
                Vec::with_capacity(header.len() + message.len() + END_OF_CHUNKS.len());
            out.extend_from_slice(header.as_bytes());
            out.extend_from_slice(message.as_bytes());
            out.extend_from_slice(END_OF_CHUNKS);
            out
        }
    }
}

/// Incremental decoder: push bytes as they arrive, pop complete messages.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    framing: Framing,
    buf: Vec<u8>,
    /// Chunk payloads collected for the message in progress.
    pending: Vec<u8>,
}

impl FrameDecoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buf: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Switches framing; bytes already buffered are kept.
    pub fn set_framing(&mut self, framing: Framing) {
        self.framing = framing;
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Returns the next complete message, or `None` if more bytes are needed.
    pub fn next_message(&mut self) -> Result<Option<String>, NetconfError> {
        match self.framing {
            Framing::EndOfMessage => self.next_eom_message(),
            Framing::Chunked => self.next_chunked_message(),
        }
    }

    fn next_eom_message(&mut self) -> Result<Option<String>, NetconfError> {
        let Some(pos) = self
            .buf
            .windows(END_OF_MESSAGE.len())
            .position(|w| w == END_OF_MESSAGE)
        else {
            return Ok(None);
        };
        let frame = self.buf.drain(..pos + END_OF_MESSAGE.len()).collect::<Vec<_>>();
        let text = String::from_utf8(frame[..pos].to_vec())
            .map_err(|e| NetconfError::Framing(format!("message is not utf-8: {e}")))?;
        Ok(Some(text.trim().to_string()))
    }

    fn next_chunked_message(&mut self) -> Result<Option<String>, NetconfError> {
        loop {
            if self.buf.len() < 4 {
                return Ok(None);
            }
            if !self.buf.starts_with(b"\n#") {
                return Err(NetconfError::Framing(format!(
                    "expected chunk header, got {:?}",
                    String::from_utf8_lossy(&self.buf[..self.buf.len().min(16)])
                )));
            }

            if self.buf[2] == b'#' {
                if self.buf[3] != b'\n' {
                    return Err(NetconfError::Framing(
                        "malformed end-of-chunks marker".to_string(),
                    ));
                }
                self.buf.drain(..END_OF_CHUNKS.len());
                let payload = std::mem::take(&mut self.pending);
                let text = String::from_utf8(payload)
                    .map_err(|e| NetconfError::Framing(format!("message is not utf-8: {e}")))?;
                return Ok(Some(text));
            }

            let Some(newline) = self.buf[2..].iter().position(|b| *b == b'\n') else {
                if self.buf.len() > MAX_CHUNK_HEADER {
                    return Err(NetconfError::Framing("chunk header too long".to_string()));
                }
                return Ok(None);
            };
            let header_end = 2 + newline;
            let digits = &self.buf[2..header_end];
            if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) || digits[0] == b'0' {
                return Err(NetconfError::Framing(format!(
                    "invalid chunk size {:?}",
                    String::from_utf8_lossy(digits)
                )));
            }
            let size = std::str::from_utf8(digits)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|n| *n <= MAX_CHUNK_SIZE)
                .ok_or_else(|| NetconfError::Framing("chunk size out of range".to_string()))?
                as usize;

            let data_start = header_end + 1;
            if self.buf.len() < data_start + size {
                return Ok(None);
            }
            self.pending
                .extend_from_slice(&self.buf[data_start..data_start + size]);
            self.buf.drain(..data_start + size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eom_decoder_waits_for_delimiter() {
        let mut decoder = FrameDecoder::new(Framing::EndOfMessage);
        decoder.push(b"<hello/>]]>");
        assert!(decoder.next_message().expect("decode").is_none());

        decoder.push(b"]]>\n<rpc-reply/>]]>]]>");
        assert_eq!(
            decoder.next_message().expect("decode").as_deref(),
            Some("<hello/>")
        );
        assert_eq!(
            decoder.next_message().expect("decode").as_deref(),
            Some("<rpc-reply/>")
        );
        assert!(decoder.next_message().expect("decode").is_none());
    }

    #[test]
    fn chunked_decoder_joins_chunks_split_across_reads() {
        let mut decoder = FrameDecoder::new(Framing::Chunked);
        decoder.push(b"\n#4\n<rpc");
        assert!(decoder.next_message().expect("decode").is_none());
        decoder.push(b"\n#1");
        assert!(decoder.next_message().expect("decode").is_none());
        decoder.push(b"3\n-reply/>extra\n#");
        assert!(decoder.next_message().expect("decode").is_none());
        decoder.push(b"#\n");

        assert_eq!(
            decoder.next_message().expect("decode").as_deref(),
            Some("<rpc-reply/>extra")
        );
    }

    #[test]
    fn chunked_encoding_is_decodable() {
        let framed = encode(Framing::Chunked, "<rpc-reply><ok/></rpc-reply>");
        assert!(framed.starts_with(b"\n#28\n"));
        assert!(framed.ends_with(b"\n##\n"));

        let mut decoder = FrameDecoder::new(Framing::Chunked);
        decoder.push(&framed);
        assert_eq!(
            decoder.next_message().expect("decode").as_deref(),
            Some("<rpc-reply><ok/></rpc-reply>")
        );
    }

    #[test]
    fn chunked_decoder_rejects_zero_and_garbage_sizes() {
        let mut decoder = FrameDecoder::new(Framing::Chunked);
        decoder.push(b"\n#0\n");
        assert!(matches!(
            decoder.next_message(),
            Err(NetconfError::Framing(_))
        ));

        let mut decoder = FrameDecoder::new(Framing::Chunked);
        decoder.push(b"<rpc-reply/>");
        assert!(matches!(
            decoder.next_message(),
            Err(NetconfError::Framing(_))
        ));
    }

    #[test]
    fn framing_switch_keeps_buffered_bytes() {
        let mut decoder = FrameDecoder::new(Framing::EndOfMessage);
        decoder.push(b"<hello/>]]>]]>\n#3\nabc\n##\n");
        assert_eq!(
            decoder.next_message().expect("decode").as_deref(),
            Some("<hello/>")
        );
        decoder.set_framing(Framing::Chunked);
        assert_eq!(decoder.framing(), Framing::Chunked);
        assert_eq!(decoder.next_message().expect("decode").as_deref(), Some("abc"));
    }
}
