//! Incremental text decoding that never splits a code point across chunks

use std::sync::Arc;

use crate::settings::StreamEncoding;

/// Guesses whether bytes read as UTF-16 are really UTF-8
///
/// Some consoles ignore the requested output encoding. When a request enables
/// `detect_encoding`, the decoder asks the sniffer once, on the first chunk,
/// and decodes the whole stream as UTF-8 if the sniffer says so.
pub trait EncodingSniffer: Send + Sync {
    /// Return true if `bytes` look like UTF-8 rather than UTF-16
    fn is_utf8(&self, bytes: &[u8]) -> bool;
}

/// Structural UTF-8 check
///
/// An odd byte count cannot be UTF-16. Otherwise the bytes must form complete
/// UTF-8 sequences and contain no NUL, which ASCII text in UTF-16 always has.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Sniffer;

impl EncodingSniffer for Utf8Sniffer {
    fn is_utf8(&self, bytes: &[u8]) -> bool {
        if bytes.len() % 2 != 0 {
            return true;
        }

        let mut continuation = 0;
        for &byte in bytes {
            if continuation > 0 {
                continuation -= 1;
                if byte & 0xC0 != 0x80 {
                    return false;
                }
            } else {
                if byte == 0 {
                    return false;
                }
                continuation = match byte.leading_ones() {
                    0 => 0,
                    2 => 1,
                    3 => 2,
                    4 => 3,
                    _ => return false,
                };
            }
        }

        continuation == 0
    }
}

/// Decoder for one output stream
pub struct StreamDecoder {
    encoding: StreamEncoding,
    sniffer: Option<Arc<dyn EncodingSniffer>>,
    carry: Vec<u8>,
}

impl StreamDecoder {
    /// Create a decoder; `sniffer` is consulted only for UTF-16 streams
    pub fn new(encoding: StreamEncoding, sniffer: Option<Arc<dyn EncodingSniffer>>) -> Self {
        Self {
            encoding,
            sniffer,
            carry: Vec::new(),
        }
    }

    /// The encoding currently in use
    pub fn encoding(&self) -> StreamEncoding {
        self.encoding
    }

    /// Decode as much of `bytes` as forms whole characters
    ///
    /// Bytes of an incomplete trailing character are kept for the next call.
    /// Malformed input decodes to U+FFFD.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        if bytes.is_empty() {
            return String::new();
        }
        self.carry.extend_from_slice(bytes);

        if let Some(sniffer) = self.sniffer.take() {
            if self.encoding == StreamEncoding::Utf16le && sniffer.is_utf8(&self.carry) {
                tracing::debug!("stream declared UTF-16 looks like UTF-8, switching");
                self.encoding = StreamEncoding::Utf8;
            }
        }

        match self.encoding {
            StreamEncoding::Utf8 => self.take_utf8(),
            StreamEncoding::Utf16le => self.take_utf16(),
        }
    }

    /// Decode whatever is left at end of stream, replacing partial characters
    pub fn finish(&mut self) -> String {
        if self.carry.is_empty() {
            return String::new();
        }
        let rest = std::mem::take(&mut self.carry);
        match self.encoding {
            StreamEncoding::Utf8 => String::from_utf8_lossy(&rest).into_owned(),
            StreamEncoding::Utf16le => {
                let units = rest
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
                let mut text: String = char::decode_utf16(units)
                    .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                    .collect();
                if rest.len() % 2 != 0 {
                    text.push(char::REPLACEMENT_CHARACTER);
                }
                text
            }
        }
    }

    fn take_utf8(&mut self) -> String {
        let mut out = String::with_capacity(self.carry.len());
        let mut start = 0;

        loop {
            match std::str::from_utf8(&self.carry[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = self.carry.len();
                    break;
                }
                Err(err) => {
                    let valid_end = start + err.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.carry[start..valid_end]) {
                        out.push_str(valid);
                    }
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.carry.drain(..start);
        out
    }

    fn take_utf16(&mut self) -> String {
        let even = self.carry.len() & !1;
        let units: Vec<u16> = self.carry[..even]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        // A trailing high surrogate waits for its low half.
        let usable = match units.last() {
            Some(unit) if (0xD800..0xDC00).contains(unit) => units.len() - 1,
            _ => units.len(),
        };

        let out = char::decode_utf16(units[..usable].iter().copied())
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();

        self.carry.drain(..usable * 2);
        out
    }
}

impl std::fmt::Debug for StreamDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDecoder")
            .field("encoding", &self.encoding)
            .field("sniffing", &self.sniffer.is_some())
            .field("carry", &self.carry.len())
            .finish()
    }
}
