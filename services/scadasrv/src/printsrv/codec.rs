//! PrintSrv wire codec
//!
//! Every frame is an 8-byte header followed by the body:
//!
//! ```text
//! +------+------+------+------+------+------+------+------+-----------...
//! | 'P'  | '0'  | '0'  | '1'  |  body length (i32, big-endian)  | body ...
//! +------+------+------+------+------+------+------+------+-----------...
//! ```
//!
//! The body is JSON text in a single-byte legacy encoding. A body equal to
//! `Fail` (any case) is PrintSrv's error marker and is surfaced as
//! [`ScadaError::FailResponse`] instead of a frame.

use bytes::{Buf, BufMut, BytesMut};
use encoding_rs::Encoding;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error::{Result, ScadaError};

/// Frame magic
pub const MAGIC: [u8; 4] = *b"P001";
/// Magic plus length field
pub const HEADER_LEN: usize = 8;
/// Largest body accepted on read or write (10 MiB)
pub const MAX_BODY_LEN: i32 = 10 * 1024 * 1024;
/// Body PrintSrv sends instead of JSON when a command fails
pub const FAIL_MARKER: &str = "Fail";
/// Default wire charset
pub const DEFAULT_CHARSET: &str = "windows-1252";

/// Bytes of a truncated body carried in the framing error
const RECEIVED_PREVIEW_LEN: usize = 64;

/// Framing codec for a PrintSrv socket
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    encoding: &'static Encoding,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            encoding: encoding_rs::WINDOWS_1252,
        }
    }
}

impl FrameCodec {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self { encoding }
    }

    /// Build a codec from a charset label such as `windows-1251` or `cp1252`
    ///
    /// Only single-byte encodings are accepted.
    pub fn for_label(label: &str) -> Result<Self> {
        let encoding = Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| ScadaError::config(format!("unknown charset '{}'", label)))?;

        if !encoding.is_single_byte() {
            return Err(ScadaError::config(format!(
                "charset '{}' ({}) is not a single-byte encoding",
                label,
                encoding.name()
            )));
        }

        Ok(Self::new(encoding))
    }

    pub fn charset(&self) -> &'static str {
        self.encoding.name()
    }

    /// Encode body text into wire bytes
    ///
    /// Characters the charset cannot represent are substituted by the
    /// encoder.
    pub fn encode_body(&self, body: &str) -> Vec<u8> {
        let (bytes, _, had_unmappable) = self.encoding.encode(body);
        if had_unmappable {
            debug!(
                "Body contains characters not representable in {}, substituted",
                self.encoding.name()
            );
        }
        bytes.into_owned()
    }

    /// Decode wire bytes into body text
    pub fn decode_body(&self, bytes: &[u8]) -> String {
        let (text, _) = self.encoding.decode_without_bom_handling(bytes);
        text.into_owned()
    }

    /// Validate the header and return the declared body length
    ///
    /// `header` may be shorter than [`HEADER_LEN`]; `Ok(None)` means more bytes
    /// are needed.
    pub fn parse_header(header: &[u8]) -> Result<Option<usize>> {
        let magic_len = header.len().min(MAGIC.len());
        if header[..magic_len] != MAGIC[..magic_len] {
            return Err(ScadaError::framing(
                "invalid magic, expected \"P001\"",
                &header[..magic_len],
            ));
        }

        if header.len() < HEADER_LEN {
            return Ok(None);
        }

        let declared = i32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if !(0..=MAX_BODY_LEN).contains(&declared) {
            return Err(ScadaError::FrameSize(declared));
        }

        Ok(Some(declared as usize))
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = ScadaError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        if src.is_empty() {
            return Ok(None);
        }

        let body_len = match Self::parse_header(&src[..src.len().min(HEADER_LEN)])? {
            Some(len) => len,
            None => {
                src.reserve(HEADER_LEN - src.len());
                return Ok(None);
            },
        };

        let frame_len = HEADER_LEN + body_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let body = src.split_to(body_len);
        let text = self.decode_body(&body);

        if text.eq_ignore_ascii_case(FAIL_MARKER) {
            return Err(ScadaError::FailResponse { body: text });
        }

        Ok(Some(text))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => {
                let message = if buf.len() < HEADER_LEN {
                    format!(
                        "connection closed inside frame header ({} of {} bytes)",
                        buf.len(),
                        HEADER_LEN
                    )
                } else {
                    format!(
                        "connection closed inside frame body ({} of {} bytes)",
                        buf.len() - HEADER_LEN,
                        i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]])
                    )
                };
                let received = &buf[..buf.len().min(HEADER_LEN + RECEIVED_PREVIEW_LEN)];
                let err = ScadaError::framing(message, received);
                buf.clear();
                Err(err)
            },
        }
    }
}

impl<'a> Encoder<&'a str> for FrameCodec {
    type Error = ScadaError;

    fn encode(&mut self, body: &'a str, dst: &mut BytesMut) -> Result<()> {
        if body.is_empty() {
            return Err(ScadaError::validation("request body must not be empty"));
        }

        let bytes = self.encode_body(body);
        let len = i32::try_from(bytes.len())
            .ok()
            .filter(|len| *len <= MAX_BODY_LEN)
            .ok_or(ScadaError::FrameSize(i32::try_from(bytes.len()).unwrap_or(i32::MAX)))?;

        dst.reserve(HEADER_LEN + bytes.len());
        dst.put_slice(&MAGIC);
        dst.put_i32(len);
        dst.put_slice(&bytes);
        Ok(())
    }
}
