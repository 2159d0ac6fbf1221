use bytes::{Buf, BufMut, Bytes, BytesMut};
use rpcprims_message::encoding::CONTENT_TYPE_BINARY;
use rpcprims_message::{Encoding, Message, TypeDescriptor};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FrameError, Result};

/// Default maximum body size: 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Maximum size of a header block, including the terminating blank line.
pub const MAX_HEADER_BLOCK: usize = 8 * 1024;

pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const ENCODING_TYPE: &str = "X-Encoding-Type";

/// Parsed header block of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub content_length: usize,
    pub encoding: Encoding,
    pub descriptor: Option<TypeDescriptor>,
}

/// A decoded frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub encoding: Encoding,
    pub descriptor: Option<TypeDescriptor>,
    /// The raw body, sliced from the read buffer without copying.
    pub body: Bytes,
    pub message: Message,
    header_len: usize,
}

impl Frame {
    /// The total wire size of this frame (header block + body).
    pub fn wire_size(&self) -> usize {
        self.header_len + self.body.len()
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: 16 MiB.
    pub max_frame_size: usize,
    /// Log every frame body at debug level.
    pub trace_messages: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            trace_messages: false,
        }
    }
}

/// Encode `message` as one frame, appending it to `dst`.
///
/// Wire format:
/// ```text
/// Content-Length: <body bytes>\r\n
/// Content-Type: application/binary\r\n      (binary only)
/// X-Encoding-Type: a{sv}\r\n                (binary only)
/// \r\n
/// <body>
/// ```
///
/// Returns the number of bytes appended. Nothing is appended on error.
pub fn encode_frame(
    message: &Message,
    encoding: Encoding,
    max_frame_size: usize,
    dst: &mut BytesMut,
) -> Result<usize> {
    let body = encoding.encode(message)?;
    if body.len() > max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size: body.len(),
            max: max_frame_size,
        });
    }

    let mut header = format!("{CONTENT_LENGTH}: {}\r\n", body.len());
    if encoding == Encoding::Binary {
        header.push_str(&format!("{CONTENT_TYPE}: {CONTENT_TYPE_BINARY}\r\n"));
        header.push_str(&format!("{ENCODING_TYPE}: {}\r\n", TypeDescriptor::message()));
    }
    header.push_str("\r\n");

    let total = header.len() + body.len();
    dst.reserve(total);
    dst.put_slice(header.as_bytes());
    dst.put_slice(&body);
    Ok(total)
}

/// Parse the header block at the start of `src` without consuming it.
///
/// Returns `Ok(None)` until a blank line has been buffered. On success,
/// returns the header and the length of the header block in bytes.
pub fn decode_header(src: &[u8], max_frame_size: usize) -> Result<Option<(FrameHeader, usize)>> {
    let mut pos = 0;
    let mut content_length = None;
    let mut encoding = Encoding::Text;
    let mut descriptor = None;

    loop {
        let Some(newline) = src[pos..].iter().position(|&b| b == b'\n') else {
            if src.len() > MAX_HEADER_BLOCK {
                return Err(FrameError::HeaderTooLarge {
                    max: MAX_HEADER_BLOCK,
                });
            }
            return Ok(None);
        };

        let line = &src[pos..pos + newline];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        pos += newline + 1;
        if pos > MAX_HEADER_BLOCK {
            return Err(FrameError::HeaderTooLarge {
                max: MAX_HEADER_BLOCK,
            });
        }

        if line.is_empty() {
            let content_length = content_length.ok_or(FrameError::MissingContentLength)?;
            let header = FrameHeader {
                content_length,
                encoding,
                descriptor,
            };
            return Ok(Some((header, pos)));
        }

        let text = std::str::from_utf8(line)
            .map_err(|_| FrameError::InvalidHeader(String::from_utf8_lossy(line).into_owned()))?;
        let (name, value) = text
            .split_once(':')
            .ok_or_else(|| FrameError::InvalidHeader(text.to_string()))?;
        let value = value.trim();

        if name.eq_ignore_ascii_case(CONTENT_LENGTH) {
            content_length = Some(parse_content_length(value, max_frame_size)?);
        } else if name.eq_ignore_ascii_case(CONTENT_TYPE) {
            encoding = Encoding::from_content_type(value);
        } else if name.eq_ignore_ascii_case(ENCODING_TYPE) {
            descriptor = Some(TypeDescriptor::parse(value)?);
        }
    }
}

fn parse_content_length(value: &str, max_frame_size: usize) -> Result<usize> {
    let size: usize = value
        .parse()
        .map_err(|_| FrameError::InvalidContentLength(value.to_string()))?;
    if size == 0 {
        return Err(FrameError::InvalidContentLength(value.to_string()));
    }
    if size > max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size,
            max: max_frame_size,
        });
    }
    Ok(size)
}

/// Decode one frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes exactly the frame's bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<Frame>> {
    let Some((header, header_len)) = decode_header(src, max_frame_size)? else {
        return Ok(None);
    };

    let total = header_len + header.content_length;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(header_len);
    let body = src.split_to(header.content_length).freeze();
    let message = header.encoding.decode(&body, header.descriptor.as_ref())?;

    Ok(Some(Frame {
        encoding: header.encoding,
        descriptor: header.descriptor,
        body,
        message,
        header_len,
    }))
}

/// `tokio_util` codec for header-delimited frames.
#[derive(Debug, Clone, Default)]
pub struct RpcCodec {
    config: FrameConfig,
}

impl RpcCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut FrameConfig {
        &mut self.config
    }
}

impl Decoder for RpcCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        decode_frame(src, self.config.max_frame_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        match decode_header(src, self.config.max_frame_size)? {
            Some((header, header_len)) => Err(FrameError::Truncated {
                expected: header.content_length,
                received: src.len() - header_len,
            }),
            None => Err(FrameError::IncompleteHeader),
        }
    }
}

impl Encoder<(Message, Encoding)> for RpcCodec {
    type Error = FrameError;

    fn encode(&mut self, item: (Message, Encoding), dst: &mut BytesMut) -> Result<()> {
        let (message, encoding) = item;
        encode_frame(&message, encoding, self.config.max_frame_size, dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(value: serde_json::Value) -> Message {
        Message::try_from(value).unwrap()
    }

    fn initialize() -> Message {
        message(json!({"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}))
    }

    #[test]
    fn encodes_text_frame_with_exact_length() {
        let mut buf = BytesMut::new();
        let written =
            encode_frame(&initialize(), Encoding::Text, DEFAULT_MAX_FRAME_SIZE, &mut buf).unwrap();

        let body = serde_json::to_vec(&initialize()).unwrap();
        let expected = format!("Content-Length: {}\r\n\r\n", body.len());
        assert_eq!(written, buf.len());
        assert!(buf.starts_with(expected.as_bytes()));
        assert_eq!(&buf[expected.len()..], body.as_slice());
    }

    #[test]
    fn encodes_binary_headers() {
        let mut buf = BytesMut::new();
        encode_frame(&initialize(), Encoding::Binary, DEFAULT_MAX_FRAME_SIZE, &mut buf).unwrap();
        let text = String::from_utf8_lossy(&buf);
        assert!(text.contains("\r\nContent-Type: application/binary\r\n"));
        assert!(text.contains("\r\nX-Encoding-Type: a{sv}\r\n\r\n"));
    }

    #[test]
    fn encode_decode_roundtrip() {
        for encoding in [Encoding::Text, Encoding::Binary] {
            let mut buf = BytesMut::new();
            let written =
                encode_frame(&initialize(), encoding, DEFAULT_MAX_FRAME_SIZE, &mut buf).unwrap();

            let frame = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
                .unwrap()
                .unwrap();

            assert_eq!(frame.message, initialize());
            assert_eq!(frame.encoding, encoding);
            assert_eq!(frame.wire_size(), written);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn decode_leaves_following_frame_untouched() {
        let mut buf = BytesMut::new();
        encode_frame(&initialize(), Encoding::Text, DEFAULT_MAX_FRAME_SIZE, &mut buf).unwrap();
        let first_len = buf.len();
        buf.put_slice(b"Content-Length: 2\r\n");

        let frame = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(frame.wire_size(), first_len);
        assert_eq!(&buf[..], b"Content-Length: 2\r\n");
    }

    #[test]
    fn accepts_lf_and_mixed_case_headers() {
        let body = br#"{"jsonrpc":"2.0","method":"exit"}"#;
        let mut buf = BytesMut::new();
        buf.put_slice(format!("content-length: {}\ncontent-type: application/vscode-jsonrpc; charset=utf-8\n\n", body.len()).as_bytes());
        buf.put_slice(body);

        let frame = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(frame.encoding, Encoding::Text);
        assert_eq!(frame.message.get("method"), Some(&json!("exit")));
    }

    #[test]
    fn incomplete_header_needs_more_data() {
        let mut buf = BytesMut::from(&b"Content-Length: 10\r\n"[..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .is_none());
        assert_eq!(buf.len(), 20);
    }

    #[test]
    fn incomplete_body_needs_more_data() {
        let mut buf = BytesMut::new();
        encode_frame(&initialize(), Encoding::Text, DEFAULT_MAX_FRAME_SIZE, &mut buf).unwrap();
        let full = buf.len();
        buf.truncate(full - 3);

        assert!(decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .is_none());
        assert_eq!(buf.len(), full - 3);
    }

    #[test]
    fn missing_content_length_is_rejected() {
        let mut buf = BytesMut::from(&b"Content-Type: application/json\r\n\r\n{}"[..]);
        assert!(matches!(
            decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE),
            Err(FrameError::MissingContentLength)
        ));
    }

    #[test]
    fn invalid_content_length_is_rejected() {
        for value in ["abc", "0", "-4", ""] {
            let mut buf = BytesMut::from(format!("Content-Length: {value}\r\n\r\n").as_bytes());
            assert!(
                matches!(
                    decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE),
                    Err(FrameError::InvalidContentLength(_))
                ),
                "{value:?} should be rejected"
            );
        }
    }

    #[test]
    fn oversized_frame_is_rejected_before_body() {
        let mut buf = BytesMut::from(&b"Content-Length: 4096\r\n\r\n"[..]);
        assert!(matches!(
            decode_frame(&mut buf, 1024),
            Err(FrameError::FrameTooLarge {
                size: 4096,
                max: 1024
            })
        ));
    }

    #[test]
    fn oversized_message_is_not_encoded() {
        let mut buf = BytesMut::new();
        let err = encode_frame(&initialize(), Encoding::Text, 8, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { max: 8, .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn runaway_header_is_rejected() {
        let mut buf = BytesMut::from(vec![b'x'; MAX_HEADER_BLOCK + 1].as_slice());
        assert!(matches!(
            decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE),
            Err(FrameError::HeaderTooLarge { .. })
        ));
    }

    #[test]
    fn header_without_colon_is_rejected() {
        let mut buf = BytesMut::from(&b"Content-Length 5\r\n\r\n"[..]);
        assert!(matches!(
            decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE),
            Err(FrameError::InvalidHeader(_))
        ));
    }

    #[test]
    fn invalid_descriptor_is_rejected() {
        let mut buf = BytesMut::from(
            &b"Content-Length: 1\r\nContent-Type: application/binary\r\nX-Encoding-Type: a{q}\r\n\r\n\xa0"[..],
        );
        assert!(matches!(
            decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE),
            Err(FrameError::Message(_))
        ));
    }

    #[test]
    fn non_object_body_is_rejected() {
        let mut buf = BytesMut::from(&b"Content-Length: 2\r\n\r\n[]"[..]);
        assert!(matches!(
            decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE),
            Err(FrameError::Message(_))
        ));
    }

    #[test]
    fn unknown_headers_are_ignored() {
        let mut buf = BytesMut::from(&b"X-Trace: 1\r\nContent-Length: 2\r\n\r\n{}"[..]);
        let frame = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert!(frame.message.is_empty());
    }

    #[test]
    fn decode_eof_reports_truncation() {
        let mut codec = RpcCodec::default();

        let mut buf = BytesMut::from(&b"Content-Length: 10\r\n\r\n{}"[..]);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(FrameError::Truncated {
                expected: 10,
                received: 2
            })
        ));

        let mut buf = BytesMut::from(&b"Content-Len"[..]);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(FrameError::IncompleteHeader)
        ));

        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }
}
