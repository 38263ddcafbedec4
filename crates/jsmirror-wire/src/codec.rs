//! V8 debugger framing.
//!
//! Messages use an HTTP-like header section:
//!
//! ```text
//! Content-Length: 123\r\n
//! \r\n
//! { ...json... }
//! ```
//!
//! Right after connecting, the VM sends a header-only frame
//! (`Type: connect`, `V8-Version: ...`, `Content-Length: 0`).

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::{request::Envelope, types::Result, WireError};

pub const MAX_HEADER_LINE_BYTES: usize = 8 * 1024;
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// One decoded frame: its header lines and raw body bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_greeting(&self) -> bool {
        self.body.is_empty()
    }
}

fn sanitize_json_error_message(message: &str) -> String {
    // `serde_json::Error` display strings can include scalar values from the payload
    // (`invalid type: string "..."`). Remote values may be sensitive; never echo them.
    let mut out = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(start) = rest.find('"') {
        out.push_str(&rest[..start + 1]);
        rest = &rest[start + 1..];

        let Some(end) = rest.find('"') else {
            out.push_str(rest);
            return out;
        };
        out.push_str("<redacted>\"");
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

async fn read_line_limited<R>(reader: &mut R, max_len: usize) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::<u8>::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if buf.is_empty() {
                return Ok(None);
            }
            break;
        }

        let newline_pos = available.iter().position(|&b| b == b'\n');
        let take = newline_pos.map(|pos| pos + 1).unwrap_or(available.len());
        if buf.len() + take > max_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("V8 header line exceeds maximum size ({max_len} bytes)"),
            ));
        }

        buf.extend_from_slice(&available[..take]);
        reader.consume(take);
        if newline_pos.is_some() {
            break;
        }
    }

    let line = String::from_utf8(buf)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "V8 header line is not UTF-8"))?;
    Ok(Some(line))
}

/// Reads one frame. Returns `Ok(None)` on a clean EOF between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>>
where
    R: AsyncBufRead + Unpin,
{
    let mut headers = Vec::new();
    let mut content_length: Option<usize> = None;
    let mut saw_header_line = false;

    loop {
        let Some(line) = read_line_limited(reader, MAX_HEADER_LINE_BYTES).await? else {
            if !saw_header_line {
                return Ok(None);
            }
            return Err(WireError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "EOF while reading V8 headers",
            )));
        };
        saw_header_line = true;

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }

        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("Content-Length") {
            content_length = Some(value.parse::<usize>().map_err(|err| {
                WireError::Protocol(format!("invalid Content-Length {value:?}: {err}"))
            })?);
        }
        headers.push((name.trim().to_string(), value.to_string()));
    }

    let Some(content_length) = content_length else {
        return Err(WireError::Protocol(
            "V8 message missing Content-Length header".to_string(),
        ));
    };

    if content_length > MAX_MESSAGE_BYTES {
        return Err(WireError::MessageTooLarge {
            size: content_length,
            max: MAX_MESSAGE_BYTES,
        });
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;
    Ok(Some(Frame { headers, body }))
}

pub fn decode_envelope(body: &[u8]) -> Result<Envelope> {
    serde_json::from_slice(body).map_err(|err| {
        WireError::Protocol(format!(
            "malformed V8 message: {}",
            sanitize_json_error_message(&err.to_string())
        ))
    })
}

pub fn encode_message(envelope: &Envelope) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(envelope)?;
    if json.len() > MAX_MESSAGE_BYTES {
        return Err(WireError::MessageTooLarge {
            size: json.len(),
            max: MAX_MESSAGE_BYTES,
        });
    }
    let mut out = format!("Content-Length: {}\r\n\r\n", json.len()).into_bytes();
    out.extend_from_slice(&json);
    Ok(out)
}
