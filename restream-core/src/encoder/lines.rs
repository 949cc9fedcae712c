use std::io;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Longest line kept in the read buffer before it is flushed as-is.
const MAX_LINE_LEN: usize = 64 * 1024;

/// Splits encoder diagnostics into lines.
///
/// Status lines are terminated by `\r` (the encoder rewrites them in place)
/// while everything else ends in `\n`, so both count as a terminator. Blank
/// lines are dropped and invalid UTF-8 is replaced rather than rejected.
#[derive(Debug, Default)]
pub struct DiagnosticLineCodec {
    next_index: usize,
}

impl DiagnosticLineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

fn to_line(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end();
    if text.trim().is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

impl Decoder for DiagnosticLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        loop {
            let found = buf[self.next_index..]
                .iter()
                .position(|b| *b == b'\n' || *b == b'\r');

            let Some(offset) = found else {
                if buf.len() > MAX_LINE_LEN {
                    self.next_index = 0;
                    let raw = buf.split_to(buf.len());
                    return Ok(Some(String::from_utf8_lossy(&raw).into_owned()));
                }
                self.next_index = buf.len();
                return Ok(None);
            };

            let end = self.next_index + offset;
            let raw = buf.split_to(end + 1);
            self.next_index = 0;
            if let Some(line) = to_line(&raw[..end]) {
                return Ok(Some(line));
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        let raw = buf.split_to(buf.len());
        Ok(to_line(&raw))
    }
}
