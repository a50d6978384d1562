//! SWC line decoding with encoding auto-detection.
//!
//! Bytes arrive in chunks (an upload, a file, a socket). [`LineDecoder`]
//! buffers only the current partial line, decodes each complete line with
//! the stream's text encoding, trims it, drops it if empty, and classifies
//! it as a comment/directive (`#`) or a candidate data row. Classification
//! never fails; [`swc`] decides what a data line is worth.
//!
//! ```text
//!  chunks ──▶ LineDecoder ──▶ SwcLine ──▶ SwcParser ──▶ ParseResult
//! ```

pub mod swc;

use encoding_rs::Encoding;
use std::io::Read;

use crate::error::DecodeError;

pub use swc::{
    parse_bytes, parse_file, parse_offset_directive, parse_reader, parse_row, JaneliaOffset,
    ParseResult, ParsedRow, RootCoercion, RowRejection, SkippedLine, SwcParser, SwcStreamParser,
};

/// Size of reads issued by [`Lines`].
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Bytes buffered before the stream encoding is decided.
const DETECTION_WINDOW: usize = 8 * 1024;

/// Kind of a non-empty SWC line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Starts with `#`: free text or a directive such as `# OFFSET`.
    Comment,
    /// Anything else: a candidate node row.
    Data,
}

/// A trimmed, non-empty, classified line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwcLine {
    /// 1-based physical line number in the stream.
    pub number: usize,
    pub kind: LineKind,
    pub text: String,
}

impl SwcLine {
    /// Classify an already trimmed, non-empty line.
    pub fn classify(number: usize, text: String) -> Self {
        let kind = if text.starts_with('#') {
            LineKind::Comment
        } else {
            LineKind::Data
        };
        Self { number, kind, text }
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Resolve a normalized charset name to a decoder. Unknown names fall back to UTF-8.
pub fn encoding_for(name: &str) -> &'static Encoding {
    match name.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => {
            encoding_rs::WINDOWS_1252
        }
        _ => Encoding::for_label(name.as_bytes()).unwrap_or(encoding_rs::UTF_8),
    }
}

/// Pick the encoding of a stream prefix.
///
/// Valid UTF-8 wins outright. When the prefix was cut from a longer stream
/// (`complete == false`) a multi-byte sequence truncated at its end still
/// counts as valid. Only otherwise is chardet consulted.
pub fn detect_prefix_encoding(prefix: &[u8], complete: bool) -> &'static Encoding {
    match std::str::from_utf8(prefix) {
        Ok(_) => encoding_rs::UTF_8,
        Err(e) if !complete && e.error_len().is_none() => encoding_rs::UTF_8,
        Err(_) => encoding_for(&detect_encoding(prefix)),
    }
}

/// Incremental, chunk-fed line decoder.
///
/// Push chunks with [`push`](Self::push), drain classified lines with
/// [`next_line`](Self::next_line), and call [`finish`](Self::finish) once the
/// stream is exhausted so the trailing unterminated line is released.
#[derive(Debug)]
pub struct LineDecoder {
    encoding: Option<&'static Encoding>,
    pending: Vec<u8>,
    cursor: usize,
    line_number: usize,
    finished: bool,
}

impl LineDecoder {
    /// Decoder that detects the encoding once 8 KiB are buffered or the
    /// stream ends, whichever comes first.
    pub fn new() -> Self {
        Self {
            encoding: None,
            pending: Vec::new(),
            cursor: 0,
            line_number: 0,
            finished: false,
        }
    }

    /// Decoder with a fixed encoding.
    pub fn with_encoding(encoding: &'static Encoding) -> Self {
        Self {
            encoding: Some(encoding),
            ..Self::new()
        }
    }

    /// Encoding in use, UTF-8 until one is detected.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding.unwrap_or(encoding_rs::UTF_8)
    }

    /// Number of physical lines consumed so far.
    pub fn lines_read(&self) -> usize {
        self.line_number
    }

    /// Append a chunk of the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        if self.cursor > 0 {
            self.pending.drain(..self.cursor);
            self.cursor = 0;
        }
        self.pending.extend_from_slice(chunk);
    }

    /// Mark the end of the stream.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Next non-empty classified line, or `None` if more input is needed
    /// (or the stream is finished and fully drained).
    pub fn next_line(&mut self) -> Option<SwcLine> {
        if self.encoding.is_none() && !self.detect() {
            return None;
        }
        loop {
            let rest = &self.pending[self.cursor..];
            let raw_end = match rest.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    let end = self.cursor + pos;
                    let start = self.cursor;
                    self.cursor = end + 1;
                    (start, end)
                }
                None if self.finished && !rest.is_empty() => {
                    let start = self.cursor;
                    self.cursor = self.pending.len();
                    (start, self.pending.len())
                }
                None => return None,
            };

            self.line_number += 1;
            let (decoded, _) = self
                .encoding()
                .decode_without_bom_handling(&self.pending[raw_end.0..raw_end.1]);
            let mut text = decoded.trim();
            if self.line_number == 1 {
                text = text.trim_start_matches('\u{feff}').trim_start();
            }
            if text.is_empty() {
                continue;
            }
            return Some(SwcLine::classify(self.line_number, text.to_string()));
        }
    }
}

impl LineDecoder {
    /// Fix the encoding if enough of the stream is buffered. Nothing has been
    /// consumed yet, so the whole buffer is the stream prefix.
    fn detect(&mut self) -> bool {
        if !self.finished && self.pending.len() < DETECTION_WINDOW {
            return false;
        }
        let window = &self.pending[..self.pending.len().min(DETECTION_WINDOW)];
        let complete = self.finished && window.len() == self.pending.len();
        // Cut at the last full line so no character straddles the sample end.
        let sample = match window.iter().rposition(|&b| b == b'\n') {
            Some(pos) if !complete => &window[..=pos],
            _ => window,
        };
        self.encoding = Some(detect_prefix_encoding(sample, complete));
        true
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy iterator of classified lines over any reader.
pub struct Lines<R> {
    reader: R,
    decoder: LineDecoder,
    buffer: Vec<u8>,
}

impl<R: Read> Lines<R> {
    /// Encoding detected (or fixed) for the stream.
    pub fn encoding(&self) -> &'static Encoding {
        self.decoder.encoding()
    }
}

impl<R: Read> Iterator for Lines<R> {
    type Item = Result<SwcLine, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.decoder.next_line() {
                return Some(Ok(line));
            }
            if self.decoder.finished {
                return None;
            }
            match self.reader.read(&mut self.buffer) {
                Ok(0) => self.decoder.finish(),
                Ok(n) => self.decoder.push(&self.buffer[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.decoder.finish();
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

/// Classified lines of a reader, with encoding auto-detection.
pub fn lines<R: Read>(reader: R) -> Lines<R> {
    Lines {
        reader,
        decoder: LineDecoder::new(),
        buffer: vec![0; READ_CHUNK_SIZE],
    }
}

/// Classified lines of an in-memory buffer.
pub fn decode_lines(bytes: &[u8]) -> impl Iterator<Item = SwcLine> {
    let mut decoder = LineDecoder::new();
    decoder.push(bytes);
    decoder.finish();
    std::iter::from_fn(move || decoder.next_line())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let lines: Vec<SwcLine> = decode_lines(b"# header\n1 1 0 0 0 1 -1\n").collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].kind, LineKind::Comment);
        assert_eq!(lines[0].text, "# header");
        assert_eq!(lines[1].kind, LineKind::Data);
        assert_eq!(lines[1].number, 2);
    }

    #[test]
    fn test_empty_lines_dropped_and_trimmed() {
        let lines: Vec<SwcLine> = decode_lines(b"\n   \n\t# c  \r\n\n  2 3 0 0 0 1 1  ").collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "# c");
        assert_eq!(lines[0].number, 3);
        assert_eq!(lines[1].text, "2 3 0 0 0 1 1");
        assert_eq!(lines[1].number, 5);
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut decoder = LineDecoder::with_encoding(encoding_rs::UTF_8);
        decoder.push(b"# fir");
        assert!(decoder.next_line().is_none());
        decoder.push(b"st\n1 1 0");
        assert_eq!(decoder.next_line().unwrap().text, "# first");
        assert!(decoder.next_line().is_none());
        decoder.push(b" 0 0 1 -1");
        assert!(decoder.next_line().is_none());
        decoder.finish();
        assert_eq!(decoder.next_line().unwrap().text, "1 1 0 0 0 1 -1");
        assert!(decoder.next_line().is_none());
    }

    #[test]
    fn test_utf8_bom_stripped() {
        let lines: Vec<SwcLine> = decode_lines("\u{feff}# bom\n".as_bytes()).collect();
        assert_eq!(lines[0].text, "# bom");
        assert_eq!(lines[0].kind, LineKind::Comment);
    }

    #[test]
    fn test_reader_lines() {
        let input = "# a\n\n1 1 0 0 0 1 -1\n";
        let collected: Vec<SwcLine> = lines(input.as_bytes()).map(|l| l.unwrap()).collect();
        assert_eq!(collected.len(), 2);
    }

    #[test]
    fn test_latin1_decoding() {
        // "# Société" in ISO-8859-1
        let decoder = encoding_for("iso-8859-1");
        let mut d = LineDecoder::with_encoding(decoder);
        d.push(&[0x23, 0x20, 0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9]);
        d.finish();
        let line = d.next_line().unwrap();
        assert_eq!(line.text, "# Société");
    }

    #[test]
    fn test_encoding_for_fallback() {
        assert_eq!(encoding_for("utf-8"), encoding_rs::UTF_8);
        assert_eq!(encoding_for("no-such-charset"), encoding_rs::UTF_8);
        assert_eq!(encoding_for("windows-1252"), encoding_rs::WINDOWS_1252);
        assert_eq!(encoding_for("iso-8859-1"), encoding_rs::WINDOWS_1252);
    }

    #[test]
    fn test_latin1_maps_to_windows_1252() {
        // 0xA4 is the currency sign in Latin-1, the euro sign in Latin-9
        let mut d = LineDecoder::with_encoding(encoding_for("latin1"));
        d.push(&[0x23, 0x20, 0xA4]);
        d.finish();
        assert_eq!(d.next_line().unwrap().text, "# \u{a4}");
    }

    #[test]
    fn test_utf8_char_split_across_first_chunk() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"# J\xC3");
        assert!(decoder.next_line().is_none());
        decoder.push(b"\xB6rg\n1 1 0 0 0 1 -1\n");
        decoder.finish();

        let comment = decoder.next_line().unwrap();
        assert_eq!(comment.text, "# Jörg");
        assert_eq!(decoder.encoding(), encoding_rs::UTF_8);
        assert_eq!(decoder.next_line().unwrap().text, "1 1 0 0 0 1 -1");
        assert!(decoder.next_line().is_none());
    }

    #[test]
    fn test_detection_waits_for_window() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"# header\n");
        assert!(decoder.next_line().is_none());

        let mut body = Vec::new();
        while body.len() < DETECTION_WINDOW {
            body.extend_from_slice(b"2 3 0 0 0 1 1\n");
        }
        decoder.push(&body);
        assert_eq!(decoder.next_line().unwrap().text, "# header");
        assert_eq!(decoder.encoding(), encoding_rs::UTF_8);
    }

    #[test]
    fn test_prefix_detection_tolerates_truncated_tail() {
        assert_eq!(detect_prefix_encoding(b"# J\xC3", false), encoding_rs::UTF_8);
        assert_eq!(detect_prefix_encoding(b"# J\xC3\xB6rg\n", true), encoding_rs::UTF_8);
    }
}
