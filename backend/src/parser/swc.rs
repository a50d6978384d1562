//! SWC row parsing.
//!
//! A data line is a node only if it splits into exactly seven
//! whitespace-separated tokens:
//!
//! ```text
//! sampleNumber structureCode x y z radius parentNumber
//! ```
//!
//! Anything else is dropped without failing the stream. Root rows
//! (`parentNumber == -1`) are canonicalized to the soma code by
//! [`canonicalize`], which reports what it changed instead of mutating in
//! place.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use thiserror::Error;

use super::{lines, LineDecoder, LineKind, SwcLine};
use crate::error::DecodeError;
use crate::models::{ROOT_PARENT_NUMBER, SOMA_STRUCTURE_CODE};

/// Prefix of the Janelia offset directive, including the trailing space.
pub const OFFSET_DIRECTIVE_PREFIX: &str = "# OFFSET ";

/// Number of tokens on a node row.
pub const ROW_TOKEN_COUNT: usize = 7;

static OFFSET_TOKENS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+)\s+(\S+)\s+(\S+)$").expect("offset pattern is valid"));

/// One node row as read from the file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRow {
    pub sample_number: i32,
    pub structure_code: i32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub radius: f64,
    pub parent_number: i32,
}

impl ParsedRow {
    pub fn is_root(&self) -> bool {
        self.parent_number == ROOT_PARENT_NUMBER
    }
}

/// Record of a root row whose structure code was forced to soma.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootCoercion {
    pub sample_number: i32,
    pub original_code: i32,
}

impl RootCoercion {
    /// Comment line appended to the tracing's file comments.
    pub fn comment(&self) -> String {
        format!(
            "# Un-parented (root) sample {} converted from {} to soma ({})",
            self.sample_number, self.original_code, SOMA_STRUCTURE_CODE
        )
    }
}

/// Root rows always carry the soma code.
pub fn canonicalize(row: ParsedRow) -> (ParsedRow, Option<RootCoercion>) {
    if !row.is_root() || row.structure_code == SOMA_STRUCTURE_CODE {
        return (row, None);
    }
    let coercion = RootCoercion {
        sample_number: row.sample_number,
        original_code: row.structure_code,
    };
    (
        ParsedRow {
            structure_code: SOMA_STRUCTURE_CODE,
            ..row
        },
        Some(coercion),
    )
}

/// Why a data line was not accepted as a node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowRejection {
    #[error("expected 7 tokens, found {0}")]
    TokenCount(usize),

    #[error("{field} is not an integer: '{value}'")]
    NotInteger { field: &'static str, value: String },

    #[error("{field} is not a finite number: '{value}'")]
    NotFinite { field: &'static str, value: String },
}

/// Integer field. Integral decimals such as `3.0` are accepted; fractional,
/// non-numeric and out-of-range tokens are not.
fn integer(field: &'static str, token: &str) -> Result<i32, RowRejection> {
    if let Ok(v) = token.parse::<i32>() {
        return Ok(v);
    }
    match token.parse::<f64>() {
        Ok(v) if v.is_finite()
            && v.fract() == 0.0
            && v >= f64::from(i32::MIN)
            && v <= f64::from(i32::MAX) =>
        {
            Ok(v as i32)
        }
        _ => Err(RowRejection::NotInteger {
            field,
            value: token.to_string(),
        }),
    }
}

fn finite(field: &'static str, token: &str) -> Result<f64, RowRejection> {
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(RowRejection::NotFinite {
            field,
            value: token.to_string(),
        }),
    }
}

/// Parse one trimmed data line into a raw (not yet canonical) row.
pub fn parse_row(line: &str) -> Result<ParsedRow, RowRejection> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != ROW_TOKEN_COUNT {
        return Err(RowRejection::TokenCount(tokens.len()));
    }

    Ok(ParsedRow {
        sample_number: integer("sample number", tokens[0])?,
        parent_number: integer("parent number", tokens[6])?,
        structure_code: integer("structure code", tokens[1])?,
        x: finite("x", tokens[2])?,
        y: finite("y", tokens[3])?,
        z: finite("z", tokens[4])?,
        radius: finite("radius", tokens[5])?,
    })
}

/// Janelia offset triple from `# OFFSET x y z` directives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JaneliaOffset {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<JaneliaOffset> for (f64, f64, f64) {
    fn from(offset: JaneliaOffset) -> Self {
        (offset.x, offset.y, offset.z)
    }
}

/// Parse an `# OFFSET <x> <y> <z>` directive.
///
/// Returns `None` for other comments and for directives without exactly three
/// finite numeric tokens.
pub fn parse_offset_directive(line: &str) -> Option<JaneliaOffset> {
    let rest = line.strip_prefix(OFFSET_DIRECTIVE_PREFIX)?;
    let caps = OFFSET_TOKENS.captures(rest)?;
    let value = |i: usize| -> Option<f64> {
        caps.get(i)?
            .as_str()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    };
    Some(JaneliaOffset {
        x: value(1)?,
        y: value(2)?,
        z: value(3)?,
    })
}

/// A dropped data line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLine {
    pub line: usize,
    pub reason: String,
}

/// Aggregate of one decode pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    pub rows: Vec<ParsedRow>,
    /// Rows with parent number -1.
    pub soma_count: usize,
    /// Roots whose structure code was coerced to soma.
    pub forced_soma_count: usize,
    pub janelia_offset: JaneliaOffset,
    /// Every comment line followed by `\n`, plus coercion notes.
    pub comments: String,
    pub skipped: Vec<SkippedLine>,
    pub encoding: String,
}

/// Accumulates classified lines into a [`ParseResult`].
#[derive(Debug, Default)]
pub struct SwcParser {
    result: ParseResult,
}

impl SwcParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows accepted so far.
    pub fn row_count(&self) -> usize {
        self.result.rows.len()
    }

    pub fn accept(&mut self, line: SwcLine) {
        match line.kind {
            LineKind::Comment => self.accept_comment(line.text),
            LineKind::Data => self.accept_data(line.number, &line.text),
        }
    }

    fn accept_comment(&mut self, text: String) {
        if let Some(offset) = parse_offset_directive(&text) {
            self.result.janelia_offset = offset;
        }
        self.result.comments.push_str(&text);
        self.result.comments.push('\n');
    }

    fn accept_data(&mut self, number: usize, text: &str) {
        let raw = match parse_row(text) {
            Ok(row) => row,
            Err(rejection) => {
                self.result.skipped.push(SkippedLine {
                    line: number,
                    reason: rejection.to_string(),
                });
                return;
            }
        };

        let (row, coercion) = canonicalize(raw);
        if row.is_root() {
            self.result.soma_count += 1;
        }
        if let Some(coercion) = coercion {
            self.result.forced_soma_count += 1;
            self.result.comments.push_str(&coercion.comment());
            self.result.comments.push('\n');
        }
        self.result.rows.push(row);
    }

    /// Finalize with the name of the encoding the stream was decoded with.
    pub fn finish(mut self, encoding: &str) -> ParseResult {
        self.result.encoding = encoding.to_string();
        self.result
    }
}

/// Decoder and parser fed chunk by chunk; holds at most one partial line.
#[derive(Debug, Default)]
pub struct SwcStreamParser {
    decoder: LineDecoder,
    parser: SwcParser,
}

impl SwcStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and parse every line it completes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.decoder.push(chunk);
        self.drain();
    }

    fn drain(&mut self) {
        while let Some(line) = self.decoder.next_line() {
            self.parser.accept(line);
        }
    }

    /// Flush the trailing line and finalize.
    pub fn finish(mut self) -> ParseResult {
        self.decoder.finish();
        self.drain();
        let encoding = self.decoder.encoding().name();
        self.parser.finish(encoding)
    }
}

/// Parse an in-memory SWC buffer.
pub fn parse_bytes(bytes: &[u8]) -> ParseResult {
    let mut stream = SwcStreamParser::new();
    stream.push(bytes);
    stream.finish()
}

/// Parse an SWC stream from any reader.
pub fn parse_reader<R: Read>(reader: R) -> Result<ParseResult, DecodeError> {
    let mut parser = SwcParser::new();
    let mut lines = lines(reader);
    for line in lines.by_ref() {
        parser.accept(line?);
    }
    Ok(parser.finish(lines.encoding().name()))
}

/// Parse an SWC file.
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<ParseResult, DecodeError> {
    let file = std::fs::File::open(path.as_ref())?;
    parse_reader(file)
}
