//! Parser seams between raw process output and metrics
//!
//! Two decoding strategies exist. A plain [`Parser`] is handed one complete
//! newline-delimited record at a time by the batch demultiplexer. A parser
//! that frames its own records additionally implements [`StreamingParser`],
//! which lets the adapter drive a [`StreamDecoder`] over the raw byte stream
//! instead. Implementing `StreamingParser` is the capability marker: it is
//! queried once when the parser is attached, never per record.

mod parsers;

pub use parsers::{DelimitedParser, FnParser, JsonLinesParser};

use async_trait::async_trait;
use thiserror::Error;

use crate::process::OutputStream;

/// Result type for single-record parsing
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// A recoverable, per-record parse failure
#[derive(Error, Debug)]
#[error("parse error: {msg}")]
pub struct ParseError {
    pub msg: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

/// Errors produced by a [`StreamDecoder`].
///
/// `Parse` is recoverable; the decode loop reports it and keeps going.
/// Anything else is a fatal stream error and ends the loop.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),
}

/// Converts one raw record into zero or more metrics.
///
/// The record includes its trailing newline delimiter. A record that parses
/// cleanly to nothing (blank line, comment) returns an empty vec.
pub trait Parser<M>: Send + Sync + 'static {
    fn parse(&self, record: &[u8]) -> ParseResult<Vec<M>>;
}

/// A continuous decoder over a raw byte stream.
///
/// `next` returns `None` at end of stream.
#[async_trait]
pub trait StreamDecoder<M>: Send {
    async fn next(&mut self) -> Option<Result<M, DecodeError>>;
}

/// Capability marker for parsers that frame their own records.
///
/// Attaching a `StreamingParser` to an [`crate::exec::ExecSource`] selects
/// the streaming demultiplexer for the lifetime of the instance.
pub trait StreamingParser<M>: Parser<M> {
    /// Construct a decoder over the process's stdout stream
    fn decoder(&self, input: OutputStream) -> Box<dyn StreamDecoder<M>>;
}
