use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use crate::process::OutputStream;

use super::{DecodeError, ParseError, ParseResult, Parser, StreamDecoder, StreamingParser};

/// A parser for JSON lines: one JSON document per record.
///
/// Blank records produce no metrics. This parser frames its own records, so
/// it also implements [`StreamingParser`].
pub struct JsonLinesParser<M> {
    /// Phantom data for the metric type
    _metric: PhantomData<fn() -> M>,
}

impl<M> JsonLinesParser<M> {
    /// Create a new JSON lines parser
    pub fn new() -> Self {
        Self {
            _metric: PhantomData,
        }
    }
}

impl<M> Default for JsonLinesParser<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Parser<M> for JsonLinesParser<M>
where
    M: DeserializeOwned + Send + 'static,
{
    fn parse(&self, record: &[u8]) -> ParseResult<Vec<M>> {
        let line = std::str::from_utf8(record)
            .map_err(|e| ParseError::new(format!("invalid UTF-8: {}", e)))?
            .trim();

        if line.is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(line)
            .map(|metric| vec![metric])
            .map_err(|e| ParseError::new(format!("invalid JSON: {}", e)))
    }
}

impl<M> StreamingParser<M> for JsonLinesParser<M>
where
    M: DeserializeOwned + Send + 'static,
{
    fn decoder(&self, input: OutputStream) -> Box<dyn StreamDecoder<M>> {
        Box::new(JsonLineDecoder {
            lines: BufReader::new(input).lines(),
            _metric: PhantomData,
        })
    }
}

/// Streaming decoder for JSON lines
struct JsonLineDecoder<M> {
    lines: Lines<BufReader<OutputStream>>,
    _metric: PhantomData<fn() -> M>,
}

#[async_trait]
impl<M> StreamDecoder<M> for JsonLineDecoder<M>
where
    M: DeserializeOwned + Send + 'static,
{
    async fn next(&mut self) -> Option<Result<M, DecodeError>> {
        loop {
            match self.lines.next_line().await {
                Ok(None) => return None,
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    return Some(
                        serde_json::from_str(line)
                            .map_err(|e| ParseError::new(format!("invalid JSON: {}", e)).into()),
                    );
                }
                Err(e) => return Some(Err(DecodeError::Io(e))),
            }
        }
    }
}

/// A parser for delimited text records (CSV, TSV, etc.)
pub struct DelimitedParser<M> {
    /// Delimiter character
    delimiter: char,

    /// Whether to trim fields
    trim: bool,

    /// Function to convert a row of fields into metrics
    converter: Box<dyn Fn(&[String]) -> ParseResult<Vec<M>> + Send + Sync>,
}

impl<M: Send + 'static> DelimitedParser<M> {
    /// Create a new delimited text parser
    pub fn new<F>(delimiter: char, converter: F) -> Self
    where
        F: Fn(&[String]) -> ParseResult<Vec<M>> + Send + Sync + 'static,
    {
        Self {
            delimiter,
            trim: true,
            converter: Box::new(converter),
        }
    }

    /// Set whether to trim fields
    pub fn trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }
}

impl<M: Send + 'static> Parser<M> for DelimitedParser<M> {
    fn parse(&self, record: &[u8]) -> ParseResult<Vec<M>> {
        let line = std::str::from_utf8(record)
            .map_err(|e| ParseError::new(format!("invalid UTF-8: {}", e)))?
            .trim_end_matches(['\r', '\n']);

        if line.trim().is_empty() {
            return Ok(Vec::new());
        }

        let fields: Vec<String> = line
            .split(self.delimiter)
            .map(|s| {
                if self.trim {
                    s.trim().to_string()
                } else {
                    s.to_string()
                }
            })
            .collect();

        (self.converter)(&fields)
    }
}

/// A parser that calls a custom function for each record
pub struct FnParser<M, F>
where
    F: Fn(&[u8]) -> ParseResult<Vec<M>> + Send + Sync,
{
    /// Function to parse a record
    parse_fn: F,

    /// Phantom data for the metric type
    _metric: PhantomData<fn() -> M>,
}

impl<M, F> FnParser<M, F>
where
    F: Fn(&[u8]) -> ParseResult<Vec<M>> + Send + Sync,
{
    /// Create a new custom parser
    pub fn new(parse_fn: F) -> Self {
        Self {
            parse_fn,
            _metric: PhantomData,
        }
    }
}

impl<M, F> Parser<M> for FnParser<M, F>
where
    M: Send + 'static,
    F: Fn(&[u8]) -> ParseResult<Vec<M>> + Send + Sync + 'static,
{
    fn parse(&self, record: &[u8]) -> ParseResult<Vec<M>> {
        (self.parse_fn)(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Cursor;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        value: i64,
    }

    #[test]
    fn json_lines_parses_one_record() {
        let parser = JsonLinesParser::<Sample>::new();
        let metrics = parser.parse(b"{\"name\":\"cpu\",\"value\":42}\n").unwrap();
        assert_eq!(
            metrics,
            vec![Sample {
                name: "cpu".to_string(),
                value: 42
            }]
        );
    }

    #[test]
    fn json_lines_blank_record_yields_nothing() {
        let parser = JsonLinesParser::<Sample>::new();
        assert!(parser.parse(b"\n").unwrap().is_empty());
        assert!(parser.parse(b"   \n").unwrap().is_empty());
    }

    #[test]
    fn json_lines_rejects_garbage() {
        let parser = JsonLinesParser::<Sample>::new();
        assert!(parser.parse(b"not json\n").is_err());
    }

    #[tokio::test]
    async fn json_decoder_skips_blank_lines_and_ends() {
        let parser = JsonLinesParser::<Sample>::new();
        let input = b"{\"name\":\"a\",\"value\":1}\n\n{\"name\":\"b\",\"value\":2}\n".to_vec();
        let mut decoder = parser.decoder(Box::new(Cursor::new(input)));

        let first = decoder.next().await.unwrap().unwrap();
        assert_eq!(first.name, "a");
        let second = decoder.next().await.unwrap().unwrap();
        assert_eq!(second.name, "b");
        assert!(decoder.next().await.is_none());
    }

    #[test]
    fn delimited_converts_fields() {
        let parser = DelimitedParser::new(',', |fields: &[String]| {
            let value = fields[1]
                .parse::<i64>()
                .map_err(|e| ParseError::new(e.to_string()))?;
            Ok(vec![(fields[0].clone(), value)])
        });

        let metrics = parser.parse(b"mem, 7\n").unwrap();
        assert_eq!(metrics, vec![("mem".to_string(), 7)]);
    }

    #[test]
    fn fn_parser_delegates() {
        let parser = FnParser::new(|record: &[u8]| Ok(vec![record.len()]));
        assert_eq!(parser.parse(b"abc\n").unwrap(), vec![4]);
    }
}
