//! Read loops over a supervised process's output streams
//!
//! One of [`read_batch`] or [`read_stream`] consumes stdout, depending on the
//! attached parser's capability; [`read_stderr`] routes stderr into the log
//! sink. Each loop owns its stream, absorbs per-record failures into the
//! sink, and ends when the stream does.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::SourceError;
use crate::parse::{DecodeError, Parser, StreamDecoder};
use crate::process::OutputStream;
use crate::sink::Sink;
use crate::util::logging::LogSink;

use super::OnceNotice;

const ZERO_METRICS_NOTICE: &str =
    "no metrics were created from a record; verify your parser settings (this notice is only printed once)";

/// Chunk-buffered line demultiplexer.
///
/// Reads complete newline-delimited records, reassembled across buffer
/// boundaries, and hands each one to the parser with its delimiter included.
/// Read and parse errors are recoverable here: the next delimiter is a fresh
/// synchronization point, so the loop reports and keeps going. A trailing
/// record with no delimiter at EOF is dropped.
pub(crate) async fn read_batch<M: Send + 'static>(
    out: OutputStream,
    parser: Arc<dyn Parser<M>>,
    sink: Arc<dyn Sink<M>>,
    buffer_size: usize,
    log: Arc<dyn LogSink>,
    notice: OnceNotice,
) {
    let mut reader = BufReader::with_capacity(buffer_size, out);
    let mut record = Vec::new();

    loop {
        record.clear();
        match reader.read_until(b'\n', &mut record).await {
            Ok(0) => break,
            Ok(_) if !record.ends_with(b"\n") => break,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => break,
            Err(e) => {
                sink.add_error(SourceError::Stream(format!("error reading stdout: {e}")));
                continue;
            }
        }

        let metrics = match parser.parse(&record) {
            Ok(metrics) => metrics,
            Err(e) => {
                sink.add_error(e.into());
                continue;
            }
        };

        if metrics.is_empty() && notice.first() {
            log.debug(ZERO_METRICS_NOTICE);
        }

        for metric in metrics {
            sink.add_metric(metric);
        }
    }
}

/// Streaming demultiplexer for self-framing parsers.
///
/// Parse errors are recoverable; any other decode error is fatal for this
/// incarnation's stdout, because the decoder's framing state is unknown after
/// a transport failure.
pub(crate) async fn read_stream<M: Send + 'static>(
    mut decoder: Box<dyn StreamDecoder<M>>,
    sink: Arc<dyn Sink<M>>,
) {
    loop {
        match decoder.next().await {
            None => break,
            Some(Ok(metric)) => sink.add_metric(metric),
            Some(Err(DecodeError::Parse(e))) => sink.add_error(e.into()),
            Some(Err(e)) => {
                sink.add_error(e.into());
                return;
            }
        }
    }
}

/// Stderr router.
///
/// Each line starting with a severity token (`E! `, `W! `, `I! `, `D! `,
/// `T! `) is routed to the matching log level with the token stripped;
/// anything else goes to Error, quoted. Scanning cannot continue past a read
/// error, so the router reports it and ends.
pub(crate) async fn read_stderr<M: Send + 'static>(
    err: OutputStream,
    sink: Arc<dyn Sink<M>>,
    log: Arc<dyn LogSink>,
) {
    let mut lines = BufReader::new(err).lines();

    loop {
        let msg = match lines.next_line().await {
            Ok(Some(msg)) => msg,
            Ok(None) => break,
            Err(e) => {
                sink.add_error(SourceError::Stream(format!("error reading stderr: {e}")));
                break;
            }
        };

        if let Some(rest) = msg.strip_prefix("E! ") {
            log.error(rest);
        } else if let Some(rest) = msg.strip_prefix("W! ") {
            log.warn(rest);
        } else if let Some(rest) = msg.strip_prefix("I! ") {
            log.info(rest);
        } else if let Some(rest) = msg.strip_prefix("D! ") {
            log.debug(rest);
        } else if let Some(rest) = msg.strip_prefix("T! ") {
            log.trace(rest);
        } else {
            log.error(&format!("stderr: {:?}", msg));
        }
    }
}
