//! A library for adapting external commands into structured metric sources
//!
//! `spigot` launches a command, keeps it running across crashes, and turns
//! its standard output into a stream of parsed metrics while routing its
//! standard error into leveled logging. The metric wire format is pluggable:
//! attach any [`parse::Parser`], or a [`parse::StreamingParser`] for formats
//! that frame their own records.

pub mod config;
pub mod error;
pub mod exec;
pub mod parse;
pub mod process;
pub mod sink;
pub mod source;
pub mod util;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::config::{ExecConfig, LogLevel};
    pub use crate::error::{Result, SourceError};
    pub use crate::exec::{ExecSource, OnceNotice};
    pub use crate::parse::{
        DecodeError, FnParser, JsonLinesParser, ParseError, Parser, StreamDecoder, StreamingParser,
    };
    pub use crate::sink::{ChannelSink, Sink};
    pub use crate::source::MetricSource;
    pub use crate::util::logging::{LogSink, StdLog};
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
