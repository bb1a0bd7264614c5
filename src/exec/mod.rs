//! The exec metric source
//!
//! [`ExecSource`] adapts an external command into a [`MetricSource`]: it
//! supervises the command, demultiplexes its stdout into metrics through the
//! attached parser, and routes its stderr into the log sink. Which stdout
//! demultiplexer runs is decided once, when the parser is attached: parsers
//! that implement [`StreamingParser`] get the continuous decode loop,
//! everything else gets chunk-buffered line parsing.

mod demux;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::config::ExecConfig;
use crate::error::SourceError;
use crate::parse::{Parser, StreamingParser};
use crate::process::{StopSignal, StreamHandler, Supervisor};
use crate::sink::Sink;
use crate::source::MetricSource;
use crate::util::logging::{LogSink, StdLog};

/// A shared at-most-once guard for the zero-metrics notice.
///
/// All sources sharing a guard emit the notice at most once between them;
/// the process-wide [`OnceNotice::global`] instance is the default, so many
/// concurrently running sources do not spam the log with the same hint.
/// A guard is never reset; tests inject fresh instances instead.
#[derive(Clone, Default)]
pub struct OnceNotice(Arc<AtomicBool>);

impl OnceNotice {
    /// Create an independent guard
    pub fn new() -> Self {
        Self::default()
    }

    /// The guard shared by every source in this process
    pub fn global() -> Self {
        static GLOBAL: OnceLock<OnceNotice> = OnceLock::new();
        GLOBAL.get_or_init(OnceNotice::new).clone()
    }

    /// Returns true exactly once per guard
    pub fn first(&self) -> bool {
        !self.0.swap(true, Ordering::Relaxed)
    }
}

enum ParserMode<M> {
    Batch(Arc<dyn Parser<M>>),
    Streaming(Arc<dyn StreamingParser<M>>),
}

impl<M> Clone for ParserMode<M> {
    fn clone(&self) -> Self {
        match self {
            ParserMode::Batch(parser) => ParserMode::Batch(Arc::clone(parser)),
            ParserMode::Streaming(parser) => ParserMode::Streaming(Arc::clone(parser)),
        }
    }
}

/// A metric source backed by a supervised external command
pub struct ExecSource<M> {
    config: ExecConfig,
    parser: Option<ParserMode<M>>,
    log: Arc<dyn LogSink>,
    notice: OnceNotice,
    process: Option<Supervisor>,
}

impl<M: Send + 'static> ExecSource<M> {
    /// Create a source for the given configuration
    pub fn new(config: ExecConfig) -> Self {
        Self {
            config,
            parser: None,
            log: Arc::new(StdLog),
            notice: OnceNotice::global(),
            process: None,
        }
    }

    /// Attach a whole-record parser; stdout will be line-demultiplexed
    pub fn set_parser(&mut self, parser: Arc<dyn Parser<M>>) {
        self.parser = Some(ParserMode::Batch(parser));
    }

    /// Attach a self-framing parser; stdout will be decoded continuously
    pub fn set_streaming_parser(&mut self, parser: Arc<dyn StreamingParser<M>>) {
        self.parser = Some(ParserMode::Streaming(parser));
    }

    /// Set the log sink used for routed stderr and lifecycle events
    pub fn set_log(&mut self, log: Arc<dyn LogSink>) {
        self.log = log;
    }

    /// Replace the zero-metrics notice guard (defaults to the process-wide
    /// one)
    pub fn set_zero_metrics_notice(&mut self, notice: OnceNotice) {
        self.notice = notice;
    }

    fn stdout_handler(&self, mode: ParserMode<M>, sink: Arc<dyn Sink<M>>) -> StreamHandler {
        match mode {
            ParserMode::Batch(parser) => {
                let buffer_size = self.config.buffer_size;
                let log = Arc::clone(&self.log);
                let notice = self.notice.clone();
                Box::new(move |out| {
                    Box::pin(demux::read_batch(
                        out,
                        Arc::clone(&parser),
                        Arc::clone(&sink),
                        buffer_size,
                        Arc::clone(&log),
                        notice.clone(),
                    ))
                })
            }
            ParserMode::Streaming(parser) => Box::new(move |out| {
                let decoder = parser.decoder(out);
                Box::pin(demux::read_stream(decoder, Arc::clone(&sink)))
            }),
        }
    }

    fn stderr_handler(&self, sink: Arc<dyn Sink<M>>) -> StreamHandler {
        let log = Arc::clone(&self.log);
        Box::new(move |err| {
            Box::pin(demux::read_stderr(
                err,
                Arc::clone(&sink),
                Arc::clone(&log),
            ))
        })
    }
}

#[async_trait]
impl<M: Send + 'static> MetricSource<M> for ExecSource<M> {
    fn init(&mut self) -> Result<(), SourceError> {
        if self.config.command.is_empty() {
            return Err(SourceError::Config("no command specified".to_string()));
        }
        Ok(())
    }

    async fn start(&mut self, sink: Arc<dyn Sink<M>>) -> Result<(), SourceError> {
        let mode = self
            .parser
            .clone()
            .ok_or_else(|| SourceError::Config("no parser attached".to_string()))?;
        let stop_signal = StopSignal::parse(&self.config.signal)?;

        let mut supervisor = Supervisor::new(&self.config.command, &self.config.environment)
            .map_err(|e| SourceError::Process(format!("error creating new process: {e}")))?;
        supervisor.restart_delay = self.config.restart_delay;
        supervisor.stop_on_error = self.config.stop_on_error;
        supervisor.set_stop_signal(stop_signal);
        supervisor.set_log(Arc::clone(&self.log));
        supervisor.on_stdout(self.stdout_handler(mode, Arc::clone(&sink)));
        supervisor.on_stderr(self.stderr_handler(sink));

        if let Err(e) = supervisor.start().await {
            if self.config.command.len() == 1 && self.config.command[0].contains(' ') {
                self.log.warn(
                    "the command contained spaces but no arguments; `command` expects the \
                     program and its arguments as separate list entries, not one \
                     space-delimited string",
                );
            }
            return Err(SourceError::Process(format!(
                "failed to start process {:?}: {e}",
                self.config.command
            )));
        }

        self.process = Some(supervisor);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(mut supervisor) = self.process.take() {
            supervisor.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{FnParser, JsonLinesParser};
    use crate::sink::ChannelSink;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    struct WarnLog {
        warns: Mutex<Vec<String>>,
    }

    impl WarnLog {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                warns: Mutex::new(Vec::new()),
            })
        }
    }

    impl LogSink for WarnLog {
        fn error(&self, _msg: &str) {}
        fn warn(&self, msg: &str) {
            self.warns.lock().unwrap().push(msg.to_string());
        }
        fn info(&self, _msg: &str) {}
        fn debug(&self, _msg: &str) {}
        fn trace(&self, _msg: &str) {}
    }

    fn line_parser() -> Arc<dyn Parser<String>> {
        Arc::new(FnParser::new(|record: &[u8]| {
            Ok(vec![String::from_utf8_lossy(record).trim_end().to_string()])
        }))
    }

    fn config_for(script: &str) -> ExecConfig {
        let mut config = ExecConfig::new(["/bin/sh", "-c", script]);
        // Keep restarts out of the picture unless a test wants them.
        config.restart_delay = Duration::from_secs(60);
        config
    }

    #[tokio::test]
    async fn init_rejects_empty_command() {
        let mut source = ExecSource::<String>::new(ExecConfig::default());
        let err = source.init().unwrap_err();
        assert!(matches!(err, SourceError::Config(_)));
    }

    #[tokio::test]
    async fn start_without_parser_fails() {
        let mut source = ExecSource::<String>::new(config_for("true"));
        source.init().unwrap();

        let (sink, _rx) = ChannelSink::channel(4);
        let err = source.start(Arc::new(sink)).await.unwrap_err();
        assert!(matches!(err, SourceError::Config(_)));
    }

    #[tokio::test]
    async fn start_rejects_unknown_signal() {
        let mut config = config_for("true");
        config.signal = "SIGBOGUS".to_string();
        let mut source = ExecSource::new(config);
        source.set_parser(line_parser());

        let (sink, _rx) = ChannelSink::channel(4);
        let err = source.start(Arc::new(sink)).await.unwrap_err();
        assert!(matches!(err, SourceError::Process(_)));
    }

    #[tokio::test]
    async fn start_warns_about_missplit_command() {
        let mut config = ExecConfig::new(["/bin/echo hello world"]);
        let mut source = ExecSource::new(config.clone());
        let log = WarnLog::new();
        source.set_log(log.clone());
        source.set_parser(line_parser());

        let (sink, _rx) = ChannelSink::channel(4);
        let err = source.start(Arc::new(sink)).await.unwrap_err();
        assert!(matches!(err, SourceError::Process(_)));
        assert_eq!(log.warns.lock().unwrap().len(), 1);

        // The same command split properly does not warn.
        config.command = vec!["/bin/echo".to_string(), "hello".to_string()];
        let mut source = ExecSource::new(config);
        let log = WarnLog::new();
        source.set_log(log.clone());
        source.set_parser(line_parser());

        let (sink, _rx) = ChannelSink::channel(4);
        source.start(Arc::new(sink)).await.unwrap();
        source.stop().await;
        assert!(log.warns.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_mode_end_to_end() {
        let mut source = ExecSource::new(config_for("printf 'm v=1\\nm v=2\\n'; sleep 30"));
        source.set_parser(line_parser());
        source.set_zero_metrics_notice(OnceNotice::new());
        source.init().unwrap();

        let (sink, mut rx) = ChannelSink::channel(16);
        source.start(Arc::new(sink)).await.unwrap();

        let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        let second = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        source.stop().await;

        assert_eq!(first.as_deref(), Some("m v=1"));
        assert_eq!(second.as_deref(), Some("m v=2"));
    }

    #[tokio::test]
    async fn streaming_mode_end_to_end() {
        let mut source =
            ExecSource::new(config_for("printf '{\"v\":1}\\n{\"v\":2}\\n'; sleep 30"));
        source.set_streaming_parser(Arc::new(JsonLinesParser::<serde_json::Value>::new()));
        source.init().unwrap();

        let (sink, mut rx) = ChannelSink::channel(16);
        source.start(Arc::new(sink)).await.unwrap();

        let first = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        source.stop().await;

        assert_eq!(first["v"], 1);
        assert_eq!(second["v"], 2);
    }
}
