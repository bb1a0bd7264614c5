use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

use crate::config::LogLevel;

/// A leveled logging destination.
///
/// Injected wherever the library needs to log on behalf of a supervised
/// process (routed stderr lines, supervisor lifecycle events, the
/// zero-metrics notice). Implementations must tolerate concurrent calls.
pub trait LogSink: Send + Sync + 'static {
    fn error(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn info(&self, msg: &str);
    fn debug(&self, msg: &str);
    fn trace(&self, msg: &str);
}

/// The default log sink, forwarding to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct StdLog;

impl LogSink for StdLog {
    fn error(&self, msg: &str) {
        log::error!("{msg}");
    }

    fn warn(&self, msg: &str) {
        log::warn!("{msg}");
    }

    fn info(&self, msg: &str) {
        log::info!("{msg}");
    }

    fn debug(&self, msg: &str) {
        log::debug!("{msg}");
    }

    fn trace(&self, msg: &str) {
        log::trace!("{msg}");
    }
}

/// Initialize the logging system
pub fn init(level: &LogLevel) {
    let log_level = match level {
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warn => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Trace => LevelFilter::Trace,
    };

    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, log_level)
        .init();
}
