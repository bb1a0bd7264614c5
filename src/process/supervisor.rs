use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::util::logging::{LogSink, StdLog};

use super::command::Command;
use super::error::{ProcessError, ProcessResult};
use super::{OutputStream, StreamHandler};

/// How long a signalled process gets to exit before it is killed
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// The signal delivered to the supervised process on stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Kill the process outright
    None,
    /// Deliver a POSIX signal, escalating to kill after a grace period
    #[cfg(unix)]
    Unix(nix::sys::signal::Signal),
}

impl StopSignal {
    /// Parse a signal name. Accepts "none" and the common termination
    /// signals with or without a SIG prefix, case-insensitively.
    pub fn parse(name: &str) -> ProcessResult<Self> {
        let upper = name.to_ascii_uppercase();
        let bare = upper.strip_prefix("SIG").unwrap_or(&upper);

        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;

            return match bare {
                "NONE" => Ok(StopSignal::None),
                "TERM" => Ok(StopSignal::Unix(Signal::SIGTERM)),
                "INT" => Ok(StopSignal::Unix(Signal::SIGINT)),
                "HUP" => Ok(StopSignal::Unix(Signal::SIGHUP)),
                "KILL" => Ok(StopSignal::Unix(Signal::SIGKILL)),
                "USR1" => Ok(StopSignal::Unix(Signal::SIGUSR1)),
                "USR2" => Ok(StopSignal::Unix(Signal::SIGUSR2)),
                _ => Err(ProcessError::UnknownSignal(name.to_string())),
            };
        }

        #[cfg(not(unix))]
        {
            match bare {
                "NONE" => Ok(StopSignal::None),
                _ => Err(ProcessError::UnknownSignal(name.to_string())),
            }
        }
    }
}

/// Shared pieces of the supervisor used by the monitor task
struct Inner {
    command: Command,
    stdout_handler: Option<StreamHandler>,
    stderr_handler: Option<StreamHandler>,
    restart_delay: Duration,
    stop_on_error: bool,
    stop_signal: StopSignal,
    log: Arc<dyn LogSink>,
}

/// Supervises an external process.
///
/// Spawns the command with stdout and stderr piped, hands each pipe to its
/// registered [`StreamHandler`] for every incarnation, and restarts the
/// process after `restart_delay` whenever it exits. `stop` delivers the
/// configured [`StopSignal`] and waits for the monitor to drain.
pub struct Supervisor {
    command: Command,
    stdout_handler: Option<StreamHandler>,
    stderr_handler: Option<StreamHandler>,

    /// Delay before an exited process is restarted
    pub restart_delay: Duration,

    /// Whether a non-zero exit ends supervision instead of restarting
    pub stop_on_error: bool,

    stop_signal: StopSignal,
    log: Arc<dyn LogSink>,
    stop_tx: Option<watch::Sender<bool>>,
    monitor: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Create a supervisor for the given argument list and KEY=VALUE
    /// environment overrides
    pub fn new(command: &[String], environment: &[String]) -> ProcessResult<Self> {
        let command = Command::from_argv(command, environment)?;

        Ok(Self {
            command,
            stdout_handler: None,
            stderr_handler: None,
            restart_delay: Duration::from_secs(10),
            stop_on_error: false,
            stop_signal: StopSignal::None,
            log: Arc::new(StdLog),
            stop_tx: None,
            monitor: None,
        })
    }

    /// Register the hook that consumes the child's stdout
    pub fn on_stdout(&mut self, handler: StreamHandler) {
        self.stdout_handler = Some(handler);
    }

    /// Register the hook that consumes the child's stderr
    pub fn on_stderr(&mut self, handler: StreamHandler) {
        self.stderr_handler = Some(handler);
    }

    /// Set the signal delivered on stop
    pub fn set_stop_signal(&mut self, signal: StopSignal) {
        self.stop_signal = signal;
    }

    /// Set the log sink used for lifecycle events
    pub fn set_log(&mut self, log: Arc<dyn LogSink>) {
        self.log = log;
    }

    /// Spawn the process and begin supervising it.
    ///
    /// The first spawn happens synchronously so creation failures surface to
    /// the caller; later respawns are the monitor task's business.
    pub async fn start(&mut self) -> ProcessResult<()> {
        if self.monitor.is_some() {
            return Err(ProcessError::Other("supervisor already started".to_string()));
        }

        let child = self.command.spawn()?;

        let inner = Arc::new(Inner {
            command: self.command.clone(),
            stdout_handler: self.stdout_handler.take(),
            stderr_handler: self.stderr_handler.take(),
            restart_delay: self.restart_delay,
            stop_on_error: self.stop_on_error,
            stop_signal: self.stop_signal,
            log: Arc::clone(&self.log),
        });

        let (stop_tx, stop_rx) = watch::channel(false);
        self.stop_tx = Some(stop_tx);
        self.monitor = Some(tokio::spawn(run(inner, child, stop_rx)));

        Ok(())
    }

    /// Stop the process and wait for the monitor task to finish.
    ///
    /// A no-op if the supervisor was never started.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(monitor) = self.monitor.take() {
            let _ = monitor.await;
        }
    }
}

enum Exit {
    Status(io::Result<ExitStatus>),
    Stop,
}

async fn run(inner: Arc<Inner>, mut child: Child, mut stop_rx: watch::Receiver<bool>) {
    loop {
        let mut hooks = Vec::new();
        if let Some(handler) = &inner.stdout_handler {
            if let Some(stdout) = child.stdout.take() {
                hooks.push(tokio::spawn(handler(Box::new(stdout) as OutputStream)));
            }
        }
        if let Some(handler) = &inner.stderr_handler {
            if let Some(stderr) = child.stderr.take() {
                hooks.push(tokio::spawn(handler(Box::new(stderr) as OutputStream)));
            }
        }

        // A dropped stop channel counts as a stop request.
        let exit = tokio::select! {
            status = child.wait() => Exit::Status(status),
            _ = stop_rx.changed() => Exit::Stop,
        };

        match exit {
            Exit::Stop => {
                terminate(&inner, &mut child).await;
                drain(hooks).await;
                return;
            }
            Exit::Status(result) => {
                // Pipes are closed now; the hooks end on EOF.
                drain(hooks).await;

                match result {
                    Ok(status) if status.success() => {
                        inner
                            .log
                            .info(&format!("process {:?} exited: {status}", inner.command.argv()));
                    }
                    Ok(status) => {
                        inner
                            .log
                            .error(&format!("process {:?} exited: {status}", inner.command.argv()));
                        if inner.stop_on_error {
                            return;
                        }
                    }
                    Err(e) => {
                        inner.log.error(&format!("error waiting for process: {e}"));
                        return;
                    }
                }
            }
        }

        if *stop_rx.borrow() {
            return;
        }

        inner.log.info(&format!(
            "restarting {:?} in {:?}",
            inner.command.argv(),
            inner.restart_delay
        ));
        tokio::select! {
            _ = sleep(inner.restart_delay) => {}
            _ = stop_rx.changed() => return,
        }

        child = match inner.command.spawn() {
            Ok(child) => child,
            Err(e) => {
                inner.log.error(&format!("failed to restart process: {e}"));
                return;
            }
        };
    }
}

async fn terminate(inner: &Inner, child: &mut Child) {
    match inner.stop_signal {
        StopSignal::None => {
            if let Err(e) = child.start_kill() {
                inner.log.error(&format!("failed to kill process: {e}"));
            }
        }
        #[cfg(unix)]
        StopSignal::Unix(signal) => {
            use nix::sys::signal::kill;
            use nix::unistd::Pid;

            match child.id() {
                Some(pid) => {
                    if let Err(e) = kill(Pid::from_raw(pid as i32), signal) {
                        inner.log.error(&format!("failed to signal process: {e}"));
                        let _ = child.start_kill();
                    }
                }
                // Already exited, nothing to signal.
                None => {}
            }
        }
    }

    match timeout(STOP_GRACE_PERIOD, child.wait()).await {
        Ok(Ok(status)) => inner.log.debug(&format!("process exited: {status}")),
        Ok(Err(e)) => inner.log.error(&format!("error waiting for process: {e}")),
        Err(_) => {
            inner.log.warn("process did not exit after stop signal; killing");
            let _ = child.kill().await;
        }
    }
}

async fn drain(hooks: Vec<JoinHandle<()>>) {
    for hook in hooks {
        let _ = hook.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncReadExt;

    fn sh(script: &str) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn counting_handler(count: Arc<AtomicUsize>) -> StreamHandler {
        Box::new(move |mut stream| {
            let count = Arc::clone(&count);
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                let mut buf = Vec::new();
                let _ = stream.read_to_end(&mut buf).await;
            })
        })
    }

    #[test]
    fn parse_signal_names() {
        assert_eq!(StopSignal::parse("none").unwrap(), StopSignal::None);
        assert_eq!(StopSignal::parse("NONE").unwrap(), StopSignal::None);
        assert_eq!(
            StopSignal::parse("SIGTERM").unwrap(),
            StopSignal::Unix(nix::sys::signal::Signal::SIGTERM)
        );
        assert_eq!(
            StopSignal::parse("term").unwrap(),
            StopSignal::Unix(nix::sys::signal::Signal::SIGTERM)
        );
        assert_eq!(
            StopSignal::parse("USR1").unwrap(),
            StopSignal::Unix(nix::sys::signal::Signal::SIGUSR1)
        );
        assert!(matches!(
            StopSignal::parse("SIGWINCH"),
            Err(ProcessError::UnknownSignal(_))
        ));
    }

    #[tokio::test]
    async fn restarts_after_exit() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut supervisor = Supervisor::new(&sh("echo hi"), &[]).unwrap();
        supervisor.restart_delay = Duration::from_millis(20);
        supervisor.on_stdout(counting_handler(Arc::clone(&count)));

        supervisor.start().await.unwrap();

        // Enough time for at least one restart cycle.
        for _ in 0..100 {
            if count.load(Ordering::SeqCst) >= 2 {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        supervisor.stop().await;

        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn stop_on_error_ends_supervision() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut supervisor = Supervisor::new(&sh("exit 1"), &[]).unwrap();
        supervisor.restart_delay = Duration::from_millis(10);
        supervisor.stop_on_error = true;
        supervisor.on_stdout(counting_handler(Arc::clone(&count)));

        supervisor.start().await.unwrap();
        sleep(Duration::from_millis(300)).await;
        supervisor.stop().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_kills_long_running_process() {
        let mut supervisor = Supervisor::new(&sh("sleep 60"), &[]).unwrap();
        supervisor.start().await.unwrap();
        sleep(Duration::from_millis(50)).await;

        // "none" kills outright, so this should come back well inside the
        // grace period.
        timeout(Duration::from_secs(2), supervisor.stop())
            .await
            .expect("stop should not hang");
    }

    #[tokio::test]
    async fn stop_with_term_signal() {
        let mut supervisor = Supervisor::new(&sh("sleep 60"), &[]).unwrap();
        supervisor.set_stop_signal(StopSignal::parse("SIGTERM").unwrap());
        supervisor.start().await.unwrap();
        sleep(Duration::from_millis(50)).await;

        timeout(Duration::from_secs(2), supervisor.stop())
            .await
            .expect("stop should not hang");
    }

    #[tokio::test]
    async fn environment_overrides_reach_child() {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(1);
        let mut supervisor = Supervisor::new(
            &sh("printf '%s' \"$SPIGOT_TEST_VAR\""),
            &["SPIGOT_TEST_VAR=hello".to_string()],
        )
        .unwrap();
        supervisor.stop_on_error = true;
        supervisor.restart_delay = Duration::from_secs(60);
        supervisor.on_stdout(Box::new(move |mut stream| {
            let tx = tx.clone();
            Box::pin(async move {
                let mut buf = String::new();
                let _ = stream.read_to_string(&mut buf).await;
                let _ = tx.send(buf).await;
            })
        }));

        supervisor.start().await.unwrap();
        let out = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("stdout in time")
            .expect("one capture");
        supervisor.stop().await;

        assert_eq!(out, "hello");
    }
}
