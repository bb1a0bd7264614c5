//! Process supervision for exec-based metric sources
//!
//! This module owns everything about the operating-system process: building
//! and spawning the command, delivering the configured stop signal, and the
//! restart loop that keeps the command alive across crashes. Consumers attach
//! async hooks that receive the child's stdout and stderr pipes; the
//! supervisor re-invokes those hooks for every incarnation of the process.

mod command;
mod error;
mod supervisor;

pub use command::Command;
pub use error::{ProcessError, ProcessResult};
pub use supervisor::{StopSignal, Supervisor};

use std::future::Future;
use std::pin::Pin;

use tokio::io::AsyncRead;

/// A readable byte stream handed to a stdout/stderr hook
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin + 'static>;

/// An async hook invoked with one of the child's output streams.
///
/// The hook is called once per process incarnation and is expected to read
/// the stream to EOF; the supervisor awaits it before restarting.
pub type StreamHandler =
    Box<dyn Fn(OutputStream) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;
