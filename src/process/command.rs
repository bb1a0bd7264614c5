use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::debug;
use tokio::process::{Child, Command as TokioCommand};

use super::error::{ProcessError, ProcessResult};

/// Command wrapper for process execution
#[derive(Debug, Clone)]
pub struct Command {
    /// Program to execute
    program: String,

    /// Arguments to pass to the program
    args: Vec<String>,

    /// Current working directory
    current_dir: Option<PathBuf>,

    /// Environment variables
    env_vars: HashMap<String, String>,
}

impl Command {
    /// Create a new command
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env_vars: HashMap::new(),
        }
    }

    /// Build a command from an argument list (first entry is the program)
    /// and KEY=VALUE environment overrides. Environment entries without an
    /// `=` are rejected.
    pub fn from_argv(argv: &[String], environment: &[String]) -> ProcessResult<Self> {
        let (program, args) = argv.split_first().ok_or(ProcessError::EmptyCommand)?;

        let mut command = Command::new(program).args(args.iter().cloned());
        for entry in environment {
            let (key, val) = entry.split_once('=').ok_or_else(|| {
                ProcessError::Other(format!("invalid environment entry {:?}", entry))
            })?;
            command = command.env(key, val);
        }

        Ok(command)
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for arg in args {
            self.args.push(arg.into());
        }
        self
    }

    /// Set the current working directory
    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add an environment variable
    pub fn env<K, V>(mut self, key: K, val: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars.insert(key.into(), val.into());
        self
    }

    /// Add multiple environment variables
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, val) in vars {
            self.env_vars.insert(key.into(), val.into());
        }
        self
    }

    /// Get the program and arguments as a single list
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(1 + self.args.len());
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Spawn the command with stdout and stderr piped
    pub fn spawn(&self) -> ProcessResult<Child> {
        debug!("Spawning command: {} {:?}", self.program, self.args);

        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args);

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        for (key, val) in &self.env_vars {
            cmd.env(key, val);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd.spawn().map_err(ProcessError::Spawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_argv_splits_program_and_args() {
        let argv = vec!["prog".to_string(), "-a".to_string(), "-b".to_string()];
        let command = Command::from_argv(&argv, &[]).unwrap();
        assert_eq!(command.argv(), argv);
    }

    #[test]
    fn from_argv_rejects_empty_command() {
        let err = Command::from_argv(&[], &[]).unwrap_err();
        assert!(matches!(err, ProcessError::EmptyCommand));
    }

    #[test]
    fn from_argv_rejects_malformed_environment() {
        let argv = vec!["prog".to_string()];
        let env = vec!["NOT_A_PAIR".to_string()];
        let err = Command::from_argv(&argv, &env).unwrap_err();
        assert!(matches!(err, ProcessError::Other(_)));
    }

    #[tokio::test]
    async fn spawn_missing_program_fails() {
        let command = Command::new("/nonexistent/spigot-test-binary");
        let err = command.spawn().unwrap_err();
        assert!(matches!(err, ProcessError::Spawn(_)));
    }
}
